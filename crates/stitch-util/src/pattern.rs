//! Include/exclude glob sets matched against root-relative paths.

use glob::{MatchOptions, Pattern};

use crate::error::UtilError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled set of include and exclude globs.
///
/// A path is selected when it matches at least one include pattern and no
/// exclude pattern. Paths use `/` separators regardless of platform.
#[derive(Debug, Clone)]
pub struct PatternSet {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl PatternSet {
    /// Compile include and exclude globs.
    ///
    /// # Errors
    /// Returns an error naming the first pattern that fails to compile.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, UtilError> {
        Ok(Self {
            include: compile_all(include)?,
            exclude: compile_all(exclude)?,
        })
    }

    /// Whether `relative` (slash-separated) is selected by this set.
    pub fn matches(&self, relative: &str) -> bool {
        self.include
            .iter()
            .any(|p| p.matches_with(relative, MATCH_OPTIONS))
            && !self
                .exclude
                .iter()
                .any(|p| p.matches_with(relative, MATCH_OPTIONS))
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Pattern>, UtilError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| UtilError::GlobPattern {
                pattern: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn set(include: &[&str], exclude: &[&str]) -> PatternSet {
        let include: Vec<String> = include.iter().map(|s| (*s).to_owned()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| (*s).to_owned()).collect();
        PatternSet::new(&include, &exclude).unwrap()
    }

    #[test]
    fn double_star_matches_any_depth() {
        let s = set(&["**/*.class"], &[]);
        assert!(s.matches("Main.class"));
        assert!(s.matches("org/example/Main.class"));
        assert!(!s.matches("org/example/notes.txt"));
    }

    #[test]
    fn single_star_does_not_cross_directories() {
        let s = set(&["org/*.class"], &[]);
        assert!(s.matches("org/Main.class"));
        assert!(!s.matches("org/example/Main.class"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let s = set(&["**/*.class"], &["**/R$*.class", "**/BuildConfig.class"]);
        assert!(s.matches("com/app/MainActivity.class"));
        assert!(!s.matches("com/app/R$string.class"));
        assert!(!s.matches("com/app/BuildConfig.class"));
    }

    #[test]
    fn empty_include_selects_nothing() {
        let s = set(&[], &[]);
        assert!(!s.matches("Main.class"));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = PatternSet::new(&["a/**b".to_owned()], &[]).unwrap_err();
        assert!(err.to_string().contains("a/**b"), "error was: {err}");
    }
}

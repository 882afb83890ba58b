//! Built-in instrumentation presets.
//!
//! Each preset is a TOML descriptor compiled into the binary. A manifest
//! selects one with `[instrument] preset = "<name>"`.

use serde::Deserialize;
use stitch_config::{MatchRule, Probe};

use crate::error::EngineError;

/// A preset descriptor loaded from a compiled-in TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Preset {
    pub name: String,
    pub description: String,
    pub probe: Probe,
    #[serde(rename = "match")]
    pub matches: Vec<MatchRule>,
}

const FAST_CLICK_DESCRIPTOR: &str = include_str!("../../../presets/fast-click.toml");

/// Load all built-in presets.
///
/// # Errors
/// Returns an error if any embedded descriptor fails to parse.
pub fn load_presets() -> Result<Vec<Preset>, EngineError> {
    let sources = [("fast-click.toml", FAST_CLICK_DESCRIPTOR)];
    let mut presets = Vec::with_capacity(sources.len());

    for (filename, content) in sources {
        let preset: Preset = toml::from_str(content).map_err(|e| EngineError::InvalidPreset {
            name: filename.to_owned(),
            reason: e.to_string(),
        })?;
        presets.push(preset);
    }

    Ok(presets)
}

/// Look up a preset by name.
///
/// # Errors
/// Returns an error if no built-in preset has that name.
pub fn find_preset(name: &str) -> Result<Preset, EngineError> {
    let presets = load_presets()?;
    let available = presets
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    presets
        .iter()
        .find(|p| p.name == name)
        .cloned()
        .ok_or(EngineError::UnknownPreset {
            name: name.to_owned(),
            available,
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stitch_config::ProbeKind;

    #[test]
    fn all_presets_parse() {
        let presets = load_presets().unwrap();
        assert!(!presets.is_empty());
        for preset in &presets {
            assert!(!preset.matches.is_empty(), "{} has no rules", preset.name);
        }
    }

    #[test]
    fn fast_click_guards_on_click() {
        let preset = find_preset("fast-click").unwrap();
        assert_eq!(preset.probe.owner, "org/example/FastClickUtil");
        assert_eq!(preset.probe.method, "isFastDoubleClick");
        assert_eq!(preset.probe.kind, ProbeKind::Guard);
        let rule = preset.matches.first().unwrap();
        assert_eq!(rule.name, "onClick");
        assert_eq!(rule.descriptor.as_deref(), Some("(Landroid/view/View;)V"));
        assert_eq!(
            rule.implements.as_deref(),
            Some("android/view/View$OnClickListener")
        );
    }

    #[test]
    fn unknown_preset_lists_available() {
        let err = find_preset("nope").unwrap_err().to_string();
        assert!(err.contains("nope"), "{err}");
        assert!(err.contains("fast-click"), "{err}");
    }
}

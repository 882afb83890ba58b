//! JVM target names and their class-file versions.

use std::fmt;
use std::str::FromStr;

/// Oldest release Stitch understands (`1.1`, class-file major 45).
const MIN_RELEASE: u16 = 1;
/// Newest release Stitch understands (Java 25, class-file major 69).
const MAX_RELEASE: u16 = 25;
/// Class-file major version of release 0, so that `major = OFFSET + release`.
const MAJOR_OFFSET: u16 = 44;
/// First release whose verifier requires `StackMapTable` frames (Java 6).
const STACK_MAP_RELEASE: u16 = 6;

/// A JVM bytecode target, e.g. `1.8` or `17`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JvmTarget {
    release: u16,
}

impl JvmTarget {
    /// Java 8, the default target of the Kotlin and Android toolchains.
    pub const JAVA_8: Self = Self { release: 8 };

    /// The target whose class files carry `major` as their major version.
    ///
    /// # Errors
    /// Returns an error if `major` is outside the supported range.
    pub fn from_major(major: u16) -> Result<Self, TargetError> {
        let release = major
            .checked_sub(MAJOR_OFFSET)
            .filter(|r| (MIN_RELEASE..=MAX_RELEASE).contains(r))
            .ok_or(TargetError::UnsupportedMajor { major })?;
        Ok(Self { release })
    }

    /// The class-file major version emitted for this target.
    pub fn major_version(self) -> u16 {
        MAJOR_OFFSET.saturating_add(self.release)
    }

    /// The feature release number (`8` for `1.8`).
    pub fn release(self) -> u16 {
        self.release
    }

    /// Whether methods compiled for this target must carry stack map frames.
    pub fn requires_stack_maps(self) -> bool {
        self.release >= STACK_MAP_RELEASE
    }

    /// Whether a class file with the given major version can run on this target.
    pub fn accepts_major(self, major: u16) -> bool {
        major <= self.major_version()
    }
}

impl Default for JvmTarget {
    fn default() -> Self {
        Self::JAVA_8
    }
}

impl fmt::Display for JvmTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.release <= 8 {
            write!(f, "1.{}", self.release)
        } else {
            write!(f, "{}", self.release)
        }
    }
}

impl FromStr for JvmTarget {
    type Err = TargetError;

    /// Parse `1.1`–`1.8` or a bare release number from `5` upwards.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TargetError::UnknownTarget {
            name: s.to_owned(),
        };
        let trimmed = s.trim();
        let release = match trimmed.strip_prefix("1.") {
            Some(minor) => {
                let release: u16 = minor.parse().map_err(|_| invalid())?;
                if release > 8 {
                    return Err(invalid());
                }
                release
            }
            None => {
                let release: u16 = trimmed.parse().map_err(|_| invalid())?;
                if release < 5 {
                    return Err(invalid());
                }
                release
            }
        };
        if !(MIN_RELEASE..=MAX_RELEASE).contains(&release) {
            return Err(invalid());
        }
        Ok(Self { release })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("unknown JVM target \"{name}\"; use 1.1 through 1.8, or 9 through {MAX_RELEASE}")]
    UnknownTarget { name: String },
    #[error("class-file major version {major} does not correspond to a supported JVM release")]
    UnsupportedMajor { major: u16 },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn java_8_is_major_52() {
        let target: JvmTarget = "1.8".parse().unwrap();
        assert_eq!(target, JvmTarget::JAVA_8);
        assert_eq!(target.major_version(), 52);
    }

    #[test]
    fn bare_release_numbers() {
        assert_eq!("8".parse::<JvmTarget>().unwrap().major_version(), 52);
        assert_eq!("11".parse::<JvmTarget>().unwrap().major_version(), 55);
        assert_eq!("17".parse::<JvmTarget>().unwrap().major_version(), 61);
        assert_eq!("21".parse::<JvmTarget>().unwrap().major_version(), 65);
    }

    #[test]
    fn legacy_targets() {
        assert_eq!("1.1".parse::<JvmTarget>().unwrap().major_version(), 45);
        assert_eq!("1.5".parse::<JvmTarget>().unwrap().major_version(), 49);
    }

    #[test]
    fn rejects_unknown_names() {
        for name in ["", "1.9", "1.0", "4", "26", "jvm8", "1.8.0"] {
            assert!(name.parse::<JvmTarget>().is_err(), "accepted {name:?}");
        }
    }

    #[test]
    fn display_uses_conventional_names() {
        assert_eq!(JvmTarget::JAVA_8.to_string(), "1.8");
        assert_eq!("17".parse::<JvmTarget>().unwrap().to_string(), "17");
    }

    #[test]
    fn stack_maps_start_at_java_6() {
        assert!(!"1.5".parse::<JvmTarget>().unwrap().requires_stack_maps());
        assert!("1.6".parse::<JvmTarget>().unwrap().requires_stack_maps());
    }

    #[test]
    fn accepts_older_majors_only() {
        let target = JvmTarget::JAVA_8;
        assert!(target.accepts_major(50));
        assert!(target.accepts_major(52));
        assert!(!target.accepts_major(55));
    }

    #[test]
    fn from_major_rejects_out_of_range() {
        assert!(JvmTarget::from_major(44).is_err());
        assert!(JvmTarget::from_major(70).is_err());
        assert_eq!(JvmTarget::from_major(61).unwrap().release(), 17);
    }

    proptest! {
        #[test]
        fn display_parse_round_trip(release in MIN_RELEASE..=MAX_RELEASE) {
            let target = JvmTarget { release };
            let parsed: JvmTarget = target.to_string().parse().unwrap();
            prop_assert_eq!(parsed, target);
        }

        #[test]
        fn major_round_trip(release in MIN_RELEASE..=MAX_RELEASE) {
            let target = JvmTarget { release };
            prop_assert_eq!(JvmTarget::from_major(target.major_version()).unwrap(), target);
        }
    }
}

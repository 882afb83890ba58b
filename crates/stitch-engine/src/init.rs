//! Project scaffolding for `stitch init`.

use std::path::Path;

use stitch_config::{Instrument, Manifest};

use crate::error::EngineError;
use crate::plugin::MANIFEST_FILE;
use crate::preset::find_preset;

/// Write a starter `stitch.toml` into `dir`.
///
/// With a preset, the manifest only names it. Without one, the manifest
/// spells out the `fast-click` probe and rules so they can be edited.
///
/// # Errors
/// Returns an error if:
/// - A `stitch.toml` already exists in `dir`
/// - The preset is unknown
/// - The directory or manifest cannot be written
pub fn init_project(dir: &Path, preset: Option<&str>) -> Result<(), EngineError> {
    let manifest_path = dir.join(MANIFEST_FILE);

    if manifest_path.exists() {
        return Err(EngineError::ProjectExists {
            path: manifest_path.display().to_string(),
        });
    }

    let manifest = match preset {
        Some(name) => {
            find_preset(name)?;
            Manifest {
                instrument: Instrument {
                    preset: Some(name.to_owned()),
                    ..Instrument::default()
                },
                ..Manifest::default()
            }
        }
        None => {
            let template = find_preset("fast-click")?;
            Manifest {
                instrument: Instrument::default(),
                probe: Some(template.probe),
                matches: template.matches,
            }
        }
    };
    manifest.validate()?;

    stitch_util::fs::ensure_dir(dir)?;
    manifest.write_to(&manifest_path)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn writes_explicit_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("app");

        init_project(&project_dir, None).unwrap();

        let manifest = Manifest::from_path(&project_dir.join(MANIFEST_FILE)).unwrap();
        assert_eq!(manifest.instrument.input, "build/classes");
        assert!(manifest.instrument.preset.is_none());
        assert_eq!(
            manifest.probe.map(|p| p.owner).as_deref(),
            Some("org/example/FastClickUtil")
        );
        assert_eq!(manifest.matches.len(), 1);
    }

    #[test]
    fn writes_preset_manifest() {
        let tmp = tempfile::tempdir().unwrap();

        init_project(tmp.path(), Some("fast-click")).unwrap();

        let content = fs::read_to_string(tmp.path().join(MANIFEST_FILE)).unwrap();
        assert!(content.contains("preset = \"fast-click\""), "{content}");
        assert!(!content.contains("[probe]"), "{content}");
        let manifest = Manifest::from_path(&tmp.path().join(MANIFEST_FILE)).unwrap();
        assert!(manifest.matches.is_empty());
    }

    #[test]
    fn refuses_existing_project() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(MANIFEST_FILE), "").unwrap();

        let err = init_project(tmp.path(), None).unwrap_err().to_string();
        assert!(err.contains("already exists"), "{err}");
    }

    #[test]
    fn unknown_preset_writes_nothing() {
        let tmp = tempfile::tempdir().unwrap();

        let err = init_project(tmp.path(), Some("nope")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownPreset { .. }), "{err}");
        assert!(!tmp.path().join(MANIFEST_FILE).exists());
    }

    #[test]
    fn creates_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let project_dir = tmp.path().join("deep").join("nested");

        init_project(&project_dir, None).unwrap();

        assert!(project_dir.join(MANIFEST_FILE).exists());
    }
}

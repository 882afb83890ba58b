//! Parse and validate `stitch.toml`.

pub mod manifest;

pub use manifest::{
    check_disjoint, Instrument, Manifest, ManifestError, MatchRule, Probe, ProbeKind,
};

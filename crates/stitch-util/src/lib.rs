#![forbid(unsafe_code)]
//! Hashing, filesystem and glob helpers for Stitch.

pub mod error;
pub mod fs;
pub mod hash;
pub mod pattern;

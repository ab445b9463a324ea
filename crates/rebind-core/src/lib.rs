//! Core data types for rebind.
//!
//! This crate defines the vocabulary shared by the resolver and the
//! operations layer: case-insensitive names, package and module versions,
//! target profiles, resolved binaries, library models, per-project
//! manifests (and the project assets loader that produces them), the
//! workspace description file, and the framework redistribution list.
//!
//! Nothing here touches the package cache or opens binaries.

pub mod assets;
pub mod binary;
pub mod library;
pub mod manifest;
pub mod name;
pub mod profile;
pub mod redist;
pub mod version;
pub mod workspace;

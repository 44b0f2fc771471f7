//! Build pipeline for a VPM package repository index.
//!
//! This crate loads per-version package manifests from a directory, makes
//! sure each one carries a verified `zipSHA256`, groups them into a single
//! repository document and writes it out as canonical JSON.

#![forbid(unsafe_code)]

pub mod build;
pub mod config;
pub mod digest;
pub mod error;
pub mod index;
pub mod integrity;
pub mod loader;
pub mod manifest;
pub mod serialize;

pub use build::{BuildSummary, run, run_with};
pub use config::{BuildConfig, ConfigError, DigestPolicy, ReleaseConfig, RepositoryInfo};
pub use digest::Sha256Digest;
pub use error::{BuildError, BuildResult};
pub use index::{IndexBuilder, PackageIndex, Repository, merge};
pub use integrity::{DigestSource, IntegrityResolver};
pub use manifest::{Author, HttpUrl, Manifest};
pub use serialize::{to_canonical_json, write_repository};

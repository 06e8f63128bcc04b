//! Parsed pipeline configuration and its validation rules.
//!
//! The concrete on-disk schema (YAML/TOML/JSON) is outside this crate's
//! concern; callers parse their own format into a [`Config`] and hand it
//! to [`crate::pipeline::Pipeline::new`]. `serde(default)` throughout
//! means unknown fields on the caller's side simply aren't represented
//! here and never fail deserialization of this struct itself.

mod validate;

pub use validate::{validate, ValidationError};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::announce::WebhookConfig;
use crate::build::BuildSpec;
use crate::packagers::{ArchiveConfig, LinuxPackageConfig};
use crate::postprocess::ChecksumAlgorithm;
use crate::publishers::{BlobStoreConfig, GitHostingConfig};

fn default_dist() -> String {
    "dist".to_owned()
}

/// A minimal declared Docker image target, carried for configuration
/// completeness; forgecast's core has no built-in Docker packager (image
/// builds delegate entirely to an external `docker build`/`buildx`
/// invocation a caller-side plugin provides), so this only validates and
/// flows into the template context for such a plugin to consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    pub id: String,
    pub image_template: String,
    #[serde(default)]
    pub dockerfile: Option<String>,
    #[serde(default)]
    pub builds: Vec<String>,
}

/// Declared checksum configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumConfig {
    #[serde(default = "default_sha256")]
    pub algorithm: String,
}

fn default_sha256() -> String {
    "sha256".to_owned()
}

impl ChecksumConfig {
    pub fn algorithm(&self) -> Result<ChecksumAlgorithm, ValidationError> {
        match self.algorithm.as_str() {
            "sha256" => Ok(ChecksumAlgorithm::Sha256),
            "sha3-256" => Ok(ChecksumAlgorithm::Sha3_256),
            "blake2b" => Ok(ChecksumAlgorithm::Blake2b),
            other => Err(ValidationError(format!("unsupported checksum algorithm {other:?}"))),
        }
    }
}

/// The top-level, parsed pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub project_name: String,
    #[serde(default = "default_dist")]
    pub dist: String,
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    #[serde(default)]
    pub builds: Vec<BuildSpec>,
    #[serde(default)]
    pub archives: Vec<ArchiveConfig>,
    #[serde(default)]
    pub nfpms: Vec<LinuxPackageConfig>,
    #[serde(default)]
    pub dockers: Vec<DockerConfig>,
    #[serde(default)]
    pub checksum: ChecksumConfig,
    #[serde(default)]
    pub release: Vec<GitHostingConfig>,
    #[serde(default)]
    pub blob_stores: Vec<BlobStoreConfig>,
    #[serde(default)]
    pub announce: Vec<WebhookConfig>,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub maintainer: String,
    #[serde(default)]
    pub vendor: String,
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self { algorithm: default_sha256() }
    }
}

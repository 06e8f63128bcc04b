#![deny(missing_docs)]

//! # forgecast-schema
//!
//! This crate exists to serialize and deserialize the
//! `dist/artifacts.json` manifest produced by [`forgecast`](https://docs.rs/forgecast).
//! It carries no pipeline logic, only the wire format, so that other tools
//! (CI steps, dashboards) can depend on it without pulling in the engine.
//!
//! The root type is [`Artifact`]; [`ReleaseManifest`] is a flat array of
//! them, matching the persisted-manifest format: a JSON array with one
//! object per artifact.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

mod kind;
pub use kind::ArtifactKind;

/// An entire persisted artifact manifest: one entry per artifact,
/// insertion-ordered.
pub type ReleaseManifest = Vec<Artifact>;

/// The universal unit of pipeline output.
///
/// `name` is unique only within its `(build_id, goos, goarch, goarm)`
/// group, never globally. `path` is empty for artifacts that are pure
/// remote references (e.g. a Docker image with no local file).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Artifact {
    /// The filename as it will appear in a release.
    pub name: String,
    /// Absolute path on local disk. Omitted for artifacts with no local
    /// backing file.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub path: Option<Utf8PathBuf>,
    /// The artifact's type tag. Serialized as `"type"`.
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    /// Target OS, e.g. `"linux"`. Empty string means not applicable.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goos: Option<String>,
    /// Target CPU architecture, e.g. `"amd64"`.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goarch: Option<String>,
    /// ARM sub-architecture, e.g. `"7"`. Only meaningful when `goarch == "arm"`.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goarm: Option<String>,
    /// AMD64 microarchitecture level, e.g. `"v3"`.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goamd64: Option<String>,
    /// The id of the build that produced this artifact, if any.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_id: Option<String>,
    /// Free-form per-kind side data (`format`, `image`, `installer`, ...).
    /// Preserves unknown fields on load/forward-compat round trips.
    #[serde(default)]
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Artifact {
    /// Build a minimal artifact with no platform metadata, as produced by
    /// e.g. a checksum or SBOM post-processor that isn't platform-specific.
    pub fn new(name: impl Into<String>, kind: ArtifactKind) -> Self {
        Self {
            name: name.into(),
            path: None,
            kind,
            goos: None,
            goarch: None,
            goarm: None,
            goamd64: None,
            build_id: None,
            extra: BTreeMap::new(),
        }
    }

    /// Attach a local path to this artifact.
    pub fn with_path(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach the platform triple this artifact was built for.
    pub fn with_platform(mut self, goos: impl Into<String>, goarch: impl Into<String>) -> Self {
        self.goos = Some(goos.into());
        self.goarch = Some(goarch.into());
        self
    }

    /// Attach the build id that produced this artifact.
    pub fn with_build_id(mut self, build_id: impl Into<String>) -> Self {
        self.build_id = Some(build_id.into());
        self
    }

    /// Set a single `extra` side-data field.
    pub fn with_extra(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// The `(goos, goarch, goarm)` platform key used for grouping.
    pub fn platform_key(&self) -> (String, String, String) {
        (
            self.goos.clone().unwrap_or_default(),
            self.goarch.clone().unwrap_or_default(),
            self.goarm.clone().unwrap_or_default(),
        )
    }
}

/// Render the JSON Schema for [`ReleaseManifest`], for `forgecast schema`-style
/// tooling or documentation generation.
pub fn json_schema() -> schemars::schema::RootSchema {
    schemars::schema_for!(ReleaseManifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_round_trips_through_json() {
        let artifact = Artifact::new("demo_1.2.3_linux_amd64.tar.gz", ArtifactKind::archive())
            .with_platform("linux", "amd64")
            .with_build_id("a")
            .with_extra("format", "tar.gz");

        let json = serde_json::to_string_pretty(&artifact).unwrap();
        let back: Artifact = serde_json::from_str(&json).unwrap();
        assert_eq!(back, artifact);
        assert!(json.contains("\"type\": \"Archive\""));
    }

    #[test]
    fn unknown_extra_fields_round_trip_via_extra() {
        let raw = r#"{
            "name": "demo.snap",
            "type": "SnapPackage",
            "confinement": "strict"
        }"#;
        let artifact: Artifact = serde_json::from_str(raw).unwrap();
        assert_eq!(artifact.kind.as_str(), "SnapPackage");
        assert!(!artifact.kind.is_known());
    }

    #[test]
    fn manifest_schema_renders() {
        let schema = json_schema();
        insta::assert_snapshot!(serde_json::to_string_pretty(&schema).unwrap());
    }
}

//! The type tag carried by every [`crate::Artifact`].
//!
//! `ArtifactKind` is a thin wrapper around `String`, not a closed Rust
//! `enum`. cargo-dist-schema's `ArtifactKind` is a `#[serde(tag = "kind")]`
//! enum with a `#[serde(other)] Unknown` fallback variant, which is the
//! right shape for a schema-versioned, closed set of kinds. Forgecast's
//! artifact taxonomy is plugin-extensible instead (any packager can invent
//! a new kind), so an `Unknown` variant would still lose the original
//! string on a load/save round trip. Keeping the string directly is how
//! `ArtifactKind` satisfies "unknown values are carried through untouched".

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The type tag of an [`crate::Artifact`]: an open enumeration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct ArtifactKind(String);

impl ArtifactKind {
    /// A built executable, produced directly by a [`crate`]-external builder.
    pub const BINARY: &'static str = "Binary";
    /// A tar/zip archive bundling one or more artifacts.
    pub const ARCHIVE: &'static str = "Archive";
    /// An OS-native package (deb, rpm, ...).
    pub const LINUX_PACKAGE: &'static str = "LinuxPackage";
    /// A container image pushed to a registry.
    pub const DOCKER_IMAGE: &'static str = "DockerImage";
    /// A multi-arch container manifest list.
    pub const DOCKER_MANIFEST: &'static str = "DockerManifest";
    /// A source tarball.
    pub const SOURCE_ARCHIVE: &'static str = "SourceArchive";
    /// A checksum manifest (e.g. `checksums.txt`).
    pub const CHECKSUM: &'static str = "Checksum";
    /// A detached signature.
    pub const SIGNATURE: &'static str = "Signature";
    /// A software bill of materials.
    pub const SBOM: &'static str = "SBOM";
    /// A macOS `.app` bundle.
    pub const APP_BUNDLE: &'static str = "AppBundle";
    /// A macOS disk image.
    pub const DMG: &'static str = "DMG";
    /// A macOS installer package.
    pub const PKG: &'static str = "PKG";
    /// A Windows MSI installer.
    pub const MSI: &'static str = "MSI";
    /// A Windows NSIS installer.
    pub const NSIS: &'static str = "NSIS";
    /// A merged multi-architecture binary (e.g. macOS universal binary).
    pub const UNIVERSAL_BINARY: &'static str = "UniversalBinary";
    /// Free-form metadata with no installable payload.
    pub const METADATA: &'static str = "Metadata";
    /// A language-registry package (npm tarball, crate, wheel, ...).
    pub const PACKAGE: &'static str = "Package";

    const KNOWN: &'static [&'static str] = &[
        Self::BINARY,
        Self::ARCHIVE,
        Self::LINUX_PACKAGE,
        Self::DOCKER_IMAGE,
        Self::DOCKER_MANIFEST,
        Self::SOURCE_ARCHIVE,
        Self::CHECKSUM,
        Self::SIGNATURE,
        Self::SBOM,
        Self::APP_BUNDLE,
        Self::DMG,
        Self::PKG,
        Self::MSI,
        Self::NSIS,
        Self::UNIVERSAL_BINARY,
        Self::METADATA,
        Self::PACKAGE,
    ];

    /// Build an `ArtifactKind` from any string, known or not.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The kind as it was constructed, verbatim.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this kind is one of forgecast's own documented kinds.
    pub fn is_known(&self) -> bool {
        Self::KNOWN.contains(&self.0.as_str())
    }
}

macro_rules! known_kind_ctor {
    ($($ctor:ident => $konst:ident),* $(,)?) => {
        impl ArtifactKind {
            $(
                #[doc = concat!("The well-known `", stringify!($konst), "` kind.")]
                pub fn $ctor() -> Self {
                    Self(Self::$konst.to_owned())
                }
            )*
        }
    };
}

known_kind_ctor! {
    binary => BINARY,
    archive => ARCHIVE,
    linux_package => LINUX_PACKAGE,
    docker_image => DOCKER_IMAGE,
    docker_manifest => DOCKER_MANIFEST,
    source_archive => SOURCE_ARCHIVE,
    checksum => CHECKSUM,
    signature => SIGNATURE,
    sbom => SBOM,
    app_bundle => APP_BUNDLE,
    dmg => DMG,
    pkg => PKG,
    msi => MSI,
    nsis => NSIS,
    universal_binary => UNIVERSAL_BINARY,
    metadata => METADATA,
    package => PACKAGE,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ArtifactKind {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ArtifactKind {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for ArtifactKind {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ArtifactKind {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_constructors_match_constants() {
        assert_eq!(ArtifactKind::binary().as_str(), ArtifactKind::BINARY);
        assert!(ArtifactKind::binary().is_known());
    }

    #[test]
    fn unknown_kind_round_trips_verbatim() {
        let kind = ArtifactKind::new("FlatpakRef");
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"FlatpakRef\"");
        let back: ArtifactKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
        assert!(!back.is_known());
    }
}

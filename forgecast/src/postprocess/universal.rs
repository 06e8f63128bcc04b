//! Merges per-architecture binaries from the same build into one
//! macOS-style universal (fat) binary using `lipo`, then optionally
//! removes the inputs it merged.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::PostProcessor;
use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::proc::Cmd;
use crate::template::TemplateContext;

/// Whether `path` parses as a Mach-O (thin or fat) binary. Inputs that
/// fail this check are skipped with a warning rather than handed to
/// `lipo`, which would otherwise fail the whole stage on one bad input.
fn is_macho(path: &camino::Utf8Path) -> bool {
    let Ok(bytes) = std::fs::read(path) else {
        return false;
    };
    matches!(
        goblin::Object::parse(&bytes),
        Ok(goblin::Object::Mach(_))
    )
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniversalBinaryConfig {
    /// Restrict to this build id; required, since merging only makes
    /// sense within one build's darwin/amd64 + darwin/arm64 outputs.
    pub build_id: String,
    /// Output binary name, templated.
    pub name_template: String,
    /// When `true`, the merged-away per-arch binaries are removed from
    /// the store so later stages (archiving, packaging) only see the
    /// universal binary.
    #[serde(default)]
    pub replace: bool,
}

pub struct UniversalBinaryProcessor {
    config: UniversalBinaryConfig,
    dist_dir: Utf8PathBuf,
}

impl UniversalBinaryProcessor {
    pub fn new(config: UniversalBinaryConfig, dist_dir: Utf8PathBuf) -> Self {
        Self { config, dist_dir }
    }
}

impl PostProcessor for UniversalBinaryProcessor {
    fn name(&self) -> &str {
        "universal_binary"
    }

    fn run(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()> {
        ctx.check()?;
        let inputs: Vec<Artifact> = store
            .filter(&[ArtifactStore::by_type(ArtifactKind::BINARY), ArtifactStore::by_goos("darwin"), ArtifactStore::by_build_id(self.config.build_id.as_str())])
            .into_iter()
            .filter(|a| a.path.is_some())
            .filter(|a| {
                let path = a.path.as_ref().expect("filtered for Some above");
                if is_macho(path) {
                    true
                } else {
                    tracing::warn!(artifact = %a.name, "not a Mach-O binary, excluding from universal merge");
                    false
                }
            })
            .collect();

        if inputs.len() < 2 {
            return Ok(());
        }

        if which::which("lipo").is_err() {
            tracing::warn!("lipo not found on PATH, skipping universal binary merge");
            return Ok(());
        }

        let name = tmpl.apply("universal.name", &self.config.name_template)?;
        let output_path = self.dist_dir.join(&self.config.build_id).join(&name);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
        }

        let mut cmd = Cmd::new("lipo", "universal-binary").arg("-create").arg("-output").arg(output_path.as_str());
        for input in &inputs {
            cmd = cmd.arg(input.path.as_ref().unwrap().as_str());
        }
        cmd.run_as_package("lipo")?;

        let merged = Artifact::new(name, ArtifactKind::universal_binary())
            .with_path(output_path)
            .with_platform("darwin", "universal")
            .with_build_id(self.config.build_id.clone());
        store.add(merged);

        if self.config.replace {
            let merged_ids: Vec<String> = inputs.iter().map(|a| a.name.clone()).collect();
            store.remove(|a| a.kind.as_str() == ArtifactKind::BINARY && merged_ids.contains(&a.name) && a.goos.as_deref() == Some("darwin"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fewer_than_two_darwin_binaries_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = ArtifactStore::new();
        let path = root.join("demo_darwin_amd64");
        std::fs::write(&path, b"not really a binary").unwrap();
        store.add(
            Artifact::new("demo_darwin_amd64", ArtifactKind::binary())
                .with_path(path)
                .with_platform("darwin", "amd64")
                .with_build_id("build0"),
        );

        let config = UniversalBinaryConfig { build_id: "build0".into(), name_template: "demo_universal".into(), replace: false };
        let processor = UniversalBinaryProcessor::new(config, root.join("dist"));
        processor.run(&RunContext::new(), &store, &TemplateContext::new()).unwrap();
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn non_macho_inputs_are_excluded_even_with_two_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = ArtifactStore::new();
        for (name, arch) in [("demo_darwin_amd64", "amd64"), ("demo_darwin_arm64", "arm64")] {
            let path = root.join(name);
            std::fs::write(&path, b"plain text, not Mach-O").unwrap();
            store.add(
                Artifact::new(name, ArtifactKind::binary())
                    .with_path(path)
                    .with_platform("darwin", arch)
                    .with_build_id("build0"),
            );
        }

        let config = UniversalBinaryConfig { build_id: "build0".into(), name_template: "demo_universal".into(), replace: true };
        let processor = UniversalBinaryProcessor::new(config, root.join("dist"));
        processor.run(&RunContext::new(), &store, &TemplateContext::new()).unwrap();
        // Neither input parsed as Mach-O, so the merge never ran and both inputs survive.
        assert_eq!(store.count(), 2);
    }
}

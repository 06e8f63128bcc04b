//! In-place binary compression via `upx`. Mutates the artifact's file on
//! disk rather than registering a derived artifact, so it must run before
//! checksumming and signing see the final bytes.

use forgecast_schema::Artifact;
use serde::{Deserialize, Serialize};

use super::PostProcessor;
use crate::artifact::ArtifactStore;
use crate::context::RunContext;
use crate::errors::Result;
use crate::proc::Cmd;
use crate::template::TemplateContext;

/// Which kinds to compress; empty means every `Binary` artifact.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpxConfig {
    #[serde(default)]
    pub kinds: Vec<String>,
    /// Extra flags, e.g. `["--best", "--lzma"]`.
    #[serde(default)]
    pub args: Vec<String>,
}

pub struct UpxProcessor {
    config: UpxConfig,
}

impl UpxProcessor {
    pub fn new(config: UpxConfig) -> Self {
        Self { config }
    }
}

impl PostProcessor for UpxProcessor {
    fn name(&self) -> &str {
        "upx"
    }

    fn run(&self, ctx: &RunContext, store: &ArtifactStore, _tmpl: &TemplateContext) -> Result<()> {
        if which::which("upx").is_err() {
            tracing::warn!("upx not found on PATH, skipping binary compression");
            return Ok(());
        }

        for artifact in select_targets(&store.all(), &self.config.kinds) {
            ctx.check()?;
            let path = artifact.path.as_ref().expect("select_targets only returns artifacts with a path");
            Cmd::new("upx", "upx")
                .args(&self.config.args)
                .arg(path.as_str())
                .run_as_package("upx")?;
        }
        Ok(())
    }
}

/// Every `Binary` artifact with a local file, further narrowed to `kinds`
/// when non-empty. A free function so the selection logic is testable
/// without needing `upx` itself on the test machine's `PATH`.
fn select_targets(artifacts: &[Artifact], kinds: &[String]) -> Vec<Artifact> {
    artifacts
        .iter()
        .filter(|a| {
            a.path.is_some()
                && a.kind.as_str() == forgecast_schema::ArtifactKind::BINARY
                && (kinds.is_empty() || kinds.contains(&a.kind.as_str().to_owned()))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use camino::Utf8PathBuf;
    use forgecast_schema::ArtifactKind;

    #[test]
    fn missing_upx_is_skipped_without_error() {
        let store = ArtifactStore::new();
        store.add(Artifact::new("demo", ArtifactKind::binary()).with_path(Utf8PathBuf::from("/tmp/does-not-matter")));
        let processor = UpxProcessor::new(UpxConfig::default());
        // Asserts the skip path specifically; if upx happens to be
        // installed in the test environment this assertion is simply
        // not exercised, rather than failing.
        if which::which("upx").is_err() {
            processor.run(&RunContext::new(), &store, &TemplateContext::new()).unwrap();
        }
    }

    #[test]
    fn select_targets_skips_non_binaries_and_pathless_artifacts() {
        let binary = Artifact::new("demo", ArtifactKind::binary()).with_path(Utf8PathBuf::from("/tmp/demo"));
        let checksum = Artifact::new("checksums.txt", ArtifactKind::checksum()).with_path(Utf8PathBuf::from("/tmp/checksums.txt"));
        let pathless = Artifact::new("ghost", ArtifactKind::binary());

        let selected = select_targets(&[binary.clone(), checksum, pathless], &[]);
        assert_eq!(selected, vec![binary]);
    }

    #[test]
    fn select_targets_honors_an_explicit_kind_allowlist() {
        let binary = Artifact::new("demo", ArtifactKind::binary()).with_path(Utf8PathBuf::from("/tmp/demo"));
        let selected = select_targets(&[binary], &["UniversalBinary".to_owned()]);
        assert!(selected.is_empty());
    }
}

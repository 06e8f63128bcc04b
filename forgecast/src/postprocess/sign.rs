//! Detached-signature generation. Runs last in the
//! checksum/SBOM/compression/signing chain so it observes the truly
//! final bytes of each artifact.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::PostProcessor;
use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::proc::Cmd;
use crate::template::TemplateContext;

/// How to invoke the external signer. Forgecast has no in-process
/// signing implementation (private key handling belongs to a dedicated,
/// audited tool), so this is always a subprocess call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignConfig {
    /// The signer binary, e.g. `"cosign"`, `"gpg"`.
    pub command: String,
    /// Arguments, templated; `{{ .Artifact }}`/`{{ .Signature }}`
    /// placeholders are substituted with the input/output paths before
    /// template expansion so signer-specific flag orders still work.
    pub args: Vec<String>,
    /// Kinds to sign; empty means every artifact with a local file.
    #[serde(default)]
    pub kinds: Vec<String>,
}

pub struct SignProcessor {
    config: SignConfig,
    dist_dir: Utf8PathBuf,
}

impl SignProcessor {
    pub fn new(config: SignConfig, dist_dir: Utf8PathBuf) -> Self {
        Self { config, dist_dir }
    }
}

impl PostProcessor for SignProcessor {
    fn name(&self) -> &str {
        "sign"
    }

    fn run(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()> {
        if which::which(&self.config.command).is_err() {
            tracing::warn!(signer = %self.config.command, "signer not found on PATH, skipping signing");
            return Ok(());
        }

        let targets: Vec<Artifact> = store
            .all()
            .into_iter()
            .filter(|a| a.path.is_some())
            .filter(|a| self.config.kinds.is_empty() || self.config.kinds.contains(&a.kind.as_str().to_owned()))
            .collect();

        for artifact in targets {
            ctx.check()?;
            let source = artifact.path.as_ref().expect("filtered for Some above");
            let signature_name = format!("{}.sig", artifact.name);
            let signature_path = self.dist_dir.join(&signature_name);
            if let Some(parent) = signature_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
            }

            let mut rendered_args = Vec::with_capacity(self.config.args.len());
            for arg in &self.config.args {
                let substituted = arg.replace("{{ .Artifact }}", source.as_str()).replace("{{ .Signature }}", signature_path.as_str());
                rendered_args.push(tmpl.apply("sign.arg", &substituted)?);
            }

            Cmd::new(&self.config.command, "sign")
                .args(&rendered_args)
                .run_as_package("sign")?;

            store.add(
                Artifact::new(signature_name, ArtifactKind::signature())
                    .with_path(signature_path)
                    .with_extra("subject", artifact.name.clone()),
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_signer_is_skipped_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = ArtifactStore::new();
        store.add(Artifact::new("demo.tar.gz", ArtifactKind::archive()).with_path(root.join("demo.tar.gz")));

        let config = SignConfig { command: "definitely-not-a-real-signer".into(), args: Vec::new(), kinds: Vec::new() };
        let processor = SignProcessor::new(config, root.join("dist"));
        processor.run(&RunContext::new(), &store, &TemplateContext::new()).unwrap();
        assert_eq!(store.filter(&[ArtifactStore::by_type(ArtifactKind::SIGNATURE)]).len(), 0);
    }
}

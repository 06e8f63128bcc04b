//! A minimal CycloneDX-shaped SBOM per publishable artifact. Must
//! observe the final artifact (after checksumming/packaging), not the
//! raw binary, so any post-checksum mutation doesn't go unaccounted.

use camino::Utf8PathBuf;
use serde::Serialize;

use super::PostProcessor;
use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

#[derive(Serialize)]
struct CycloneDxDocument {
    #[serde(rename = "bomFormat")]
    bom_format: &'static str,
    #[serde(rename = "specVersion")]
    spec_version: &'static str,
    version: u32,
    metadata: CycloneDxMetadata,
}

#[derive(Serialize)]
struct CycloneDxMetadata {
    component: CycloneDxComponent,
}

#[derive(Serialize)]
struct CycloneDxComponent {
    #[serde(rename = "type")]
    kind: &'static str,
    name: String,
    version: String,
}

pub struct SbomProcessor {
    dist_dir: Utf8PathBuf,
}

impl SbomProcessor {
    pub fn new(dist_dir: Utf8PathBuf) -> Self {
        Self { dist_dir }
    }
}

impl PostProcessor for SbomProcessor {
    fn name(&self) -> &str {
        "sbom"
    }

    fn run(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()> {
        ctx.check()?;
        let version = tmpl.get("Version").unwrap_or_default();
        let targets = store
            .all()
            .into_iter()
            .filter(|a| matches!(a.kind.as_str(), "Archive" | "Binary" | "LinuxPackage"))
            .collect::<Vec<_>>();

        for artifact in targets {
            let document = CycloneDxDocument {
                bom_format: "CycloneDX",
                spec_version: "1.5",
                version: 1,
                metadata: CycloneDxMetadata {
                    component: CycloneDxComponent { kind: "application", name: artifact.name.clone(), version: version.clone() },
                },
            };
            let json = serde_json::to_string_pretty(&document)
                .map_err(|e| ForgecastError::Config { message: e.to_string() })?;
            let output_name = format!("{}.sbom.cdx.json", artifact.name);
            let output_path = self.dist_dir.join(&output_name);
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
            }
            std::fs::write(&output_path, json).map_err(|e| ForgecastError::io(output_path.clone(), e))?;

            store.add(
                Artifact::new(output_name, ArtifactKind::sbom())
                    .with_path(output_path)
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
    fn emits_one_sbom_per_publishable_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = ArtifactStore::new();
        store.add(Artifact::new("demo.tar.gz", ArtifactKind::archive()));

        let processor = SbomProcessor::new(root.join("dist"));
        let tmpl = TemplateContext::builder().version("v1.0.0").build();
        processor.run(&RunContext::new(), &store, &tmpl).unwrap();

        let sboms = store.filter(&[ArtifactStore::by_type(ArtifactKind::SBOM)]);
        assert_eq!(sboms.len(), 1);
        assert_eq!(sboms[0].name, "demo.tar.gz.sbom.cdx.json");
    }
}

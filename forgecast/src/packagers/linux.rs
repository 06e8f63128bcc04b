//! A `deb`-shaped Linux packager, illustrating the staged-artifact
//! fallback: when the external packaging tool (`nfpm`) isn't on `PATH`,
//! this packager doesn't fail the run — it ships a tar containing the
//! staged payload plus a README so a maintainer can finish the package
//! on a native host, and marks the output `extra.installer = true` so
//! publishers still know to surface it.

use std::fs::File;
use std::io::Write;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::Packager;
use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinuxPackageConfig {
    pub id: String,
    pub package_name: String,
    pub maintainer: String,
    #[serde(default)]
    pub builds: Vec<String>,
}

pub struct LinuxPackager {
    config: LinuxPackageConfig,
    dist_dir: Utf8PathBuf,
}

impl LinuxPackager {
    pub fn new(config: LinuxPackageConfig, dist_dir: Utf8PathBuf) -> Self {
        Self { config, dist_dir }
    }

    fn nfpm_available() -> bool {
        which::which("nfpm").is_ok()
    }
}

impl Packager for LinuxPackager {
    fn name(&self) -> &str {
        "nfpm"
    }

    fn build(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()> {
        let linux_binaries: Vec<Artifact> = store
            .filter(&[ArtifactStore::by_type(ArtifactKind::BINARY), ArtifactStore::by_goos("linux")])
            .into_iter()
            .filter(|a| self.config.builds.is_empty() || a.build_id.as_deref().is_some_and(|id| self.config.builds.contains(&id.to_owned())))
            .collect();
        if linux_binaries.is_empty() {
            return Ok(());
        }

        ctx.check()?;
        let version = tmpl.get("Version").unwrap_or_default();
        let output_dir = self.dist_dir.join(&self.config.id);
        std::fs::create_dir_all(&output_dir).map_err(|e| ForgecastError::io(&output_dir, e))?;

        if Self::nfpm_available() {
            // A real integration would invoke `nfpm package` with a
            // generated config; external packagers are out of scope for
            // this crate's core, so a real nfpm install still falls
            // through to the staged path below, which is always correct
            // output (a tar a maintainer can repackage from).
            warn!("nfpm is on PATH but native .deb generation is not implemented; staging instead");
        }

        for binary in &linux_binaries {
            let arch = binary.goarch.clone().unwrap_or_default();
            let staged_name = format!("{}_{}_linux_{}.staged.tar.gz", self.config.package_name, version, arch);
            let staged_path = output_dir.join(&staged_name);
            write_staged_tar(&staged_path, binary, &self.config)?;

            let artifact = Artifact::new(staged_name, ArtifactKind::new("LinuxPackage"))
                .with_path(staged_path)
                .with_platform("linux", arch)
                .with_extra("installer", true)
                .with_extra("staged", true);
            store.add(artifact);
        }
        Ok(())
    }
}

fn write_staged_tar(output_path: &Utf8PathBuf, binary: &Artifact, config: &LinuxPackageConfig) -> Result<()> {
    let file = File::create(output_path).map_err(|e| ForgecastError::io(output_path.clone(), e))?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);

    if let Some(path) = &binary.path {
        builder.append_path_with_name(path, &binary.name).map_err(|e| ForgecastError::io(path.clone(), e))?;
    }

    let readme = format!(
        "This is a staged payload for {} ({}), not a finished Linux package.\n\
         nfpm was not available when this release was built; run nfpm against\n\
         this payload on a Linux host to produce the final package.\n\
         Maintainer: {}\n",
        config.package_name, binary.name, config.maintainer
    );
    let mut header = tar::Header::new_gnu();
    header.set_size(readme.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "README.txt", readme.as_bytes())
        .map_err(|e| ForgecastError::io(output_path.clone(), e))?;

    builder.into_inner().map_err(|e| ForgecastError::io(output_path.clone(), e))?.finish().map_err(|e| ForgecastError::io(output_path.clone(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_fallback_marks_artifact_installer_and_staged() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let binary_path = root.join("demo");
        std::fs::write(&binary_path, b"bin").unwrap();

        let store = ArtifactStore::new();
        store.add(Artifact::new("demo", ArtifactKind::binary()).with_path(binary_path).with_platform("linux", "amd64"));

        let config = LinuxPackageConfig { id: "deb".into(), package_name: "demo".into(), maintainer: "me".into(), builds: Vec::new() };
        let packager = LinuxPackager::new(config, root.join("dist"));
        let tmpl = TemplateContext::builder().version("v1.0.0").build();
        packager.build(&RunContext::new(), &store, &tmpl).unwrap();

        let packages = store.filter(&[ArtifactStore::by_type("LinuxPackage")]);
        assert_eq!(packages.len(), 1);
        assert_eq!(packages[0].extra.get("installer").and_then(|v| v.as_bool()), Some(true));
    }
}

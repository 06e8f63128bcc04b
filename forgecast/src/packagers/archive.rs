//! `tar.gz`/`zip` archive formation, grouped one archive per
//! `(build_id, goos, goarch, goarm)` platform group of `Binary` artifacts.

use std::fs::File;
use std::io::Write;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use super::Packager;
use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

/// Declared archive format and naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub id: String,
    /// `"tar.gz"` or `"zip"`. Anything else is rejected at build time.
    pub format: String,
    /// Output filename without extension, templated per platform.
    pub name_template: String,
    /// Restrict to binaries from these build ids; empty means "all".
    #[serde(default)]
    pub builds: Vec<String>,
    /// Extra files to include verbatim (README, LICENSE, ...).
    #[serde(default)]
    pub extra_files: Vec<Utf8PathBuf>,
}

pub struct ArchivePackager {
    config: ArchiveConfig,
    dist_dir: Utf8PathBuf,
}

impl ArchivePackager {
    pub fn new(config: ArchiveConfig, dist_dir: Utf8PathBuf) -> Self {
        Self { config, dist_dir }
    }
}

impl Packager for ArchivePackager {
    fn name(&self) -> &str {
        "archive"
    }

    fn build(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()> {
        let binaries = store.filter(&[ArtifactStore::by_type(ArtifactKind::BINARY)]);
        let mut groups = std::collections::BTreeMap::<(String, String, String), Vec<Artifact>>::new();
        for binary in binaries {
            if !self.config.builds.is_empty() {
                let Some(build_id) = &binary.build_id else { continue };
                if !self.config.builds.contains(build_id) {
                    continue;
                }
            }
            groups.entry(binary.platform_key()).or_default().push(binary);
        }

        for ((goos, goarch, goarm), members) in groups {
            ctx.check()?;
            let mut scoped = tmpl.clone();
            scoped.set("Os", goos.clone());
            scoped.set("Arch", goarch.clone());
            scoped.set("Arm", goarm.clone());

            let base_name = scoped.apply("archive.name", &self.config.name_template)?;
            let extension = match self.config.format.as_str() {
                "tar.gz" => "tar.gz",
                "zip" => "zip",
                other => {
                    return Err(ForgecastError::Config { message: format!("unsupported archive format {other:?}") })
                }
            };
            let filename = format!("{base_name}.{extension}");
            let output_path = self.dist_dir.join(&filename);
            if let Some(parent) = output_path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
            }

            let mut entries: Vec<Utf8PathBuf> =
                members.iter().filter_map(|a| a.path.clone()).collect();
            entries.extend(self.config.extra_files.iter().cloned());

            match self.config.format.as_str() {
                "tar.gz" => write_tar_gz(&output_path, &entries)?,
                "zip" => write_zip(&output_path, &entries)?,
                _ => unreachable!("format already validated above"),
            }

            let mut artifact = Artifact::new(filename, ArtifactKind::archive())
                .with_platform(goos, goarch)
                .with_extra("format", self.config.format.clone());
            if !goarm.is_empty() {
                artifact.goarm = Some(goarm);
            }
            artifact.path = Some(output_path);
            store.add(artifact);
        }
        Ok(())
    }
}

fn write_tar_gz(output_path: &Utf8PathBuf, entries: &[Utf8PathBuf]) -> Result<()> {
    let file = File::create(output_path).map_err(|e| ForgecastError::io(output_path.clone(), e))?;
    let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        let name = entry.file_name().unwrap_or("file");
        builder.append_path_with_name(entry, name).map_err(|e| ForgecastError::io(entry.clone(), e))?;
    }
    builder.into_inner().map_err(|e| ForgecastError::io(output_path.clone(), e))?.finish().map_err(|e| ForgecastError::io(output_path.clone(), e))?;
    Ok(())
}

fn write_zip(output_path: &Utf8PathBuf, entries: &[Utf8PathBuf]) -> Result<()> {
    let file = File::create(output_path).map_err(|e| ForgecastError::io(output_path.clone(), e))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for entry in entries {
        let name = entry.file_name().unwrap_or("file");
        let bytes = std::fs::read(entry).map_err(|e| ForgecastError::io(entry.clone(), e))?;
        writer.start_file(name, options).map_err(|e| ForgecastError::io(entry.clone(), e.into()))?;
        writer.write_all(&bytes).map_err(|e| ForgecastError::io(entry.clone(), e))?;
    }
    writer.finish().map_err(|e| ForgecastError::io(output_path.clone(), e.into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgecast_schema::ArtifactKind as Kind;

    #[test]
    fn groups_binaries_and_produces_one_archive_per_platform() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let binary_path = root.join("demo");
        std::fs::write(&binary_path, b"binary-bytes").unwrap();

        let store = ArtifactStore::new();
        store.add(
            Artifact::new("demo", Kind::binary())
                .with_path(binary_path)
                .with_platform("linux", "amd64")
                .with_build_id("a"),
        );

        let config = ArchiveConfig {
            id: "x".into(),
            format: "tar.gz".into(),
            name_template: "{{ ProjectName }}_{{ .Version }}_{{ .Os }}_{{ .Arch }}".into(),
            builds: Vec::new(),
            extra_files: Vec::new(),
        };
        let packager = ArchivePackager::new(config, root.join("dist"));
        let tmpl = TemplateContext::builder().project_name("demo").version("v1.2.3").build();
        let ctx = RunContext::new();
        packager.build(&ctx, &store, &tmpl).unwrap();

        let archives = store.filter(&[ArtifactStore::by_type(Kind::ARCHIVE)]);
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].name, "demo_1.2.3_linux_amd64.tar.gz");
        assert!(archives[0].path.as_ref().unwrap().exists());
    }
}

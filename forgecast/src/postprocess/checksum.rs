//! Checksum manifest generation. Must run after compression/packaging so
//! it observes the final compressed artifact, never the raw binary.

use std::io::Read;

use blake2::Blake2b512;
use camino::Utf8PathBuf;
use sha2::{Digest, Sha256};
use sha3::Sha3_256;

use super::PostProcessor;
use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha3_256,
    Blake2b,
}

impl ChecksumAlgorithm {
    fn label(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha3_256 => "sha3-256",
            Self::Blake2b => "blake2b",
        }
    }

    fn digest_hex(self, bytes: &[u8]) -> String {
        match self {
            Self::Sha256 => hex(&Sha256::digest(bytes)),
            Self::Sha3_256 => hex(&Sha3_256::digest(bytes)),
            Self::Blake2b => hex(&Blake2b512::digest(bytes)),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Writes a single `checksums.txt` covering every artifact currently in
/// the store that has a local file (archives, packages, standalone
/// binaries not wrapped in an archive).
pub struct ChecksumProcessor {
    algorithm: ChecksumAlgorithm,
    dist_dir: Utf8PathBuf,
    filename: String,
}

impl ChecksumProcessor {
    pub fn new(algorithm: ChecksumAlgorithm, dist_dir: Utf8PathBuf) -> Self {
        Self { algorithm, dist_dir, filename: "checksums.txt".to_owned() }
    }
}

impl PostProcessor for ChecksumProcessor {
    fn name(&self) -> &str {
        "checksum"
    }

    fn run(&self, ctx: &RunContext, store: &ArtifactStore, _tmpl: &TemplateContext) -> Result<()> {
        ctx.check()?;
        let mut lines = Vec::new();
        for artifact in store.all() {
            let Some(path) = &artifact.path else { continue };
            if matches!(artifact.kind.as_str(), "Checksum" | "Signature" | "SBOM") {
                continue;
            }
            let mut file = std::fs::File::open(path).map_err(|e| ForgecastError::io(path.clone(), e))?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes).map_err(|e| ForgecastError::io(path.clone(), e))?;
            let digest = self.algorithm.digest_hex(&bytes);
            lines.push(format!("{digest}  {}", artifact.name));
        }
        if lines.is_empty() {
            return Ok(());
        }
        lines.sort();
        let output_path = self.dist_dir.join(&self.filename);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
        }
        std::fs::write(&output_path, lines.join("\n") + "\n").map_err(|e| ForgecastError::io(output_path.clone(), e))?;

        store.add(
            Artifact::new(self.filename.clone(), ArtifactKind::checksum())
                .with_path(output_path)
                .with_extra("algorithm", self.algorithm.label()),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_one_sorted_line_per_artifact_with_a_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let a = root.join("b.tar.gz");
        let b = root.join("a.tar.gz");
        std::fs::write(&a, b"one").unwrap();
        std::fs::write(&b, b"two").unwrap();

        let store = ArtifactStore::new();
        store.add(Artifact::new("b.tar.gz", ArtifactKind::archive()).with_path(a));
        store.add(Artifact::new("a.tar.gz", ArtifactKind::archive()).with_path(b));

        let processor = ChecksumProcessor::new(ChecksumAlgorithm::Sha256, root.join("dist"));
        processor.run(&RunContext::new(), &store, &TemplateContext::new()).unwrap();

        let checksums = store.filter(&[ArtifactStore::by_type(ArtifactKind::CHECKSUM)]);
        assert_eq!(checksums.len(), 1);
        let content = std::fs::read_to_string(checksums[0].path.as_ref().unwrap()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("a.tar.gz"));
        assert!(lines[1].ends_with("b.tar.gz"));
    }
}

//! The post-processor plane: derives `Checksum`/`SBOM`/`Signature`
//! artifacts from whatever's publishable, or mutates a binary in place
//! (UPX compression, universal-binary merge).

mod checksum;
mod sbom;
mod sign;
mod universal;
mod upx;

pub use checksum::{ChecksumAlgorithm, ChecksumProcessor};
pub use sbom::SbomProcessor;
pub use sign::SignProcessor;
pub use universal::UniversalBinaryProcessor;
pub use upx::{UpxConfig, UpxProcessor};

use crate::artifact::ArtifactStore;
use crate::context::RunContext;
use crate::errors::Result;
use crate::template::TemplateContext;

/// One derivation/mutation stage over the artifact store.
pub trait PostProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()>;
}

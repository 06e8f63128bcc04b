//! The packager plane: reads `Binary` artifacts and produces
//! `Archive`/`LinuxPackage`/... artifacts. Specified by the [`Packager`]
//! contract; concrete formats are plugins against that contract, so this
//! module carries one archive packager (tar.gz/zip, needs no external
//! tool) and one OS-package packager illustrating the staged-artifact
//! fallback for a missing external tool.

mod archive;
mod linux;

pub use archive::{ArchiveConfig, ArchivePackager};
pub use linux::{LinuxPackageConfig, LinuxPackager};

use crate::artifact::ArtifactStore;
use crate::context::RunContext;
use crate::errors::Result;
use crate::template::TemplateContext;

/// A producer of one packaging format.
pub trait Packager: Send + Sync {
    /// A short name for diagnostics (`"archive"`, `"nfpm"`, ...).
    fn name(&self) -> &str;

    /// Read matching `Binary` artifacts from `store`, write output files,
    /// and register one artifact per produced file.
    fn build(&self, ctx: &RunContext, store: &ArtifactStore, tmpl: &TemplateContext) -> Result<()>;
}

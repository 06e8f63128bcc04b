//! The publisher plane: ships artifacts to external destinations.
//! Implementations are grouped by destination family; this module
//! carries a git-hosting-shaped publisher (generic over the REST calls
//! a GitHub/GitLab/Gitea release needs) and a blob-store publisher.

mod blob;
mod git_hosting;

pub use blob::{BlobStoreConfig, BlobStorePublisher};
pub use git_hosting::{GitHostingConfig, GitHostingPublisher};

use crate::artifact::Artifact;
use crate::context::RunContext;
use crate::errors::Result;
use crate::template::TemplateContext;

/// One publish destination.
pub trait Publisher: Send + Sync {
    /// A short name for diagnostics and `skip` logging.
    fn name(&self) -> &str;

    /// Whether this destination is configured to no-op.
    fn is_skipped(&self) -> bool;

    /// Ship `artifacts` to this destination. Implementations must
    /// template-expand every user-supplied string against `tmpl` and
    /// never log secret values.
    fn publish(&self, ctx: &RunContext, artifacts: &[Artifact], tmpl: &TemplateContext) -> Result<()>;
}

/// Run `publish` unless `is_skipped()`, logging a no-op instead.
pub fn publish_or_skip(
    publisher: &dyn Publisher,
    ctx: &RunContext,
    artifacts: &[Artifact],
    tmpl: &TemplateContext,
) -> Result<()> {
    if publisher.is_skipped() {
        tracing::info!(publisher = publisher.name(), "skip=true, no-op");
        return Ok(());
    }
    publisher.publish(ctx, artifacts, tmpl)
}

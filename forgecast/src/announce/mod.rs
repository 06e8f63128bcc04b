//! The announcer plane: posts release notifications to chat/notification
//! channels. Best-effort — a failing announcer never fails the pipeline,
//! its error is collected alongside its siblings' by the pipeline engine.

mod webhook;

pub use webhook::{WebhookAnnouncer, WebhookConfig};

use crate::context::RunContext;
use crate::errors::Result;
use crate::template::TemplateContext;

/// One notification channel.
pub trait Announcer: Send + Sync {
    fn name(&self) -> &str;
    fn announce(&self, ctx: &RunContext, tmpl: &TemplateContext) -> Result<()>;
}

//! A generic JSON webhook announcer, covering Slack/Discord/Teams/a
//! bespoke `ANNOUNCE_WEBHOOK_URL` alike: all of them accept a simple
//! `{"text": "..."}`-shaped POST, differing only in which env var holds
//! the URL and what the message template usually looks like.

use serde::{Deserialize, Serialize};

use super::Announcer;
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub name: String,
    /// Env var holding the webhook URL (e.g. `SLACK_WEBHOOK_URL`).
    pub url_env: String,
    /// Message body template.
    pub message_template: String,
    #[serde(default)]
    pub skip: bool,
}

pub struct WebhookAnnouncer {
    config: WebhookConfig,
    client: reqwest::blocking::Client,
}

impl WebhookAnnouncer {
    pub fn new(config: WebhookConfig) -> Self {
        Self { config, client: reqwest::blocking::Client::new() }
    }
}

impl Announcer for WebhookAnnouncer {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn announce(&self, ctx: &RunContext, tmpl: &TemplateContext) -> Result<()> {
        if self.config.skip {
            tracing::info!(announcer = %self.config.name, "skip=true, no-op");
            return Ok(());
        }
        ctx.check()?;
        let url = std::env::var(&self.config.url_env)
            .map_err(|_| ForgecastError::MissingSecret { publisher: self.config.name.clone(), env_var: self.config.url_env.clone() })?;
        let message = tmpl.apply("announce.message", &self.config.message_template)?;

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .map_err(|source| ForgecastError::Network { destination: self.config.name.clone(), source })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ForgecastError::Publish { destination: self.config.name.clone(), status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_webhook_url_env_surfaces_missing_secret() {
        let config = WebhookConfig {
            name: "slack".into(),
            url_env: "FORGECAST_TEST_WEBHOOK_DOES_NOT_EXIST".into(),
            message_template: "{{ ProjectName }} released".into(),
            skip: false,
        };
        let announcer = WebhookAnnouncer::new(config);
        let result = announcer.announce(&RunContext::new(), &TemplateContext::new());
        assert!(matches!(result, Err(ForgecastError::MissingSecret { .. })));
    }
}

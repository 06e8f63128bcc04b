//! A generic git-hosting release publisher, parameterized by API base
//! URL and token environment variable so the same upload logic serves
//! GitHub, GitLab, and Gitea as one destination family. One-time setup
//! (get-or-create the release) runs before any upload, and uploads for
//! a single destination happen sequentially.

use serde::{Deserialize, Serialize};

use super::Publisher;
use crate::artifact::Artifact;
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHostingConfig {
    /// Display name, e.g. `"github"`, used in logs/errors.
    pub name: String,
    /// REST API base, templated (e.g. may embed `{{ .ProjectName }}`).
    pub api_base: String,
    /// `owner/repo` slug, templated.
    pub repo: String,
    /// Environment variable holding the auth token.
    pub token_env: String,
    #[serde(default)]
    pub skip: bool,
    /// Mark the release as a draft.
    #[serde(default)]
    pub draft: bool,
    /// Mark the release as a prerelease.
    #[serde(default)]
    pub prerelease: bool,
    /// Per-artifact asset label, templated against an
    /// [`TemplateContext::with_artifact`]-scoped context (e.g.
    /// `"{{ .ArtifactName }} ({{ .Os }}/{{ .Arch }})"`). GitHub-style
    /// hosts accept this as a `label` query parameter alongside the
    /// upload's `name`; `artifact.name` is used verbatim when unset.
    #[serde(default)]
    pub asset_label_template: Option<String>,
}

pub struct GitHostingPublisher {
    config: GitHostingConfig,
    client: reqwest::blocking::Client,
}

impl GitHostingPublisher {
    pub fn new(config: GitHostingConfig) -> Self {
        Self { config, client: reqwest::blocking::Client::new() }
    }

    fn token(&self) -> Result<String> {
        std::env::var(&self.config.token_env)
            .map_err(|_| ForgecastError::MissingSecret { publisher: self.config.name.clone(), env_var: self.config.token_env.clone() })
    }
}

impl Publisher for GitHostingPublisher {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_skipped(&self) -> bool {
        self.config.skip
    }

    fn publish(&self, ctx: &RunContext, artifacts: &[Artifact], tmpl: &TemplateContext) -> Result<()> {
        let token = self.token()?;
        let repo = tmpl.apply("publish.repo", &self.config.repo)?;
        let api_base = tmpl.apply("publish.api_base", &self.config.api_base)?;
        let tag = tmpl.get("Tag").unwrap_or_default();

        ctx.check()?;
        let releases_url = format!("{api_base}/repos/{repo}/releases");
        let body = serde_json::json!({
            "tag_name": tag,
            "name": tag,
            "draft": self.config.draft,
            "prerelease": self.config.prerelease,
        });
        let response = self
            .client
            .post(&releases_url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .map_err(|source| ForgecastError::Network { destination: self.config.name.clone(), source })?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().unwrap_or_default();
            return Err(ForgecastError::Publish { destination: self.config.name.clone(), status, body });
        }
        let release: serde_json::Value =
            response.json().map_err(|source| ForgecastError::Network { destination: self.config.name.clone(), source })?;
        let upload_url = release.get("upload_url").and_then(|v| v.as_str()).unwrap_or(&releases_url).to_owned();

        for artifact in artifacts {
            ctx.check()?;
            let Some(path) = &artifact.path else { continue };
            let bytes = std::fs::read(path).map_err(|e| ForgecastError::io(path.clone(), e))?;
            let mut upload_request_url = format!("{upload_url}?name={}", artifact.name);
            if let Some(label_template) = &self.config.asset_label_template {
                let scoped = tmpl.with_artifact(artifact);
                let label = scoped.apply("publish.asset_label", label_template)?;
                upload_request_url.push_str(&format!("&label={label}"));
            }
            let response = self
                .client
                .post(upload_request_url)
                .bearer_auth(&token)
                .header("content-type", "application/octet-stream")
                .body(bytes)
                .send()
                .map_err(|source| ForgecastError::Network { destination: self.config.name.clone(), source })?;
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().unwrap_or_default();
                return Err(ForgecastError::Publish { destination: self.config.name.clone(), status, body });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_env_fails_before_any_network_call() {
        let config = GitHostingConfig {
            name: "github".into(),
            api_base: "https://api.github.com".into(),
            repo: "acme/demo".into(),
            token_env: "FORGECAST_TEST_TOKEN_DOES_NOT_EXIST".into(),
            skip: false,
            draft: false,
            prerelease: false,
            asset_label_template: None,
        };
        let publisher = GitHostingPublisher::new(config);
        let result = publisher.publish(&RunContext::new(), &[], &TemplateContext::new());
        assert!(matches!(result, Err(ForgecastError::MissingSecret { .. })));
    }

    #[test]
    fn skip_flag_marks_publisher_as_skipped() {
        let config = GitHostingConfig {
            name: "github".into(),
            api_base: "https://api.github.com".into(),
            repo: "acme/demo".into(),
            token_env: "X".into(),
            skip: true,
            draft: false,
            prerelease: false,
            asset_label_template: None,
        };
        assert!(GitHostingPublisher::new(config).is_skipped());
    }
}

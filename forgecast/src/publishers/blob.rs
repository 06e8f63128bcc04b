//! A generic blob-store publisher (S3-shaped): uploads every artifact to
//! `{endpoint}/{bucket}/{prefix}/{name}` via a signed-enough `PUT`. Real
//! SigV4 signing is out of scope for this core; the access key/secret are
//! passed as basic-auth credentials, which is the shape S3-compatible
//! stores (MinIO, R2 in compatibility mode) accept behind a reverse proxy,
//! and callers needing strict SigV4 supply a presigned `endpoint` instead.

use serde::{Deserialize, Serialize};

use super::Publisher;
use crate::artifact::Artifact;
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::template::TemplateContext;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStoreConfig {
    pub name: String,
    /// Base endpoint, templated.
    pub endpoint: String,
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    /// Per-artifact object key, templated against an
    /// [`TemplateContext::with_artifact`]-scoped context (e.g.
    /// `"{{ .Tag }}/{{ .ArtifactName }}"`). Overrides `prefix` entirely
    /// when set; `prefix`/`artifact.name` remains the default otherwise.
    #[serde(default)]
    pub key_template: Option<String>,
    /// Env var holding the access key id.
    pub access_key_env: String,
    /// Env var holding the secret access key.
    pub secret_key_env: String,
    #[serde(default)]
    pub skip: bool,
}

pub struct BlobStorePublisher {
    config: BlobStoreConfig,
    client: reqwest::blocking::Client,
}

impl BlobStorePublisher {
    pub fn new(config: BlobStoreConfig) -> Self {
        Self { config, client: reqwest::blocking::Client::new() }
    }

    fn credentials(&self) -> Result<(String, String)> {
        let access_key = std::env::var(&self.config.access_key_env)
            .map_err(|_| ForgecastError::MissingSecret { publisher: self.config.name.clone(), env_var: self.config.access_key_env.clone() })?;
        let secret_key = std::env::var(&self.config.secret_key_env)
            .map_err(|_| ForgecastError::MissingSecret { publisher: self.config.name.clone(), env_var: self.config.secret_key_env.clone() })?;
        Ok((access_key, secret_key))
    }
}

impl Publisher for BlobStorePublisher {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_skipped(&self) -> bool {
        self.config.skip
    }

    fn publish(&self, ctx: &RunContext, artifacts: &[Artifact], tmpl: &TemplateContext) -> Result<()> {
        let (access_key, secret_key) = self.credentials()?;
        let endpoint = tmpl.apply("publish.endpoint", &self.config.endpoint)?;

        for artifact in artifacts {
            ctx.check()?;
            let Some(path) = &artifact.path else { continue };
            let bytes = std::fs::read(path).map_err(|e| ForgecastError::io(path.clone(), e))?;
            let key = match &self.config.key_template {
                Some(key_template) => {
                    let scoped = tmpl.with_artifact(artifact);
                    scoped.apply("publish.key", key_template)?
                }
                None if self.config.prefix.is_empty() => artifact.name.clone(),
                None => format!("{}/{}", self.config.prefix.trim_end_matches('/'), artifact.name),
            };
            let url = format!("{}/{}/{}", endpoint.trim_end_matches('/'), self.config.bucket, key);
            let response = self
                .client
                .put(&url)
                .basic_auth(&access_key, Some(&secret_key))
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
    use forgecast_schema::ArtifactKind;

    use super::*;
    use crate::artifact::Artifact;

    fn config() -> BlobStoreConfig {
        BlobStoreConfig {
            name: "r2".into(),
            endpoint: "https://example.com".into(),
            bucket: "releases".into(),
            prefix: String::new(),
            key_template: None,
            access_key_env: "FORGECAST_TEST_ACCESS_KEY_DOES_NOT_EXIST".into(),
            secret_key_env: "FORGECAST_TEST_SECRET_KEY_DOES_NOT_EXIST".into(),
            skip: false,
        }
    }

    #[test]
    fn missing_access_key_env_fails_before_any_network_call() {
        let publisher = BlobStorePublisher::new(config());
        let result = publisher.publish(&RunContext::new(), &[], &TemplateContext::new());
        assert!(matches!(result, Err(ForgecastError::MissingSecret { .. })));
    }

    #[test]
    fn skip_flag_marks_publisher_as_skipped() {
        let mut cfg = config();
        cfg.skip = true;
        assert!(BlobStorePublisher::new(cfg).is_skipped());
    }

    #[test]
    fn key_template_renders_against_the_artifact_scoped_context() {
        let mut cfg = config();
        cfg.key_template = Some("{{ .Tag }}/{{ .ArtifactName }}".into());
        let tmpl = TemplateContext::builder().tag("v1.2.3").build();
        let artifact = Artifact::new("demo-linux-amd64.tar.gz", ArtifactKind::archive()).with_platform("linux", "amd64");
        let scoped = tmpl.with_artifact(&artifact);
        let key = scoped.apply("publish.key", cfg.key_template.as_ref().unwrap()).unwrap();
        assert_eq!(key, "v1.2.3/demo-linux-amd64.tar.gz");
    }
}

//! The plugin ABI: an exec-based extension point. A plugin is any
//! executable on `PATH` matching a naming convention
//! (`forgecast-builder-<name>`, `forgecast-publisher-<name>`) that reads
//! a JSON request on stdin and writes a JSON response on stdout — the
//! same shape as Cargo's own subcommand-plugin convention, adapted to
//! carry the request payload over stdin instead of argv, since a build
//! request (env, target, template bindings) is too large for an
//! argument list.

use serde::{Deserialize, Serialize};

use crate::artifact::Artifact;
use crate::build::{BuildSpec, Builder, Target};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::proc::Cmd;
use crate::publishers::Publisher;
use crate::template::TemplateContext;

/// The JSON payload written to a plugin's stdin.
#[derive(Serialize)]
struct BuildRequest<'a> {
    spec_id: &'a str,
    command: &'a str,
    target_os: &'a str,
    target_arch: &'a str,
    output_path: &'a str,
    bindings: std::collections::BTreeMap<String, String>,
}

/// The JSON payload a builder plugin writes to stdout on success.
#[derive(Deserialize)]
struct BuildResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// A [`Builder`] that shells out to `forgecast-builder-<name>`.
pub struct ExternalBuilder {
    name: String,
}

impl ExternalBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn binary(&self) -> String {
        format!("forgecast-builder-{}", self.name)
    }
}

impl Builder for ExternalBuilder {
    fn supports(&self, builder: &str) -> bool {
        builder == self.name
    }

    fn build(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        target: &Target,
        output_path: &camino::Utf8PathBuf,
        tmpl: &TemplateContext,
    ) -> Result<()> {
        ctx.check()?;
        let binary = self.binary();
        if which::which(&binary).is_err() {
            return Err(ForgecastError::ToolchainMissing {
                target_key: target.key(),
                remediation: format!("install the {binary} plugin (expected on PATH)"),
            });
        }

        let bindings: std::collections::BTreeMap<String, String> = ["ProjectName", "Version", "Tag"]
            .into_iter()
            .filter_map(|key| tmpl.get(key).map(|v| (key.to_owned(), v)))
            .collect();
        let request = BuildRequest {
            spec_id: &spec.id,
            command: &spec.command,
            target_os: &target.goos,
            target_arch: &target.goarch,
            output_path: output_path.as_str(),
            bindings,
        };
        let payload = serde_json::to_vec(&request).map_err(|e| ForgecastError::Config { message: e.to_string() })?;

        let output = Cmd::new(&binary, format!("plugin:{binary}")).stdin_payload(payload).output()?;
        if !output.success() {
            return Err(ForgecastError::Build {
                build_id: spec.id.clone(),
                exit_code: output.exit_code,
                stderr_tail: ForgecastError::tail(&output.stderr),
            });
        }

        let response: BuildResponse =
            serde_json::from_slice(&output.stdout).map_err(|e| ForgecastError::Config { message: e.to_string() })?;
        if !response.ok {
            return Err(ForgecastError::Build {
                build_id: spec.id.clone(),
                exit_code: output.exit_code,
                stderr_tail: response.error.unwrap_or_else(|| "plugin reported failure with no message".to_owned()),
            });
        }
        Ok(())
    }
}

/// A [`Publisher`] that shells out to `forgecast-publisher-<name>`,
/// receiving the rendered artifact manifest on stdin.
pub struct ExternalPublisher {
    name: String,
    skip: bool,
}

impl ExternalPublisher {
    pub fn new(name: impl Into<String>, skip: bool) -> Self {
        Self { name: name.into(), skip }
    }

    fn binary(&self) -> String {
        format!("forgecast-publisher-{}", self.name)
    }
}

impl Publisher for ExternalPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_skipped(&self) -> bool {
        self.skip
    }

    fn publish(&self, ctx: &RunContext, artifacts: &[Artifact], tmpl: &TemplateContext) -> Result<()> {
        ctx.check()?;
        let binary = self.binary();
        if which::which(&binary).is_err() {
            return Err(ForgecastError::ToolchainMissing {
                target_key: self.name.clone(),
                remediation: format!("install the {binary} plugin (expected on PATH)"),
            });
        }
        let manifest: Vec<Artifact> = artifacts.to_vec();
        let payload = serde_json::to_vec(&manifest).map_err(|e| ForgecastError::Config { message: e.to_string() })?;
        let tag = tmpl.get("Tag").unwrap_or_default();

        let output = Cmd::new(&binary, format!("plugin:{binary}"))
            .arg("--tag")
            .arg(&tag)
            .stdin_payload(payload)
            .output()?;
        if !output.success() {
            return Err(ForgecastError::Publish {
                destination: self.name.clone(),
                status: 0,
                body: ForgecastError::tail(&output.stderr),
            });
        }
        Ok(())
    }
}

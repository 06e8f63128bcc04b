//! Concrete [`Builder`] implementations, one per keyword group from the
//! builder-selection table.

use camino::Utf8PathBuf;

use super::toolchain::{self, ToolchainConfig, ZigCc};
use super::{Builder, BuildSpec, Target};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::proc::Cmd;
use crate::template::TemplateContext;

/// The default builder: a native-A (Go-shaped) toolchain, selected by an
/// empty `builder` string or `"go"`. Cross-compiles via `GOOS`/`GOARCH`
/// environment variables, resolving a cross-C-compiler through
/// [`toolchain::resolve`] when `cgo_enabled` is set and the target
/// differs from the host.
pub struct NativeABuilder {
    wrapper_dir: Utf8PathBuf,
}

impl NativeABuilder {
    pub fn new(dist_dir: Utf8PathBuf) -> Self {
        Self { wrapper_dir: dist_dir.join(".forgecast-cross") }
    }
}

impl Builder for NativeABuilder {
    fn supports(&self, builder: &str) -> bool {
        matches!(builder, "" | "go")
    }

    fn build(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        target: &Target,
        output_path: &Utf8PathBuf,
        tmpl: &TemplateContext,
    ) -> Result<()> {
        ctx.check()?;
        let mut env = render_env(&spec.env, tmpl)?;
        env.insert("GOOS".into(), target.goos.clone());
        env.insert("GOARCH".into(), target.goarch.clone());
        if let Some(arm) = &target.goarm {
            env.insert("GOARM".into(), arm.clone());
        }
        if let Some(amd64) = &target.goamd64 {
            env.insert("GOAMD64".into(), amd64.clone());
        }
        env.insert("CGO_ENABLED".into(), if spec.cgo_enabled { "1" } else { "0" }.into());

        if spec.cgo_enabled {
            let host_os = std::env::consts::OS;
            let host_arch = normalize_host_arch(std::env::consts::ARCH);
            let config = ToolchainConfig { cross_compilers: spec.cross_compilers.clone(), cc: None, cxx: None };
            let resolution =
                toolchain::resolve(&config, host_os, &host_arch, &target.goos, &target.goarch, &self.wrapper_dir, &ZigCc)?;
            if let toolchain::ToolchainResolution::Cross { cc, cxx } = resolution {
                env.insert("CC".into(), cc);
                if let Some(cxx) = cxx {
                    env.insert("CXX".into(), cxx);
                }
            }
        }

        let command = tmpl.apply("build.command", &spec.command)?;
        let mut cmd = Cmd::new("sh", format!("build:{}", spec.id)).arg("-c").arg(&command);
        env.insert("FORGECAST_OUTPUT".into(), output_path.to_string());
        cmd = cmd.envs(&env);
        cmd.run_as_build(&spec.id)?;
        Ok(())
    }
}

/// `"rust"`/`"cargo"`: cross-compiles by passing `--target <triple>`
/// rather than environment variables.
pub struct CargoBuilder;

impl Builder for CargoBuilder {
    fn supports(&self, builder: &str) -> bool {
        matches!(builder, "rust" | "cargo")
    }

    fn build(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        target: &Target,
        output_path: &Utf8PathBuf,
        tmpl: &TemplateContext,
    ) -> Result<()> {
        ctx.check()?;
        let mut env = render_env(&spec.env, tmpl)?;
        let triple = cargo_target_triple(&target.goos, &target.goarch);
        env.insert("FORGECAST_OUTPUT".into(), output_path.to_string());
        let command = tmpl.apply("build.command", &spec.command)?;
        let full_command = format!("{command} --target {triple}");
        Cmd::new("sh", format!("build:{}", spec.id))
            .arg("-c")
            .arg(&full_command)
            .envs(&env)
            .run_as_build(&spec.id)?;
        Ok(())
    }
}

fn cargo_target_triple(goos: &str, goarch: &str) -> String {
    let arch = match goarch {
        "amd64" => "x86_64",
        "arm64" => "aarch64",
        "386" => "i686",
        other => other,
    };
    match goos {
        "linux" => format!("{arch}-unknown-linux-gnu"),
        "darwin" => format!("{arch}-apple-darwin"),
        "windows" => format!("{arch}-pc-windows-msvc"),
        other => format!("{arch}-{other}"),
    }
}

/// Covers `node`/`npm`/`yarn`/`pnpm`, `python`/`pip`/`poetry`/`pyinstaller`,
/// `java`/`maven`/`mvn`/`gradle`, and `php`/`composer`/`phar`: none of
/// these cross-compile via toolchain environment variables the way
/// native-A/Rust do, so they all reduce to "run the configured command
/// with rendered env, target selection is the tool's own concern".
pub struct InterpretedToolBuilder;

impl Builder for InterpretedToolBuilder {
    fn supports(&self, builder: &str) -> bool {
        matches!(
            builder,
            "node" | "npm" | "yarn" | "pnpm" | "python" | "pip" | "poetry" | "pyinstaller" | "java" | "maven"
                | "mvn" | "gradle" | "php" | "composer" | "phar"
        )
    }

    fn build(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        target: &Target,
        output_path: &Utf8PathBuf,
        tmpl: &TemplateContext,
    ) -> Result<()> {
        ctx.check()?;
        let mut env = render_env(&spec.env, tmpl)?;
        env.insert("FORGECAST_OS".into(), target.goos.clone());
        env.insert("FORGECAST_ARCH".into(), target.goarch.clone());
        env.insert("FORGECAST_OUTPUT".into(), output_path.to_string());
        let command = tmpl.apply("build.command", &spec.command)?;
        Cmd::new("sh", format!("build:{}", spec.id)).arg("-c").arg(&command).envs(&env).run_as_build(&spec.id)?;
        Ok(())
    }
}

/// `"prebuilt"`: no compilation, just copies an already-built file into
/// place. `spec.command` is the source path (templated), allowing it to
/// vary per target, e.g. `"./vendor/{{ .Os }}_{{ .Arch }}/tool"`.
pub struct PrebuiltBuilder;

impl Builder for PrebuiltBuilder {
    fn supports(&self, builder: &str) -> bool {
        builder == "prebuilt"
    }

    fn build(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        _target: &Target,
        output_path: &Utf8PathBuf,
        tmpl: &TemplateContext,
    ) -> Result<()> {
        ctx.check()?;
        let source = tmpl.apply("build.command", &spec.command)?;
        std::fs::copy(&source, output_path).map_err(|e| ForgecastError::io(output_path.clone(), e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(meta) = std::fs::metadata(output_path) {
                let mut perms = meta.permissions();
                perms.set_mode(perms.mode() | 0o111);
                let _ = std::fs::set_permissions(output_path, perms);
            }
        }
        Ok(())
    }
}

fn render_env(
    env: &std::collections::BTreeMap<String, String>,
    tmpl: &TemplateContext,
) -> Result<std::collections::BTreeMap<String, String>> {
    let mut rendered = std::collections::BTreeMap::new();
    for (key, value) in env {
        rendered.insert(key.clone(), tmpl.apply("build.env", value)?);
    }
    Ok(rendered)
}

fn normalize_host_arch(rust_arch: &str) -> String {
    match rust_arch {
        "x86_64" => "amd64".to_owned(),
        "aarch64" => "arm64".to_owned(),
        "x86" => "386".to_owned(),
        other => other.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cargo_triple_maps_common_platforms() {
        assert_eq!(cargo_target_triple("linux", "amd64"), "x86_64-unknown-linux-gnu");
        assert_eq!(cargo_target_triple("darwin", "arm64"), "aarch64-apple-darwin");
        assert_eq!(cargo_target_triple("windows", "amd64"), "x86_64-pc-windows-msvc");
    }

    #[test]
    fn native_a_builder_matches_empty_and_go_keywords() {
        let builder = NativeABuilder::new(Utf8PathBuf::from("/tmp/dist"));
        assert!(builder.supports(""));
        assert!(builder.supports("go"));
        assert!(!builder.supports("rust"));
    }

    #[test]
    fn interpreted_tool_builder_covers_every_listed_keyword() {
        let builder = InterpretedToolBuilder;
        for keyword in ["node", "npm", "yarn", "pnpm", "python", "pip", "poetry", "pyinstaller", "java", "maven", "mvn", "gradle", "php", "composer", "phar"] {
            assert!(builder.supports(keyword), "expected {keyword} to be supported");
        }
    }
}

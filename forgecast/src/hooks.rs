//! Lifecycle hooks: arbitrary user commands run before/after a stage,
//! templated the same way every other configured string is.

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::RunContext;
use crate::errors::Result;
use crate::proc::Cmd;
use crate::template::TemplateContext;

/// One `before`/`after` lifecycle hook, as declared under a stage's
/// `hooks:` block in the pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    /// The command line to run, templated before execution.
    pub cmd: String,
    /// Working directory, templated. Defaults to the current directory.
    #[serde(default)]
    pub dir: Option<String>,
    /// Extra environment variables, values templated.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// A templated boolean expression; the hook only runs if it renders
    /// to a truthy string (`"true"`, a non-empty, non-`"false"`/`"0"` value).
    #[serde(default)]
    pub r#if: Option<String>,
    /// When `true` (the default), a failing hook aborts the stage. When
    /// `false`, the failure is logged and the stage continues.
    #[serde(default = "default_true")]
    pub fail_fast: bool,
}

fn default_true() -> bool {
    true
}

/// The outcome of running one hook.
pub struct HookOutcome {
    /// Whether the hook ran at all (it may have been skipped by `if`).
    pub ran: bool,
    /// Whether the hook succeeded, when it ran.
    pub succeeded: bool,
}

impl Hook {
    /// Template and run this hook. Returns `Ok` even when the underlying
    /// command fails and `fail_fast` is `false`; the caller inspects
    /// [`HookOutcome::succeeded`] to decide whether to log or escalate.
    pub fn run(&self, ctx: &RunContext, tmpl: &TemplateContext) -> Result<HookOutcome> {
        ctx.check()?;

        if let Some(cond) = &self.r#if {
            let rendered = tmpl.apply("hook.if", cond)?;
            if !is_truthy(&rendered) {
                return Ok(HookOutcome { ran: false, succeeded: true });
            }
        }

        let command = tmpl.apply("hook.cmd", &self.cmd)?;
        info!(command = %command, "running hook");

        let mut cmd = Cmd::new("sh", "hook");
        cmd = cmd.arg("-c").arg(&command);

        if let Some(dir) = &self.dir {
            let rendered_dir = tmpl.apply("hook.dir", dir)?;
            cmd = cmd.current_dir(&Utf8PathBuf::from(rendered_dir));
        }

        let mut rendered_env = BTreeMap::new();
        for (key, value) in &self.env {
            rendered_env.insert(key.clone(), tmpl.apply("hook.env", value)?);
        }
        cmd = cmd.envs(&rendered_env);

        let output = cmd.output()?;
        if output.success() {
            Ok(HookOutcome { ran: true, succeeded: true })
        } else if self.fail_fast {
            Err(crate::errors::ForgecastError::Build {
                build_id: "hook".to_owned(),
                exit_code: output.exit_code,
                stderr_tail: crate::errors::ForgecastError::tail(&output.stderr),
            })
        } else {
            Ok(HookOutcome { ran: true, succeeded: false })
        }
    }
}

/// Run a list of hooks in order, stopping at the first one that returns
/// `Err` (a `fail_fast: true` hook that failed).
pub fn run_all(ctx: &RunContext, tmpl: &TemplateContext, hooks: &[Hook]) -> Result<()> {
    for hook in hooks {
        hook.run(ctx, tmpl)?;
    }
    Ok(())
}

fn is_truthy(rendered: &str) -> bool {
    let trimmed = rendered.trim();
    !(trimmed.is_empty() || trimmed.eq_ignore_ascii_case("false") || trimmed == "0")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_parses_common_falsy_strings() {
        assert!(!is_truthy(""));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("0"));
        assert!(is_truthy("true"));
        assert!(is_truthy("yes"));
    }

    #[test]
    fn skipped_hook_reports_not_ran_and_succeeded() {
        let ctx = RunContext::new();
        let tmpl = TemplateContext::new();
        let hook = Hook {
            cmd: "echo should-not-run".into(),
            dir: None,
            env: BTreeMap::new(),
            r#if: Some("false".into()),
            fail_fast: true,
        };
        let outcome = hook.run(&ctx, &tmpl).unwrap();
        assert!(!outcome.ran);
        assert!(outcome.succeeded);
    }

    #[test]
    fn successful_command_is_reported_as_ran_and_succeeded() {
        let ctx = RunContext::new();
        let tmpl = TemplateContext::new();
        let hook = Hook { cmd: "true".into(), dir: None, env: BTreeMap::new(), r#if: None, fail_fast: true };
        let outcome = hook.run(&ctx, &tmpl).unwrap();
        assert!(outcome.ran);
        assert!(outcome.succeeded);
    }

    #[test]
    fn non_fail_fast_hook_failure_does_not_error() {
        let ctx = RunContext::new();
        let tmpl = TemplateContext::new();
        let hook = Hook { cmd: "false".into(), dir: None, env: BTreeMap::new(), r#if: None, fail_fast: false };
        let outcome = hook.run(&ctx, &tmpl).unwrap();
        assert!(outcome.ran);
        assert!(!outcome.succeeded);
    }

    #[test]
    fn fail_fast_hook_failure_errors() {
        let ctx = RunContext::new();
        let tmpl = TemplateContext::new();
        let hook = Hook { cmd: "false".into(), dir: None, env: BTreeMap::new(), r#if: None, fail_fast: true };
        assert!(hook.run(&ctx, &tmpl).is_err());
    }
}

//! Template rendering: the binding set every stage can interpolate into
//! its configured strings (archive names, changelog bodies, webhook
//! payloads, hook commands), plus the named functions/filters layered on
//! top of minijinja to reach them.

mod functions;
pub(crate) mod preprocess;

use std::collections::BTreeMap;

use minijinja::value::Value;
use minijinja::Environment;

use crate::artifact::Artifact;
use crate::errors::{ForgecastError, Result};

/// The interpolation context handed to every templated string.
///
/// A `TemplateContext` is built once per run from repository/VCS/project
/// metadata (the "root" bindings), then cheaply specialized per artifact
/// via [`TemplateContext::with_artifact`] without touching the root set.
/// Bindings are looked up by minijinja as plain top-level names, so a
/// template written as `{{ .Version }}` (rewritten to `{{ Version }}` by
/// [`preprocess::rewrite`]) resolves directly against this map.
#[derive(Clone)]
pub struct TemplateContext {
    bindings: BTreeMap<String, Value>,
}

impl TemplateContext {
    /// An empty context with no bindings. Mostly useful in tests; real
    /// callers build one through [`TemplateContext::builder`].
    pub fn new() -> Self {
        Self { bindings: BTreeMap::new() }
    }

    pub fn builder() -> TemplateContextBuilder {
        TemplateContextBuilder::default()
    }

    /// Look up a binding as a minijinja [`Value`], if present.
    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.bindings.get(key)
    }

    /// Look up a binding and render it as a plain string via `Display`,
    /// for callers (e.g. archive-name builders) that want a `&str`
    /// rather than routing through the template engine.
    pub fn get(&self, key: &str) -> Option<String> {
        self.bindings.get(key).map(|v| v.to_string())
    }

    /// Set or override a user-declared binding. Root context fields
    /// (`Version`, `Os`, ...) can be overridden the same way; forgecast
    /// has no notion of a binding being structurally read-only, only a
    /// convention that stages don't mutate fields they don't own.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.bindings.insert(key.into(), value.into());
    }

    /// A derived context carrying every root binding plus the
    /// artifact-scoped ones (`ArtifactName`, `Arm`, `Amd64`) for one
    /// artifact. The root context is left untouched; this is a cheap
    /// clone-and-extend since bindings are a `BTreeMap<String, Value>`.
    pub fn with_artifact(&self, artifact: &Artifact) -> Self {
        let mut derived = self.clone();
        derived.set("ArtifactName", artifact.name.clone());
        derived.set("Os", artifact.goos.clone().unwrap_or_default());
        derived.set("Arch", artifact.goarch.clone().unwrap_or_default());
        derived.set("Arm", artifact.goarm.clone().unwrap_or_default());
        derived.set(
            "Amd64",
            artifact.goamd64.clone().unwrap_or_else(|| "v1".to_owned()),
        );
        derived
    }

    /// Render `template` against this context, first rewriting the
    /// Go-template-flavored surface syntax into plain minijinja.
    pub fn apply(&self, name: &str, template: &str) -> Result<String> {
        let rewritten = preprocess::rewrite(template);
        let mut env = Environment::new();
        functions::register(&mut env);
        env.add_template_owned(name.to_owned(), rewritten)
            .map_err(|e| ForgecastError::Template { template_name: name.to_owned(), message: e.to_string() })?;
        let ctx = Value::from(self.bindings.clone());
        env.get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| ForgecastError::Template { template_name: name.to_owned(), message: e.to_string() })
    }
}

impl Default for TemplateContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the root [`TemplateContext`] from project/VCS metadata, filling
/// in the derived fields (`Major`/`Minor`/`Patch`/`IsPrerelease` from
/// `Version`, `ShortCommit` from `Commit`, ...) that the caller shouldn't
/// have to compute by hand.
#[derive(Default)]
pub struct TemplateContextBuilder {
    ctx: TemplateContext,
}

impl TemplateContextBuilder {
    pub fn project_name(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("ProjectName", value.into());
        self
    }

    pub fn tag(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Tag", value.into());
        self
    }

    pub fn previous_tag(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("PreviousTag", value.into());
        self
    }

    /// Set `Version` plus the fields semver derives from it: `RawVersion`,
    /// `Major`, `Minor`, `Patch`, `Prerelease`, `IsPrerelease`.
    pub fn version(mut self, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        self.ctx.set("RawVersion", raw.clone());
        let normalized = raw.trim_start_matches('v');
        match semver::Version::parse(normalized) {
            Ok(v) => {
                self.ctx.set("Version", v.to_string());
                self.ctx.set("Major", v.major as i64);
                self.ctx.set("Minor", v.minor as i64);
                self.ctx.set("Patch", v.patch as i64);
                self.ctx.set("Prerelease", v.pre.to_string());
                self.ctx.set("IsPrerelease", !v.pre.is_empty());
            }
            Err(_) => {
                self.ctx.set("Version", raw);
                self.ctx.set("Major", 0i64);
                self.ctx.set("Minor", 0i64);
                self.ctx.set("Patch", 0i64);
                self.ctx.set("Prerelease", "");
                self.ctx.set("IsPrerelease", false);
            }
        }
        self
    }

    pub fn branch(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Branch", value.into());
        self
    }

    /// Set `Commit` plus the derived `ShortCommit` (first 8 characters).
    pub fn commit(mut self, value: impl Into<String>) -> Self {
        let commit = value.into();
        let short: String = commit.chars().take(8).collect();
        self.ctx.set("ShortCommit", short);
        self.ctx.set("Commit", commit);
        self
    }

    pub fn commit_date(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("CommitDate", value.into());
        self
    }

    pub fn commit_timestamp(mut self, value: i64) -> Self {
        self.ctx.set("CommitTimestamp", value);
        self
    }

    pub fn git_url(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("GitURL", value.into());
        self
    }

    pub fn summary(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Summary", value.into());
        self
    }

    /// Set `Date`, `Now` and `Timestamp` from a single RFC3339 instant,
    /// so every time-derived binding in a run agrees with the others.
    pub fn now(mut self, rfc3339: impl Into<String>, unix: i64) -> Self {
        let rfc3339 = rfc3339.into();
        self.ctx.set("Date", rfc3339.clone());
        self.ctx.set("Now", rfc3339);
        self.ctx.set("Timestamp", unix);
        self
    }

    pub fn runtime(mut self, os: impl Into<String>, arch: impl Into<String>) -> Self {
        self.ctx.set("Runtime", format!("{}/{}", os.into(), arch.into()));
        self
    }

    pub fn env(mut self, env: BTreeMap<String, String>) -> Self {
        let map: BTreeMap<String, Value> = env.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
        self.ctx.set("Env", Value::from_serialize(&map));
        self
    }

    pub fn is_snapshot(mut self, value: bool) -> Self {
        self.ctx.set("IsSnapshot", value);
        self
    }

    pub fn is_nightly(mut self, value: bool) -> Self {
        self.ctx.set("IsNightly", value);
        self
    }

    pub fn homepage(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Homepage", value.into());
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Description", value.into());
        self
    }

    pub fn license(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("License", value.into());
        self
    }

    pub fn maintainer(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Maintainer", value.into());
        self
    }

    pub fn vendor(mut self, value: impl Into<String>) -> Self {
        self.ctx.set("Vendor", value.into());
        self
    }

    /// A user-declared variable from `forgecast.yaml`'s `vars:` block.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.set(key.into(), value.into());
        self
    }

    pub fn build(self) -> TemplateContext {
        self.ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgecast_schema::ArtifactKind;

    fn sample() -> TemplateContext {
        TemplateContext::builder()
            .project_name("demo")
            .tag("v1.2.3")
            .version("v1.2.3")
            .commit("abc123def456789")
            .now("2026-08-01T00:00:00Z", 1_785_196_800)
            .build()
    }

    #[test]
    fn version_builder_derives_semver_fields() {
        let ctx = sample();
        assert_eq!(ctx.get("Major").as_deref(), Some("1"));
        assert_eq!(ctx.get("Minor").as_deref(), Some("2"));
        assert_eq!(ctx.get("Patch").as_deref(), Some("3"));
        assert_eq!(ctx.get("IsPrerelease").as_deref(), Some("false"));
        assert_eq!(ctx.get("ShortCommit").as_deref(), Some("abc123de"));
    }

    #[test]
    fn apply_renders_dot_prefixed_fields_with_filters() {
        let ctx = sample();
        let out = ctx.apply("name", "{{ ProjectName }}-{{ .Version }}-{{ .Os | default \"any\" }}").unwrap();
        assert_eq!(out, "demo-1.2.3-any");
    }

    #[test]
    fn with_artifact_adds_scoped_bindings_without_touching_root() {
        let root = sample();
        let artifact = Artifact::new("demo", ArtifactKind::binary()).with_platform("linux", "amd64");
        let scoped = root.with_artifact(&artifact);
        assert_eq!(scoped.get("Os").as_deref(), Some("linux"));
        assert_eq!(scoped.get("ArtifactName").as_deref(), Some("demo"));
        assert!(root.get_value("ArtifactName").is_none());
    }

    #[test]
    fn apply_rewrites_if_call_ternary() {
        let ctx = sample();
        let out = ctx.apply("t", "{{ if(.IsPrerelease, \"rc\", \"stable\") }}").unwrap();
        assert_eq!(out, "stable");
    }
}

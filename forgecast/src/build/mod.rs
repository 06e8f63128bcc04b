//! The build dispatcher: turns each declared [`BuildSpec`] into one
//! invocation per target platform, selecting a [`Builder`] by its
//! configured `builder` keyword, running the surrounding hooks, and
//! registering the resulting file as a `Binary` [`Artifact`].

mod builders;
pub mod toolchain;

use std::collections::BTreeMap;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

pub use builders::{
    CargoBuilder, InterpretedToolBuilder, NativeABuilder, PrebuiltBuilder,
};

use crate::artifact::{Artifact, ArtifactKind, ArtifactStore};
use crate::context::RunContext;
use crate::errors::{ForgecastError, Result};
use crate::hooks::Hook;
use crate::template::TemplateContext;

/// One build's declared configuration: what to run, for which targets,
/// with which builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Unique id for this build; auto-filled as `build<index>` when absent.
    pub id: String,
    /// Builder selection keyword (`""`/`"go"`, `"rust"`, `"node"`, ...).
    #[serde(default)]
    pub builder: String,
    /// The command/script the builder should invoke.
    #[serde(default)]
    pub command: String,
    /// Output binary name template, e.g. `"{{ .ProjectName }}"`.
    pub binary_name: String,
    /// Explicit `(os, arch[, arm])` combinations to build for. When
    /// `goos`/`goarch` below are also set, this instead narrows their
    /// Cartesian-product expansion down to just these combinations;
    /// otherwise it's the whole target list verbatim.
    #[serde(default)]
    pub targets: Vec<Target>,
    /// Target operating systems; combined with `goarch`/`goarm`/`goamd64`
    /// into the full build matrix by [`BuildSpec::expand_targets`].
    #[serde(default)]
    pub goos: Vec<String>,
    /// Target CPU architectures.
    #[serde(default)]
    pub goarch: Vec<String>,
    /// ARM sub-architecture variants, only applied where `goarch == "arm"`.
    #[serde(default)]
    pub goarm: Vec<String>,
    /// AMD64 microarchitecture levels, only applied where `goarch == "amd64"`.
    #[serde(default)]
    pub goamd64: Vec<String>,
    /// Matrix combinations to drop after expansion.
    #[serde(default)]
    pub ignore: Vec<Ignore>,
    /// Extra environment variables, values templated.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Whether CGO/native-extension compilation is enabled for this build.
    #[serde(default)]
    pub cgo_enabled: bool,
    /// Per-target explicit cross-compiler overrides.
    #[serde(default)]
    pub cross_compilers: BTreeMap<String, String>,
    /// Hooks run immediately before/after this build, once per target.
    #[serde(default)]
    pub before: Vec<Hook>,
    #[serde(default)]
    pub after: Vec<Hook>,
}

/// One concrete `(os, arch)` platform, with optional ARM/AMD64 variant
/// tags.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Target {
    pub goos: String,
    pub goarch: String,
    #[serde(default)]
    pub goarm: Option<String>,
    #[serde(default)]
    pub goamd64: Option<String>,
}

impl Target {
    pub fn key(&self) -> String {
        format!("{}_{}", self.goos, self.goarch)
    }
}

/// A matrix-exclusion rule: every populated field must match the
/// corresponding field of a [`Target`] for that combination to be
/// dropped. A `None` field matches any value, so `{goos: "windows",
/// goarch: "arm64"}` drops only that one pair and leaves e.g.
/// `windows/amd64` in the expansion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Ignore {
    #[serde(default)]
    pub goos: Option<String>,
    #[serde(default)]
    pub goarch: Option<String>,
    #[serde(default)]
    pub goarm: Option<String>,
    #[serde(default)]
    pub goamd64: Option<String>,
}

impl Ignore {
    fn matches(&self, target: &Target) -> bool {
        self.goos.as_deref().map_or(true, |v| v == target.goos)
            && self.goarch.as_deref().map_or(true, |v| v == target.goarch)
            && self.goarm.as_deref().map_or(true, |v| Some(v) == target.goarm.as_deref())
            && self.goamd64.as_deref().map_or(true, |v| Some(v) == target.goamd64.as_deref())
    }
}

impl BuildSpec {
    /// The Cartesian product of `goos × goarch × goarm × goamd64`, minus
    /// entries matched by `ignore`, intersected with `targets` when that
    /// list is also non-empty. ARM/AMD64 variants are only crossed in for
    /// the architecture they apply to (`"arm"`/`"amd64"` respectively);
    /// every other architecture gets exactly one target per `(goos,
    /// goarch)` pair with both left unset.
    ///
    /// When `goos`/`goarch` are empty, `targets` is returned verbatim —
    /// the explicit, non-matrix configuration style.
    pub fn expand_targets(&self) -> Vec<Target> {
        if self.goos.is_empty() || self.goarch.is_empty() {
            return self.targets.clone();
        }

        let arm_variants: Vec<Option<String>> = if self.goarm.is_empty() {
            vec![None]
        } else {
            self.goarm.iter().cloned().map(Some).collect()
        };
        let amd64_variants: Vec<Option<String>> = if self.goamd64.is_empty() {
            vec![None]
        } else {
            self.goamd64.iter().cloned().map(Some).collect()
        };
        let no_variant: Vec<Option<String>> = vec![None];

        let mut expanded = Vec::new();
        for goos in &self.goos {
            for goarch in &self.goarch {
                let arms = if goarch == "arm" { &arm_variants } else { &no_variant };
                let amd64s = if goarch == "amd64" { &amd64_variants } else { &no_variant };
                for goarm in arms {
                    for goamd64 in amd64s {
                        let target = Target {
                            goos: goos.clone(),
                            goarch: goarch.clone(),
                            goarm: goarm.clone(),
                            goamd64: goamd64.clone(),
                        };
                        if !self.ignore.iter().any(|rule| rule.matches(&target)) {
                            expanded.push(target);
                        }
                    }
                }
            }
        }

        if self.targets.is_empty() {
            expanded
        } else {
            expanded.into_iter().filter(|t| self.targets.contains(t)).collect()
        }
    }
}

/// A per-language build strategy.
pub trait Builder: Send + Sync {
    /// Whether this builder handles the given `builder:` keyword.
    /// An empty string is the wildcard the default builder matches.
    fn supports(&self, builder: &str) -> bool;

    /// Run the build for one `(spec, target)` pair, writing the
    /// resulting binary to `output_path`.
    fn build(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        target: &Target,
        output_path: &Utf8PathBuf,
        tmpl: &TemplateContext,
    ) -> Result<()>;
}

/// Holds the registered [`Builder`]s and dispatches each `(spec, target)`
/// pair to the first one whose `supports` returns `true`.
pub struct BuildDispatcher {
    builders: Vec<Box<dyn Builder>>,
    dist_dir: Utf8PathBuf,
    host_os: String,
    host_arch: String,
}

impl BuildDispatcher {
    /// A dispatcher with the standard builder set, matching the keyword
    /// table: native-A default, Rust/Cargo, and a table-driven
    /// interpreted/script builder covering node/python/java/php plus
    /// their package-manager aliases.
    pub fn standard(dist_dir: Utf8PathBuf, host_os: impl Into<String>, host_arch: impl Into<String>) -> Self {
        Self {
            builders: vec![
                Box::new(CargoBuilder),
                Box::new(InterpretedToolBuilder),
                Box::new(PrebuiltBuilder),
                Box::new(NativeABuilder::new(dist_dir.clone())),
            ],
            dist_dir,
            host_os: host_os.into(),
            host_arch: host_arch.into(),
        }
    }

    fn select(&self, keyword: &str) -> Option<&dyn Builder> {
        self.builders.iter().find(|b| b.supports(keyword)).map(|b| b.as_ref())
    }

    /// Run one build spec across every one of its targets, registering a
    /// `Binary` artifact per successful target into `store`.
    ///
    /// Each target is an independent unit: a failure on one target is
    /// returned immediately (the caller typically runs this per-target
    /// through the [`crate::executor::Executor`] rather than looping
    /// targets here, so that one slow/failing target doesn't block its
    /// siblings).
    pub fn build_target(
        &self,
        ctx: &RunContext,
        spec: &BuildSpec,
        target: &Target,
        root_tmpl: &TemplateContext,
        store: &ArtifactStore,
    ) -> Result<Artifact> {
        ctx.check()?;
        let builder = self
            .select(&spec.builder)
            .ok_or_else(|| ForgecastError::Config { message: format!("no builder matches {:?}", spec.builder) })?;

        let mut scoped = root_tmpl.clone();
        scoped.set("Os", target.goos.clone());
        scoped.set("Arch", target.goarch.clone());
        scoped.set("Arm", target.goarm.clone().unwrap_or_default());
        scoped.set("Amd64", target.goamd64.clone().unwrap_or_else(|| "v1".into()));

        crate::hooks::run_all(ctx, &scoped, &spec.before)?;

        let binary_name = scoped.apply("build.binary_name", &spec.binary_name)?;
        let filename = if target.goos == "windows" { format!("{binary_name}.exe") } else { binary_name };
        let output_path = self.dist_dir.join(&spec.id).join(target.key()).join(&filename);
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
        }

        builder.build(ctx, spec, target, &output_path, &scoped)?;

        crate::hooks::run_all(ctx, &scoped, &spec.after)?;

        let artifact = Artifact::new(output_path.file_name().unwrap_or(&filename), ArtifactKind::binary())
            .with_path(output_path)
            .with_platform(target.goos.clone(), target.goarch.clone())
            .with_build_id(spec.id.clone());
        let artifact = match &target.goarm {
            Some(arm) => {
                let mut a = artifact;
                a.goarm = Some(arm.clone());
                a
            }
            None => artifact,
        };
        store.add(artifact.clone());
        Ok(artifact)
    }

    pub fn host_os(&self) -> &str {
        &self.host_os
    }

    pub fn host_arch(&self) -> &str {
        &self.host_arch
    }
}

/// Assign `build<index>` to every [`BuildSpec`] with an empty `id`,
/// matching the configuration validation rule that build ids are unique
/// and auto-filled.
pub fn assign_missing_ids(specs: &mut [BuildSpec]) {
    for (index, spec) in specs.iter_mut().enumerate() {
        if spec.id.is_empty() {
            spec.id = format!("build{index}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> BuildSpec {
        BuildSpec {
            id: "demo".into(),
            builder: "prebuilt".into(),
            command: String::new(),
            binary_name: "{{ ProjectName }}".into(),
            targets: vec![Target { goos: "linux".into(), goarch: "amd64".into(), goarm: None, goamd64: None }],
            goos: Vec::new(),
            goarch: Vec::new(),
            goarm: Vec::new(),
            goamd64: Vec::new(),
            ignore: Vec::new(),
            env: BTreeMap::new(),
            cgo_enabled: false,
            cross_compilers: BTreeMap::new(),
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    #[test]
    fn expand_targets_falls_back_to_explicit_targets_with_no_matrix_fields() {
        let targets = spec().expand_targets();
        assert_eq!(targets, vec![Target { goos: "linux".into(), goarch: "amd64".into(), goarm: None, goamd64: None }]);
    }

    #[test]
    fn expand_targets_builds_the_cartesian_product_minus_ignored_entries() {
        let mut s = spec();
        s.targets = Vec::new();
        s.goos = vec!["linux".into(), "windows".into()];
        s.goarch = vec!["amd64".into(), "arm64".into()];
        s.ignore = vec![Ignore { goos: Some("windows".into()), goarch: Some("arm64".into()), ..Default::default() }];

        let targets = s.expand_targets();
        assert_eq!(targets.len(), 3);
        assert!(!targets.iter().any(|t| t.goos == "windows" && t.goarch == "arm64"));
    }

    #[test]
    fn expand_targets_only_crosses_goarm_for_the_arm_architecture() {
        let mut s = spec();
        s.targets = Vec::new();
        s.goos = vec!["linux".into()];
        s.goarch = vec!["arm".into(), "amd64".into()];
        s.goarm = vec!["6".into(), "7".into()];

        let targets = s.expand_targets();
        assert_eq!(targets.len(), 3); // arm/6, arm/7, amd64 (no variant)
        assert!(targets.iter().any(|t| t.goarch == "arm" && t.goarm.as_deref() == Some("6")));
        assert!(targets.iter().any(|t| t.goarch == "arm" && t.goarm.as_deref() == Some("7")));
        assert!(targets.iter().any(|t| t.goarch == "amd64" && t.goarm.is_none()));
    }

    #[test]
    fn expand_targets_intersects_the_matrix_with_explicit_targets_when_both_are_set() {
        let mut s = spec();
        s.goos = vec!["linux".into(), "windows".into()];
        s.goarch = vec!["amd64".into()];
        // `targets` (from `spec()`) only names linux/amd64, so windows/amd64
        // is produced by the matrix but filtered back out by the intersection.
        let targets = s.expand_targets();
        assert_eq!(targets, vec![Target { goos: "linux".into(), goarch: "amd64".into(), goarm: None, goamd64: None }]);
    }

    #[test]
    fn assign_missing_ids_fills_gaps_by_index() {
        let mut specs = vec![spec(), { let mut s = spec(); s.id = String::new(); s }];
        assign_missing_ids(&mut specs);
        assert_eq!(specs[0].id, "demo");
        assert_eq!(specs[1].id, "build1");
    }

    #[test]
    fn prebuilt_build_copies_source_and_registers_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let source = root.join("source-binary");
        std::fs::write(&source, b"#!/bin/sh\necho hi\n").unwrap();

        let mut s = spec();
        s.command = source.to_string();

        let dispatcher = BuildDispatcher::standard(root.join("dist"), "linux", "amd64");
        let store = ArtifactStore::new();
        let tmpl = TemplateContext::builder().project_name("demo").build();
        let ctx = RunContext::new();

        let artifact = dispatcher.build_target(&ctx, &s, &s.targets[0], &tmpl, &store).unwrap();
        assert_eq!(artifact.name, "demo");
        assert_eq!(store.count(), 1);
        assert!(artifact.path.as_ref().unwrap().exists());
    }
}

//! The pipeline engine: runs the ten-stage sequence in
//! §4.7 order, holding the one root [`RunContext`] every stage shares.

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::announce::Announcer;
use crate::artifact::{Artifact, ArtifactStore};
use crate::build::{BuildDispatcher, Target};
use crate::config::Config;
use crate::context::RunContext;
use crate::errors::Result;
use crate::executor::{Executor, Task};
use crate::hooks::{self, Hook};
use crate::packagers::Packager;
use crate::postprocess::PostProcessor;
use crate::publishers::{publish_or_skip, Publisher};
use crate::template::TemplateContext;
use crate::vcs::VcsInfo;

/// A completed (or partially completed, on fatal error) pipeline run.
pub struct PipelineResult {
    pub manifest: Vec<Artifact>,
    /// Non-fatal errors collected from announcers and other best-effort
    /// stages; an empty vec means every announcer succeeded.
    pub warnings: Vec<String>,
}

/// Global before/after hooks plus the registered planes for one run.
/// Constructed by a caller that has already parsed and validated a
/// [`Config`] into concrete `Vec<Box<dyn _>>` plane members — this
/// struct carries no parsing logic of its own.
pub struct Pipeline {
    pub config: Config,
    pub dist_dir: Utf8PathBuf,
    pub before: Vec<Hook>,
    pub after: Vec<Hook>,
    pub packagers: Vec<Box<dyn Packager>>,
    pub post_processors: Vec<Box<dyn PostProcessor>>,
    pub publishers: Vec<Box<dyn Publisher>>,
    pub announcers: Vec<Box<dyn Announcer>>,
    pub host_os: String,
    pub host_arch: String,
}

struct BuildTargetTask {
    dispatcher: std::sync::Arc<BuildDispatcher>,
    spec: crate::build::BuildSpec,
    target: Target,
    tmpl: TemplateContext,
    store: std::sync::Arc<ArtifactStore>,
}

impl Task for BuildTargetTask {
    type Output = Artifact;

    fn run(self, ctx: &RunContext) -> Result<Artifact> {
        self.dispatcher.build_target(ctx, &self.spec, &self.target, &self.tmpl, &self.store)
    }
}

impl Pipeline {
    /// A pipeline over `config` with no hooks or plane members registered
    /// yet and `dist`/host platform filled in from `config` and the build
    /// host. Callers assemble `packagers`/`post_processors`/`publishers`/
    /// `announcers` afterward (this struct's fields are public for exactly
    /// that reason) before calling [`Self::run`].
    pub fn new(config: Config) -> Self {
        let dist_dir = Utf8PathBuf::from(config.dist.clone());
        Self {
            config,
            dist_dir,
            before: Vec::new(),
            after: Vec::new(),
            packagers: Vec::new(),
            post_processors: Vec::new(),
            publishers: Vec::new(),
            announcers: Vec::new(),
            host_os: std::env::consts::OS.to_owned(),
            host_arch: std::env::consts::ARCH.to_owned(),
        }
    }

    /// Run the full sequence. `vcs` seeds stage 1's `TemplateContext`
    /// derivation; a caller with no repository (e.g. a snapshot build
    /// outside VCS) passes a synthesized [`VcsInfo`] instead.
    ///
    /// The artifact manifest is flushed to `dist/artifacts.json` before
    /// returning on every exit path, success or fatal error, so operators
    /// can inspect whatever partial state a failed run produced.
    pub fn run(&self, vcs: VcsInfo) -> Result<PipelineResult> {
        let ctx = RunContext::new();
        let store = std::sync::Arc::new(ArtifactStore::new());

        let outcome = self.run_stages(&ctx, &store, vcs);

        let manifest_path = self.dist_dir.join("artifacts.json");
        if let Err(e) = store.save(&manifest_path) {
            warn!(path = %manifest_path, error = %e, "failed to flush artifact manifest");
        }

        outcome
    }

    /// Stage 3 alone: build every `BuildSpec x Target`, returning the
    /// resulting `Binary` artifacts. Mirrors `cargo-dist`'s `do_build`
    /// decomposition for callers that want to drive one stage directly
    /// instead of the full [`Self::run`] sequence.
    pub fn run_build(&self, vcs: &VcsInfo) -> Result<Vec<Artifact>> {
        let ctx = RunContext::new();
        let store = std::sync::Arc::new(ArtifactStore::new());
        let tmpl = self.build_template_context(vcs);
        self.run_builds(&ctx, &tmpl, &store)?;
        Ok(store.all())
    }

    fn run_stages(
        &self,
        ctx: &RunContext,
        store: &std::sync::Arc<ArtifactStore>,
        vcs: VcsInfo,
    ) -> Result<PipelineResult> {
        let mut warnings = Vec::new();

        // 1. Version metadata.
        let tmpl = self.build_template_context(&vcs);

        // 2. Global before-hooks.
        hooks::run_all(ctx, &tmpl, &self.before)?;

        // 3. Build, parallel across BuildSpec x targets.
        self.run_builds(ctx, &tmpl, store)?;

        // 4. Post-build merges (universal binary) run as ordinary
        // post-processors; callers that want one register a
        // UniversalBinaryProcessor ahead of the rest in post_processors.

        // 5. Archive formation, parallel across archive configs.
        self.run_packagers_by_kind(ctx, &tmpl, store, "archive")?;

        // 6. OS-level packaging, parallel across configs.
        self.run_packagers_by_kind(ctx, &tmpl, store, "nfpm")?;

        // 7. Checksum -> SBOM -> Compression -> Signing, strict order:
        // callers populate `post_processors` in that order; the engine
        // just runs them sequentially as declared.
        for processor in &self.post_processors {
            ctx.check()?;
            processor.run(ctx, store, &tmpl)?;
        }

        // 8. Publish, parallel across destinations, sequential within one.
        self.run_publishers(ctx, &tmpl, store)?;

        // 9. Announce, parallel across channels, best-effort.
        for announcer in &self.announcers {
            if ctx.is_cancelled() {
                break;
            }
            if let Err(e) = announcer.announce(ctx, &tmpl) {
                warn!(announcer = announcer.name(), error = %e, "announcer failed, continuing");
                warnings.push(format!("{}: {e}", announcer.name()));
            }
        }

        // 10. Global after-hooks.
        hooks::run_all(ctx, &tmpl, &self.after)?;

        info!(artifacts = store.count(), "pipeline run complete");
        Ok(PipelineResult { manifest: store.all(), warnings })
    }

    fn build_template_context(&self, vcs: &VcsInfo) -> TemplateContext {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        let mut builder = TemplateContext::builder()
            .project_name(self.config.project_name.clone())
            .branch(vcs.branch.clone())
            .commit(vcs.commit.clone())
            .commit_date(vcs.commit_date.clone())
            .commit_timestamp(vcs.commit_timestamp)
            .summary(vcs.summary.clone())
            .runtime(self.host_os.clone(), self.host_arch.clone())
            .now(vcs.commit_date.clone(), now)
            .homepage(self.config.homepage.clone())
            .description(self.config.description.clone())
            .license(self.config.license.clone())
            .maintainer(self.config.maintainer.clone())
            .vendor(self.config.vendor.clone())
            .is_snapshot(vcs.tag.is_none())
            .is_nightly(false);

        if let Some(tag) = &vcs.tag {
            builder = builder.tag(tag.clone()).version(tag.clone());
        } else {
            builder = builder.tag(vcs.short_commit.clone()).version(format!("0.0.0-{}", vcs.short_commit));
        }
        if let Some(previous) = &vcs.previous_tag {
            builder = builder.previous_tag(previous.clone());
        }
        if let Some(url) = &vcs.git_url {
            builder = builder.git_url(url.clone());
        }
        for (key, value) in &self.config.variables {
            builder = builder.var(key.clone(), value.clone());
        }
        builder.build()
    }

    fn run_builds(&self, ctx: &RunContext, tmpl: &TemplateContext, store: &std::sync::Arc<ArtifactStore>) -> Result<()> {
        let dispatcher = std::sync::Arc::new(BuildDispatcher::standard(
            self.dist_dir.clone(),
            self.host_os.clone(),
            self.host_arch.clone(),
        ));
        let mut tasks = Vec::new();
        for spec in &self.config.builds {
            for target in &spec.expand_targets() {
                let label = format!("{}:{}", spec.id, target.key());
                tasks.push((
                    label,
                    BuildTargetTask {
                        dispatcher: std::sync::Arc::clone(&dispatcher),
                        spec: spec.clone(),
                        target: target.clone(),
                        tmpl: tmpl.clone(),
                        store: std::sync::Arc::clone(store),
                    },
                ));
            }
        }
        let results = Executor::new().with_fail_fast(true).execute(ctx, tasks);
        for result in results {
            result.outcome?;
        }
        Ok(())
    }

    fn run_packagers_by_kind(&self, ctx: &RunContext, tmpl: &TemplateContext, store: &ArtifactStore, kind: &str) -> Result<()> {
        for packager in self.packagers.iter().filter(|p| p.name() == kind) {
            ctx.check()?;
            packager.build(ctx, store, tmpl)?;
        }
        Ok(())
    }

    fn run_publishers(&self, ctx: &RunContext, tmpl: &TemplateContext, store: &ArtifactStore) -> Result<()> {
        let artifacts = store.all();
        for publisher in &self.publishers {
            ctx.check()?;
            publish_or_skip(publisher.as_ref(), ctx, &artifacts, tmpl)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn vcs() -> VcsInfo {
        VcsInfo {
            commit: "abc123def456".into(),
            short_commit: "abc123de".into(),
            commit_date: "2026-08-01T00:00:00Z".into(),
            commit_timestamp: 1_785_000_000,
            branch: "main".into(),
            tag: Some("v1.0.0".into()),
            previous_tag: None,
            summary: "release".into(),
            git_url: Some("https://example.com/acme/demo".into()),
        }
    }

    fn empty_config() -> Config {
        Config {
            project_name: "demo".into(),
            dist: "dist".into(),
            variables: BTreeMap::new(),
            builds: Vec::new(),
            archives: Vec::new(),
            nfpms: Vec::new(),
            dockers: Vec::new(),
            checksum: Default::default(),
            release: Vec::new(),
            blob_stores: Vec::new(),
            announce: Vec::new(),
            homepage: String::new(),
            description: String::new(),
            license: String::new(),
            maintainer: String::new(),
            vendor: String::new(),
        }
    }

    #[test]
    fn empty_pipeline_runs_every_stage_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let dist_dir = Utf8PathBuf::from_path_buf(dir.path().join("dist")).unwrap();
        let pipeline = Pipeline {
            config: empty_config(),
            dist_dir,
            before: Vec::new(),
            after: Vec::new(),
            packagers: Vec::new(),
            post_processors: Vec::new(),
            publishers: Vec::new(),
            announcers: Vec::new(),
            host_os: "linux".into(),
            host_arch: "amd64".into(),
        };
        let result = pipeline.run(vcs()).unwrap();
        assert!(result.manifest.is_empty());
        assert!(result.warnings.is_empty());
    }
}

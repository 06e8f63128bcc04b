use std::collections::BTreeMap;
use std::sync::RwLock;

use camino::Utf8Path;
use forgecast_schema::{Artifact, ReleaseManifest};
use tracing::{debug, info};

use crate::errors::{ForgecastError, Result};

/// A boxed predicate over an [`Artifact`], as produced by [`ArtifactStore::by_type`]
/// and friends. `Send + Sync` so predicates can cross into worker threads
/// unchanged.
pub type Predicate = Box<dyn Fn(&Artifact) -> bool + Send + Sync>;

/// A concurrency-safe, append-mostly collection of artifacts.
///
/// Internally a single `RwLock<Vec<Artifact>>`: all mutators take the
/// write lock, all readers take the read lock and copy out before
/// returning, so no caller ever observes a concurrent mutation mid-read.
#[derive(Default)]
pub struct ArtifactStore {
    inner: RwLock<Vec<Artifact>>,
}

impl ArtifactStore {
    /// A fresh, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an artifact. O(1), serialized against concurrent writers.
    pub fn add(&self, artifact: Artifact) {
        debug!(name = %artifact.name, kind = %artifact.kind, "registering artifact");
        self.inner
            .write()
            .expect("artifact store lock poisoned")
            .push(artifact);
    }

    /// A snapshot copy of every artifact, in insertion order.
    pub fn all(&self) -> Vec<Artifact> {
        self.inner
            .read()
            .expect("artifact store lock poisoned")
            .clone()
    }

    /// Alias of [`Self::all`].
    pub fn list(&self) -> Vec<Artifact> {
        self.all()
    }

    /// How many artifacts are currently registered.
    pub fn count(&self) -> usize {
        self.inner.read().expect("artifact store lock poisoned").len()
    }

    /// Discard every artifact.
    pub fn clear(&self) {
        self.inner.write().expect("artifact store lock poisoned").clear();
    }

    /// Artifacts for which every predicate holds, evaluated in insertion
    /// order.
    pub fn filter(&self, preds: &[Predicate]) -> Vec<Artifact> {
        self.all()
            .into_iter()
            .filter(|a| preds.iter().all(|p| p(a)))
            .collect()
    }

    /// Remove every artifact matching `pred`. Used to prune inputs that
    /// have been replaced by an aggregated output (e.g. after forming a
    /// universal binary with `replace = true`).
    pub fn remove(&self, pred: impl Fn(&Artifact) -> bool) {
        let mut guard = self.inner.write().expect("artifact store lock poisoned");
        let before = guard.len();
        guard.retain(|a| !pred(a));
        let removed = before - guard.len();
        if removed > 0 {
            debug!(removed, "pruned artifacts from store");
        }
    }

    /// Group by `(goos, goarch, goarm)`, preserving insertion order within
    /// each group.
    pub fn group_by_platform(&self) -> BTreeMap<(String, String, String), Vec<Artifact>> {
        let mut groups: BTreeMap<(String, String, String), Vec<Artifact>> = BTreeMap::new();
        for artifact in self.all() {
            groups.entry(artifact.platform_key()).or_default().push(artifact);
        }
        groups
    }

    /// Group by `type`, preserving insertion order within each group.
    pub fn group_by_type(&self) -> BTreeMap<String, Vec<Artifact>> {
        let mut groups: BTreeMap<String, Vec<Artifact>> = BTreeMap::new();
        for artifact in self.all() {
            groups
                .entry(artifact.kind.as_str().to_owned())
                .or_default()
                .push(artifact);
        }
        groups
    }

    /// Group by `build_id`, preserving insertion order within each group.
    /// Artifacts with no `build_id` are grouped under the empty string.
    pub fn group_by_build(&self) -> BTreeMap<String, Vec<Artifact>> {
        let mut groups: BTreeMap<String, Vec<Artifact>> = BTreeMap::new();
        for artifact in self.all() {
            groups
                .entry(artifact.build_id.clone().unwrap_or_default())
                .or_default()
                .push(artifact);
        }
        groups
    }

    /// Serialize the store to a JSON manifest at `path`, 2-space indented.
    pub fn save(&self, path: &Utf8Path) -> Result<()> {
        let manifest: ReleaseManifest = self.all();
        let json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| ForgecastError::Config { message: e.to_string() })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ForgecastError::io(parent, e))?;
        }
        std::fs::write(path, json).map_err(|e| ForgecastError::io(path, e))?;
        info!(path = %path, count = manifest.len(), "wrote artifact manifest");
        Ok(())
    }

    /// Load a JSON manifest from `path`, replacing any artifacts currently
    /// in the store's backing `Vec` is *not* performed implicitly — callers
    /// that want a clean load should `clear()` first, matching the
    /// documented `save; clear; load` round trip.
    pub fn load(&self, path: &Utf8Path) -> Result<()> {
        let json = std::fs::read_to_string(path).map_err(|e| ForgecastError::io(path, e))?;
        let manifest: ReleaseManifest = serde_json::from_str(&json)
            .map_err(|e| ForgecastError::Config { message: e.to_string() })?;
        let mut guard = self.inner.write().expect("artifact store lock poisoned");
        guard.extend(manifest);
        Ok(())
    }

    /// Predicate factory: artifacts of an exact `type`.
    pub fn by_type(kind: impl Into<String>) -> Predicate {
        let kind = kind.into();
        Box::new(move |a: &Artifact| a.kind.as_str() == kind)
    }

    /// Predicate factory: artifacts targeting a given `goos`.
    pub fn by_goos(goos: impl Into<String>) -> Predicate {
        let goos = goos.into();
        Box::new(move |a: &Artifact| a.goos.as_deref() == Some(goos.as_str()))
    }

    /// Predicate factory: artifacts targeting a given `goarch`.
    pub fn by_goarch(goarch: impl Into<String>) -> Predicate {
        let goarch = goarch.into();
        Box::new(move |a: &Artifact| a.goarch.as_deref() == Some(goarch.as_str()))
    }

    /// Predicate factory: artifacts produced by a given build id.
    pub fn by_build_id(build_id: impl Into<String>) -> Predicate {
        let build_id = build_id.into();
        Box::new(move |a: &Artifact| a.build_id.as_deref() == Some(build_id.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgecast_schema::ArtifactKind;

    fn artifact(name: &str, kind: ArtifactKind, goos: &str, goarch: &str) -> Artifact {
        Artifact::new(name, kind).with_platform(goos, goarch)
    }

    #[test]
    fn filter_by_type_and_platform() {
        let store = ArtifactStore::new();
        store.add(artifact("demo_linux", ArtifactKind::binary(), "linux", "amd64"));
        store.add(artifact("demo_windows", ArtifactKind::binary(), "windows", "amd64"));
        store.add(artifact("demo.txt", ArtifactKind::checksum(), "", ""));

        let linux_binaries = store.filter(&[
            ArtifactStore::by_type(ArtifactKind::BINARY),
            ArtifactStore::by_goos("linux"),
        ]);
        assert_eq!(linux_binaries.len(), 1);
        assert_eq!(linux_binaries[0].name, "demo_linux");
    }

    #[test]
    fn remove_prunes_matching_artifacts() {
        let store = ArtifactStore::new();
        store.add(artifact("a", ArtifactKind::binary(), "macos", "amd64"));
        store.add(artifact("b", ArtifactKind::binary(), "macos", "arm64"));
        store.remove(|a| a.goarch.as_deref() == Some("arm64"));
        assert_eq!(store.count(), 1);
        assert_eq!(store.all()[0].name, "a");
    }

    #[test]
    fn group_by_platform_preserves_insertion_order() {
        let store = ArtifactStore::new();
        store.add(artifact("a1", ArtifactKind::binary(), "linux", "amd64"));
        store.add(artifact("a2", ArtifactKind::archive(), "linux", "amd64"));
        store.add(artifact("b1", ArtifactKind::binary(), "macos", "arm64"));

        let groups = store.group_by_platform();
        let linux = &groups[&("linux".into(), "amd64".into(), "".into())];
        assert_eq!(linux.iter().map(|a| a.name.as_str()).collect::<Vec<_>>(), vec!["a1", "a2"]);
    }

    #[test]
    fn save_then_clear_then_load_round_trips() {
        let store = ArtifactStore::new();
        store.add(artifact("demo_linux.tar.gz", ArtifactKind::archive(), "linux", "amd64"));
        store.add(artifact("checksums.txt", ArtifactKind::checksum(), "", ""));

        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(dir.path().join("artifacts.json")).unwrap();

        let before = store.all();
        store.save(&path).unwrap();
        store.clear();
        assert_eq!(store.count(), 0);
        store.load(&path).unwrap();
        assert_eq!(store.all(), before);
    }
}

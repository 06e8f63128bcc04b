//! The artifact store: a concurrency-safe, filterable, groupable
//! collection of [`Artifact`]s. It is the sole data channel between
//! pipeline stages — stages never communicate except through the store
//! and the immutable [`crate::template::TemplateContext`].

mod store;

pub use forgecast_schema::{Artifact, ArtifactKind};
pub use store::{ArtifactStore, Predicate};

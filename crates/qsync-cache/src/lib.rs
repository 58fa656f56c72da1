//! On-disk cache of dependency build outputs.
//!
//! Artifacts are copied into flat per-kind directories under a [`CacheKey`] derived from their
//! build path. [`DependencyCache`] records which targets own which keys so that outputs of
//! targets that disappear are deleted.

mod artifact_cache;
mod cache_key;
mod dependency_cache;
mod error;
mod pool;
mod util;

pub use crate::{
    artifact_cache::{ArtifactCache, CacheItem, RefreshResult, STATE_FILE},
    cache_key::CacheKey,
    dependency_cache::{
        CachedArtifact, DependencyCache, UpdateResult, DEPENDENCY_STATE_FILE, RENDER_JARS_DIR,
    },
    error::{CacheError, Result},
    pool::CopyPool,
    util::{atomic_write, read_json, write_json},
};

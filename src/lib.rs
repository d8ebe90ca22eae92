//! Frameloom is the render-side optimization core of an animation engine.
//!
//! It turns "render this frame of this scene" requests into cached, scheduled
//! work, and turns finished scenes into portable playback artifacts.
//!
//! # Pipeline overview
//!
//! 1. **Snapshot**: `&dyn Serializable -> SceneSnapshot` (canonical scene data
//!    plus a truncated content hash)
//! 2. **Cache**: [`RenderCache`] answers frame lookups from a bounded memory
//!    tier, falling back to a disk tier with promotion on hit
//! 3. **Schedule**: [`RenderPool`] runs misses on worker threads with priority
//!    ordering, backpressure, per-task timeouts and status callbacks
//! 4. **Export**: [`Exporter`] emits a self-contained interactive artifact
//!    with the normalized scene data and a playback runtime embedded
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic identity**: cache keys and snapshot hashes are pure
//!   functions of scene content and render parameters.
//! - **Dependencies are injected**: the cache, pool and exporter are plain
//!   values the caller constructs and wires together; there is no global
//!   state.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod cache;
mod export;
mod foundation;
mod pool;
mod scene;

pub use cache::entry::{CacheEntry, EntryMetadata};
pub use cache::key::{CacheKeyParams, generate_cache_key};
pub use cache::manager::{
    CacheConfig, CacheStats, FrameMetadata, Lookup, LookupSource, RenderCache, StoreOutcome,
};
pub use export::model::{
    Easing, ExportData, Keyframe, ObjectAnimation, ObjectKind, ObjectStyle, ObjectTransform,
    SceneObject, Timeline, TimelineTrack,
};
pub use export::pipeline::{ExportOptions, ExportOutcome, Exporter};
pub use foundation::core::{FrameIndex, OutputFormat, RenderParams};
pub use foundation::error::{FrameloomError, FrameloomResult};
pub use pool::pool::{CallbackId, FrameRenderer, PoolStats, RenderPool, RenderPoolConfig};
pub use pool::task::{RenderTask, TaskId, TaskPriority, TaskStatus};
pub use scene::snapshot::{SceneSnapshot, Serializable, content_hash};

use std::sync::Arc;
use std::time::Instant;

use crate::foundation::core::{FrameIndex, RenderParams};
use crate::scene::snapshot::SceneSnapshot;

/// Unique identifier for a render task.
///
/// Uniqueness is the caller's responsibility; the pool rejects a queued id
/// that is already live or completed.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct TaskId(pub u64);

/// Scheduling priority. Higher wins the next free worker slot.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default priority.
    Normal,
    /// Latency-sensitive work.
    High,
    /// Jumps everything else in the queue.
    Critical,
}

/// Per-task lifecycle state.
///
/// `Pending → Processing → {Completed | Failed | TimedOut}`, with
/// `Pending → Cancelled` available only while still queued. Terminal states
/// are immutable once reached.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Queued, not yet dispatched to a worker.
    Pending,
    /// Dispatched; running on a worker.
    Processing,
    /// Finished successfully; `result` holds the frame bytes.
    Completed,
    /// The renderer returned an error or panicked; `error` holds the message.
    Failed,
    /// Exceeded the pool's task timeout while processing.
    TimedOut,
    /// Cancelled while still pending.
    Cancelled,
}

impl TaskStatus {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }
}

/// A single frame-render request owned by the pool for its lifetime.
#[derive(Clone, Debug)]
pub struct RenderTask {
    /// Caller-assigned unique id.
    pub id: TaskId,
    /// Frame to render.
    pub frame: FrameIndex,
    /// Scene snapshot the frame is evaluated from; its hash feeds the cache
    /// key.
    pub scene: SceneSnapshot,
    /// Render parameters.
    pub params: RenderParams,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// When the task was accepted into the queue.
    pub created_at: Instant,
    /// When the task was dispatched to a worker.
    pub started_at: Option<Instant>,
    /// When the task reached a terminal state.
    pub completed_at: Option<Instant>,
    /// Rendered frame bytes, present once `Completed`.
    pub result: Option<Arc<Vec<u8>>>,
    /// Failure message, present once `Failed` or `TimedOut`.
    pub error: Option<String>,
}

impl RenderTask {
    /// Build a pending task.
    pub fn new(
        id: TaskId,
        frame: FrameIndex,
        scene: SceneSnapshot,
        params: RenderParams,
        priority: TaskPriority,
    ) -> Self {
        Self {
            id,
            frame,
            scene,
            params,
            priority,
            status: TaskStatus::Pending,
            created_at: Instant::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    /// Cache key identifying this task's (scene state, render params) pair.
    pub fn cache_key(&self) -> String {
        crate::cache::key::generate_cache_key(&crate::cache::key::CacheKeyParams {
            scene_hash: &self.scene.hash,
            frame: self.frame,
            width: self.params.width,
            height: self.params.height,
            format: self.params.format,
            quality: self.params.quality,
        })
    }
}

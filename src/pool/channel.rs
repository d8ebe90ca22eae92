//! Typed message channel between the pool coordinator and its workers.
//!
//! The transport (`std::sync::mpsc` today) stays an implementation detail:
//! the rest of the pool only sees "send a task to a worker" and "receive a
//! completion or failure event", so swapping the primitive does not touch
//! scheduling logic.

use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use crate::pool::task::{RenderTask, TaskId};

/// Message sent to a worker thread.
pub(crate) enum WorkerRequest {
    /// Execute a dispatched task.
    Run(RenderTask),
    /// Exit the worker loop.
    Shutdown,
}

/// Message posted back by a worker.
pub(crate) enum PoolEvent {
    /// Task finished with rendered bytes.
    Completed {
        worker: usize,
        id: TaskId,
        bytes: Arc<Vec<u8>>,
        render_time: Duration,
        from_cache: bool,
    },
    /// Task failed (renderer error or panic).
    Failed {
        worker: usize,
        id: TaskId,
        error: String,
        render_time: Duration,
    },
}

/// Sending half of a worker's task channel.
pub(crate) struct TaskSender {
    tx: mpsc::Sender<WorkerRequest>,
}

impl TaskSender {
    /// Send a request; `false` if the worker is gone.
    pub(crate) fn send(&self, req: WorkerRequest) -> bool {
        self.tx.send(req).is_ok()
    }
}

/// Receiving half of a worker's task channel.
pub(crate) struct TaskReceiver {
    rx: mpsc::Receiver<WorkerRequest>,
}

impl TaskReceiver {
    /// Block until the next request; `None` once the pool is gone.
    pub(crate) fn recv(&self) -> Option<WorkerRequest> {
        self.rx.recv().ok()
    }
}

/// Build a task channel for one worker.
pub(crate) fn task_channel() -> (TaskSender, TaskReceiver) {
    let (tx, rx) = mpsc::channel();
    (TaskSender { tx }, TaskReceiver { rx })
}

/// Sending half of the shared event channel (one clone per worker).
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::Sender<PoolEvent>,
}

impl EventSender {
    /// Post an event; `false` if the coordinator is gone.
    pub(crate) fn send(&self, event: PoolEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half of the shared event channel (coordinator side).
pub(crate) struct EventReceiver {
    rx: mpsc::Receiver<PoolEvent>,
}

/// Outcome of a timed event wait.
pub(crate) enum EventWait {
    /// An event arrived.
    Event(PoolEvent),
    /// The timeout elapsed with no event.
    Tick,
    /// All senders are gone.
    Disconnected,
}

impl EventReceiver {
    /// Wait up to `timeout` for the next event.
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> EventWait {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => EventWait::Event(event),
            Err(mpsc::RecvTimeoutError::Timeout) => EventWait::Tick,
            Err(mpsc::RecvTimeoutError::Disconnected) => EventWait::Disconnected,
        }
    }
}

/// Build the shared worker→coordinator event channel.
pub(crate) fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

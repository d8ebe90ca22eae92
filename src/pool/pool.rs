use std::cmp::Reverse;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::manager::{FrameMetadata, RenderCache};
use crate::foundation::error::{FrameloomError, FrameloomResult};
use crate::pool::channel::{
    EventReceiver, EventSender, EventWait, PoolEvent, TaskSender, WorkerRequest, event_channel,
    task_channel,
};
use crate::pool::task::{RenderTask, TaskId, TaskStatus};

/// Renderer seam: the out-of-scope rasterizer plugs in here.
///
/// One renderer instance is created per worker via the factory passed to
/// [`RenderPool::new`], so implementations may hold mutable scratch state.
pub trait FrameRenderer: Send {
    /// Render the task's frame and return encoded bytes.
    fn render_frame(&mut self, task: &RenderTask) -> FrameloomResult<Vec<u8>>;
}

/// Configuration for [`RenderPool`].
#[derive(Clone, Debug)]
pub struct RenderPoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Pending-queue capacity; `queue_task` rejects beyond this.
    pub max_queue_size: usize,
    /// How long a processing task may run before being marked `TimedOut`.
    pub task_timeout: Duration,
    /// Minimum idle time before a worker is handed its next task.
    pub idle_debounce: Duration,
    /// Coordinator tick and `wait_for_completion` poll interval.
    pub poll_interval: Duration,
}

impl Default for RenderPoolConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_queue_size: 100,
            task_timeout: Duration::from_secs(30),
            idle_debounce: Duration::from_millis(5),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl RenderPoolConfig {
    fn validate(&self) -> FrameloomResult<()> {
        if self.workers == 0 {
            return Err(FrameloomError::validation("pool workers must be >= 1"));
        }
        if self.max_queue_size == 0 {
            return Err(FrameloomError::validation(
                "pool max_queue_size must be >= 1",
            ));
        }
        Ok(())
    }
}

/// Aggregate pool statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PoolStats {
    /// Configured worker count.
    pub total_workers: usize,
    /// Workers currently executing a task.
    pub active_workers: usize,
    /// Tasks waiting in the pending queue.
    pub queued_tasks: usize,
    /// Tasks completed successfully.
    pub completed_tasks: u64,
    /// Tasks failed or timed out.
    pub failed_tasks: u64,
    /// Mean render execution time (cache hits excluded).
    pub average_render_time: Duration,
    /// Estimated completions per second, derived from the average render time
    /// across all workers. 0.0 before any render completes.
    pub throughput: f64,
    /// Mean time tasks spent queued before dispatch.
    pub average_queue_wait: Duration,
    /// `active_workers / total_workers`.
    pub utilization: f64,
}

/// Handle returned by [`RenderPool::on`], used to unregister the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

type TaskCallback = Arc<dyn Fn(&RenderTask) + Send + Sync>;

struct WorkerSlot {
    tx: TaskSender,
    busy: Option<TaskId>,
    idle_since: Instant,
    alive: bool,
}

#[derive(Default)]
struct PoolSamples {
    render_time_total: Duration,
    render_samples: u64,
    queue_wait_total: Duration,
    queue_wait_samples: u64,
}

struct PoolState {
    pending: Vec<RenderTask>,
    processing: HashMap<TaskId, RenderTask>,
    completed: HashMap<TaskId, RenderTask>,
    workers: Vec<WorkerSlot>,
    completed_count: u64,
    failed_count: u64,
    samples: PoolSamples,
    callbacks: HashMap<TaskStatus, Vec<(CallbackId, TaskCallback)>>,
    next_callback_id: u64,
    shutdown: bool,
}

struct PoolShared {
    cfg: RenderPoolConfig,
    state: Mutex<PoolState>,
}

/// Fixed-size worker pool executing prioritized render tasks.
///
/// Tasks flow `Pending → Processing → {Completed | Failed | TimedOut}` with
/// `Pending → Cancelled` available until dispatch. The pending queue is
/// bounded: `queue_task` returning `false` is the backpressure contract and
/// an expected steady-state condition under load, not an error.
///
/// When constructed with a cache, a worker consults it before rendering: a
/// hit completes the task with cached bytes without invoking the renderer,
/// and a fresh render is stored back.
pub struct RenderPool {
    shared: Arc<PoolShared>,
    worker_handles: Vec<std::thread::JoinHandle<()>>,
    coordinator: Option<std::thread::JoinHandle<()>>,
}

impl RenderPool {
    /// Spawn workers and the coordinator.
    ///
    /// `factory` is invoked once per worker, on that worker's thread.
    pub fn new(
        cfg: RenderPoolConfig,
        cache: Option<Arc<RenderCache>>,
        factory: impl Fn() -> Box<dyn FrameRenderer> + Send + Sync + 'static,
    ) -> FrameloomResult<Self> {
        cfg.validate()?;
        let factory: Arc<dyn Fn() -> Box<dyn FrameRenderer> + Send + Sync> = Arc::new(factory);

        let (event_tx, event_rx) = event_channel();
        let now = Instant::now();

        let mut slots = Vec::with_capacity(cfg.workers);
        let mut handles = Vec::with_capacity(cfg.workers);
        for worker_idx in 0..cfg.workers {
            let (task_tx, task_rx) = task_channel();
            let events = event_tx.clone();
            let factory = factory.clone();
            let cache = cache.clone();
            let handle = std::thread::Builder::new()
                .name(format!("frameloom-worker-{worker_idx}"))
                .spawn(move || worker_loop(worker_idx, task_rx, events, factory, cache))
                .map_err(anyhow::Error::from)?;
            slots.push(WorkerSlot {
                tx: task_tx,
                busy: None,
                idle_since: now,
                alive: true,
            });
            handles.push(handle);
        }
        drop(event_tx);

        let shared = Arc::new(PoolShared {
            cfg,
            state: Mutex::new(PoolState {
                pending: Vec::new(),
                processing: HashMap::new(),
                completed: HashMap::new(),
                workers: slots,
                completed_count: 0,
                failed_count: 0,
                samples: PoolSamples::default(),
                callbacks: HashMap::new(),
                next_callback_id: 0,
                shutdown: false,
            }),
        });

        let coord_shared = shared.clone();
        let coordinator = std::thread::Builder::new()
            .name("frameloom-pool-coordinator".to_owned())
            .spawn(move || coordinator_loop(coord_shared, event_rx))
            .map_err(anyhow::Error::from)?;

        Ok(Self {
            shared,
            worker_handles: handles,
            coordinator: Some(coordinator),
        })
    }

    /// Queue a task. Returns `false` when the queue is full, the id is
    /// already known, or the pool is shutting down.
    pub fn queue_task(&self, task: RenderTask) -> bool {
        let mut st = self.shared.state.lock();
        if st.shutdown || st.pending.len() >= self.shared.cfg.max_queue_size {
            return false;
        }
        let duplicate = st.pending.iter().any(|t| t.id == task.id)
            || st.processing.contains_key(&task.id)
            || st.completed.contains_key(&task.id);
        if duplicate {
            warn!(id = task.id.0, "rejected task with duplicate id");
            return false;
        }

        let mut task = task;
        task.status = TaskStatus::Pending;
        task.created_at = Instant::now();
        st.pending.push(task);
        // Stable sort: FIFO is preserved within a priority class.
        st.pending.sort_by_key(|t| Reverse(t.priority));
        assignment_pass(&self.shared.cfg, &mut st);
        true
    }

    /// Best-effort batch enqueue: stops at the first rejection and returns
    /// the count actually queued. Partial success is expected under load.
    pub fn queue_tasks(&self, tasks: Vec<RenderTask>) -> usize {
        let mut queued = 0;
        for task in tasks {
            if !self.queue_task(task) {
                break;
            }
            queued += 1;
        }
        queued
    }

    /// Cancel a task that is still pending. Returns `false` once the task has
    /// been dispatched; in-flight work is never preempted.
    pub fn cancel_task(&self, id: TaskId) -> bool {
        let mut st = self.shared.state.lock();
        let Some(pos) = st.pending.iter().position(|t| t.id == id) else {
            return false;
        };
        let mut task = st.pending.remove(pos);
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Instant::now());
        let fired = callbacks_for(&st, TaskStatus::Cancelled, &task);
        st.completed.insert(id, task);
        drop(st);

        run_callbacks(fired);
        true
    }

    /// Poll until the pending queue is empty and no task is processing, or
    /// the timeout elapses. Returns whether completion occurred in budget.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let fired = {
                let mut st = self.shared.state.lock();
                let fired = reap_timeouts(&self.shared.cfg, &mut st);
                assignment_pass(&self.shared.cfg, &mut st);
                let done = st.pending.is_empty() && st.processing.is_empty();
                if done {
                    drop(st);
                    run_callbacks(fired);
                    return true;
                }
                fired
            };
            run_callbacks(fired);

            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.shared.cfg.poll_interval);
        }
    }

    /// Snapshot of the pending queue, in dispatch order.
    pub fn pending_tasks(&self) -> Vec<RenderTask> {
        self.shared.state.lock().pending.clone()
    }

    /// Snapshot of all tasks that reached a terminal state.
    pub fn completed_tasks(&self) -> Vec<RenderTask> {
        self.shared.state.lock().completed.values().cloned().collect()
    }

    /// Look up a task by id across the queue, in-flight set and completed map.
    pub fn task(&self, id: TaskId) -> Option<RenderTask> {
        let st = self.shared.state.lock();
        st.pending
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .or_else(|| st.processing.get(&id).cloned())
            .or_else(|| st.completed.get(&id).cloned())
    }

    /// Register a callback fired whenever a task reaches `status`.
    ///
    /// Callbacks run on pool-internal threads; a panicking callback is caught
    /// and logged without affecting other subscribers or pool state.
    pub fn on(
        &self,
        status: TaskStatus,
        callback: impl Fn(&RenderTask) + Send + Sync + 'static,
    ) -> CallbackId {
        let mut st = self.shared.state.lock();
        let id = CallbackId(st.next_callback_id);
        st.next_callback_id += 1;
        st.callbacks
            .entry(status)
            .or_default()
            .push((id, Arc::new(callback)));
        id
    }

    /// Unregister a callback. Returns whether it was found.
    pub fn off(&self, status: TaskStatus, id: CallbackId) -> bool {
        let mut st = self.shared.state.lock();
        let Some(list) = st.callbacks.get_mut(&status) else {
            return false;
        };
        let before = list.len();
        list.retain(|(cid, _)| *cid != id);
        list.len() != before
    }

    /// Snapshot aggregate statistics.
    pub fn stats(&self) -> PoolStats {
        let st = self.shared.state.lock();
        let total_workers = st.workers.len();
        let active_workers = st.workers.iter().filter(|w| w.busy.is_some()).count();

        let average_render_time = if st.samples.render_samples == 0 {
            Duration::ZERO
        } else {
            st.samples.render_time_total / st.samples.render_samples as u32
        };
        let average_queue_wait = if st.samples.queue_wait_samples == 0 {
            Duration::ZERO
        } else {
            st.samples.queue_wait_total / st.samples.queue_wait_samples as u32
        };
        let throughput = if average_render_time.is_zero() {
            0.0
        } else {
            total_workers as f64 / average_render_time.as_secs_f64()
        };

        PoolStats {
            total_workers,
            active_workers,
            queued_tasks: st.pending.len(),
            completed_tasks: st.completed_count,
            failed_tasks: st.failed_count,
            average_render_time,
            throughput,
            average_queue_wait,
            utilization: if total_workers == 0 {
                0.0
            } else {
                active_workers as f64 / total_workers as f64
            },
        }
    }
}

impl Drop for RenderPool {
    fn drop(&mut self) {
        {
            let mut st = self.shared.state.lock();
            st.shutdown = true;
            for w in &st.workers {
                if w.alive {
                    w.tx.send(WorkerRequest::Shutdown);
                }
            }
        }
        for handle in self.worker_handles.drain(..) {
            let _ = handle.join();
        }
        // Workers dropped their event senders; the coordinator sees the
        // channel disconnect and exits.
        if let Some(handle) = self.coordinator.take() {
            let _ = handle.join();
        }
    }
}

/// Dispatch pending tasks to workers that have been idle past the debounce
/// window. Pop-from-queue and mark-Processing happen under the state lock, so
/// a task can never be handed to two workers.
fn assignment_pass(cfg: &RenderPoolConfig, st: &mut PoolState) {
    let now = Instant::now();
    for wi in 0..st.workers.len() {
        if st.pending.is_empty() {
            break;
        }
        let slot = &st.workers[wi];
        if !slot.alive
            || slot.busy.is_some()
            || now.duration_since(slot.idle_since) < cfg.idle_debounce
        {
            continue;
        }

        let mut task = st.pending.remove(0);
        task.status = TaskStatus::Processing;
        task.started_at = Some(Instant::now());

        if st.workers[wi].tx.send(WorkerRequest::Run(task.clone())) {
            st.workers[wi].busy = Some(task.id);
            st.processing.insert(task.id, task);
        } else {
            warn!(worker = wi, "worker channel closed; retiring slot");
            st.workers[wi].alive = false;
            task.status = TaskStatus::Pending;
            task.started_at = None;
            st.pending.insert(0, task);
        }
    }
}

/// Mark processing tasks that exceeded the task timeout as `TimedOut`.
///
/// The worker is not preempted; when its late result arrives it is discarded
/// because the task has already left the processing map.
fn reap_timeouts(
    cfg: &RenderPoolConfig,
    st: &mut PoolState,
) -> Vec<(Vec<TaskCallback>, RenderTask)> {
    let now = Instant::now();
    let expired: Vec<TaskId> = st
        .processing
        .iter()
        .filter(|(_, t)| {
            t.started_at
                .is_some_and(|s| now.duration_since(s) > cfg.task_timeout)
        })
        .map(|(id, _)| *id)
        .collect();

    let mut fired = Vec::new();
    for id in expired {
        if let Some(mut task) = st.processing.remove(&id) {
            warn!(id = task.id.0, "task exceeded timeout; marking TimedOut");
            task.status = TaskStatus::TimedOut;
            task.completed_at = Some(now);
            task.error = Some(format!(
                "task exceeded timeout of {} ms",
                cfg.task_timeout.as_millis()
            ));
            st.failed_count += 1;
            fired.extend(callbacks_for(st, TaskStatus::TimedOut, &task));
            st.completed.insert(id, task);
        }
    }
    fired
}

fn callbacks_for(
    st: &PoolState,
    status: TaskStatus,
    task: &RenderTask,
) -> Vec<(Vec<TaskCallback>, RenderTask)> {
    match st.callbacks.get(&status) {
        Some(list) if !list.is_empty() => {
            let cbs = list.iter().map(|(_, cb)| cb.clone()).collect();
            vec![(cbs, task.clone())]
        }
        _ => Vec::new(),
    }
}

/// Invoke callbacks outside the state lock, isolating each invocation.
fn run_callbacks(fired: Vec<(Vec<TaskCallback>, RenderTask)>) {
    for (cbs, task) in fired {
        for cb in cbs {
            if std::panic::catch_unwind(AssertUnwindSafe(|| cb(&task))).is_err() {
                warn!(id = task.id.0, "task callback panicked; continuing");
            }
        }
    }
}

fn coordinator_loop(shared: Arc<PoolShared>, events: EventReceiver) {
    loop {
        let wait = events.recv_timeout(shared.cfg.poll_interval);
        let disconnected = matches!(wait, EventWait::Disconnected);

        let fired = {
            let mut st = shared.state.lock();
            let mut fired = Vec::new();
            if let EventWait::Event(event) = wait {
                fired.extend(handle_event(&mut st, event));
            }
            fired.extend(reap_timeouts(&shared.cfg, &mut st));
            assignment_pass(&shared.cfg, &mut st);
            fired
        };
        run_callbacks(fired);

        if disconnected {
            debug!("all workers exited; coordinator stopping");
            break;
        }
    }
}

fn handle_event(st: &mut PoolState, event: PoolEvent) -> Vec<(Vec<TaskCallback>, RenderTask)> {
    let now = Instant::now();
    let (worker, id) = match &event {
        PoolEvent::Completed { worker, id, .. } => (*worker, *id),
        PoolEvent::Failed { worker, id, .. } => (*worker, *id),
    };

    if let Some(slot) = st.workers.get_mut(worker) {
        slot.busy = None;
        slot.idle_since = now;
    }

    let Some(mut task) = st.processing.remove(&id) else {
        // Already reaped as TimedOut (or cancelled race): terminal states are
        // immutable, so the late result is discarded.
        debug!(id = id.0, "discarding result for task no longer in flight");
        return Vec::new();
    };

    if let Some(started) = task.started_at {
        st.samples.queue_wait_total += started.duration_since(task.created_at);
        st.samples.queue_wait_samples += 1;
    }
    task.completed_at = Some(now);

    let fired = match event {
        PoolEvent::Completed {
            bytes,
            render_time,
            from_cache,
            ..
        } => {
            task.status = TaskStatus::Completed;
            task.result = Some(bytes);
            st.completed_count += 1;
            if !from_cache {
                st.samples.render_time_total += render_time;
                st.samples.render_samples += 1;
            }
            callbacks_for(st, TaskStatus::Completed, &task)
        }
        PoolEvent::Failed { error, .. } => {
            task.status = TaskStatus::Failed;
            task.error = Some(error);
            st.failed_count += 1;
            callbacks_for(st, TaskStatus::Failed, &task)
        }
    };

    st.completed.insert(id, task);
    fired
}

fn worker_loop(
    worker_idx: usize,
    rx: crate::pool::channel::TaskReceiver,
    events: EventSender,
    factory: Arc<dyn Fn() -> Box<dyn FrameRenderer> + Send + Sync>,
    cache: Option<Arc<RenderCache>>,
) {
    let mut renderer = factory();

    while let Some(req) = rx.recv() {
        let task = match req {
            WorkerRequest::Run(task) => task,
            WorkerRequest::Shutdown => break,
        };
        let started = Instant::now();

        if let Some(cache) = cache.as_deref() {
            let key = task.cache_key();
            let lookup = cache.lookup(&key);
            if let Some(entry) = lookup.entry {
                let delivered = events.send(PoolEvent::Completed {
                    worker: worker_idx,
                    id: task.id,
                    bytes: entry.data,
                    render_time: started.elapsed(),
                    from_cache: true,
                });
                if !delivered {
                    break;
                }
                continue;
            }
        }

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| renderer.render_frame(&task)));
        let render_time = started.elapsed();

        let event = match outcome {
            Ok(Ok(bytes)) => {
                let bytes = Arc::new(bytes);
                if let Some(cache) = cache.as_deref() {
                    cache.store(
                        &task.cache_key(),
                        task.frame,
                        bytes.clone(),
                        FrameMetadata {
                            width: task.params.width,
                            height: task.params.height,
                            format: task.params.format,
                            quality: task.params.quality,
                            render_time_ms: render_time.as_secs_f64() * 1000.0,
                        },
                    );
                }
                PoolEvent::Completed {
                    worker: worker_idx,
                    id: task.id,
                    bytes,
                    render_time,
                    from_cache: false,
                }
            }
            Ok(Err(e)) => PoolEvent::Failed {
                worker: worker_idx,
                id: task.id,
                error: e.to_string(),
                render_time,
            },
            Err(_) => {
                // A panicked renderer may hold broken state; rebuild it.
                renderer = factory();
                PoolEvent::Failed {
                    worker: worker_idx,
                    id: task.id,
                    error: "renderer panicked during task execution".to_owned(),
                    render_time,
                }
            }
        };

        if !events.send(event) {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{FrameIndex, RenderParams};
    use crate::pool::task::TaskPriority;
    use crate::scene::snapshot::SceneSnapshot;

    struct NoopRenderer;

    impl FrameRenderer for NoopRenderer {
        fn render_frame(&mut self, task: &RenderTask) -> FrameloomResult<Vec<u8>> {
            Ok(vec![0u8; (task.params.width * 4) as usize])
        }
    }

    fn task(id: u64, priority: TaskPriority) -> RenderTask {
        RenderTask::new(
            TaskId(id),
            FrameIndex(id),
            SceneSnapshot::from_data(r#"{"objects":[]}"#, "composition"),
            RenderParams {
                width: 4,
                height: 4,
                ..RenderParams::default()
            },
            priority,
        )
    }

    #[test]
    fn config_validation_rejects_degenerate_pools() {
        assert!(
            RenderPoolConfig {
                workers: 0,
                ..RenderPoolConfig::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            RenderPoolConfig {
                max_queue_size: 0,
                ..RenderPoolConfig::default()
            }
            .validate()
            .is_err()
        );
        assert!(RenderPoolConfig::default().validate().is_ok());
    }

    #[test]
    fn pending_queue_orders_by_priority_then_fifo() {
        // Use a long debounce so nothing is dispatched while we inspect the
        // queue.
        let pool = RenderPool::new(
            RenderPoolConfig {
                workers: 1,
                idle_debounce: Duration::from_secs(60),
                ..RenderPoolConfig::default()
            },
            None,
            || Box::new(NoopRenderer),
        )
        .unwrap();

        assert!(pool.queue_task(task(1, TaskPriority::Low)));
        assert!(pool.queue_task(task(2, TaskPriority::High)));
        assert!(pool.queue_task(task(3, TaskPriority::Normal)));
        assert!(pool.queue_task(task(4, TaskPriority::High)));

        let order: Vec<u64> = pool.pending_tasks().iter().map(|t| t.id.0).collect();
        assert_eq!(order, vec![2, 4, 3, 1]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let pool = RenderPool::new(
            RenderPoolConfig {
                workers: 1,
                idle_debounce: Duration::from_secs(60),
                ..RenderPoolConfig::default()
            },
            None,
            || Box::new(NoopRenderer),
        )
        .unwrap();

        assert!(pool.queue_task(task(7, TaskPriority::Normal)));
        assert!(!pool.queue_task(task(7, TaskPriority::High)));
    }

    #[test]
    fn off_unregisters_callbacks() {
        let pool = RenderPool::new(
            RenderPoolConfig {
                workers: 1,
                ..RenderPoolConfig::default()
            },
            None,
            || Box::new(NoopRenderer),
        )
        .unwrap();

        let id = pool.on(TaskStatus::Completed, |_| {});
        assert!(pool.off(TaskStatus::Completed, id));
        assert!(!pool.off(TaskStatus::Completed, id));
        assert!(!pool.off(TaskStatus::Failed, id));
    }
}

//! Scheduler abstraction over tick-driven host runtimes.
//!
//! Host runtimes differ in how they partition execution: some run one global
//! tick thread, others tick independent regions on their own threads. Every
//! other component routes slot mutations through a [`Scheduler`] rather than
//! assuming a single global thread; the host selects one implementation at
//! startup.
//!
//! Two implementations are provided:
//!
//! - [`TickScheduler`] for single-tick-thread hosts. The host calls
//!   [`TickScheduler::tick`] once per tick from its main thread.
//! - [`RegionScheduler`] for partitioned hosts. The host calls
//!   [`RegionScheduler::tick`] from each region's own thread with that
//!   region's [`ContextKey`].
//!
//! Delays are measured in host ticks, not wall-clock time; the schedulers
//! only advance when the host ticks them. Work that must not block a tick
//! context goes through [`Scheduler::run_async`], which executes on a small
//! worker pool; results are delivered back via a context-bound task, never by
//! blocking.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use slotmap::{new_key_type, SlotMap};

/// Identifies a viewer (one connected user) in the host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewerId(u64);

impl ViewerId {
    /// Wrap a host-assigned viewer id.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw host id.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Identifies a region in a partitioned host runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);

impl RegionId {
    /// Wrap a host-assigned region id.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The raw host id.
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// The execution context that may legally mutate state for an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// The single global tick thread.
    Global,
    /// One region's tick thread in a partitioned host.
    Region(RegionId),
}

/// A one-shot unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A repeating unit of work.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Cancellable handle to a submitted task.
///
/// Cancelling after the task has started has no effect on the in-flight
/// execution, but prevents any future repeats. Cancellation is idempotent.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Prevent the task from (re-)executing.
    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    /// Whether the handle has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

/// Uniform interface for running work on the correct execution context.
///
/// Guarantee: a task submitted via the context-bound variants executes only
/// on the thread(s) legally permitted to mutate state associated with that
/// context in the underlying host. Tasks submitted to the same context run in
/// submission order.
pub trait Scheduler: Send + Sync {
    /// Run `task` on the context's next tick.
    fn run_on_context(&self, ctx: ContextKey, task: Task) -> TaskHandle;

    /// Run `task` on the context after `delay_ticks` ticks.
    fn run_delayed(&self, ctx: ContextKey, delay_ticks: u64, task: Task) -> TaskHandle;

    /// Run `task` on the context after `initial_delay` ticks, then every
    /// `period_ticks` ticks.
    fn run_repeating(
        &self,
        ctx: ContextKey,
        initial_delay: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> TaskHandle;

    /// Run `task` off the tick threads, on the async worker pool.
    fn run_async(&self, task: Task) -> TaskHandle;
}

new_key_type! {
    /// A unique identifier for a tick-scheduled task.
    pub struct ScheduledTaskId;
}

/// An immediate task waiting in a context queue.
struct QueuedTask {
    cancelled: Arc<AtomicBool>,
    task: Task,
}

enum TimedWork {
    Once(Option<Task>),
    Repeating(RepeatingTask),
}

struct TimedTaskData {
    due_tick: u64,
    period: u64,
    cancelled: Arc<AtomicBool>,
    work: TimedWork,
}

/// An entry in the timed queue (min-heap by due tick).
#[derive(Debug, Clone, Copy)]
struct TimedQueueEntry {
    id: ScheduledTaskId,
    due_tick: u64,
}

impl PartialEq for TimedQueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due_tick == other.due_tick
    }
}

impl Eq for TimedQueueEntry {}

impl PartialOrd for TimedQueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedQueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse order for min-heap (BinaryHeap is max-heap by default).
        other.due_tick.cmp(&self.due_tick)
    }
}

/// Per-context task state: an immediate FIFO queue plus a timed heap.
struct ContextQueue {
    sender: Sender<QueuedTask>,
    receiver: Receiver<QueuedTask>,
    timed: Mutex<TimedTasks>,
}

struct TimedTasks {
    current_tick: u64,
    tasks: SlotMap<ScheduledTaskId, TimedTaskData>,
    queue: BinaryHeap<TimedQueueEntry>,
}

impl ContextQueue {
    fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            sender,
            receiver,
            timed: Mutex::new(TimedTasks {
                current_tick: 0,
                tasks: SlotMap::with_key(),
                queue: BinaryHeap::new(),
            }),
        }
    }

    fn submit(&self, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let queued = QueuedTask {
            cancelled: handle.cancelled.clone(),
            task,
        };
        // Unbounded channel; send only fails if the receiver is gone, which
        // cannot happen while the queue itself is alive.
        let _ = self.sender.send(queued);
        handle
    }

    fn submit_timed(&self, delay: u64, period: Option<u64>, work: TimedWork) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut timed = self.timed.lock();
        let due_tick = timed.current_tick + delay.max(1);
        let id = timed.tasks.insert(TimedTaskData {
            due_tick,
            period: period.unwrap_or(0),
            cancelled: handle.cancelled.clone(),
            work,
        });
        timed.queue.push(TimedQueueEntry { id, due_tick });
        handle
    }

    /// Advance this context by one tick, running all due work.
    ///
    /// Returns the number of tasks executed.
    fn tick(&self) -> usize {
        let mut executed = 0;

        // Drain only the tasks present at tick start; tasks submitted by
        // running tasks execute next tick, preserving per-session ordering.
        let pending = self.receiver.len();
        for _ in 0..pending {
            let Ok(queued) = self.receiver.try_recv() else {
                break;
            };
            if queued.cancelled.load(AtomicOrdering::SeqCst) {
                continue;
            }
            (queued.task)();
            executed += 1;
        }

        executed += self.run_due_timed();
        executed
    }

    fn run_due_timed(&self) -> usize {
        let now = {
            let mut timed = self.timed.lock();
            timed.current_tick += 1;
            timed.current_tick
        };

        let mut executed = 0;
        loop {
            // Take one due task out while holding the lock, run it without,
            // so the task itself may submit or cancel scheduled work.
            let mut data = {
                let mut timed = self.timed.lock();
                let due = loop {
                    match timed.queue.peek() {
                        Some(entry) if entry.due_tick <= now => {
                            let entry = timed.queue.pop().expect("peeked entry");
                            // Stale entries (rescheduled or removed) are skipped.
                            match timed.tasks.get(entry.id) {
                                Some(task) if task.due_tick == entry.due_tick => {
                                    break Some(entry.id)
                                }
                                _ => continue,
                            }
                        }
                        _ => break None,
                    }
                };

                match due {
                    Some(id) => timed.tasks.remove(id).expect("due task exists"),
                    None => return executed,
                }
            };

            if data.cancelled.load(AtomicOrdering::SeqCst) {
                continue;
            }

            match &mut data.work {
                TimedWork::Once(task) => {
                    if let Some(task) = task.take() {
                        task();
                        executed += 1;
                    }
                }
                TimedWork::Repeating(task) => {
                    task();
                    executed += 1;
                    // Re-arm unless it was cancelled mid-run.
                    if !data.cancelled.load(AtomicOrdering::SeqCst) && data.period > 0 {
                        let mut timed = self.timed.lock();
                        let due_tick = now + data.period;
                        data.due_tick = due_tick;
                        let id = timed.tasks.insert(data);
                        timed.queue.push(TimedQueueEntry { id, due_tick });
                    }
                }
            }
        }
    }
}

/// Scheduler for hosts with a single global tick thread.
///
/// Every [`ContextKey`] maps to the same queue: on this host model the global
/// thread is the legal mutation context for everything.
pub struct TickScheduler {
    queue: ContextQueue,
    pool: AsyncPool,
}

impl TickScheduler {
    /// Create a scheduler with the default async pool size.
    pub fn new() -> Self {
        Self::with_async_workers(2)
    }

    /// Create a scheduler with `workers` async pool threads.
    pub fn with_async_workers(workers: usize) -> Self {
        Self {
            queue: ContextQueue::new(),
            pool: AsyncPool::new(workers),
        }
    }

    /// Advance one host tick, draining queued work. Must be called from the
    /// host's main tick thread.
    ///
    /// Returns the number of tasks executed.
    pub fn tick(&self) -> usize {
        let executed = self.queue.tick();
        if executed > 0 {
            tracing::trace!(target: crate::logging::targets::SCHEDULER, executed, "tick drained");
        }
        executed
    }
}

impl Default for TickScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TickScheduler {
    fn run_on_context(&self, _ctx: ContextKey, task: Task) -> TaskHandle {
        self.queue.submit(task)
    }

    fn run_delayed(&self, _ctx: ContextKey, delay_ticks: u64, task: Task) -> TaskHandle {
        self.queue
            .submit_timed(delay_ticks, None, TimedWork::Once(Some(task)))
    }

    fn run_repeating(
        &self,
        _ctx: ContextKey,
        initial_delay: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> TaskHandle {
        self.queue.submit_timed(
            initial_delay,
            Some(period_ticks.max(1)),
            TimedWork::Repeating(task),
        )
    }

    fn run_async(&self, task: Task) -> TaskHandle {
        self.pool.submit(task)
    }
}

/// Scheduler for hosts that tick regions on independent threads.
///
/// Each [`ContextKey`] owns its own queue; the host calls [`tick`] for a
/// region from that region's thread only.
///
/// [`tick`]: RegionScheduler::tick
pub struct RegionScheduler {
    queues: Mutex<HashMap<ContextKey, Arc<ContextQueue>>>,
    pool: AsyncPool,
}

impl RegionScheduler {
    /// Create a scheduler with the default async pool size.
    pub fn new() -> Self {
        Self::with_async_workers(2)
    }

    /// Create a scheduler with `workers` async pool threads.
    pub fn with_async_workers(workers: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            pool: AsyncPool::new(workers),
        }
    }

    fn queue(&self, ctx: ContextKey) -> Arc<ContextQueue> {
        self.queues
            .lock()
            .entry(ctx)
            .or_insert_with(|| Arc::new(ContextQueue::new()))
            .clone()
    }

    /// Drop the queue for a departed region, discarding any tasks still
    /// scheduled on it. Work submitted for the context afterwards lands in a
    /// fresh queue.
    pub fn remove_region(&self, ctx: ContextKey) {
        if self.queues.lock().remove(&ctx).is_some() {
            tracing::debug!(target: crate::logging::targets::SCHEDULER, ?ctx, "region queue dropped");
        }
    }

    /// Advance one tick for `ctx`. Must be called from the thread that ticks
    /// that region in the host.
    ///
    /// Returns the number of tasks executed.
    pub fn tick(&self, ctx: ContextKey) -> usize {
        let queue = self.queue(ctx);
        let executed = queue.tick();
        if executed > 0 {
            tracing::trace!(target: crate::logging::targets::SCHEDULER, ?ctx, executed, "region tick drained");
        }
        executed
    }
}

impl Default for RegionScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RegionScheduler {
    fn run_on_context(&self, ctx: ContextKey, task: Task) -> TaskHandle {
        self.queue(ctx).submit(task)
    }

    fn run_delayed(&self, ctx: ContextKey, delay_ticks: u64, task: Task) -> TaskHandle {
        self.queue(ctx)
            .submit_timed(delay_ticks, None, TimedWork::Once(Some(task)))
    }

    fn run_repeating(
        &self,
        ctx: ContextKey,
        initial_delay: u64,
        period_ticks: u64,
        task: RepeatingTask,
    ) -> TaskHandle {
        self.queue(ctx).submit_timed(
            initial_delay,
            Some(period_ticks.max(1)),
            TimedWork::Repeating(task),
        )
    }

    fn run_async(&self, task: Task) -> TaskHandle {
        self.pool.submit(task)
    }
}

/// Fixed-size worker pool for off-tick work.
struct AsyncPool {
    sender: Sender<QueuedTask>,
}

impl AsyncPool {
    fn new(workers: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<QueuedTask>();
        for index in 0..workers.max(1) {
            let receiver = receiver.clone();
            std::thread::Builder::new()
                .name(format!("slotframe-async-{index}"))
                .spawn(move || {
                    while let Ok(queued) = receiver.recv() {
                        if queued.cancelled.load(AtomicOrdering::SeqCst) {
                            continue;
                        }
                        (queued.task)();
                    }
                })
                .expect("spawn async worker");
        }
        Self { sender }
    }

    fn submit(&self, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let _ = self.sender.send(QueuedTask {
            cancelled: handle.cancelled.clone(),
            task,
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn immediate_tasks_run_on_next_tick_in_order() {
        let scheduler = TickScheduler::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            scheduler.run_on_context(
                ContextKey::Global,
                Box::new(move || order.lock().push(n)),
            );
        }

        assert!(order.lock().is_empty());
        scheduler.tick();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn task_submitted_during_tick_runs_next_tick() {
        let scheduler = Arc::new(TickScheduler::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_ran = ran.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.run_on_context(
            ContextKey::Global,
            Box::new(move || {
                let ran = inner_ran.clone();
                inner_scheduler.run_on_context(
                    ContextKey::Global,
                    Box::new(move || {
                        ran.fetch_add(1, AtomicOrdering::SeqCst);
                    }),
                );
            }),
        );

        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn cancelled_task_does_not_run() {
        let scheduler = TickScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        let handle = scheduler.run_on_context(
            ContextKey::Global,
            Box::new(move || {
                ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        handle.cancel();
        handle.cancel(); // idempotent

        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
    }

    #[test]
    fn delayed_task_fires_after_delay_ticks() {
        let scheduler = TickScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        scheduler.run_delayed(
            ContextKey::Global,
            3,
            Box::new(move || {
                ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        scheduler.tick();
        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);
        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn repeating_task_fires_each_period_until_cancelled() {
        let scheduler = TickScheduler::new();
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        let handle = scheduler.run_repeating(
            ContextKey::Global,
            1,
            2,
            Box::new(move || {
                ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );

        scheduler.tick(); // fires (initial delay 1)
        scheduler.tick();
        scheduler.tick(); // fires (period 2)
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 2);

        handle.cancel();
        scheduler.tick();
        scheduler.tick();
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 2);
    }

    #[test]
    fn region_queues_are_independent() {
        let scheduler = RegionScheduler::new();
        let a = ContextKey::Region(RegionId::new(1));
        let b = ContextKey::Region(RegionId::new(2));
        let ran = Arc::new(Mutex::new(Vec::new()));

        let ran_a = ran.clone();
        scheduler.run_on_context(a, Box::new(move || ran_a.lock().push("a")));
        let ran_b = ran.clone();
        scheduler.run_on_context(b, Box::new(move || ran_b.lock().push("b")));

        scheduler.tick(b);
        assert_eq!(*ran.lock(), vec!["b"]);
        scheduler.tick(a);
        assert_eq!(*ran.lock(), vec!["b", "a"]);
    }

    #[test]
    fn removed_region_discards_its_queue() {
        let scheduler = RegionScheduler::new();
        let region = ContextKey::Region(RegionId::new(9));
        let ran = Arc::new(AtomicUsize::new(0));

        let ran_clone = ran.clone();
        scheduler.run_on_context(
            region,
            Box::new(move || {
                ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        scheduler.remove_region(region);

        // The old queue and its task are gone; ticking starts fresh.
        assert_eq!(scheduler.tick(region), 0);
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 0);

        // Removing an absent region is a no-op.
        scheduler.remove_region(region);

        let ran_clone = ran.clone();
        scheduler.run_on_context(
            region,
            Box::new(move || {
                ran_clone.fetch_add(1, AtomicOrdering::SeqCst);
            }),
        );
        scheduler.tick(region);
        assert_eq!(ran.load(AtomicOrdering::SeqCst), 1);
    }

    #[test]
    fn async_tasks_run_off_the_tick_thread() {
        let scheduler = TickScheduler::new();
        let (tx, rx) = crossbeam_channel::bounded(1);

        let tick_thread = std::thread::current().id();
        scheduler.run_async(Box::new(move || {
            let _ = tx.send(std::thread::current().id() != tick_thread);
        }));

        let off_thread = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("async task ran");
        assert!(off_thread);
    }
}

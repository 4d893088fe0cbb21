//! Deferred work and timers.
//!
//! Callbacks that arrive in interrupt-like context post a [`WorkItem`] and
//! return. A single worker (a named thread, or the caller of
//! [`drain`] in tests) takes the sleep-capable control lock and runs the
//! item. The same worker fires the cancellable timers, so a timer never
//! races the state it touches.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};

use crate::dispatcher::Opcode;
use crate::sync::CriticalSectionCell;

/// Work posted from interrupt-like context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WorkItem {
    /// A firmware message is parked in the dispatcher slot
    Opcode(Opcode),
    /// Deferred resource grant notification
    ResourceGranted,
    /// Deferred resource release notification
    ResourceReleased,
    /// Send everything parked in the suspend queue
    PmFlush,
    /// Stop the worker thread
    Shutdown,
}

/// Timer kinds owned by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerKind {
    /// Drop the wake lock if no request arrived since `epoch`
    WakeLockRelease {
        /// Resource epoch when the timer was armed
        epoch: u64,
    },
    /// Request a bandwidth calibration sample
    BandwidthProbe,
}

impl TimerKind {
    fn same_kind(&self, other: &TimerKind) -> bool {
        core::mem::discriminant(self) == core::mem::discriminant(other)
    }
}

/// Armed timers, at most one per kind
#[derive(Debug, Default)]
pub struct TimerSet {
    armed: CriticalSectionCell<Vec<(Instant, TimerKind)>>,
}

impl TimerSet {
    /// Create an empty timer set
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire after `delay`, replacing an armed timer of the
    /// same kind
    pub fn arm(&self, kind: TimerKind, delay: Duration) {
        let deadline = Instant::now() + delay;
        self.armed.with(|armed| {
            armed.retain(|(_, k)| !k.same_kind(&kind));
            armed.push((deadline, kind));
        });
    }

    /// Cancel an armed timer of the same kind as `kind`.
    ///
    /// Returns `true` if one was armed.
    pub fn cancel(&self, kind: TimerKind) -> bool {
        self.armed.with(|armed| {
            let before = armed.len();
            armed.retain(|(_, k)| !k.same_kind(&kind));
            armed.len() != before
        })
    }

    /// Cancel every timer
    pub fn clear(&self) {
        self.armed.with(Vec::clear);
    }

    /// Whether a timer of the same kind as `kind` is armed
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed
            .with_ref(|armed| armed.iter().any(|(_, k)| k.same_kind(&kind)))
    }

    /// Remove and return timers due at `now`, earliest first
    pub fn take_due(&self, now: Instant) -> Vec<TimerKind> {
        self.armed.with(|armed| {
            let mut due: Vec<(Instant, TimerKind)> = Vec::new();
            armed.retain(|entry| {
                if entry.0 <= now {
                    due.push(*entry);
                    false
                } else {
                    true
                }
            });
            due.sort_by_key(|(deadline, _)| *deadline);
            due.into_iter().map(|(_, kind)| kind).collect()
        })
    }

    /// Time until the earliest armed timer
    pub fn next_due_in(&self, now: Instant) -> Option<Duration> {
        self.armed.with_ref(|armed| {
            armed
                .iter()
                .map(|(deadline, _)| deadline.saturating_duration_since(now))
                .min()
        })
    }
}

/// Something the worker runs items and timers against
pub trait WorkHandler: Send + Sync + 'static {
    /// Run one work item
    fn handle(&self, item: WorkItem);

    /// Run one expired timer
    fn fire(&self, timer: TimerKind);

    /// Timers this handler owns
    fn timers(&self) -> &TimerSet;
}

/// Channel carrying work from callbacks to the worker
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<WorkItem>,
    rx: Receiver<WorkItem>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Post an item; never blocks
    pub fn post(&self, item: WorkItem) -> bool {
        self.tx.send(item).is_ok()
    }

    /// Queued item count
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Receiving side
    pub fn receiver(&self) -> Receiver<WorkItem> {
        self.rx.clone()
    }
}

/// Run queued items and due timers on the calling thread.
///
/// Returns the number of items and timers run. `Shutdown` items are
/// discarded.
pub fn drain<H: WorkHandler + ?Sized>(handler: &H, queue: &WorkQueue) -> usize {
    let mut ran = 0;
    loop {
        let mut progressed = false;
        while let Ok(item) = queue.rx.try_recv() {
            progressed = true;
            if item != WorkItem::Shutdown {
                handler.handle(item);
                ran += 1;
            }
        }
        for timer in handler.timers().take_due(Instant::now()) {
            progressed = true;
            handler.fire(timer);
            ran += 1;
        }
        if !progressed {
            return ran;
        }
    }
}

/// Handle to a running worker thread
#[derive(Debug)]
pub struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    tx: Sender<WorkItem>,
}

impl WorkerHandle {
    /// Spawn a named worker running `handler` against `queue`.
    ///
    /// The worker wakes at least every `idle_tick` to check timers.
    pub fn spawn<H: WorkHandler>(
        name: &str,
        handler: std::sync::Arc<H>,
        queue: &WorkQueue,
        idle_tick: Duration,
    ) -> std::io::Result<Self> {
        let rx = queue.receiver();
        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(&*handler, &rx, idle_tick))?;
        log::debug!(target: "wlan_offload", "worker {name} started");
        Ok(Self {
            thread: Some(thread),
            tx: queue.tx.clone(),
        })
    }

    /// Whether the thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the worker and wait for it to exit
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.tx.send(WorkItem::Shutdown);
        if thread.join().is_err() {
            log::error!(target: "wlan_offload", "worker panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<H: WorkHandler + ?Sized>(handler: &H, rx: &Receiver<WorkItem>, idle_tick: Duration) {
    loop {
        let wait = handler
            .timers()
            .next_due_in(Instant::now())
            .map_or(idle_tick, |due| due.min(idle_tick));
        match rx.recv_timeout(wait) {
            Ok(WorkItem::Shutdown) => break,
            Ok(item) => handler.handle(item),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        for timer in handler.timers().take_due(Instant::now()) {
            handler.fire(timer);
        }
    }
    log::debug!(target: "wlan_offload", "worker stopped");
}

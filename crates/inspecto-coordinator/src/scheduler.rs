use inspecto_types::record::ContentId;
use parking_lot::Mutex;

/// Deferred look at the outcome of one refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshCheck {
    pub target: ContentId,
    /// Identifies the request that scheduled this check; a newer request
    /// makes older checks stale.
    pub generation: u64,
}

/// Update-context task queue counted in logic ticks.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, after_ticks: u32, check: RefreshCheck);
    /// Moves one tick forward and returns the checks that became due, oldest
    /// first.
    fn advance(&self) -> Vec<RefreshCheck>;
}

#[derive(Debug, Default)]
struct Queue {
    tick: u64,
    pending: Vec<(u64, RefreshCheck)>,
}

#[derive(Debug, Default)]
pub struct TickScheduler {
    queue: Mutex<Queue>,
}

impl TickScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_tick(&self) -> u64 {
        self.queue.lock().tick
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().pending.len()
    }
}

impl Scheduler for TickScheduler {
    fn schedule(&self, after_ticks: u32, check: RefreshCheck) {
        let mut queue = self.queue.lock();
        let due = queue.tick + u64::from(after_ticks.max(1));
        queue.pending.push((due, check));
    }

    fn advance(&self) -> Vec<RefreshCheck> {
        let mut queue = self.queue.lock();
        queue.tick += 1;
        let now = queue.tick;
        let (due, waiting): (Vec<_>, Vec<_>) =
            queue.pending.drain(..).partition(|(at, _)| *at <= now);
        queue.pending = waiting;
        due.into_iter().map(|(_, check)| check).collect()
    }
}

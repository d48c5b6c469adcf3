//! Request/response bridge between the update context and the render hook.

pub mod scheduler;

use std::sync::Arc;

use inspecto_capture::{CaptureBackend, RenderHook};
use inspecto_types::{pixels::PixelBuffer, record::ContentId};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

pub use scheduler::{RefreshCheck, Scheduler, TickScheduler};

/// Something that can start a portrait refresh for a record.
pub trait RefreshRequester: Send + Sync {
    fn request_refresh(&self, target: ContentId);
}

/// Receiver of finished refreshes.
pub trait RefreshSink {
    fn apply_refresh(&self, target: ContentId, buffer: PixelBuffer);
}

/// What a deferred check concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A non-empty capture went to the sink.
    Delivered(ContentId),
    /// A newer request replaced this one before the check ran.
    Superseded(ContentId),
    /// The render context had not captured yet; the attempt was dropped.
    StillArmed(ContentId),
    /// The capture came back empty; the attempt was dropped.
    Unavailable(ContentId),
}

impl RefreshOutcome {
    pub fn target(self) -> ContentId {
        match self {
            RefreshOutcome::Delivered(target)
            | RefreshOutcome::Superseded(target)
            | RefreshOutcome::StillArmed(target)
            | RefreshOutcome::Unavailable(target) => target,
        }
    }
}

#[derive(Debug, Default)]
struct InFlight {
    next_generation: u64,
    current: Option<RefreshCheck>,
}

pub struct CaptureCoordinator<B: CaptureBackend, S: Scheduler = TickScheduler> {
    hook: Arc<RenderHook<B>>,
    scheduler: S,
    check_delay_ticks: u32,
    in_flight: Mutex<InFlight>,
}

impl<B: CaptureBackend, S: Scheduler> CaptureCoordinator<B, S> {
    pub fn new(hook: Arc<RenderHook<B>>, scheduler: S, check_delay_ticks: u32) -> Self {
        Self {
            hook,
            scheduler,
            check_delay_ticks,
            in_flight: Mutex::new(InFlight::default()),
        }
    }

    pub fn hook(&self) -> &Arc<RenderHook<B>> {
        &self.hook
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Record currently waiting for a new portrait, if any.
    pub fn in_flight(&self) -> Option<ContentId> {
        self.in_flight.lock().current.map(|check| check.target)
    }

    /// Arms a capture for `target` and schedules the deferred check.
    ///
    /// Replaces any refresh still in flight.
    pub fn request_refresh(&self, target: ContentId) {
        let check = {
            let mut in_flight = self.in_flight.lock();
            in_flight.next_generation += 1;
            let check = RefreshCheck {
                target,
                generation: in_flight.next_generation,
            };
            if let Some(previous) = in_flight.current.replace(check) {
                debug!(
                    "Refresh for {} superseded by refresh for {target}",
                    previous.target
                );
            }
            check
        };
        self.hook.request_capture();
        self.scheduler.schedule(self.check_delay_ticks, check);
        debug!(
            "Portrait refresh requested for {target}, checking in {} ticks",
            self.check_delay_ticks
        );
    }

    /// One update-context tick: runs every check that became due.
    pub fn tick(&self, sink: &dyn RefreshSink) -> Vec<RefreshOutcome> {
        self.scheduler
            .advance()
            .into_iter()
            .map(|check| self.run_check(check, sink))
            .collect()
    }

    fn run_check(&self, check: RefreshCheck, sink: &dyn RefreshSink) -> RefreshOutcome {
        let target = check.target;
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.current != Some(check) {
                debug!("Dropping superseded refresh check for {target}");
                return RefreshOutcome::Superseded(target);
            }
            in_flight.current = None;
        }

        if self.hook.is_armed() {
            warn!("Portrait for {target} was not captured in time, abandoning refresh");
            return RefreshOutcome::StillArmed(target);
        }

        match self.hook.take_published() {
            Some(buffer) if !buffer.is_empty() => {
                info!(
                    "Refreshed portrait for {target} ({}x{})",
                    buffer.width(),
                    buffer.height()
                );
                sink.apply_refresh(target, buffer);
                RefreshOutcome::Delivered(target)
            }
            _ => {
                info!("No portrait available for {target}, keeping current image");
                RefreshOutcome::Unavailable(target)
            }
        }
    }
}

impl<B, S> RefreshRequester for CaptureCoordinator<B, S>
where
    B: CaptureBackend,
    S: Scheduler,
{
    fn request_refresh(&self, target: ContentId) {
        CaptureCoordinator::request_refresh(self, target);
    }
}

#[cfg(test)]
mod tests {
    use inspecto_capture::{HookSettings, PixelFormat, SoftwareGpu};

    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<(ContentId, PixelBuffer)>>,
    }

    impl RefreshSink for RecordingSink {
        fn apply_refresh(&self, target: ContentId, buffer: PixelBuffer) {
            self.applied.lock().push((target, buffer));
        }
    }

    fn coordinator(gpu: SoftwareGpu) -> CaptureCoordinator<SoftwareGpu> {
        let hook = Arc::new(RenderHook::new(gpu, HookSettings::default()));
        CaptureCoordinator::new(hook, TickScheduler::new(), 5)
    }

    fn ready_gpu() -> SoftwareGpu {
        let gpu = SoftwareGpu::new();
        gpu.install_target(1, 2, 2, PixelFormat::Bgra8Unorm);
        gpu.draw(1, vec![0x55; 16]).expect("draw");
        gpu
    }

    fn render_frames(coordinator: &CaptureCoordinator<SoftwareGpu>, frames: usize) {
        for _ in 0..frames {
            coordinator.hook().process_commands(|| ());
        }
    }

    #[test]
    fn capture_is_delivered_after_check_delay() {
        let coordinator = coordinator(ready_gpu());
        let sink = RecordingSink::default();
        let target = ContentId(42);

        coordinator.request_refresh(target);
        assert_eq!(coordinator.in_flight(), Some(target));
        render_frames(&coordinator, 3);

        for _ in 0..4 {
            assert!(coordinator.tick(&sink).is_empty());
        }
        assert_eq!(
            coordinator.tick(&sink),
            vec![RefreshOutcome::Delivered(target)]
        );
        let applied = sink.applied.lock();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, target);
        assert_eq!(applied[0].1.data(), &[0x55; 16]);
        assert_eq!(coordinator.in_flight(), None);
    }

    #[test]
    fn check_while_armed_abandons_without_retry() {
        let coordinator = coordinator(ready_gpu());
        let sink = RecordingSink::default();

        coordinator.request_refresh(ContentId(7));
        render_frames(&coordinator, 1);
        let outcomes: Vec<_> = (0..5).flat_map(|_| coordinator.tick(&sink)).collect();

        assert_eq!(outcomes, vec![RefreshOutcome::StillArmed(ContentId(7))]);
        assert!(sink.applied.lock().is_empty());
        assert_eq!(coordinator.in_flight(), None);
        assert_eq!(coordinator.scheduler().pending(), 0);
        assert!(coordinator.hook().is_armed());
    }

    #[test]
    fn empty_capture_is_not_delivered() {
        let gpu = SoftwareGpu::new();
        gpu.install_null_target(1);
        let coordinator = coordinator(gpu);
        let sink = RecordingSink::default();

        coordinator.request_refresh(ContentId(3));
        render_frames(&coordinator, 3);
        let outcomes: Vec<_> = (0..5).flat_map(|_| coordinator.tick(&sink)).collect();

        assert_eq!(outcomes, vec![RefreshOutcome::Unavailable(ContentId(3))]);
        assert!(sink.applied.lock().is_empty());
        assert!(coordinator.hook().take_published().is_none());
    }

    #[test]
    fn newer_request_supersedes_older_one() {
        let coordinator = coordinator(ready_gpu());
        let sink = RecordingSink::default();

        coordinator.request_refresh(ContentId(1));
        coordinator.tick(&sink);
        coordinator.tick(&sink);
        coordinator.request_refresh(ContentId(2));
        assert_eq!(coordinator.in_flight(), Some(ContentId(2)));
        render_frames(&coordinator, 3);

        let outcomes: Vec<_> = (0..5).flat_map(|_| coordinator.tick(&sink)).collect();
        assert_eq!(
            outcomes,
            vec![
                RefreshOutcome::Superseded(ContentId(1)),
                RefreshOutcome::Delivered(ContentId(2)),
            ]
        );
        let applied = sink.applied.lock();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].0, ContentId(2));
    }

    #[test]
    fn requester_trait_forwards_to_coordinator() {
        let coordinator = coordinator(ready_gpu());
        let requester: &dyn RefreshRequester = &coordinator;
        requester.request_refresh(ContentId(11));
        assert_eq!(coordinator.in_flight(), Some(ContentId(11)));
        assert!(coordinator.hook().is_armed());
    }
}

//! Examine-window lifecycle wired to the record store and the capture path.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use inspecto_capture::{CaptureBackend, HookSettings, RenderHook};
use inspecto_coordinator::{CaptureCoordinator, RefreshOutcome, Scheduler, TickScheduler};
use inspecto_store::InspectRecordStore;
use inspecto_types::{
    clock::Clock,
    config::InspectoConfig,
    record::{CharacterSnapshot, ContentId, EntityId, HistoryOrder, InspectRecord},
};
use parking_lot::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct ExamineState {
    processed: bool,
    refresh_due: Option<(DateTime<Utc>, EntityId)>,
}

pub struct InspectSession<B: CaptureBackend, S: Scheduler = TickScheduler> {
    store: Arc<InspectRecordStore>,
    coordinator: Arc<CaptureCoordinator<B, S>>,
    clock: Arc<dyn Clock>,
    refresh_delay: Duration,
    examine: Mutex<ExamineState>,
}

impl<B, S> InspectSession<B, S>
where
    B: CaptureBackend + 'static,
    S: Scheduler + 'static,
{
    pub fn new(
        coordinator: Arc<CaptureCoordinator<B, S>>,
        clock: Arc<dyn Clock>,
        refresh_delay: std::time::Duration,
    ) -> Self {
        let store = Arc::new(InspectRecordStore::new(
            Arc::clone(&clock),
            coordinator.clone(),
        ));
        let refresh_delay =
            Duration::milliseconds(i64::try_from(refresh_delay.as_millis()).unwrap_or(i64::MAX));
        Self {
            store,
            coordinator,
            clock,
            refresh_delay,
            examine: Mutex::new(ExamineState::default()),
        }
    }

    /// Builds the hook, coordinator and store for `backend` from configuration.
    pub fn from_config(
        backend: B,
        scheduler: S,
        clock: Arc<dyn Clock>,
        config: &InspectoConfig,
    ) -> Self {
        let hook = Arc::new(RenderHook::new(
            backend,
            HookSettings::from(&config.capture),
        ));
        let coordinator = Arc::new(CaptureCoordinator::new(
            hook,
            scheduler,
            config.refresh.check_delay_ticks,
        ));
        Self::new(coordinator, clock, config.refresh.image_refresh_delay())
    }

    pub fn store(&self) -> &Arc<InspectRecordStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<CaptureCoordinator<B, S>> {
        &self.coordinator
    }

    pub fn hook(&self) -> &Arc<RenderHook<B>> {
        self.coordinator.hook()
    }

    /// Records a freshly examined character and starts the refresh timer.
    ///
    /// Returns `false` when the window was already handled since it last
    /// closed.
    pub fn on_examine_opened(&self, snapshot: CharacterSnapshot) -> bool {
        let mut examine = self.examine.lock();
        if examine.processed {
            debug!("Examine window for {} already processed", snapshot.content_id);
            return false;
        }
        examine.processed = true;

        let now = self.clock.now();
        let entity = snapshot.capture_target;
        let record = InspectRecord::from_snapshot(snapshot, now);
        info!("Examined {} ({})", record.name, record.key);
        self.store.upsert(record);
        examine.refresh_due = Some((now + self.refresh_delay, entity));
        true
    }

    /// Starts the portrait refresh once the timer has elapsed.
    pub fn on_examine_repainted(&self) -> Option<ContentId> {
        let entity = {
            let mut examine = self.examine.lock();
            match examine.refresh_due {
                Some((due, entity)) if self.clock.now() >= due => {
                    examine.refresh_due = None;
                    entity
                }
                _ => return None,
            }
        };
        self.store.begin_refresh(entity)
    }

    pub fn on_examine_closed(&self) {
        let mut examine = self.examine.lock();
        if examine.refresh_due.take().is_some() {
            debug!("Examine window closed before the portrait refresh");
        }
        examine.processed = false;
    }

    /// One update-context tick.
    pub fn tick(&self) -> Vec<RefreshOutcome> {
        self.coordinator.tick(self.store.as_ref())
    }

    pub fn history(&self, order: HistoryOrder) -> Vec<InspectRecord> {
        let mut records = self.store.snapshot();
        order.sort(&mut records);
        records
    }
}

#[cfg(test)]
mod tests {
    use inspecto_capture::{PixelFormat, SoftwareGpu};
    use inspecto_types::{
        clock::ManualClock,
        gear::GearSlots,
        pixels::{ChannelOrder, PixelBuffer},
    };

    use super::*;

    const SLOT: u32 = 1;

    struct Harness {
        session: InspectSession<SoftwareGpu>,
        clock: Arc<ManualClock>,
    }

    impl Harness {
        fn new() -> Self {
            let gpu = SoftwareGpu::new();
            gpu.install_target(SLOT, 2, 2, PixelFormat::Bgra8Unorm);
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let session = InspectSession::from_config(
                gpu,
                TickScheduler::new(),
                clock.clone(),
                &InspectoConfig::default(),
            );
            Self { session, clock }
        }

        fn draw(&self, fill: u8) {
            self.session
                .hook()
                .backend()
                .draw(SLOT, vec![fill; 16])
                .expect("draw");
        }

        fn frames(&self, count: usize) {
            let hook = self.session.hook();
            for _ in 0..count {
                hook.process_commands(|| hook.backend().end_frame());
            }
        }

        fn ticks(&self, count: usize) -> Vec<RefreshOutcome> {
            (0..count).flat_map(|_| self.session.tick()).collect()
        }
    }

    fn snapshot(id: u64, entity: u32) -> CharacterSnapshot {
        CharacterSnapshot {
            content_id: ContentId(id),
            capture_target: EntityId(entity),
            name: "Alphinaud Leveilleur".into(),
            world_id: 33,
            level: 100,
            job_id: 28,
            sex: 0,
            title_id: 7,
            average_item_level: 700,
            gear: GearSlots::from_container(|slot| if slot == 0 { 1_043_001 } else { 0 }),
            comment: b"hello".to_vec(),
        }
    }

    #[test]
    fn examine_then_refresh_delivers_portrait() {
        let harness = Harness::new();
        harness.draw(0x7F);

        assert!(harness.session.on_examine_opened(snapshot(42, 0x1001)));
        let stored = harness.session.store().get(ContentId(42)).expect("record");
        assert!(stored.image.is_empty());
        assert_eq!(stored.pending_entity, Some(EntityId(0x1001)));

        assert_eq!(harness.session.on_examine_repainted(), None);
        harness.clock.advance(Duration::milliseconds(500));
        assert_eq!(harness.session.on_examine_repainted(), Some(ContentId(42)));
        assert_eq!(harness.session.on_examine_repainted(), None);

        harness.frames(3);
        assert_eq!(
            harness.ticks(5),
            vec![RefreshOutcome::Delivered(ContentId(42))]
        );

        let stored = harness.session.store().get(ContentId(42)).expect("record");
        assert_eq!(stored.image.data(), &[0x7F; 16]);
        assert_eq!(stored.pending_entity, None);
        assert!(stored.added <= stored.last_update);
    }

    #[test]
    fn repeated_open_is_ignored_until_closed() {
        let harness = Harness::new();
        assert!(harness.session.on_examine_opened(snapshot(1, 10)));
        assert!(!harness.session.on_examine_opened(snapshot(2, 20)));
        assert!(!harness.session.store().contains(ContentId(2)));

        harness.session.on_examine_closed();
        harness.clock.advance(Duration::seconds(3));
        assert!(harness.session.on_examine_opened(snapshot(1, 11)));

        let stored = harness.session.store().get(ContentId(1)).expect("record");
        assert_eq!(stored.last_update - stored.added, Duration::seconds(3));
        assert_eq!(stored.pending_entity, Some(EntityId(11)));
    }

    #[test]
    fn closing_cancels_the_refresh_timer() {
        let harness = Harness::new();
        harness.session.on_examine_opened(snapshot(5, 50));
        harness.session.on_examine_closed();
        harness.clock.advance(Duration::seconds(1));

        assert_eq!(harness.session.on_examine_repainted(), None);
        assert_eq!(harness.session.coordinator().in_flight(), None);
        assert!(!harness.session.hook().is_armed());
        assert_eq!(harness.session.store().len(), 1);
    }

    #[test]
    fn late_capture_leaves_image_untouched() {
        let harness = Harness::new();
        let mut record = InspectRecord::from_snapshot(snapshot(9, 90), harness.clock.now());
        record.image =
            PixelBuffer::new(2, 2, ChannelOrder::Bgra, vec![0x11; 16]).expect("portrait");
        harness.session.store().upsert(record);

        harness.draw(0x22);
        assert_eq!(
            harness.session.store().begin_refresh(EntityId(90)),
            Some(ContentId(9))
        );
        harness.frames(1);

        assert_eq!(
            harness.ticks(5),
            vec![RefreshOutcome::StillArmed(ContentId(9))]
        );
        let after = harness.session.store().get(ContentId(9)).expect("record");
        assert_eq!(after.image.data(), &[0x11; 16]);
        assert_eq!(after.pending_entity, Some(EntityId(90)));
    }

    #[test]
    fn history_follows_requested_order() {
        let harness = Harness::new();
        harness.session.on_examine_opened(snapshot(1, 1));
        harness.session.on_examine_closed();
        harness.clock.advance(Duration::seconds(1));
        harness.session.on_examine_opened(snapshot(2, 2));
        harness.session.on_examine_closed();
        harness.clock.advance(Duration::seconds(1));
        harness.session.on_examine_opened(snapshot(1, 3));

        let by_added: Vec<_> = harness
            .session
            .history(HistoryOrder::Added)
            .into_iter()
            .map(|record| record.key)
            .collect();
        assert_eq!(by_added, vec![ContentId(2), ContentId(1)]);

        let by_update: Vec<_> = harness
            .session
            .history(HistoryOrder::LastUpdate)
            .into_iter()
            .map(|record| record.key)
            .collect();
        assert_eq!(by_update, vec![ContentId(1), ContentId(2)]);
    }
}

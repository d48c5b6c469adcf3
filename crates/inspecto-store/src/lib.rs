//! Authoritative cache of inspection records.

use std::{collections::HashMap, sync::Arc};

use inspecto_coordinator::{RefreshRequester, RefreshSink};
use inspecto_types::{
    clock::Clock,
    pixels::PixelBuffer,
    record::{ContentId, EntityId, InspectRecord},
};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// Key-unique mapping from character identity to its latest inspection.
///
/// Every mutation goes through one mutex, so readers always see whole records.
/// The store imposes no order; callers sort the snapshot as they see fit.
pub struct InspectRecordStore {
    records: Mutex<HashMap<ContentId, InspectRecord>>,
    clock: Arc<dyn Clock>,
    refresher: Arc<dyn RefreshRequester>,
}

impl InspectRecordStore {
    pub fn new(clock: Arc<dyn Clock>, refresher: Arc<dyn RefreshRequester>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            clock,
            refresher,
        }
    }

    /// Inserts a new record or overwrites an existing one, keeping the
    /// original `added` timestamp.
    ///
    /// `last_update` never moves backwards, even when the clock does.
    pub fn upsert(&self, mut record: InspectRecord) {
        let now = self.clock.now();
        let mut records = self.records.lock();

        if let Some(entity) = record.pending_entity {
            for other in records.values_mut() {
                if other.key != record.key && other.pending_entity == Some(entity) {
                    debug!("Pending refresh moves from {} to {}", other.key, record.key);
                    other.pending_entity = None;
                }
            }
        }

        match records.get(&record.key) {
            Some(existing) => {
                record.added = existing.added;
                record.last_update = now.max(existing.last_update);
                debug!("Updating inspection record {}", record.key);
            }
            None => {
                record.added = now;
                record.last_update = now;
                info!("New inspection record {} ({})", record.key, record.name);
            }
        }
        records.insert(record.key, record);
    }

    /// Starts a portrait refresh for the record waiting on `entity_hint`.
    ///
    /// Returns the record's key, or `None` when no record is waiting on that
    /// entity; the store is left untouched in that case.
    pub fn begin_refresh(&self, entity_hint: EntityId) -> Option<ContentId> {
        let target = self
            .records
            .lock()
            .values()
            .find(|record| record.pending_entity == Some(entity_hint))
            .map(|record| record.key);

        match target {
            Some(key) => {
                self.refresher.request_refresh(key);
                Some(key)
            }
            None => {
                warn!("No inspection record waits on entity {entity_hint}, skipping refresh");
                None
            }
        }
    }

    /// Stores a refreshed portrait and marks the record as settled.
    ///
    /// An empty buffer keeps the current image. Unknown keys are ignored.
    pub fn apply_refresh(&self, key: ContentId, buffer: PixelBuffer) {
        let now = self.clock.now();
        let mut records = self.records.lock();
        let Some(record) = records.get_mut(&key) else {
            debug!("Dropping refresh for unknown record {key}");
            return;
        };
        if buffer.is_empty() {
            debug!("Empty refresh for {key}, keeping current image");
        } else {
            record.image = buffer;
        }
        record.pending_entity = None;
        record.last_update = now.max(record.last_update);
    }

    pub fn get(&self, key: ContentId) -> Option<InspectRecord> {
        self.records.lock().get(&key).cloned()
    }

    pub fn contains(&self, key: ContentId) -> bool {
        self.records.lock().contains_key(&key)
    }

    /// Copies of every record, in no particular order.
    pub fn snapshot(&self) -> Vec<InspectRecord> {
        self.records.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl RefreshSink for InspectRecordStore {
    fn apply_refresh(&self, target: ContentId, buffer: PixelBuffer) {
        InspectRecordStore::apply_refresh(self, target, buffer);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use inspecto_types::{
        clock::ManualClock,
        gear::GearSlots,
        pixels::ChannelOrder,
        record::CharacterSnapshot,
    };

    use super::*;

    #[derive(Default)]
    struct RecordingRequester {
        requested: Mutex<Vec<ContentId>>,
    }

    impl RefreshRequester for RecordingRequester {
        fn request_refresh(&self, target: ContentId) {
            self.requested.lock().push(target);
        }
    }

    fn store() -> (InspectRecordStore, Arc<ManualClock>, Arc<RecordingRequester>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let requester = Arc::new(RecordingRequester::default());
        let store = InspectRecordStore::new(clock.clone(), requester.clone());
        (store, clock, requester)
    }

    fn record(key: u64, entity: u32, name: &str) -> InspectRecord {
        InspectRecord::from_snapshot(
            CharacterSnapshot {
                content_id: ContentId(key),
                capture_target: EntityId(entity),
                name: name.into(),
                world_id: 40,
                level: 90,
                job_id: 24,
                sex: 0,
                title_id: 12,
                average_item_level: 660,
                gear: GearSlots::empty(),
                comment: Vec::new(),
            },
            Utc::now() - Duration::days(1),
        )
    }

    fn portrait(fill: u8) -> PixelBuffer {
        PixelBuffer::new(2, 2, ChannelOrder::Bgra, vec![fill; 16]).expect("valid")
    }

    #[test]
    fn upsert_keeps_first_added_timestamp() {
        let (store, clock, _) = store();
        let first_call = clock.now();
        store.upsert(record(42, 1, "First"));

        clock.advance(Duration::seconds(30));
        store.upsert(record(42, 1, "X"));

        assert_eq!(store.len(), 1);
        let stored = store.get(ContentId(42)).expect("record");
        assert_eq!(stored.name, "X");
        assert!(stored.image.is_empty());
        assert_eq!(stored.added, first_call);
        assert_eq!(stored.last_update, first_call + Duration::seconds(30));
        assert!(stored.added <= stored.last_update);
    }

    #[test]
    fn clock_stepping_back_does_not_rewind_last_update() {
        let (store, clock, _) = store();
        store.upsert(record(42, 1, "First"));
        let first = store.get(ContentId(42)).expect("record");

        clock.advance(Duration::seconds(-5));
        store.upsert(record(42, 1, "Second"));
        let second = store.get(ContentId(42)).expect("record");
        assert_eq!(second.added, first.added);
        assert_eq!(second.last_update, first.last_update);
        assert!(second.added <= second.last_update);

        clock.advance(Duration::seconds(-5));
        store.apply_refresh(ContentId(42), portrait(3));
        let refreshed = store.get(ContentId(42)).expect("record");
        assert_eq!(refreshed.image, portrait(3));
        assert_eq!(refreshed.last_update, first.last_update);
        assert!(refreshed.added <= refreshed.last_update);
    }

    #[test]
    fn upsert_replaces_image_and_metadata() {
        let (store, _, _) = store();
        let mut original = record(5, 1, "Old");
        original.image = portrait(1);
        store.upsert(original);

        let mut replacement = record(5, 2, "New");
        replacement.level = 100;
        store.upsert(replacement);

        let stored = store.get(ContentId(5)).expect("record");
        assert_eq!(stored.level, 100);
        assert!(stored.image.is_empty());
        assert_eq!(stored.pending_entity, Some(EntityId(2)));
    }

    #[test]
    fn pending_entity_belongs_to_one_record() {
        let (store, _, requester) = store();
        store.upsert(record(1, 77, "A"));
        store.upsert(record(2, 77, "B"));

        assert_eq!(store.get(ContentId(1)).unwrap().pending_entity, None);
        assert_eq!(store.begin_refresh(EntityId(77)), Some(ContentId(2)));
        assert_eq!(*requester.requested.lock(), vec![ContentId(2)]);
    }

    #[test]
    fn begin_refresh_on_unknown_entity_is_a_no_op() {
        let (store, _, requester) = store();
        store.upsert(record(1, 10, "A"));
        let before = store.get(ContentId(1)).unwrap();

        assert_eq!(store.begin_refresh(EntityId(99)), None);

        assert_eq!(store.len(), 1);
        let after = store.get(ContentId(1)).unwrap();
        assert_eq!(after.last_update, before.last_update);
        assert_eq!(after.pending_entity, before.pending_entity);
        assert!(requester.requested.lock().is_empty());
    }

    #[test]
    fn apply_refresh_swaps_image_and_clears_pending() {
        let (store, clock, _) = store();
        store.upsert(record(8, 3, "A"));
        clock.advance(Duration::milliseconds(600));

        store.apply_refresh(ContentId(8), portrait(9));

        let stored = store.get(ContentId(8)).unwrap();
        assert_eq!(stored.image, portrait(9));
        assert_eq!(stored.pending_entity, None);
        assert_eq!(stored.last_update, clock.now());
        assert_eq!(store.begin_refresh(EntityId(3)), None);
    }

    #[test]
    fn empty_refresh_keeps_prior_image() {
        let (store, clock, _) = store();
        let mut existing = record(8, 3, "A");
        existing.image = portrait(4);
        store.upsert(existing);
        let before = store.get(ContentId(8)).unwrap();
        clock.advance(Duration::seconds(1));

        store.apply_refresh(ContentId(8), PixelBuffer::empty());

        let after = store.get(ContentId(8)).unwrap();
        assert_eq!(after.image.data(), before.image.data());
        assert!(after.last_update > before.last_update);
        assert_eq!(after.pending_entity, None);
    }

    #[test]
    fn refresh_for_unknown_key_is_dropped() {
        let (store, _, _) = store();
        store.apply_refresh(ContentId(1234), portrait(1));
        assert!(store.is_empty());
        assert!(!store.contains(ContentId(1234)));
    }

    #[test]
    fn store_is_shareable_across_threads() {
        let (store, _, _) = store();
        let store = Arc::new(store);
        let handles: Vec<_> = (0..4u64)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..25 {
                        store.upsert(record(i * 100 + n, (i * 100 + n) as u32, "T"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        assert_eq!(store.len(), 100);
        assert_eq!(store.snapshot().len(), 100);
    }
}

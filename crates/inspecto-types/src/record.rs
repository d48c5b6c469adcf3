use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{gear::GearSlots, pixels::PixelBuffer};

/// Stable 64-bit identity of a character, never reused while it is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub u64);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Short-lived object id the host assigns to the character currently shown in
/// the examine window. Only meaningful while that window is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.0)
    }
}

/// Fully resolved character data delivered by the examine collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    pub content_id: ContentId,
    pub capture_target: EntityId,
    pub name: String,
    pub world_id: u32,
    pub level: u32,
    pub job_id: u32,
    pub sex: u8,
    pub title_id: u32,
    pub average_item_level: u32,
    pub gear: GearSlots,
    /// Encoded rich text, kept byte for byte.
    pub comment: Vec<u8>,
}

/// Cached result of one examination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectRecord {
    pub key: ContentId,
    pub name: String,
    pub world_id: u32,
    pub level: u32,
    pub job_id: u32,
    pub sex: u8,
    pub title_id: u32,
    pub average_item_level: u32,
    pub comment: Vec<u8>,
    pub gear: GearSlots,
    #[serde(skip)]
    pub image: PixelBuffer,
    /// Set while a portrait refresh may still target this record.
    #[serde(skip)]
    pub pending_entity: Option<EntityId>,
    pub added: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl InspectRecord {
    /// Builds a record with a placeholder image, waiting for a refresh from
    /// `snapshot.capture_target`.
    pub fn from_snapshot(snapshot: CharacterSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            key: snapshot.content_id,
            name: snapshot.name,
            world_id: snapshot.world_id,
            level: snapshot.level,
            job_id: snapshot.job_id,
            sex: snapshot.sex,
            title_id: snapshot.title_id,
            average_item_level: snapshot.average_item_level,
            comment: snapshot.comment,
            gear: snapshot.gear,
            image: PixelBuffer::empty(),
            pending_entity: Some(snapshot.capture_target),
            added: now,
            last_update: now,
        }
    }

    pub fn is_feminine(&self) -> bool {
        self.sex == 1
    }
}

/// Display order for the history list; newest first in both cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HistoryOrder {
    #[default]
    Added,
    LastUpdate,
}

impl HistoryOrder {
    pub fn from_sort_by_update(sort_by_update: bool) -> Self {
        if sort_by_update {
            HistoryOrder::LastUpdate
        } else {
            HistoryOrder::Added
        }
    }

    pub fn sort(self, records: &mut [InspectRecord]) {
        match self {
            HistoryOrder::Added => records.sort_by(|a, b| b.added.cmp(&a.added)),
            HistoryOrder::LastUpdate => records.sort_by(|a, b| b.last_update.cmp(&a.last_update)),
        }
    }
}

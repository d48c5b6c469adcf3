use chrono::{DateTime, Utc};
use inspecto_types::{
    gear::{GearSlots, ItemQuality},
    lookup::{Descriptor, Lookup, StaticLookup},
    pixels::BYTES_PER_PIXEL,
    record::{CharacterSnapshot, ContentId, EntityId, InspectRecord},
};
use serde::Serialize;

/// Scripted character shown in the simulated examine window.
pub struct Character {
    pub content_id: u64,
    pub name: &'static str,
    pub world_id: u32,
    pub job_id: u32,
    pub sex: u8,
    pub title_id: u32,
    pub level: u32,
    pub raw_gear: [u32; 13],
}

pub const ROSTER: &[Character] = &[
    Character {
        content_id: 0x0040_0000_1A2B_3C4D,
        name: "Y'shtola Rhul",
        world_id: 73,
        job_id: 24,
        sex: 1,
        title_id: 2,
        level: 100,
        raw_gear: [1_043_101, 0, 43_102, 43_103, 43_104, 0, 43_106, 43_107, 0, 43_109, 0, 543_111, 43_112],
    },
    Character {
        content_id: 0x0040_0000_5E6F_7081,
        name: "Thancred Waters",
        world_id: 79,
        job_id: 37,
        sex: 0,
        title_id: 1,
        level: 100,
        raw_gear: [43_201, 0, 43_202, 0, 1_043_204, 0, 43_206, 0, 0, 0, 0, 0, 0],
    },
    Character {
        content_id: 0x0040_0000_9ABC_DEF0,
        name: "Urianger Augurelt",
        world_id: 73,
        job_id: 33,
        sex: 0,
        title_id: 2,
        level: 96,
        raw_gear: [0; 13],
    },
    Character {
        content_id: 0x0040_0001_0203_0405,
        name: "Krile Mayer Baldesion",
        world_id: 33,
        job_id: 42,
        sex: 1,
        title_id: 0,
        level: 100,
        raw_gear: [43_401, 43_402, 43_403, 43_404, 43_405, 0, 43_407, 43_408, 43_409, 43_410, 43_411, 43_412, 43_413],
    },
];

impl Character {
    pub fn key(&self) -> ContentId {
        ContentId(self.content_id)
    }

    /// What the examine collaborator would hand over when this character's
    /// window opens with `entity` as the capture target.
    pub fn snapshot(&self, entity: EntityId) -> CharacterSnapshot {
        let gear = GearSlots::from_container(|raw_slot| self.raw_gear[raw_slot]);
        let equipped = gear.iter().flatten().count() as u32;
        CharacterSnapshot {
            content_id: self.key(),
            capture_target: entity,
            name: self.name.into(),
            world_id: self.world_id,
            level: self.level,
            job_id: self.job_id,
            sex: self.sex,
            title_id: self.title_id,
            average_item_level: 600 + equipped * 9,
            gear,
            comment: format!("Examined in the simulator as {}", self.name).into_bytes(),
        }
    }

    /// Tightly packed BGRA portrait, distinct per character.
    pub fn portrait(&self, width: u32, height: u32) -> Vec<u8> {
        let seed = self.content_id.to_le_bytes();
        let mut pixels = Vec::with_capacity(width as usize * height as usize * BYTES_PER_PIXEL);
        for y in 0..height {
            for x in 0..width {
                let fx = (x * 255 / width.max(1)) as u8;
                let fy = (y * 255 / height.max(1)) as u8;
                pixels.extend_from_slice(&[fx ^ seed[0], fy ^ seed[1], seed[2], 0xFF]);
            }
        }
        pixels
    }
}

pub struct Tables {
    pub jobs: StaticLookup,
    pub titles: StaticLookup,
    pub worlds: StaticLookup,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            jobs: StaticLookup::new([
                Descriptor::named(24, "white mage").with_abbreviation("WHM"),
                Descriptor::named(33, "astrologian").with_abbreviation("AST"),
                Descriptor::named(37, "gunbreaker").with_abbreviation("GNB"),
                Descriptor::named(42, "pictomancer").with_abbreviation("PCT"),
            ]),
            titles: StaticLookup::new([
                Descriptor::named(1, "Lord of Crags").with_feminine("Lady of Crags"),
                Descriptor::named(2, "Scion of the Seventh Dawn"),
            ]),
            worlds: StaticLookup::new([
                Descriptor::named(33, "Twintania"),
                Descriptor::named(73, "Adamantoise"),
                Descriptor::named(79, "Cactuar"),
            ]),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PortraitSummary {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub content_id: String,
    pub name: String,
    pub world: String,
    pub level: u32,
    pub job: String,
    pub title: Option<String>,
    pub average_item_level: u32,
    pub equipped: usize,
    pub high_quality: usize,
    pub portrait: Option<PortraitSummary>,
    pub added: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn decorate(record: &InspectRecord, tables: &Tables) -> Self {
        let job = tables
            .jobs
            .lookup(record.job_id)
            .and_then(|row| row.abbreviation)
            .unwrap_or_else(|| format!("job #{}", record.job_id));
        let world = tables
            .worlds
            .lookup(record.world_id)
            .map(|row| row.name)
            .unwrap_or_else(|| format!("world #{}", record.world_id));
        let title = tables
            .titles
            .lookup(record.title_id)
            .map(|row| row.gendered_name(record.is_feminine()).to_string());
        let portrait = (!record.image.is_empty()).then(|| PortraitSummary {
            width: record.image.width(),
            height: record.image.height(),
        });

        Self {
            content_id: record.key.to_string(),
            name: record.name.clone(),
            world,
            level: record.level,
            job,
            title,
            average_item_level: record.average_item_level,
            equipped: record.gear.iter().flatten().count(),
            high_quality: record
                .gear
                .iter()
                .flatten()
                .filter(|item| item.quality == ItemQuality::High)
                .count(),
            portrait,
            added: record.added,
            last_update: record.last_update,
        }
    }
}

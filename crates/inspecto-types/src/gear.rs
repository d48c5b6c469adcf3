use serde::{Deserialize, Serialize};

/// Number of raw equipment slots reported by the host's examine container.
pub const RAW_SLOT_COUNT: usize = 13;
/// Raw slot the host keeps for a retired equipment kind; never holds an item.
pub const RESERVED_RAW_SLOT: usize = 5;
/// Number of entries in the display-ordered gear sequence.
pub const GEAR_SLOT_COUNT: usize = 12;

const HIGH_QUALITY_OFFSET: u32 = 1_000_000;
const COLLECTABLE_OFFSET: u32 = 500_000;

/// Maps a raw equipment slot to its display index.
///
/// Left column: main hand, head, body, hands, legs, feet (0..=5).
/// Right column: off hand, ears, neck, wrists, right ring, left ring (6..=11).
///
/// # Panics
///
/// On the reserved slot 5 and on anything outside `0..13`. Either means the
/// caller walked the container wrong.
pub fn slot_to_index(raw_slot: usize) -> usize {
    match raw_slot {
        0 => 0,
        1 => 6,
        2 => 1,
        3 => 2,
        4 => 3,
        RESERVED_RAW_SLOT => panic!("raw equipment slot 5 is reserved and never carries gear"),
        6 => 4,
        7 => 5,
        8 => 7,
        9 => 8,
        10 => 9,
        11 => 10,
        12 => 11,
        other => panic!("raw equipment slot {other} is out of range"),
    }
}

/// Inverse of [`slot_to_index`].
///
/// # Panics
///
/// On indices outside `0..12`.
pub fn index_to_slot(index: usize) -> usize {
    match index {
        0 => 0,
        1 => 2,
        2 => 3,
        3 => 4,
        4 => 6,
        5 => 7,
        6 => 1,
        7 => 8,
        8 => 9,
        9 => 10,
        10 => 11,
        11 => 12,
        other => panic!("gear display index {other} is out of range"),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemQuality {
    Normal,
    High,
    Collectable,
}

/// Reference to an equipped item by its normalised id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GearRef {
    pub item_id: u32,
    pub quality: ItemQuality,
}

impl GearRef {
    /// Splits the quality marker the host folds into raw item ids.
    pub fn from_raw(raw_item_id: u32) -> Self {
        if raw_item_id > HIGH_QUALITY_OFFSET {
            Self {
                item_id: raw_item_id - HIGH_QUALITY_OFFSET,
                quality: ItemQuality::High,
            }
        } else if raw_item_id > COLLECTABLE_OFFSET {
            Self {
                item_id: raw_item_id - COLLECTABLE_OFFSET,
                quality: ItemQuality::Collectable,
            }
        } else {
            Self {
                item_id: raw_item_id,
                quality: ItemQuality::Normal,
            }
        }
    }
}

/// Display-ordered gear sequence, always twelve entries long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GearSlots([Option<GearRef>; GEAR_SLOT_COUNT]);

impl GearSlots {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds the sequence from a raw container accessor returning the item id
    /// stored in a raw slot (`0` when the slot is empty).
    pub fn from_container(mut item_in_slot: impl FnMut(usize) -> u32) -> Self {
        let mut slots = Self::empty();
        for raw_slot in (0..RAW_SLOT_COUNT).filter(|slot| *slot != RESERVED_RAW_SLOT) {
            let item_id = item_in_slot(raw_slot);
            if item_id != 0 {
                slots.0[slot_to_index(raw_slot)] = Some(GearRef::from_raw(item_id));
            }
        }
        slots
    }

    pub fn get(&self, index: usize) -> Option<GearRef> {
        self.0.get(index).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<GearRef>> + '_ {
        self.0.iter().copied()
    }
}

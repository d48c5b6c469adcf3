use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Decoration text for a static game-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    pub id: u32,
    pub name: String,
    /// Short form, e.g. a job abbreviation.
    pub abbreviation: Option<String>,
    /// Alternate form for feminine characters (titles).
    pub feminine: Option<String>,
}

impl Descriptor {
    pub fn named(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            abbreviation: None,
            feminine: None,
        }
    }

    pub fn with_abbreviation(mut self, abbreviation: impl Into<String>) -> Self {
        self.abbreviation = Some(abbreviation.into());
        self
    }

    pub fn with_feminine(mut self, feminine: impl Into<String>) -> Self {
        self.feminine = Some(feminine.into());
        self
    }

    pub fn gendered_name(&self, feminine: bool) -> &str {
        match (&self.feminine, feminine) {
            (Some(text), true) => text,
            _ => &self.name,
        }
    }
}

/// Narrow read-only access to a static game table.
pub trait Lookup: Send + Sync {
    fn lookup(&self, id: u32) -> Option<Descriptor>;
}

/// Map-backed table, used by tools and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    rows: HashMap<u32, Descriptor>,
}

impl StaticLookup {
    pub fn new(rows: impl IntoIterator<Item = Descriptor>) -> Self {
        Self {
            rows: rows.into_iter().map(|row| (row.id, row)).collect(),
        }
    }
}

impl Lookup for StaticLookup {
    fn lookup(&self, id: u32) -> Option<Descriptor> {
        self.rows.get(&id).cloned()
    }
}

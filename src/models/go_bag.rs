//! Go Bag catalog and per-user checklist

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Catalog entry a household can pack
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoBagItem {
    pub id: i64,
    pub name: String,
    pub category: ItemCategory,
    pub description: String,
    /// Counted in the "essential items missing" warning
    pub is_essential: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCategory {
    Water,
    Food,
    FirstAid,
    Tools,
    Documents,
    Hygiene,
    Clothing,
    Other,
}

impl fmt::Display for ItemCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemCategory::Water => "water",
            ItemCategory::Food => "food",
            ItemCategory::FirstAid => "first_aid",
            ItemCategory::Tools => "tools",
            ItemCategory::Documents => "documents",
            ItemCategory::Hygiene => "hygiene",
            ItemCategory::Clothing => "clothing",
            ItemCategory::Other => "other",
        };
        f.write_str(s)
    }
}

impl FromStr for ItemCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "water" => Ok(Self::Water),
            "food" => Ok(Self::Food),
            "first_aid" => Ok(Self::FirstAid),
            "tools" => Ok(Self::Tools),
            "documents" => Ok(Self::Documents),
            "hygiene" => Ok(Self::Hygiene),
            "clothing" => Ok(Self::Clothing),
            "other" => Ok(Self::Other),
            _ => Err(anyhow::anyhow!("Invalid item category: {}", s)),
        }
    }
}

/// Input for creating or replacing a catalog item
#[derive(Debug, Clone, Deserialize)]
pub struct GoBagItemInput {
    pub name: String,
    pub category: ItemCategory,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_essential: bool,
}

/// One catalog row as seen by a particular user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoBagEntry {
    #[serde(flatten)]
    pub item: GoBagItem,
    pub packed: bool,
}

/// A user's whole checklist with progress figures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoBag {
    pub user_id: i64,
    pub items: Vec<GoBagEntry>,
    pub packed_count: usize,
    pub total_count: usize,
    /// Whole percent, rounded down
    pub completion: u8,
    pub essential_missing: Vec<String>,
}

impl GoBag {
    /// Build the checklist view from the catalog and the set of packed ids
    pub fn assemble(user_id: i64, catalog: Vec<GoBagItem>, packed_ids: &[i64]) -> Self {
        let items: Vec<GoBagEntry> = catalog
            .into_iter()
            .map(|item| {
                let packed = packed_ids.contains(&item.id);
                GoBagEntry { item, packed }
            })
            .collect();

        let total_count = items.len();
        let packed_count = items.iter().filter(|e| e.packed).count();
        let essential_missing = items
            .iter()
            .filter(|e| e.item.is_essential && !e.packed)
            .map(|e| e.item.name.clone())
            .collect();

        Self {
            user_id,
            items,
            packed_count,
            total_count,
            completion: completion_percent(packed_count, total_count),
            essential_missing,
        }
    }
}

/// Integer completion percentage; an empty catalog counts as 0%.
pub fn completion_percent(packed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((packed.min(total) * 100) / total) as u8
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use labloan_core::{DomainError, DomainResult, Entity, ItemId};

/// Fixed set of inventory categories.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "IC")]
    Ic,
    Equipment,
    Device,
    Other,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Ic,
        Category::Equipment,
        Category::Device,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ic => "IC",
            Category::Equipment => "Equipment",
            Category::Device => "Device",
            Category::Other => "Other",
        }
    }
}

impl core::fmt::Display for Category {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                DomainError::validation("category must be one of: IC, Equipment, Device, Other")
            })
    }
}

/// Unvalidated item input as it arrives from a caller.
///
/// Only `name` and `category` are required. A missing quantity means zero and
/// a missing check date means `today`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemDraft {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<i64>,
    pub location: Option<String>,
    pub last_checked: Option<NaiveDate>,
}

impl ItemDraft {
    pub fn validate(self, today: NaiveDate) -> DomainResult<ItemFields> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| DomainError::validation("name is required"))?;

        let category = self
            .category
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| DomainError::validation("category is required"))?
            .parse::<Category>()?;

        let quantity = self.quantity.unwrap_or(0);
        if quantity < 0 {
            return Err(DomainError::validation("quantity cannot be negative"));
        }

        Ok(ItemFields {
            name,
            category,
            quantity,
            location: self.location.map(|l| l.trim().to_string()).unwrap_or_default(),
            last_checked: self.last_checked.unwrap_or(today),
        })
    }

    /// Validation for overwriting an existing item: `quantity` must be given.
    pub fn validate_replacement(self, today: NaiveDate) -> DomainResult<ItemFields> {
        if self.quantity.is_none() {
            return Err(DomainError::validation("quantity is required"));
        }
        self.validate(today)
    }
}

/// Validated mutable fields of an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFields {
    pub name: String,
    pub category: Category,
    pub quantity: i64,
    pub location: String,
    pub last_checked: NaiveDate,
}

/// A lendable inventory record.
///
/// # Invariants
/// - `quantity` (units currently available to lend) is never negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: Category,
    pub quantity: i64,
    pub location: String,
    pub last_checked: NaiveDate,
}

impl Item {
    pub fn new(id: ItemId, fields: ItemFields) -> Self {
        Self {
            id,
            name: fields.name,
            category: fields.category,
            quantity: fields.quantity,
            location: fields.location,
            last_checked: fields.last_checked,
        }
    }

    /// Overwrite every mutable field (the id is preserved).
    pub fn overwrite(&mut self, fields: ItemFields) {
        *self = Self::new(self.id, fields);
    }

    /// Stock level after applying `delta`, without mutating.
    ///
    /// Fails with `Conflict` when the result would be negative.
    pub fn quantity_after(&self, delta: i64) -> DomainResult<i64> {
        let next = self
            .quantity
            .checked_add(delta)
            .ok_or_else(|| DomainError::validation("quantity overflow"))?;
        if next < 0 {
            return Err(DomainError::conflict(format!(
                "insufficient stock for \"{}\": {} available, {} requested",
                self.name,
                self.quantity,
                -delta
            )));
        }
        Ok(next)
    }

    /// Apply a stock delta in place; a no-op when it fails.
    pub fn adjust(&mut self, delta: i64) -> DomainResult<()> {
        self.quantity = self.quantity_after(delta)?;
        Ok(())
    }
}

impl Entity for Item {
    type Id = ItemId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

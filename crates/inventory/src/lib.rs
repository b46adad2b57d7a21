//! Inventory domain module.
//!
//! Item records and stock arithmetic, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage).

pub mod item;

pub use item::{Category, Item, ItemDraft, ItemFields};

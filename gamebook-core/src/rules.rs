//! Effect application.
//!
//! Effect bundles come from choices and usable items. Applying one mutates
//! the player state and produces a list of [`StateChange`]s describing what
//! actually happened, so views and logs never have to diff states.
//!
//! Health and sanity are clamped to `0..=max` here and nowhere else.

use crate::content::{ContentBundle, Effects};
use crate::state::{ItemEntry, ItemKind, PlayerState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A concrete change made to the player state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StateChange {
    /// Health moved by `amount` (before clamping) and now sits at `new_current`.
    HealthChanged {
        amount: i32,
        new_current: u32,
        max: u32,
    },

    SanityChanged {
        amount: i32,
        new_current: u32,
        max: u32,
    },

    ItemAdded { id: String, name: String },

    ItemRemoved { id: String },

    /// A consume entry found nothing to remove.
    ItemNotHeld { id: String },

    FlagSet { flag: String },
}

/// Errors from using or dropping inventory items.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("No inventory entry at index {0}")]
    InventoryIndex(usize),

    #[error("Item '{0}' is not defined in the story content")]
    UnknownItem(String),

    #[error("Item '{0}' cannot be used")]
    NotUsable(String),

    #[error("Item '{0}' cannot be dropped")]
    NotDroppable(String),
}

/// Result of using an item from the inventory.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemUse {
    pub item_id: String,
    /// The inventory entry was removed because it is consumable.
    pub consumed: bool,
    pub changes: Vec<StateChange>,
    /// Text to show the player.
    pub message: String,
}

fn clamp_add(current: u32, amount: i32, max: u32) -> u32 {
    let raw = i64::from(current) + i64::from(amount);
    raw.clamp(0, i64::from(max)) as u32
}

/// Apply an effect bundle to the player.
pub fn apply_effects(state: &mut PlayerState, effects: &Effects) -> Vec<StateChange> {
    let mut changes = Vec::new();

    if let Some(amount) = effects.health {
        let stats = &mut state.stats;
        stats.health = clamp_add(stats.health, amount, stats.max_health);
        changes.push(StateChange::HealthChanged {
            amount,
            new_current: stats.health,
            max: stats.max_health,
        });
    }

    if let Some(amount) = effects.sanity {
        let stats = &mut state.stats;
        stats.sanity = clamp_add(stats.sanity, amount, stats.max_sanity);
        changes.push(StateChange::SanityChanged {
            amount,
            new_current: stats.sanity,
            max: stats.max_sanity,
        });
    }

    for entry in &effects.items {
        if entry.kind == ItemKind::Consume {
            match state.inventory.iter().position(|i| i.id == entry.id) {
                Some(index) => {
                    state.inventory.remove(index);
                    changes.push(StateChange::ItemRemoved {
                        id: entry.id.clone(),
                    });
                }
                None => {
                    tracing::debug!(item = %entry.id, "Consume effect found no matching item");
                    changes.push(StateChange::ItemNotHeld {
                        id: entry.id.clone(),
                    });
                }
            }
        } else {
            state.inventory.push(entry.clone());
            changes.push(StateChange::ItemAdded {
                id: entry.id.clone(),
                name: entry.name.clone(),
            });
        }
    }

    for flag in &effects.flags {
        if state.flags.insert(flag.clone()) {
            changes.push(StateChange::FlagSet { flag: flag.clone() });
        }
    }

    tracing::debug!(count = changes.len(), "Applied effects");
    changes
}

/// Use the inventory entry at `index`.
///
/// Only items the story marks `usable` can be used. A consumable entry is
/// removed before the item's effects are applied, so an effect that consumes
/// the same id takes a different copy.
pub fn use_item(
    state: &mut PlayerState,
    bundle: &ContentBundle,
    index: usize,
) -> Result<ItemUse, ItemError> {
    let entry = state
        .inventory
        .get(index)
        .ok_or(ItemError::InventoryIndex(index))?;
    let item = bundle
        .item(&entry.id)
        .ok_or_else(|| ItemError::UnknownItem(entry.id.clone()))?;
    if !item.usable {
        return Err(ItemError::NotUsable(entry.id.clone()));
    }

    let item_id = entry.id.clone();
    let consumed = entry.kind == ItemKind::Consumable;
    if consumed {
        state.inventory.remove(index);
    }

    let changes = item
        .effects
        .as_ref()
        .map(|effects| apply_effects(state, effects))
        .unwrap_or_default();

    let message = item
        .use_message
        .clone()
        .unwrap_or_else(|| bundle.ui.get_or("itemUsed", "Item used!").to_string());

    tracing::debug!(item = %item_id, consumed, "Used item");
    Ok(ItemUse {
        item_id,
        consumed,
        changes,
        message,
    })
}

/// Remove the inventory entry at `index`. Only consumable and permanent
/// entries can be dropped.
pub fn drop_item(state: &mut PlayerState, index: usize) -> Result<ItemEntry, ItemError> {
    let entry = state
        .inventory
        .get(index)
        .ok_or(ItemError::InventoryIndex(index))?;
    if !entry.kind.is_droppable() {
        return Err(ItemError::NotDroppable(entry.id.clone()));
    }

    let dropped = state.inventory.remove(index);
    tracing::debug!(item = %dropped.id, "Dropped item");
    Ok(dropped)
}

//! Player state for a gamebook playthrough.
//!
//! The serialized shape follows the save format used by the story bundles:
//! camelCase field names, used choices as `"<node>_<index>"` strings and
//! inventory entries carrying their raw `type` tag.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Health and sanity a new character starts with (and their maximum).
pub const STARTING_HEALTH: u32 = 5;
pub const STARTING_SANITY: u32 = 5;

/// Stat points handed out at character creation.
pub const STARTING_POINTS: i32 = 3;

/// Perk points handed out at character creation.
pub const STARTING_PERK_POINTS: i32 = 1;

/// Inventory slots every character has before strength is added.
pub const BASE_CAPACITY: u32 = 5;

/// Stats that can be raised at creation and rolled against in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stat {
    Strength,
    Dexterity,
    Intelligence,
}

impl Stat {
    /// The lowercase name, which doubles as the UI string key for the label.
    pub fn name(&self) -> &'static str {
        match self {
            Stat::Strength => "strength",
            Stat::Dexterity => "dexterity",
            Stat::Intelligence => "intelligence",
        }
    }

    pub fn all() -> &'static [Stat] {
        &[Stat::Strength, Stat::Dexterity, Stat::Intelligence]
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Character statistics.
///
/// Health and sanity are kept inside `0..=max` by the effect applier; nothing
/// else in the crate writes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub strength: u32,
    pub dexterity: u32,
    pub intelligence: u32,
    pub health: u32,
    pub max_health: u32,
    pub sanity: u32,
    pub max_sanity: u32,
}

impl Default for Stats {
    fn default() -> Self {
        Self {
            strength: 0,
            dexterity: 0,
            intelligence: 0,
            health: STARTING_HEALTH,
            max_health: STARTING_HEALTH,
            sanity: STARTING_SANITY,
            max_sanity: STARTING_SANITY,
        }
    }
}

impl Stats {
    /// Value of a testable stat.
    pub fn get(&self, stat: Stat) -> u32 {
        match stat {
            Stat::Strength => self.strength,
            Stat::Dexterity => self.dexterity,
            Stat::Intelligence => self.intelligence,
        }
    }

    pub(crate) fn set(&mut self, stat: Stat, value: u32) {
        match stat {
            Stat::Strength => self.strength = value,
            Stat::Dexterity => self.dexterity = value,
            Stat::Intelligence => self.intelligence = value,
        }
    }
}

/// The `type` tag of an inventory entry or item effect.
///
/// `consume` only appears in effect bundles and means "remove one"; the other
/// known tags describe what the player may do with an item they hold. Unknown
/// tags are preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemKind {
    Consume,
    Consumable,
    Permanent,
    Other(String),
}

impl ItemKind {
    pub fn as_str(&self) -> &str {
        match self {
            ItemKind::Consume => "consume",
            ItemKind::Consumable => "consumable",
            ItemKind::Permanent => "permanent",
            ItemKind::Other(tag) => tag,
        }
    }

    /// Whether the player may throw an entry of this kind away.
    pub fn is_droppable(&self) -> bool {
        matches!(self, ItemKind::Consumable | ItemKind::Permanent)
    }
}

impl Default for ItemKind {
    fn default() -> Self {
        ItemKind::Other("other".to_string())
    }
}

impl From<String> for ItemKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "consume" => ItemKind::Consume,
            "consumable" => ItemKind::Consumable,
            "permanent" => ItemKind::Permanent,
            _ => ItemKind::Other(tag),
        }
    }
}

impl From<ItemKind> for String {
    fn from(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

/// One entry of an effect's item list, and the shape of an inventory slot.
///
/// The same item may sit in the inventory several times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    /// Any further fields the story author attached; carried through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ItemEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            extra: serde_json::Map::new(),
        }
    }

    /// An entry that removes one matching item when applied.
    pub fn consume(id: impl Into<String>) -> Self {
        Self::new(id, "", ItemKind::Consume)
    }
}

/// Error for a used-choice key that is not `<node>_<index>`.
#[derive(Debug, Clone, Error)]
#[error("Invalid choice key: {0}")]
pub struct InvalidChoiceKey(pub String);

/// Identity of a choice for oneshot tracking: node id plus position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChoiceKey {
    pub node: String,
    pub index: usize,
}

impl ChoiceKey {
    pub fn new(node: impl Into<String>, index: usize) -> Self {
        Self {
            node: node.into(),
            index,
        }
    }
}

impl fmt::Display for ChoiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.node, self.index)
    }
}

impl FromStr for ChoiceKey {
    type Err = InvalidChoiceKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Node ids may themselves contain underscores; the index is after the last one.
        let (node, index) = s
            .rsplit_once('_')
            .ok_or_else(|| InvalidChoiceKey(s.to_string()))?;
        let index = index
            .parse()
            .map_err(|_| InvalidChoiceKey(s.to_string()))?;
        Ok(Self::new(node, index))
    }
}

impl TryFrom<String> for ChoiceKey {
    type Error = InvalidChoiceKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ChoiceKey> for String {
    fn from(key: ChoiceKey) -> Self {
        key.to_string()
    }
}

/// Everything that describes the player between two choices.
///
/// Fields are crate-private: stats, inventory and flags change only through
/// [`crate::rules`], used choices only through the narrative engine, and the
/// point budgets only through the character builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub(crate) stats: Stats,
    #[serde(default)]
    pub(crate) perks: BTreeSet<String>,
    #[serde(default)]
    pub(crate) inventory: Vec<ItemEntry>,
    #[serde(default)]
    pub(crate) flags: BTreeSet<String>,
    #[serde(default)]
    pub(crate) used_choices: BTreeSet<ChoiceKey>,
    pub(crate) points_to_spend: i32,
    pub(crate) perk_points_to_spend: i32,
    #[serde(default)]
    pub(crate) character_name: String,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self::with_budget(STARTING_POINTS, STARTING_PERK_POINTS)
    }
}

impl PlayerState {
    /// A fresh character with the given unspent budgets.
    pub fn with_budget(points: i32, perk_points: i32) -> Self {
        Self {
            stats: Stats::default(),
            perks: BTreeSet::new(),
            inventory: Vec::new(),
            flags: BTreeSet::new(),
            used_choices: BTreeSet::new(),
            points_to_spend: points,
            perk_points_to_spend: perk_points,
            character_name: String::new(),
        }
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn perks(&self) -> &BTreeSet<String> {
        &self.perks
    }

    pub fn inventory(&self) -> &[ItemEntry] {
        &self.inventory
    }

    pub fn flags(&self) -> &BTreeSet<String> {
        &self.flags
    }

    pub fn used_choices(&self) -> &BTreeSet<ChoiceKey> {
        &self.used_choices
    }

    pub fn points_to_spend(&self) -> i32 {
        self.points_to_spend
    }

    pub fn perk_points_to_spend(&self) -> i32 {
        self.perk_points_to_spend
    }

    pub fn character_name(&self) -> &str {
        &self.character_name
    }

    pub fn has_item(&self, item_id: &str) -> bool {
        self.inventory.iter().any(|i| i.id == item_id)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn has_perk(&self, perk_id: &str) -> bool {
        self.perks.contains(perk_id)
    }

    pub fn is_choice_used(&self, key: &ChoiceKey) -> bool {
        self.used_choices.contains(key)
    }

    /// Advisory inventory size (`strength + 5`). Shown to the player, never enforced.
    pub fn capacity(&self) -> u32 {
        self.stats.strength + BASE_CAPACITY
    }

    /// Whether the inventory holds more entries than [`Self::capacity`].
    pub fn is_over_capacity(&self) -> bool {
        self.inventory.len() > self.capacity() as usize
    }

    /// Mark a oneshot choice as used. Returns `false` if it already was.
    pub(crate) fn record_choice(&mut self, key: ChoiceKey) -> bool {
        self.used_choices.insert(key)
    }
}

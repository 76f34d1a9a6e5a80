//! The port the engine renders through.
//!
//! Nothing in this crate draws anything. A front end implements
//! [`GameView`] and receives nodes, choice lists, stat panels and dice
//! frames as plain data.

use crate::content::Node;
use crate::engine::VisibleChoice;
use crate::resolver::RollFrame;
use crate::state::PlayerState;
use serde::{Deserialize, Serialize};

/// Rendering callbacks. Implementations must not call back into the engine.
pub trait GameView: Send {
    fn render_node(&mut self, node_id: &str, node: &Node);

    fn render_choices(&mut self, choices: &[VisibleChoice]);

    fn render_stats(&mut self, panel: &StatsPanel);

    /// One frame of a stat test: tumbling dice, then the resolved roll.
    fn render_roll(&mut self, frame: &RollFrame);

    /// The dice overlay's hold time is over.
    fn close_roll(&mut self) {}

    /// A short message for the player (item use text, "no save found", ...).
    fn notify(&mut self, _message: &str) {}
}

/// A view that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullView;

impl GameView for NullView {
    fn render_node(&mut self, _node_id: &str, _node: &Node) {}
    fn render_choices(&mut self, _choices: &[VisibleChoice]) {}
    fn render_stats(&mut self, _panel: &StatsPanel) {}
    fn render_roll(&mut self, _frame: &RollFrame) {}
}

/// Colour band of a stat bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarLevel {
    Normal,
    /// At or below 60%.
    Warning,
    /// At or below 30%.
    Danger,
}

/// A current/max bar such as health or sanity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatBar {
    pub current: u32,
    pub max: u32,
    pub level: BarLevel,
}

impl StatBar {
    /// Levels compare the exact ratio; a bar with no maximum is `Normal`.
    pub fn new(current: u32, max: u32) -> Self {
        let scaled = u64::from(current) * 100;
        let max_scaled = u64::from(max);
        let level = if max == 0 {
            BarLevel::Normal
        } else if scaled <= 30 * max_scaled {
            BarLevel::Danger
        } else if scaled <= 60 * max_scaled {
            BarLevel::Warning
        } else {
            BarLevel::Normal
        };
        Self {
            current,
            max,
            level,
        }
    }

    /// Fill percentage, 0 when `max` is 0.
    pub fn percent(&self) -> u32 {
        Self::percent_of(self.current, self.max)
    }

    fn percent_of(current: u32, max: u32) -> u32 {
        if max == 0 {
            0
        } else {
            (u64::from(current) * 100 / u64::from(max)) as u32
        }
    }
}

/// Everything the side panel shows about the character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsPanel {
    pub name: String,
    pub strength: u32,
    pub dexterity: u32,
    pub intelligence: u32,
    pub health: StatBar,
    pub sanity: StatBar,
    pub inventory_len: usize,
    /// Advisory only.
    pub capacity: u32,
}

impl StatsPanel {
    pub fn from_state(state: &PlayerState) -> Self {
        let stats = state.stats();
        Self {
            name: state.character_name().to_string(),
            strength: stats.strength,
            dexterity: stats.dexterity,
            intelligence: stats.intelligence,
            health: StatBar::new(stats.health, stats.max_health),
            sanity: StatBar::new(stats.sanity, stats.max_sanity),
            inventory_len: state.inventory().len(),
            capacity: state.capacity(),
        }
    }
}

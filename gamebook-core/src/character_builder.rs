//! Character creation.
//!
//! The player spends a fixed budget of stat points and perk points and picks
//! a name. A playthrough can only start once both budgets are exactly zero
//! and the name is not blank; [`CharacterBuilder::build`] enforces that gate.

use crate::content::{ContentBundle, Perk};
use crate::state::{PlayerState, Stat, Stats};

/// Outcome of toggling a perk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerkToggle {
    Selected,
    Deselected,
    /// No perk points were left; nothing changed.
    Rejected,
}

/// Error from character building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    NotReady {
        points: i32,
        perk_points: i32,
        name_missing: bool,
    },
    UnknownPerk(String),
}

impl std::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuilderError::NotReady {
                points,
                perk_points,
                name_missing,
            } => {
                write!(
                    f,
                    "Character is not ready: {points} stat point(s) and {perk_points} perk point(s) unspent"
                )?;
                if *name_missing {
                    write!(f, ", name is required")?;
                }
                Ok(())
            }
            BuilderError::UnknownPerk(id) => write!(f, "Perk '{id}' is not available"),
        }
    }
}

impl std::error::Error for BuilderError {}

/// Builder for a new character.
#[derive(Debug, Clone)]
pub struct CharacterBuilder {
    state: PlayerState,
    available_perks: Vec<Perk>,
    name: String,
}

impl CharacterBuilder {
    /// A builder with the standard budget (3 stat points, 1 perk point).
    pub fn new(available_perks: Vec<Perk>) -> Self {
        Self::with_state(PlayerState::default(), available_perks)
    }

    /// A builder with a custom budget.
    pub fn with_budget(points: i32, perk_points: i32, available_perks: Vec<Perk>) -> Self {
        Self::with_state(PlayerState::with_budget(points, perk_points), available_perks)
    }

    /// A builder offering the perks of a language bundle.
    pub fn from_bundle(bundle: &ContentBundle, points: i32, perk_points: i32) -> Self {
        Self::with_budget(points, perk_points, bundle.perks.clone())
    }

    fn with_state(state: PlayerState, available_perks: Vec<Perk>) -> Self {
        Self {
            state,
            available_perks,
            name: String::new(),
        }
    }

    /// Raise (positive `delta`) or lower a stat.
    ///
    /// Raising needs at least one unspent point; no stat may go below zero.
    /// Returns `false` and changes nothing when rejected.
    pub fn adjust_stat(&mut self, stat: Stat, delta: i32) -> bool {
        if delta > 0 && self.state.points_to_spend <= 0 {
            tracing::debug!(stat = %stat, delta, "No stat points left");
            return false;
        }

        let current = i64::from(self.state.stats.get(stat));
        let Ok(new_value) = u32::try_from(current + i64::from(delta)) else {
            tracing::debug!(stat = %stat, delta, "Stat would go negative");
            return false;
        };

        self.state.stats.set(stat, new_value);
        self.state.points_to_spend -= delta;
        tracing::debug!(
            stat = %stat,
            value = new_value,
            points_left = self.state.points_to_spend,
            "Adjusted stat"
        );
        true
    }

    /// Select a perk, or deselect it if it is already held.
    pub fn toggle_perk(&mut self, perk_id: &str) -> Result<PerkToggle, BuilderError> {
        if !self.available_perks.iter().any(|p| p.id == perk_id) {
            return Err(BuilderError::UnknownPerk(perk_id.to_string()));
        }

        if self.state.perks.remove(perk_id) {
            self.state.perk_points_to_spend += 1;
            return Ok(PerkToggle::Deselected);
        }

        if self.state.perk_points_to_spend <= 0 {
            tracing::warn!(perk = perk_id, "Perk selection rejected: no perk points left");
            return Ok(PerkToggle::Rejected);
        }

        self.state.perks.insert(perk_id.to_string());
        self.state.perk_points_to_spend -= 1;
        Ok(PerkToggle::Selected)
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stats(&self) -> &Stats {
        self.state.stats()
    }

    pub fn points_to_spend(&self) -> i32 {
        self.state.points_to_spend
    }

    pub fn perk_points_to_spend(&self) -> i32 {
        self.state.perk_points_to_spend
    }

    pub fn is_selected(&self, perk_id: &str) -> bool {
        self.state.has_perk(perk_id)
    }

    pub fn available_perks(&self) -> &[Perk] {
        &self.available_perks
    }

    /// Both budgets are spent and the trimmed name is not empty.
    pub fn is_ready(&self) -> bool {
        self.state.points_to_spend == 0
            && self.state.perk_points_to_spend == 0
            && !self.name.trim().is_empty()
    }

    /// The initial player state, if the character is ready.
    pub fn build(&self) -> Result<PlayerState, BuilderError> {
        if !self.is_ready() {
            return Err(BuilderError::NotReady {
                points: self.state.points_to_spend,
                perk_points: self.state.perk_points_to_spend,
                name_missing: self.name.trim().is_empty(),
            });
        }

        let mut state = self.state.clone();
        state.character_name = self.name.trim().to_string();
        Ok(state)
    }
}

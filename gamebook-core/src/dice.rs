//! Six-sided dice behind an injectable source.
//!
//! Stat tests never call a random number generator directly; they ask a
//! [`DiceSource`], so tests can replay fixed sequences.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Faces used when showing a die, indexed by `value - 1`.
pub const DIE_FACES: [char; 6] = ['⚀', '⚁', '⚂', '⚃', '⚄', '⚅'];

/// Error type for die values.
#[derive(Debug, Error)]
pub enum DiceError {
    #[error("Die value out of range: {0} (expected 1-6)")]
    OutOfRange(u8),
    #[error("No dice values scripted")]
    Empty,
}

/// Something that produces uniform d6 results.
pub trait DiceSource: Send {
    /// Roll one six-sided die. Implementations must return a value in `1..=6`.
    fn roll_d6(&mut self) -> u8;
}

/// Dice backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct RngDice<R> {
    rng: R,
}

impl RngDice<StdRng> {
    /// Dice seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible dice (useful for testing).
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng> RngDice<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> DiceSource for RngDice<R> {
    fn roll_d6(&mut self) -> u8 {
        self.rng.gen_range(1..=6)
    }
}

/// Check that a value could have come off a d6.
pub fn check_die(value: u8) -> Result<u8, DiceError> {
    if (1..=6).contains(&value) {
        Ok(value)
    } else {
        Err(DiceError::OutOfRange(value))
    }
}

/// The face character for a die value.
pub fn die_face(value: u8) -> Option<char> {
    check_die(value).ok().map(|v| DIE_FACES[usize::from(v - 1)])
}

/// Roll two independent dice, validating both.
pub fn roll_pair(dice: &mut dyn DiceSource) -> Result<(u8, u8), DiceError> {
    let first = check_die(dice.roll_d6())?;
    let second = check_die(dice.roll_d6())?;
    Ok((first, second))
}

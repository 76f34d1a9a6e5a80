//! Stat test resolution.
//!
//! A test is resolved in two phases. The roll is computed at once from the
//! injected dice; afterwards the view is walked through a fixed animation
//! (`Rolling` frames, then the `Resolved` frame and a hold). The animation
//! only delays the reveal: it never rolls again and cannot change the outcome.

use crate::content::StatTest;
use crate::dice::{check_die, die_face, roll_pair, DiceError, DiceSource};
use crate::state::{PlayerState, Stat};
use crate::view::GameView;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The computed result of a stat test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub stat: Stat,
    pub difficulty: i32,
    pub dice: [u8; 2],
    pub bonus: u32,
    pub total: i32,
    pub success: bool,
}

impl TestOutcome {
    /// Compute an outcome from known die values.
    pub fn compute(test: &StatTest, bonus: u32, first: u8, second: u8) -> Result<Self, DiceError> {
        let first = check_die(first)?;
        let second = check_die(second)?;
        let total = i64::from(first) + i64::from(second) + i64::from(bonus);
        let total = i32::try_from(total).unwrap_or(i32::MAX);

        Ok(Self {
            stat: test.stat,
            difficulty: test.difficulty,
            dice: [first, second],
            bonus,
            total,
            success: total >= test.difficulty,
        })
    }

    /// Arithmetic of the roll, e.g. `"3 + 4 + 2 = 9"`. A zero bonus is left out.
    pub fn dice_display(&self) -> String {
        let [first, second] = self.dice;
        if self.bonus > 0 {
            format!("{first} + {second} + {} = {}", self.bonus, self.total)
        } else {
            format!("{first} + {second} = {}", self.total)
        }
    }

    /// Die faces, e.g. `"⚂ ⚃"`.
    pub fn faces(&self) -> String {
        faces(self.dice)
    }
}

fn faces(dice: [u8; 2]) -> String {
    dice.iter()
        .filter_map(|&d| die_face(d))
        .map(String::from)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Roll two dice and add the player's stat.
pub fn resolve_test(
    test: &StatTest,
    state: &PlayerState,
    dice: &mut dyn DiceSource,
) -> Result<TestOutcome, DiceError> {
    let (first, second) = roll_pair(dice)?;
    let outcome = TestOutcome::compute(test, state.stats().get(test.stat), first, second)?;
    tracing::debug!(
        stat = %test.stat,
        difficulty = test.difficulty,
        total = outcome.total,
        success = outcome.success,
        "Resolved stat test"
    );
    Ok(outcome)
}

/// Timing of the dice reveal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollSchedule {
    /// Number of tumbling frames before the result is shown.
    pub ticks: u32,
    pub tick_interval: Duration,
    /// How long the result stays up before the overlay closes.
    pub hold: Duration,
}

impl RollSchedule {
    /// Sixteen 100 ms frames, then a 2.5 s hold.
    pub const fn standard() -> Self {
        Self {
            ticks: 16,
            tick_interval: Duration::from_millis(100),
            hold: Duration::from_millis(2500),
        }
    }

    /// No frames and no waiting.
    pub const fn instant() -> Self {
        Self {
            ticks: 0,
            tick_interval: Duration::ZERO,
            hold: Duration::ZERO,
        }
    }

    pub fn total_duration(&self) -> Duration {
        self.tick_interval * self.ticks + self.hold
    }
}

impl Default for RollSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

/// Where the reveal animation is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollPhase {
    /// Cosmetic faces; unrelated to the real roll.
    Rolling { tick: u32, faces: [u8; 2] },
    Resolved(TestOutcome),
}

/// What the view is asked to draw for a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollFrame {
    /// e.g. `"Test Strength"`.
    pub label: String,
    pub difficulty: i32,
    pub phase: RollPhase,
}

impl RollFrame {
    pub fn faces(&self) -> String {
        match &self.phase {
            RollPhase::Rolling { faces: dice, .. } => faces(*dice),
            RollPhase::Resolved(outcome) => outcome.faces(),
        }
    }
}

async fn pause(duration: Duration) {
    if !duration.is_zero() {
        tokio::time::sleep(duration).await;
    }
}

/// Play the reveal for an already computed outcome.
pub async fn reveal<V: GameView + ?Sized>(
    schedule: &RollSchedule,
    label: &str,
    outcome: &TestOutcome,
    view: &mut V,
) {
    for tick in 1..=schedule.ticks {
        let tumble = {
            let mut rng = rand::thread_rng();
            [rng.gen_range(1..=6), rng.gen_range(1..=6)]
        };
        view.render_roll(&RollFrame {
            label: label.to_string(),
            difficulty: outcome.difficulty,
            phase: RollPhase::Rolling {
                tick,
                faces: tumble,
            },
        });
        pause(schedule.tick_interval).await;
    }

    view.render_roll(&RollFrame {
        label: label.to_string(),
        difficulty: outcome.difficulty,
        phase: RollPhase::Resolved(outcome.clone()),
    });
    pause(schedule.hold).await;
    view.close_roll();
}

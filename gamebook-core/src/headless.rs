//! Headless game interface for programmatic use.
//!
//! This module provides a simplified interface for playing a gamebook
//! without a front end. It's designed for:
//! - Automated walkthroughs of story content
//! - Scripts that check every branch of a story is reachable
//! - Agents playing the game by choice text
//!
//! # Example
//!
//! ```ignore
//! use gamebook_core::headless::{HeadlessConfig, HeadlessGame};
//! use gamebook_core::persist::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HeadlessConfig::quick_start("Ada");
//!     let store = Arc::new(MemoryStore::new());
//!     let mut game = HeadlessGame::open(config, "story.json", store).await?;
//!
//!     let response = game.choose("Search the hall").await?;
//!     println!("{}", response.text);
//!     println!("Health: {}/{}", response.health.0, response.health.1);
//!
//!     game.save().await?;
//!     Ok(())
//! }
//! ```

use crate::content::ContentRepository;
use crate::dice::RngDice;
use crate::engine::VisibleChoice;
use crate::persist::KeyValueStore;
use crate::resolver::{RollSchedule, TestOutcome};
use crate::rules::{ItemUse, StateChange};
use crate::session::{GameSession, LoadOutcome, SessionConfig, SessionError};
use crate::state::{PlayerState, Stat};
use crate::testing::RecordingView;
use std::path::Path;
use std::sync::Arc;

/// Configuration for a headless game.
#[derive(Debug, Clone)]
pub struct HeadlessConfig {
    /// Character name.
    pub name: String,
    /// Stat points to spend, in order. `None` spreads points evenly.
    pub stats: Option<Vec<(Stat, i32)>>,
    /// Perks to pick. `None` takes the first ones the story lists.
    pub perks: Option<Vec<String>>,
    /// Session settings.
    pub session: SessionConfig,
    /// Seed for reproducible dice.
    pub dice_seed: Option<u64>,
}

impl HeadlessConfig {
    /// Create a quick-start configuration with sensible defaults.
    ///
    /// Points are spread across the stats, perks are taken in story order,
    /// and dice reveals are instant.
    pub fn quick_start(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: None,
            perks: None,
            session: SessionConfig::new().with_roll_schedule(RollSchedule::instant()),
            dice_seed: None,
        }
    }

    /// Spend stat points explicitly.
    pub fn with_stats(mut self, stats: Vec<(Stat, i32)>) -> Self {
        self.stats = Some(stats);
        self
    }

    /// Pick perks explicitly.
    pub fn with_perks(mut self, perks: Vec<String>) -> Self {
        self.perks = Some(perks);
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.session = self.session.with_language(language);
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn with_dice_seed(mut self, seed: u64) -> Self {
        self.dice_seed = Some(seed);
        self
    }
}

/// A simplified response from the game.
#[derive(Debug, Clone)]
pub struct GameResponse {
    /// Node now shown.
    pub node: String,
    /// Text of that node.
    pub text: String,
    /// Choices now offered.
    pub choices: Vec<VisibleChoice>,
    /// The stat test rolled on the way, if any.
    pub test: Option<TestOutcome>,
    /// What the choice's effects did.
    pub changes: Vec<StateChange>,
    /// Current and maximum health.
    pub health: (u32, u32),
    /// Current and maximum sanity.
    pub sanity: (u32, u32),
}

/// An entry in the game transcript.
#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    /// Turn number, from 1.
    pub turn: usize,
    /// Text of the choice taken.
    pub choice: String,
    pub from: String,
    pub to: String,
    /// Roll arithmetic and result, e.g. `"3 + 4 + 2 = 9 (success)"`.
    pub roll: Option<String>,
}

/// A gamebook that can be played programmatically.
///
/// This wraps `GameSession` with a simpler interface for automated use.
pub struct HeadlessGame {
    session: GameSession<RecordingView>,
    /// Transcript of all choices taken.
    transcript: Vec<TranscriptEntry>,
}

impl HeadlessGame {
    /// Create a character from the configuration and start playing.
    pub async fn new(
        config: HeadlessConfig,
        content: Arc<ContentRepository>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SessionError> {
        let mut session =
            GameSession::new(config.session.clone(), content, store, RecordingView::default())?;
        if let Some(seed) = config.dice_seed {
            session = session.with_dice(Box::new(RngDice::seeded(seed)));
        }

        Self::create_character(&mut session, &config)?;
        session.start()?;

        Ok(Self {
            session,
            transcript: Vec::new(),
        })
    }

    /// Load a story file, then create a character and start playing.
    pub async fn open(
        config: HeadlessConfig,
        story_path: impl AsRef<Path>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SessionError> {
        let content = ContentRepository::load(story_path, &config.session.start_node).await?;
        Self::new(config, Arc::new(content), store).await
    }

    fn create_character(
        session: &mut GameSession<RecordingView>,
        config: &HeadlessConfig,
    ) -> Result<(), SessionError> {
        let builder = session.new_game()?;

        match &config.stats {
            Some(stats) => {
                for &(stat, points) in stats {
                    builder.adjust_stat(stat, points);
                }
            }
            None => {
                let mut order = Stat::all().iter().cycle();
                while builder.points_to_spend() > 0 {
                    let Some(&stat) = order.next() else { break };
                    builder.adjust_stat(stat, 1);
                }
            }
        }

        let perks: Vec<String> = match &config.perks {
            Some(perks) => perks.clone(),
            None => builder
                .available_perks()
                .iter()
                .take(usize::try_from(builder.perk_points_to_spend()).unwrap_or(0))
                .map(|p| p.id.clone())
                .collect(),
        };
        for perk in &perks {
            builder.toggle_perk(perk)?;
        }

        builder.set_name(config.name.clone());
        Ok(())
    }

    /// Take the visible choice whose text is `text`.
    pub async fn choose(&mut self, text: &str) -> Result<GameResponse, SessionError> {
        let choice = self
            .choices()?
            .into_iter()
            .find(|c| c.text == text)
            .ok_or_else(|| SessionError::UnknownChoice(text.to_string()))?;
        if !choice.allowed {
            return Err(SessionError::ChoiceLocked {
                text: choice.text,
                reason: choice.reason.unwrap_or_default(),
            });
        }

        self.session.view_mut().clear();
        let transition = self.session.select_choice(choice.index).await?;

        self.transcript.push(TranscriptEntry {
            turn: self.transcript.len() + 1,
            choice: choice.text,
            from: transition.from.clone(),
            to: transition.to.clone(),
            roll: transition.test.as_ref().map(|outcome| {
                let result = if outcome.success { "success" } else { "failure" };
                format!("{} ({result})", outcome.dice_display())
            }),
        });

        Ok(GameResponse {
            node: transition.to,
            text: self.current_text().to_string(),
            choices: self.choices()?,
            test: transition.test,
            changes: transition.changes,
            health: self.health(),
            sanity: self.sanity(),
        })
    }

    pub fn use_item(&mut self, index: usize) -> Result<ItemUse, SessionError> {
        self.session.use_item(index)
    }

    pub fn change_language(&mut self, language: &str) -> Result<(), SessionError> {
        self.session.change_language(language)
    }

    /// Save the current game.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        self.session.save().await
    }

    /// Restore the saved game, if any.
    pub async fn load(&mut self) -> Result<LoadOutcome, SessionError> {
        self.session.load().await
    }

    // ========================================================================
    // Game State Queries
    // ========================================================================

    fn player(&self) -> Option<&PlayerState> {
        self.session.state()
    }

    /// Choices offered at the current node.
    pub fn choices(&self) -> Result<Vec<VisibleChoice>, SessionError> {
        self.session.visible_choices()
    }

    pub fn player_name(&self) -> &str {
        self.player().map(PlayerState::character_name).unwrap_or_default()
    }

    pub fn current_node(&self) -> &str {
        self.session.current_node().unwrap_or_default()
    }

    /// Text of the current node.
    pub fn current_text(&self) -> &str {
        self.session
            .engine()
            .and_then(|engine| engine.node().ok())
            .map(|node| node.text.as_str())
            .unwrap_or_default()
    }

    pub fn health(&self) -> (u32, u32) {
        self.player()
            .map(|p| (p.stats().health, p.stats().max_health))
            .unwrap_or_default()
    }

    pub fn sanity(&self) -> (u32, u32) {
        self.player()
            .map(|p| (p.stats().sanity, p.stats().max_sanity))
            .unwrap_or_default()
    }

    /// No choice can be taken from here.
    pub fn is_finished(&self) -> bool {
        self.choices()
            .map(|choices| !choices.iter().any(|c| c.allowed))
            .unwrap_or(true)
    }

    pub fn transcript(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    pub fn turn_count(&self) -> usize {
        self.transcript.len()
    }

    /// Messages shown to the player since the last choice.
    pub fn notices(&self) -> Vec<&str> {
        self.session.view().notices()
    }

    pub fn session(&self) -> &GameSession<RecordingView> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut GameSession<RecordingView> {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use crate::testing::sample_repository;

    async fn game(config: HeadlessConfig) -> HeadlessGame {
        HeadlessGame::new(
            config.with_language("en"),
            sample_repository(),
            Arc::new(MemoryStore::new()),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_quick_start_spreads_points() {
        let game = game(HeadlessConfig::quick_start("Ada")).await;
        let stats = game.session().state().unwrap().stats();

        assert_eq!(game.player_name(), "Ada");
        assert_eq!(
            (stats.strength, stats.dexterity, stats.intelligence),
            (1, 1, 1)
        );
        assert!(game.session().state().unwrap().has_perk("lucky"));
        assert_eq!(game.current_node(), "start");
    }

    #[tokio::test]
    async fn test_walkthrough_to_the_end() {
        let config = HeadlessConfig::quick_start("Ada")
            .with_stats(vec![(Stat::Strength, 3)])
            .with_perks(vec!["tough".to_string()]);
        let mut game = game(config).await;

        game.choose("Search the hall").await.unwrap();
        game.choose("Pray at the altar").await.unwrap();
        game.choose("Unlock the door").await.unwrap();
        let response = game.choose("Touch the dark water").await.unwrap();

        assert_eq!(response.node, "end");
        assert_eq!(response.health, (2, 5));
        // Sanity was already full before the altar, so 5 - 2.
        assert_eq!(response.sanity, (3, 5));
        assert!(game.is_finished());
        assert_eq!(game.turn_count(), 4);
        assert_eq!(game.transcript()[2].to, "cellar");
    }

    #[tokio::test]
    async fn test_locked_and_unknown_choices() {
        let mut game = game(HeadlessConfig::quick_start("Ada")).await;

        assert!(matches!(
            game.choose("Unlock the door").await,
            Err(SessionError::ChoiceLocked { .. })
        ));
        assert!(matches!(
            game.choose("Fly away").await,
            Err(SessionError::UnknownChoice(_))
        ));
        assert_eq!(game.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_transcript_records_rolls() {
        let mut game = game(HeadlessConfig::quick_start("Ada").with_dice_seed(7)).await;
        let response = game.choose("Climb through the window").await.unwrap();

        let outcome = response.test.unwrap();
        let expected = if outcome.success { "window" } else { "window_fail" };
        assert_eq!(response.node, expected);

        let roll = game.transcript()[0].roll.as_deref().unwrap();
        assert!(roll.starts_with(&outcome.dice_display()));
    }
}

//! GameSession - the primary public API for playing a gamebook.
//!
//! A session wraps the story content, the save slot and a view, and moves
//! between three stages: the main menu, character creation and play.

use crate::character_builder::{BuilderError, CharacterBuilder};
use crate::content::{ContentError, ContentRepository};
use crate::dice::{DiceSource, RngDice};
use crate::engine::{EngineError, NarrativeEngine, Transition, VisibleChoice};
use crate::persist::{KeyValueStore, PersistError, Persistence, SaveRecord, SAVE_KEY};
use crate::resolver::RollSchedule;
use crate::rules::ItemUse;
use crate::state::{ItemEntry, PlayerState, STARTING_PERK_POINTS, STARTING_POINTS};
use crate::view::GameView;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors from GameSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Character error: {0}")]
    Builder(#[from] BuilderError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("No game is in progress")]
    NoActiveGame,

    #[error("No character is being created")]
    NotCreating,

    #[error("No visible choice '{0}'")]
    UnknownChoice(String),

    #[error("Choice '{text}' is locked: {reason}")]
    ChoiceLocked { text: String, reason: String },
}

/// Configuration for a game session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Node every new playthrough starts at.
    pub start_node: String,

    /// Language shown until the player picks another.
    pub language: String,

    /// Timing of the dice reveal.
    pub roll_schedule: RollSchedule,

    /// Key of the save slot.
    pub save_key: String,

    /// Stat points a new character gets to spend.
    pub starting_points: i32,

    /// Perk points a new character gets to spend.
    pub starting_perk_points: i32,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            start_node: "start".to_string(),
            language: "it".to_string(),
            roll_schedule: RollSchedule::standard(),
            save_key: SAVE_KEY.to_string(),
            starting_points: STARTING_POINTS,
            starting_perk_points: STARTING_PERK_POINTS,
        }
    }

    pub fn with_start_node(mut self, node: impl Into<String>) -> Self {
        self.start_node = node.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_roll_schedule(mut self, schedule: RollSchedule) -> Self {
        self.roll_schedule = schedule;
        self
    }

    pub fn with_save_key(mut self, key: impl Into<String>) -> Self {
        self.save_key = key.into();
        self
    }

    pub fn with_budget(mut self, points: i32, perk_points: i32) -> Self {
        self.starting_points = points;
        self.starting_perk_points = perk_points;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the session is.
pub enum Stage {
    Menu,
    Creating(CharacterBuilder),
    Playing(NarrativeEngine),
}

/// Result of [`GameSession::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Restored,
    /// The slot was empty; the session did not change.
    NoSave,
}

/// A running gamebook.
pub struct GameSession<V: GameView> {
    config: SessionConfig,
    content: Arc<ContentRepository>,
    persistence: Persistence,
    view: V,
    language: String,
    stage: Stage,
    /// Dice for the next engine, while no engine holds them.
    dice: Option<Box<dyn DiceSource>>,
}

impl<V: GameView> GameSession<V> {
    /// Create a session at the main menu.
    pub fn new(
        config: SessionConfig,
        content: Arc<ContentRepository>,
        store: Arc<dyn KeyValueStore>,
        view: V,
    ) -> Result<Self, SessionError> {
        content.bundle(&config.language)?;
        let persistence = Persistence::with_key(store, config.save_key.clone());

        Ok(Self {
            language: config.language.clone(),
            config,
            content,
            persistence,
            view,
            stage: Stage::Menu,
            dice: None,
        })
    }

    /// Load and validate the story file, then create a session.
    pub async fn open(
        config: SessionConfig,
        story_path: impl AsRef<Path>,
        store: Arc<dyn KeyValueStore>,
        view: V,
    ) -> Result<Self, SessionError> {
        let content = ContentRepository::load(story_path, &config.start_node).await?;
        Self::new(config, Arc::new(content), store, view)
    }

    /// Use these dice for stat tests.
    pub fn with_dice(mut self, dice: Box<dyn DiceSource>) -> Self {
        self.dice = Some(dice);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn content(&self) -> &Arc<ContentRepository> {
        &self.content
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.stage, Stage::Playing(_))
    }

    pub fn engine(&self) -> Option<&NarrativeEngine> {
        match &self.stage {
            Stage::Playing(engine) => Some(engine),
            _ => None,
        }
    }

    /// The player state of the game in progress.
    pub fn state(&self) -> Option<&PlayerState> {
        self.engine().map(NarrativeEngine::state)
    }

    pub fn current_node(&self) -> Option<&str> {
        self.engine().map(NarrativeEngine::current_node)
    }

    /// Leave the current stage, keeping the engine's dice for the next one.
    fn leave_stage(&mut self, next: Stage) {
        if let Stage::Playing(engine) = std::mem::replace(&mut self.stage, next) {
            self.dice = Some(engine.into_parts().dice);
        }
    }

    fn build_engine(
        &mut self,
        language: String,
        node: String,
        state: PlayerState,
    ) -> Result<NarrativeEngine, SessionError> {
        let engine = NarrativeEngine::new(Arc::clone(&self.content), language, node, state)?
            .with_schedule(self.config.roll_schedule);
        let dice = self
            .dice
            .take()
            .unwrap_or_else(|| Box::new(RngDice::from_entropy()));
        Ok(engine.with_dice(dice))
    }

    /// Start character creation for a new playthrough.
    pub fn new_game(&mut self) -> Result<&mut CharacterBuilder, SessionError> {
        let builder = CharacterBuilder::from_bundle(
            self.content.bundle(&self.language)?,
            self.config.starting_points,
            self.config.starting_perk_points,
        );
        self.leave_stage(Stage::Creating(builder));
        tracing::info!(language = %self.language, "Character creation started");
        self.builder_mut().ok_or(SessionError::NotCreating)
    }

    /// The character being created, if any.
    pub fn builder_mut(&mut self) -> Option<&mut CharacterBuilder> {
        match &mut self.stage {
            Stage::Creating(builder) => Some(builder),
            _ => None,
        }
    }

    /// Finish character creation and show the start node.
    ///
    /// Fails without changing anything if the character is not ready.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let Stage::Creating(builder) = &self.stage else {
            return Err(SessionError::NotCreating);
        };
        let state = builder.build()?;

        let engine =
            self.build_engine(self.language.clone(), self.config.start_node.clone(), state)?;
        engine.display(&mut self.view)?;
        tracing::info!(
            character = %engine.state().character_name(),
            node = %engine.current_node(),
            "Playthrough started"
        );
        self.stage = Stage::Playing(engine);
        Ok(())
    }

    /// Choices of the current node, with their requirement verdicts.
    pub fn visible_choices(&self) -> Result<Vec<VisibleChoice>, SessionError> {
        let engine = self.engine().ok_or(SessionError::NoActiveGame)?;
        Ok(engine.visible_choices()?)
    }

    /// Follow a choice of the current node.
    pub async fn select_choice(&mut self, index: usize) -> Result<Transition, SessionError> {
        let Stage::Playing(engine) = &mut self.stage else {
            return Err(SessionError::NoActiveGame);
        };
        Ok(engine.select_choice(index, &mut self.view).await?)
    }

    /// Finish a choice whose dice reveal was interrupted, using the roll
    /// already made.
    pub fn complete_test(&mut self) -> Result<Transition, SessionError> {
        let Stage::Playing(engine) = &mut self.stage else {
            return Err(SessionError::NoActiveGame);
        };
        Ok(engine.complete_test(&mut self.view)?)
    }

    pub fn use_item(&mut self, index: usize) -> Result<ItemUse, SessionError> {
        let Stage::Playing(engine) = &mut self.stage else {
            return Err(SessionError::NoActiveGame);
        };
        Ok(engine.use_item(index, &mut self.view)?)
    }

    pub fn drop_item(&mut self, index: usize) -> Result<ItemEntry, SessionError> {
        let Stage::Playing(engine) = &mut self.stage else {
            return Err(SessionError::NoActiveGame);
        };
        Ok(engine.drop_item(index, &mut self.view)?)
    }

    /// Switch language. During play the current node is kept and redrawn.
    pub fn change_language(&mut self, language: &str) -> Result<(), SessionError> {
        match &mut self.stage {
            Stage::Playing(engine) => engine.change_language(language, &mut self.view)?,
            _ => {
                self.content.bundle(language)?;
            }
        }
        self.language = language.to_string();
        Ok(())
    }

    /// Write the game in progress to the save slot.
    ///
    /// A choice still waiting on its dice reveal is completed first, so the
    /// slot never holds a half-applied choice.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        if self.engine().is_some_and(NarrativeEngine::is_awaiting_test) {
            let transition = self.complete_test()?;
            tracing::debug!(to = %transition.to, "Completed pending test before saving");
        }

        let record = {
            let engine = self.engine().ok_or(SessionError::NoActiveGame)?;
            SaveRecord::new(
                engine.state().clone(),
                engine.current_node(),
                engine.language(),
            )
        };
        self.persistence.save(&record).await?;

        let ui = &self.content.bundle(&self.language)?.ui;
        let message = format!("{} ✓", ui.get_or("saveGame", "Save"));
        self.view.notify(&message);
        Ok(())
    }

    /// Replace the session with the saved game, if there is one.
    ///
    /// Works from any stage. An empty slot leaves the session untouched and
    /// tells the player so.
    pub async fn load(&mut self) -> Result<LoadOutcome, SessionError> {
        let Some(record) = self.persistence.load().await? else {
            let ui = &self.content.bundle(&self.language)?.ui;
            let message = ui.get_or("noSaveFound", "No save found").to_string();
            self.view.notify(&message);
            return Ok(LoadOutcome::NoSave);
        };

        // Check the position first so a stale save cannot end the current game.
        if self
            .content
            .bundle(&record.current_lang)?
            .node(&record.current_node)
            .is_none()
        {
            return Err(EngineError::UnknownNode(record.current_node).into());
        }

        self.leave_stage(Stage::Menu);
        let SaveRecord {
            state,
            current_node,
            current_lang,
        } = record;
        let engine = self.build_engine(current_lang.clone(), current_node, state)?;
        engine.display(&mut self.view)?;

        self.language = current_lang;
        self.stage = Stage::Playing(engine);
        Ok(LoadOutcome::Restored)
    }

    /// Whether the save slot holds a game.
    pub async fn has_save(&self) -> Result<bool, SessionError> {
        Ok(self.persistence.has_save().await?)
    }

    /// Abandon the current game and return to the main menu.
    ///
    /// The save slot is not touched.
    pub fn restart(&mut self) {
        self.leave_stage(Stage::Menu);
        tracing::info!("Returned to main menu");
    }

    pub fn into_view(self) -> V {
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use crate::state::Stat;
    use crate::testing::{sample_repository, RecordingView, ScriptedDice, ViewEvent};

    fn session() -> GameSession<RecordingView> {
        session_with(RollSchedule::instant())
    }

    fn session_with(schedule: RollSchedule) -> GameSession<RecordingView> {
        let config = SessionConfig::new()
            .with_language("en")
            .with_roll_schedule(schedule);
        GameSession::new(
            config,
            sample_repository(),
            Arc::new(MemoryStore::new()),
            RecordingView::default(),
        )
        .unwrap()
        .with_dice(Box::new(ScriptedDice::new(vec![6]).unwrap()))
    }

    fn create_character(session: &mut GameSession<RecordingView>) {
        let builder = session.new_game().unwrap();
        builder.adjust_stat(Stat::Strength, 1);
        builder.adjust_stat(Stat::Dexterity, 2);
        builder.toggle_perk("lucky").unwrap();
        builder.set_name("Ada");
        session.start().unwrap();
    }

    #[test]
    fn test_config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.start_node, "start");
        assert_eq!(config.language, "it");
        assert_eq!(config.save_key, "gameSave");
        assert_eq!(config.starting_points, 3);
        assert_eq!(config.starting_perk_points, 1);
    }

    #[test]
    fn test_unknown_language_rejected() {
        let result = GameSession::new(
            SessionConfig::new().with_language("fr"),
            sample_repository(),
            Arc::new(MemoryStore::new()),
            RecordingView::default(),
        );
        assert!(matches!(result, Err(SessionError::Content(_))));
    }

    #[test]
    fn test_start_requires_ready_character() {
        let mut session = session();
        session.new_game().unwrap().set_name("Ada");

        assert!(matches!(session.start(), Err(SessionError::Builder(_))));
        assert!(session.builder_mut().is_some());
        assert!(!session.is_playing());
    }

    #[test]
    fn test_start_shows_start_node() {
        let mut session = session();
        create_character(&mut session);

        assert!(session.is_playing());
        assert_eq!(session.current_node(), Some("start"));
        assert_eq!(session.view().last_node(), Some("start"));
        assert_eq!(session.state().unwrap().character_name(), "Ada");
    }

    #[tokio::test]
    async fn test_play_without_game() {
        let mut session = session();
        assert!(matches!(
            session.select_choice(0).await,
            Err(SessionError::NoActiveGame)
        ));
        assert!(matches!(session.save().await, Err(SessionError::NoActiveGame)));
    }

    #[tokio::test]
    async fn test_load_empty_slot_notifies() {
        let mut session = session();
        assert_eq!(session.load().await.unwrap(), LoadOutcome::NoSave);
        assert!(!session.is_playing());
        assert!(session
            .view()
            .events
            .contains(&ViewEvent::Notice("No save found".to_string())));
    }

    #[tokio::test]
    async fn test_save_then_load_restores() {
        let mut session = session();
        create_character(&mut session);
        session.select_choice(0).await.unwrap();
        session.save().await.unwrap();
        let saved_state = session.state().unwrap().clone();
        let saved_node = session.current_node().unwrap().to_string();

        session.restart();
        assert!(!session.is_playing());

        assert_eq!(session.load().await.unwrap(), LoadOutcome::Restored);
        assert_eq!(session.state(), Some(&saved_state));
        assert_eq!(session.current_node(), Some(saved_node.as_str()));
    }

    /// Start the window climb with the full reveal and drop it partway.
    async fn interrupt_window_climb(session: &mut GameSession<RecordingView>) {
        let index = session
            .visible_choices()
            .unwrap()
            .into_iter()
            .find(|c| c.has_test)
            .unwrap()
            .index;
        let result = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            session.select_choice(index),
        )
        .await;
        assert!(result.is_err(), "reveal should still be running");
        assert!(session.engine().unwrap().is_awaiting_test());
    }

    #[tokio::test]
    async fn test_complete_interrupted_choice() {
        let mut session = session_with(RollSchedule::standard());
        create_character(&mut session);
        interrupt_window_climb(&mut session).await;

        assert!(matches!(
            session.select_choice(0).await,
            Err(SessionError::Engine(EngineError::TestInFlight))
        ));

        let transition = session.complete_test().unwrap();
        assert_eq!(transition.to, "window");
        assert_eq!(session.current_node(), Some("window"));
        assert!(session.state().unwrap().has_flag("tried_window"));
        assert!(matches!(
            session.complete_test(),
            Err(SessionError::Engine(EngineError::NoPendingTest))
        ));
    }

    #[tokio::test]
    async fn test_save_finishes_pending_choice() {
        let mut session = session_with(RollSchedule::standard());
        create_character(&mut session);
        interrupt_window_climb(&mut session).await;

        session.save().await.unwrap();
        assert!(!session.engine().unwrap().is_awaiting_test());

        session.restart();
        session.load().await.unwrap();
        assert_eq!(session.current_node(), Some("window"));
        let state = session.state().unwrap();
        assert!(state.has_flag("tried_window"));
        assert!(state.is_choice_used(&crate::state::ChoiceKey::new("start", 2)));
    }

    #[tokio::test]
    async fn test_language_change_in_menu_and_play() {
        let mut session = session();
        session.change_language("it").unwrap();
        assert_eq!(session.language(), "it");
        assert!(session.change_language("fr").is_err());
        assert_eq!(session.language(), "it");

        create_character(&mut session);
        session.change_language("en").unwrap();
        assert_eq!(session.engine().unwrap().language(), "en");
        assert_eq!(session.current_node(), Some("start"));
    }
}

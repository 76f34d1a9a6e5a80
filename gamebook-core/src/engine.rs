//! The narrative state machine.
//!
//! The engine owns the player state and the current position in the story
//! graph. Each call either renders the current node or moves along one
//! choice:
//!
//! 1. a oneshot choice is marked used;
//! 2. a stat test, if any, is resolved and its reveal played;
//! 3. the choice's effects are applied, whatever the test said;
//! 4. the engine moves to `next`, or `next + "_fail"` after a failed test.
//!
//! Requirements are not checked again at selection time. Offering only
//! allowed choices is the caller's job.

use crate::content::{fail_target, Choice, ContentBundle, ContentError, ContentRepository, Effects, Node};
use crate::dice::{DiceError, DiceSource, RngDice};
use crate::requirements::{self, Verdict};
use crate::resolver::{self, RollSchedule, TestOutcome};
use crate::rules::{self, ItemError, ItemUse, StateChange};
use crate::state::{ChoiceKey, ItemEntry, PlayerState};
use crate::view::{GameView, StatsPanel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Content error: {0}")]
    Content(#[from] ContentError),

    #[error("Unknown node: {0}")]
    UnknownNode(String),

    #[error("Node '{node}' has no choice {index}")]
    ChoiceOutOfRange { node: String, index: usize },

    #[error("A stat test is still being resolved")]
    TestInFlight,

    #[error("No stat test is waiting to complete")]
    NoPendingTest,

    #[error("Dice error: {0}")]
    Dice(#[from] DiceError),

    #[error("Item error: {0}")]
    Item(#[from] ItemError),
}

/// A choice as offered to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleChoice {
    /// Position in the node's declared choice list.
    pub index: usize,
    pub text: String,
    pub allowed: bool,
    pub reason: Option<String>,
    pub has_test: bool,
}

/// Choices of `node` the player can see, in declared order.
///
/// Used oneshot choices are left out; the rest carry the requirement verdict.
pub fn visible_choices(
    node_id: &str,
    node: &Node,
    state: &PlayerState,
    bundle: &ContentBundle,
) -> Vec<VisibleChoice> {
    node.choices
        .iter()
        .enumerate()
        .filter(|(index, choice)| {
            !choice.oneshot || !state.is_choice_used(&ChoiceKey::new(node_id, *index))
        })
        .map(|(index, choice)| {
            let Verdict { allowed, reason } =
                requirements::evaluate(choice.requirements.as_ref(), state, bundle);
            VisibleChoice {
                index,
                text: choice.text.clone(),
                allowed,
                reason,
                has_test: choice.test.is_some(),
            }
        })
        .collect()
}

/// The result of following a choice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub from: String,
    pub choice_index: usize,
    pub to: String,
    pub test: Option<TestOutcome>,
    pub changes: Vec<StateChange>,
}

/// A choice whose test has been rolled but whose reveal has not finished.
#[derive(Debug, Clone)]
struct PendingTest {
    from: String,
    choice_index: usize,
    target: String,
    outcome: TestOutcome,
    effects: Option<Effects>,
}

/// Owned pieces of an engine, returned by [`NarrativeEngine::into_parts`].
pub struct EngineParts {
    pub state: PlayerState,
    pub current_node: String,
    pub language: String,
    pub dice: Box<dyn DiceSource>,
}

/// Walks a player through one language's story graph.
pub struct NarrativeEngine {
    content: Arc<ContentRepository>,
    language: String,
    current_node: String,
    state: PlayerState,
    dice: Box<dyn DiceSource>,
    schedule: RollSchedule,
    pending: Option<PendingTest>,
}

impl NarrativeEngine {
    /// Create an engine positioned at `node`.
    ///
    /// Uses OS-seeded dice and the standard reveal schedule.
    pub fn new(
        content: Arc<ContentRepository>,
        language: impl Into<String>,
        node: impl Into<String>,
        state: PlayerState,
    ) -> Result<Self, EngineError> {
        let language = language.into();
        let current_node = node.into();
        if content.bundle(&language)?.node(&current_node).is_none() {
            return Err(EngineError::UnknownNode(current_node));
        }

        Ok(Self {
            content,
            language,
            current_node,
            state,
            dice: Box::new(RngDice::from_entropy()),
            schedule: RollSchedule::standard(),
            pending: None,
        })
    }

    pub fn with_dice(mut self, dice: Box<dyn DiceSource>) -> Self {
        self.dice = dice;
        self
    }

    pub fn with_schedule(mut self, schedule: RollSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn current_node(&self) -> &str {
        &self.current_node
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn content(&self) -> &Arc<ContentRepository> {
        &self.content
    }

    /// A test has been rolled and the engine is waiting for its reveal.
    pub fn is_awaiting_test(&self) -> bool {
        self.pending.is_some()
    }

    pub fn bundle(&self) -> Result<&ContentBundle, EngineError> {
        Ok(self.content.bundle(&self.language)?)
    }

    pub fn node(&self) -> Result<&Node, EngineError> {
        self.bundle()?
            .node(&self.current_node)
            .ok_or_else(|| EngineError::UnknownNode(self.current_node.clone()))
    }

    /// Choices of the current node the player can see.
    pub fn visible_choices(&self) -> Result<Vec<VisibleChoice>, EngineError> {
        let bundle = self.bundle()?;
        let node = self.node()?;
        Ok(visible_choices(&self.current_node, node, &self.state, bundle))
    }

    /// No visible choice can be taken: the story has ended here.
    pub fn is_terminal(&self) -> Result<bool, EngineError> {
        Ok(!self.visible_choices()?.iter().any(|c| c.allowed))
    }

    /// Render the current node, its choices and the stat panel.
    pub fn display<V: GameView + ?Sized>(&self, view: &mut V) -> Result<(), EngineError> {
        let node = self.node()?;
        view.render_node(&self.current_node, node);
        view.render_choices(&self.visible_choices()?);
        view.render_stats(&StatsPanel::from_state(&self.state));
        Ok(())
    }

    /// Follow choice `index` of the current node.
    pub async fn select_choice<V: GameView + ?Sized>(
        &mut self,
        index: usize,
        view: &mut V,
    ) -> Result<Transition, EngineError> {
        self.ensure_idle()?;

        let from = self.current_node.clone();
        let choice: Choice = self
            .node()?
            .choices
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::ChoiceOutOfRange {
                node: from.clone(),
                index,
            })?;

        // Marked before the test so a failed roll still uses the choice up.
        if choice.oneshot {
            self.state.record_choice(ChoiceKey::new(&from, index));
        }

        let Some(test) = choice.test else {
            return self.finish(from, index, choice.next, None, choice.effects.as_ref(), view);
        };

        let outcome = resolver::resolve_test(&test, &self.state, self.dice.as_mut())?;
        let target = if outcome.success {
            choice.next
        } else {
            fail_target(&choice.next)
        };
        let label = self.test_label(&outcome)?;

        self.pending = Some(PendingTest {
            from,
            choice_index: index,
            target,
            outcome: outcome.clone(),
            effects: choice.effects,
        });

        resolver::reveal(&self.schedule, &label, &outcome, view).await;
        self.complete_test(view)
    }

    /// Complete a test whose reveal was interrupted.
    ///
    /// The outcome rolled in [`Self::select_choice`] is kept; nothing is re-rolled.
    pub fn complete_test<V: GameView + ?Sized>(
        &mut self,
        view: &mut V,
    ) -> Result<Transition, EngineError> {
        let pending = self.pending.take().ok_or(EngineError::NoPendingTest)?;
        self.finish(
            pending.from,
            pending.choice_index,
            pending.target,
            Some(pending.outcome),
            pending.effects.as_ref(),
            view,
        )
    }

    fn finish<V: GameView + ?Sized>(
        &mut self,
        from: String,
        choice_index: usize,
        to: String,
        test: Option<TestOutcome>,
        effects: Option<&Effects>,
        view: &mut V,
    ) -> Result<Transition, EngineError> {
        let changes = effects
            .map(|effects| rules::apply_effects(&mut self.state, effects))
            .unwrap_or_default();

        tracing::debug!(from = %from, choice = choice_index, to = %to, "Node transition");
        self.current_node = to.clone();
        self.display(view)?;

        Ok(Transition {
            from,
            choice_index,
            to,
            test,
            changes,
        })
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.pending.is_some() {
            return Err(EngineError::TestInFlight);
        }
        Ok(())
    }

    fn test_label(&self, outcome: &TestOutcome) -> Result<String, EngineError> {
        let ui = &self.bundle()?.ui;
        let stat = outcome.stat.name();
        Ok(format!("{} {}", ui.get_or("test", "Test"), ui.get_or(stat, stat)))
    }

    /// Use the inventory entry at `index`, then refresh the view.
    pub fn use_item<V: GameView + ?Sized>(
        &mut self,
        index: usize,
        view: &mut V,
    ) -> Result<ItemUse, EngineError> {
        self.ensure_idle()?;
        let content = Arc::clone(&self.content);
        let bundle = content.bundle(&self.language)?;
        let used = rules::use_item(&mut self.state, bundle, index)?;
        view.notify(&used.message);
        self.display(view)?;
        Ok(used)
    }

    /// Drop the inventory entry at `index`, then refresh the view.
    pub fn drop_item<V: GameView + ?Sized>(
        &mut self,
        index: usize,
        view: &mut V,
    ) -> Result<ItemEntry, EngineError> {
        self.ensure_idle()?;
        let dropped = rules::drop_item(&mut self.state, index)?;
        self.display(view)?;
        Ok(dropped)
    }

    /// Switch to another language bundle, staying on the same node.
    pub fn change_language<V: GameView + ?Sized>(
        &mut self,
        language: &str,
        view: &mut V,
    ) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let bundle = self.content.bundle(language)?;
        if bundle.node(&self.current_node).is_none() {
            return Err(EngineError::UnknownNode(self.current_node.clone()));
        }

        tracing::debug!(from = %self.language, to = language, "Changed language");
        self.language = language.to_string();
        self.display(view)
    }

    pub fn into_parts(self) -> EngineParts {
        EngineParts {
            state: self.state,
            current_node: self.current_node,
            language: self.language,
            dice: self.dice,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_repository, started_state, RecordingView, ScriptedDice};
    use crate::view::NullView;
    use std::time::Duration;

    fn engine(dice: Vec<u8>) -> NarrativeEngine {
        NarrativeEngine::new(sample_repository(), "en", "start", started_state())
            .unwrap()
            .with_dice(Box::new(ScriptedDice::new(dice).unwrap()))
            .with_schedule(RollSchedule::instant())
    }

    #[test]
    fn test_unknown_start() {
        let result = NarrativeEngine::new(sample_repository(), "en", "nowhere", started_state());
        assert!(matches!(result, Err(EngineError::UnknownNode(_))));

        let result = NarrativeEngine::new(sample_repository(), "xx", "start", started_state());
        assert!(matches!(result, Err(EngineError::Content(_))));
    }

    #[test]
    fn test_visible_choices_annotated() {
        let engine = engine(vec![1]);
        let choices = engine.visible_choices().unwrap();

        assert_eq!(choices.len(), 4);
        let door = choices.iter().find(|c| c.text == "Unlock the door").unwrap();
        assert!(!door.allowed);
        assert!(door.reason.as_deref().unwrap().contains("key"));
        assert!(choices.iter().any(|c| c.has_test));
    }

    #[tokio::test]
    async fn test_oneshot_hidden_after_use() {
        let mut engine = engine(vec![1]);
        let mut view = NullView;

        let search = engine
            .visible_choices()
            .unwrap()
            .into_iter()
            .find(|c| c.text == "Search the hall")
            .unwrap();
        let transition = engine.select_choice(search.index, &mut view).await.unwrap();
        assert_eq!(transition.to, "start");
        assert_eq!(engine.state().inventory().len(), 1);

        let choices = engine.visible_choices().unwrap();
        assert!(choices.iter().all(|c| c.text != "Search the hall"));
        let door = choices.iter().find(|c| c.text == "Unlock the door").unwrap();
        assert!(door.allowed);
    }

    #[tokio::test]
    async fn test_failed_test_goes_to_fail_node_and_applies_effects() {
        let mut engine = engine(vec![1, 1]);
        let mut view = NullView;
        let index = engine
            .visible_choices()
            .unwrap()
            .into_iter()
            .find(|c| c.has_test)
            .unwrap()
            .index;

        let transition = engine.select_choice(index, &mut view).await.unwrap();
        let outcome = transition.test.unwrap();
        assert!(!outcome.success);
        assert_eq!(transition.to, "window_fail");
        assert_eq!(engine.current_node(), "window_fail");
        // Effects apply regardless of the roll.
        assert!(engine.state().has_flag("tried_window"));
        // The oneshot is spent even though the test failed.
        assert!(engine
            .state()
            .is_choice_used(&ChoiceKey::new("start", index)));
    }

    #[tokio::test]
    async fn test_successful_test_goes_to_next() {
        let mut engine = engine(vec![6, 6]);
        let mut view = RecordingView::default();
        let index = engine
            .visible_choices()
            .unwrap()
            .into_iter()
            .find(|c| c.has_test)
            .unwrap()
            .index;

        let transition = engine.select_choice(index, &mut view).await.unwrap();
        assert_eq!(transition.to, "window");
        assert!(!engine.is_awaiting_test());
        assert_eq!(view.roll_frames().len(), 1);
        assert_eq!(view.last_node(), Some("window"));
    }

    #[tokio::test]
    async fn test_choice_out_of_range() {
        let mut engine = engine(vec![1]);
        let err = engine.select_choice(42, &mut NullView).await.unwrap_err();
        assert!(matches!(err, EngineError::ChoiceOutOfRange { index: 42, .. }));
    }

    #[test]
    fn test_complete_without_pending() {
        let mut engine = engine(vec![1]);
        assert!(matches!(
            engine.complete_test(&mut NullView),
            Err(EngineError::NoPendingTest)
        ));
    }

    fn window_index(engine: &NarrativeEngine) -> usize {
        engine
            .visible_choices()
            .unwrap()
            .into_iter()
            .find(|c| c.has_test)
            .unwrap()
            .index
    }

    /// Start a tested choice with the full reveal and drop it partway.
    async fn interrupted(dice: Vec<u8>) -> NarrativeEngine {
        let mut engine = engine(dice).with_schedule(RollSchedule::standard());
        let index = window_index(&engine);
        let mut view = NullView;
        let result = tokio::time::timeout(
            Duration::from_millis(50),
            engine.select_choice(index, &mut view),
        )
        .await;
        assert!(result.is_err(), "reveal should still be running");
        engine
    }

    #[tokio::test]
    async fn test_interrupted_reveal_completes_with_same_roll() {
        let mut engine = interrupted(vec![1, 1]).await;
        assert!(engine.is_awaiting_test());
        assert_eq!(engine.current_node(), "start");

        let mut view = RecordingView::default();
        let transition = engine.complete_test(&mut view).unwrap();
        let outcome = transition.test.unwrap();
        assert_eq!(outcome.dice, [1, 1]);
        assert!(!outcome.success);
        assert_eq!(engine.current_node(), "window_fail");
        assert!(engine.state().has_flag("tried_window"));
        assert!(!engine.is_awaiting_test());
        assert_eq!(view.last_node(), Some("window_fail"));
    }

    #[tokio::test]
    async fn test_pending_test_blocks_state_changes() {
        let mut engine = interrupted(vec![6, 6]).await;
        let mut view = NullView;

        assert!(matches!(
            engine.select_choice(0, &mut view).await,
            Err(EngineError::TestInFlight)
        ));
        assert!(matches!(
            engine.use_item(0, &mut view),
            Err(EngineError::TestInFlight)
        ));
        assert!(matches!(
            engine.drop_item(0, &mut view),
            Err(EngineError::TestInFlight)
        ));
        assert!(matches!(
            engine.change_language("it", &mut view),
            Err(EngineError::TestInFlight)
        ));
        assert_eq!(engine.language(), "en");

        engine.complete_test(&mut view).unwrap();
        assert_eq!(engine.current_node(), "window");
        engine.change_language("it", &mut view).unwrap();
    }

    #[tokio::test]
    async fn test_change_language_keeps_node() {
        let mut engine = engine(vec![1]);
        let mut view = RecordingView::default();
        engine.change_language("it", &mut view).unwrap();

        assert_eq!(engine.language(), "it");
        assert_eq!(engine.current_node(), "start");
        assert_eq!(view.last_node(), Some("start"));
        assert!(matches!(
            engine.change_language("fr", &mut view),
            Err(EngineError::Content(_))
        ));
    }
}

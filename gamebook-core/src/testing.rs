//! Testing utilities for gamebooks.
//!
//! This module provides tools for integration testing:
//! - `ScriptedDice` for deterministic stat tests
//! - `RecordingView` for checking what the player was shown
//! - `TestHarness` for walking through a story by choice text
//! - Assertion helpers for verifying player state

use crate::content::{ContentRepository, Node};
use crate::dice::{check_die, DiceError, DiceSource};
use crate::engine::{EngineError, NarrativeEngine, Transition, VisibleChoice};
use crate::resolver::{RollFrame, RollSchedule};
use crate::state::{PlayerState, Stat};
use crate::view::{GameView, StatsPanel};
use std::sync::Arc;

/// Dice that replay a fixed sequence, starting over when it runs out.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    values: Vec<u8>,
    next: usize,
}

impl ScriptedDice {
    /// Every value must be a valid die face.
    pub fn new(values: Vec<u8>) -> Result<Self, DiceError> {
        if values.is_empty() {
            return Err(DiceError::Empty);
        }
        for &value in &values {
            check_die(value)?;
        }
        Ok(Self { values, next: 0 })
    }

    /// Number of dice rolled so far.
    pub fn rolled(&self) -> usize {
        self.next
    }
}

impl DiceSource for ScriptedDice {
    fn roll_d6(&mut self) -> u8 {
        let value = self.values[self.next % self.values.len()];
        self.next += 1;
        value
    }
}

/// Something a [`RecordingView`] was asked to show.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Node { id: String, text: String },
    Choices(Vec<VisibleChoice>),
    Stats(StatsPanel),
    Roll(RollFrame),
    RollClosed,
    Notice(String),
}

/// A view that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingView {
    pub events: Vec<ViewEvent>,
}

impl RecordingView {
    /// Id of the node rendered last.
    pub fn last_node(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|e| match e {
            ViewEvent::Node { id, .. } => Some(id.as_str()),
            _ => None,
        })
    }

    pub fn last_choices(&self) -> Option<&[VisibleChoice]> {
        self.events.iter().rev().find_map(|e| match e {
            ViewEvent::Choices(choices) => Some(choices.as_slice()),
            _ => None,
        })
    }

    pub fn last_stats(&self) -> Option<&StatsPanel> {
        self.events.iter().rev().find_map(|e| match e {
            ViewEvent::Stats(panel) => Some(panel),
            _ => None,
        })
    }

    pub fn roll_frames(&self) -> Vec<&RollFrame> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Roll(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                ViewEvent::Notice(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl GameView for RecordingView {
    fn render_node(&mut self, node_id: &str, node: &Node) {
        self.events.push(ViewEvent::Node {
            id: node_id.to_string(),
            text: node.text.clone(),
        });
    }

    fn render_choices(&mut self, choices: &[VisibleChoice]) {
        self.events.push(ViewEvent::Choices(choices.to_vec()));
    }

    fn render_stats(&mut self, panel: &StatsPanel) {
        self.events.push(ViewEvent::Stats(panel.clone()));
    }

    fn render_roll(&mut self, frame: &RollFrame) {
        self.events.push(ViewEvent::Roll(frame.clone()));
    }

    fn close_roll(&mut self) {
        self.events.push(ViewEvent::RollClosed);
    }

    fn notify(&mut self, message: &str) {
        self.events.push(ViewEvent::Notice(message.to_string()));
    }
}

/// A small two-language story exercising every content feature.
pub const SAMPLE_STORY: &str = r#"{
    "en": {
        "title": "The Dusty Hall",
        "ui": {
            "requires": "Requires",
            "test": "Test",
            "dexterity": "Dexterity",
            "saveGame": "Save",
            "noSaveFound": "No save found"
        },
        "perks": [
            { "id": "lucky", "name": "Lucky", "description": "Fortune smiles on you." },
            { "id": "tough", "name": "Tough", "description": "Hard to put down." }
        ],
        "items": {
            "key": { "name": "Rusty key", "type": "permanent" },
            "potion": {
                "name": "Potion",
                "type": "consumable",
                "usable": true,
                "effects": { "health": 2 },
                "useMessage": "You feel better."
            }
        },
        "nodes": {
            "start": {
                "text": "A dusty hall.",
                "choices": [
                    {
                        "text": "Search the hall",
                        "next": "start",
                        "oneshot": true,
                        "effects": { "items": [{ "id": "key", "name": "Rusty key", "type": "permanent" }] }
                    },
                    {
                        "text": "Unlock the door",
                        "next": "cellar",
                        "requirements": { "items": ["key"] }
                    },
                    {
                        "text": "Climb through the window",
                        "next": "window",
                        "oneshot": true,
                        "test": { "stat": "dexterity", "difficulty": 8 },
                        "effects": { "flags": ["tried_window"] }
                    },
                    {
                        "text": "Pray at the altar",
                        "next": "start",
                        "requirements": { "perks": ["tough"] },
                        "effects": { "sanity": 1 }
                    }
                ]
            },
            "cellar": {
                "text": "Cold stone steps lead down.",
                "choices": [
                    {
                        "text": "Take the potion",
                        "next": "cellar",
                        "oneshot": true,
                        "effects": { "items": [{ "id": "potion", "name": "Potion", "type": "consumable" }] }
                    },
                    {
                        "text": "Touch the dark water",
                        "next": "end",
                        "effects": { "health": -3, "sanity": -2 }
                    }
                ]
            },
            "window": {
                "text": "You slip outside.",
                "choices": [{ "text": "Go back", "next": "start" }]
            },
            "window_fail": {
                "text": "You fall into the bushes.",
                "choices": [{ "text": "Get up", "next": "start", "effects": { "health": -1 } }]
            },
            "end": { "text": "The water takes you.", "choices": [] }
        }
    },
    "it": {
        "title": "La sala polverosa",
        "ui": {
            "requires": "Richiede",
            "test": "Prova",
            "dexterity": "Destrezza",
            "saveGame": "Salva",
            "noSaveFound": "Nessun salvataggio trovato"
        },
        "perks": [
            { "id": "lucky", "name": "Fortunato" },
            { "id": "tough", "name": "Robusto" }
        ],
        "items": {
            "key": { "name": "Chiave arrugginita", "type": "permanent" },
            "potion": {
                "name": "Pozione",
                "type": "consumable",
                "usable": true,
                "effects": { "health": 2 },
                "useMessage": "Ti senti meglio."
            }
        },
        "nodes": {
            "start": {
                "text": "Una sala polverosa.",
                "choices": [
                    {
                        "text": "Perquisisci la sala",
                        "next": "start",
                        "oneshot": true,
                        "effects": { "items": [{ "id": "key", "name": "Chiave arrugginita", "type": "permanent" }] }
                    },
                    {
                        "text": "Apri la porta",
                        "next": "cellar",
                        "requirements": { "items": ["key"] }
                    },
                    {
                        "text": "Arrampicati dalla finestra",
                        "next": "window",
                        "oneshot": true,
                        "test": { "stat": "dexterity", "difficulty": 8 },
                        "effects": { "flags": ["tried_window"] }
                    },
                    {
                        "text": "Prega all'altare",
                        "next": "start",
                        "requirements": { "perks": ["tough"] },
                        "effects": { "sanity": 1 }
                    }
                ]
            },
            "cellar": {
                "text": "Gradini di pietra scendono nel buio.",
                "choices": [
                    {
                        "text": "Prendi la pozione",
                        "next": "cellar",
                        "oneshot": true,
                        "effects": { "items": [{ "id": "potion", "name": "Pozione", "type": "consumable" }] }
                    },
                    {
                        "text": "Tocca l'acqua scura",
                        "next": "end",
                        "effects": { "health": -3, "sanity": -2 }
                    }
                ]
            },
            "window": {
                "text": "Scivoli fuori.",
                "choices": [{ "text": "Torna indietro", "next": "start" }]
            },
            "window_fail": {
                "text": "Cadi tra i cespugli.",
                "choices": [{ "text": "Rialzati", "next": "start", "effects": { "health": -1 } }]
            },
            "end": { "text": "L'acqua ti prende.", "choices": [] }
        }
    }
}"#;

/// [`SAMPLE_STORY`], parsed and validated.
pub fn sample_repository() -> Arc<ContentRepository> {
    let repository = ContentRepository::from_json(SAMPLE_STORY, "start")
        .unwrap_or_else(|e| panic!("Sample story is invalid: {e}"));
    Arc::new(repository)
}

/// A finished character: strength 1, dexterity 2, no perks, named "Tester".
pub fn started_state() -> PlayerState {
    let mut state = PlayerState::with_budget(0, 0);
    state.stats.set(Stat::Strength, 1);
    state.stats.set(Stat::Dexterity, 2);
    state.character_name = "Tester".to_string();
    state
}

/// Test harness for walking through the sample story.
pub struct TestHarness {
    /// The engine under test.
    pub engine: NarrativeEngine,
    /// Everything the engine rendered.
    pub view: RecordingView,
}

impl TestHarness {
    /// A harness at the start node with [`started_state`] and dice that
    /// always roll 6.
    pub fn new() -> Self {
        Self::with_state(started_state())
    }

    pub fn with_state(state: PlayerState) -> Self {
        let engine = match NarrativeEngine::new(sample_repository(), "en", "start", state) {
            Ok(engine) => engine,
            Err(e) => panic!("Sample story has no start node: {e}"),
        };
        Self {
            engine: engine.with_schedule(RollSchedule::instant()),
            view: RecordingView::default(),
        }
        .with_dice(vec![6])
    }

    /// Replace the dice with a scripted sequence.
    pub fn with_dice(mut self, values: Vec<u8>) -> Self {
        let dice = match ScriptedDice::new(values) {
            Ok(dice) => dice,
            Err(e) => panic!("Invalid scripted dice: {e}"),
        };
        self.engine = self.engine.with_dice(Box::new(dice));
        self
    }

    /// Follow the visible choice whose text is `text`.
    pub async fn choose(&mut self, text: &str) -> Result<Transition, EngineError> {
        let index = self.choice_index(text).unwrap_or_else(|| {
            panic!(
                "No visible choice '{text}' at node '{}'",
                self.engine.current_node()
            )
        });
        self.engine.select_choice(index, &mut self.view).await
    }

    /// Declared index of the visible choice with this text.
    pub fn choice_index(&self, text: &str) -> Option<usize> {
        self.visible_choice(text).map(|c| c.index)
    }

    pub fn visible_choice(&self, text: &str) -> Option<VisibleChoice> {
        self.engine
            .visible_choices()
            .ok()?
            .into_iter()
            .find(|c| c.text == text)
    }

    pub fn state(&self) -> &PlayerState {
        self.engine.state()
    }

    pub fn current_node(&self) -> &str {
        self.engine.current_node()
    }

    /// Current health as (current, max).
    pub fn health(&self) -> (u32, u32) {
        let stats = self.state().stats();
        (stats.health, stats.max_health)
    }

    /// Current sanity as (current, max).
    pub fn sanity(&self) -> (u32, u32) {
        let stats = self.state().stats();
        (stats.sanity, stats.max_sanity)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert that the engine is at `node`.
#[track_caller]
pub fn assert_at(harness: &TestHarness, node: &str) {
    assert_eq!(
        harness.current_node(),
        node,
        "Expected to be at node '{node}'"
    );
}

/// Assert player health.
#[track_caller]
pub fn assert_health(harness: &TestHarness, current: u32, max: u32) {
    let (actual_current, actual_max) = harness.health();
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected health {current}/{max}, got {actual_current}/{actual_max}"
    );
}

/// Assert player sanity.
#[track_caller]
pub fn assert_sanity(harness: &TestHarness, current: u32, max: u32) {
    let (actual_current, actual_max) = harness.sanity();
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected sanity {current}/{max}, got {actual_current}/{actual_max}"
    );
}

/// Assert that a story flag is set.
#[track_caller]
pub fn assert_has_flag(harness: &TestHarness, flag: &str) {
    assert!(
        harness.state().has_flag(flag),
        "Expected flag '{flag}' to be set"
    );
}

/// Assert that the inventory holds an entry with this id.
#[track_caller]
pub fn assert_has_item(harness: &TestHarness, item: &str) {
    assert!(
        harness.state().has_item(item),
        "Expected item '{item}' in inventory"
    );
}

/// Assert that a choice is not offered at all.
#[track_caller]
pub fn assert_choice_hidden(harness: &TestHarness, text: &str) {
    assert!(
        harness.visible_choice(text).is_none(),
        "Expected choice '{text}' to be hidden"
    );
}

/// Assert that a choice is shown but locked, with a reason naming `missing`.
#[track_caller]
pub fn assert_choice_locked(harness: &TestHarness, text: &str, missing: &str) {
    let choice = harness
        .visible_choice(text)
        .unwrap_or_else(|| panic!("Expected choice '{text}' to be visible"));
    assert!(!choice.allowed, "Expected choice '{text}' to be locked");
    let reason = choice.reason.unwrap_or_default();
    assert!(
        reason.contains(missing),
        "Expected lock reason for '{text}' to mention '{missing}', got '{reason}'"
    );
}

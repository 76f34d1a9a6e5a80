//! Gamebook runtime: a choice-driven story engine.
//!
//! This crate provides:
//! - A narrative state machine over a JSON story graph
//! - Requirement checks and effect application for choices and items
//! - 2d6 stat tests with an injectable dice source
//! - Character creation with stat and perk budgets
//! - Save/load through a pluggable key-value store
//!
//! # Quick Start
//!
//! ```ignore
//! use gamebook_core::{GameSession, SessionConfig};
//! use gamebook_core::persist::FileStore;
//! use gamebook_core::view::NullView;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new().with_language("en");
//!     let store = Arc::new(FileStore::new("saves"));
//!     let mut session = GameSession::open(config, "story.json", store, NullView).await?;
//!
//!     let builder = session.new_game()?;
//!     builder.set_name("Ada");
//!     // ... spend points, pick a perk ...
//!     session.start()?;
//!
//!     let transition = session.select_choice(0).await?;
//!     println!("Now at {}", transition.to);
//!
//!     session.save().await?;
//!     Ok(())
//! }
//! ```

pub mod character_builder;
pub mod content;
pub mod dice;
pub mod engine;
pub mod headless;
pub mod persist;
pub mod requirements;
pub mod resolver;
pub mod rules;
pub mod session;
pub mod state;
pub mod testing;
pub mod view;
pub mod worker;

// Primary public API
pub use character_builder::{BuilderError, CharacterBuilder, PerkToggle};
pub use content::{ContentBundle, ContentError, ContentRepository};
pub use dice::{DiceSource, RngDice};
pub use engine::{EngineError, NarrativeEngine, Transition, VisibleChoice};
pub use headless::{HeadlessConfig, HeadlessGame};
pub use persist::{FileStore, KeyValueStore, MemoryStore, PersistError, Persistence, SaveRecord};
pub use resolver::{RollSchedule, TestOutcome};
pub use session::{GameSession, LoadOutcome, SessionConfig, SessionError};
pub use state::{PlayerState, Stat};
pub use testing::{RecordingView, ScriptedDice, TestHarness};
pub use view::{GameView, NullView};
pub use worker::{spawn_worker, WorkerRequest, WorkerResponse};

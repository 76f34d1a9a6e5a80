//! Character creation through a session.

use gamebook_core::character_builder::{BuilderError, PerkToggle};
use gamebook_core::persist::MemoryStore;
use gamebook_core::session::{GameSession, SessionConfig, SessionError, Stage};
use gamebook_core::state::Stat;
use gamebook_core::testing::sample_repository;
use gamebook_core::view::NullView;
use std::sync::Arc;

fn session(config: SessionConfig) -> GameSession<NullView> {
    GameSession::new(
        config.with_language("en"),
        sample_repository(),
        Arc::new(MemoryStore::new()),
        NullView,
    )
    .unwrap()
}

#[test]
fn test_budget_must_be_spent_exactly() {
    let mut session = session(SessionConfig::new());
    let builder = session.new_game().unwrap();
    assert_eq!(builder.points_to_spend(), 3);
    assert_eq!(builder.perk_points_to_spend(), 1);
    assert_eq!(builder.available_perks().len(), 2);

    builder.set_name("Ada");
    assert!(builder.adjust_stat(Stat::Strength, 1));
    assert!(builder.adjust_stat(Stat::Dexterity, 1));
    assert_eq!(
        builder.toggle_perk("lucky").unwrap(),
        PerkToggle::Selected
    );

    assert!(matches!(
        session.start(),
        Err(SessionError::Builder(BuilderError::NotReady { points: 1, .. }))
    ));

    let builder = session.builder_mut().unwrap();
    assert!(builder.adjust_stat(Stat::Intelligence, 1));
    assert!(!builder.adjust_stat(Stat::Intelligence, 1));
    session.start().unwrap();

    let state = session.state().unwrap();
    assert_eq!(state.stats().get(Stat::Strength), 1);
    assert_eq!(state.stats().get(Stat::Dexterity), 1);
    assert_eq!(state.stats().get(Stat::Intelligence), 1);
    assert!(state.has_perk("lucky"));
    assert_eq!(state.points_to_spend(), 0);
}

#[test]
fn test_custom_budget() {
    let mut session = session(SessionConfig::new().with_budget(5, 2));
    let builder = session.new_game().unwrap();
    builder.set_name("Ada");
    assert!(builder.adjust_stat(Stat::Strength, 5));
    builder.toggle_perk("lucky").unwrap();
    builder.toggle_perk("tough").unwrap();
    assert!(builder.is_ready());

    session.start().unwrap();
    let state = session.state().unwrap();
    assert_eq!(state.stats().strength, 5);
    assert_eq!(state.capacity(), 10);
}

#[test]
fn test_blank_name_blocks_start() {
    let mut session = session(SessionConfig::new());
    let builder = session.new_game().unwrap();
    builder.adjust_stat(Stat::Strength, 3);
    builder.toggle_perk("tough").unwrap();
    builder.set_name("  ");

    assert!(matches!(
        session.start(),
        Err(SessionError::Builder(BuilderError::NotReady {
            name_missing: true,
            ..
        }))
    ));
}

#[test]
fn test_restart_goes_back_to_menu() {
    let mut session = session(SessionConfig::new());
    let builder = session.new_game().unwrap();
    builder.adjust_stat(Stat::Strength, 3);
    builder.toggle_perk("tough").unwrap();
    builder.set_name("Ada");
    session.start().unwrap();

    session.restart();
    assert!(matches!(session.stage(), Stage::Menu));
    assert!(session.state().is_none());

    let builder = session.new_game().unwrap();
    assert_eq!(builder.points_to_spend(), 3);
    assert_eq!(builder.perk_points_to_spend(), 1);
    assert!(builder.name().is_empty());
}

#[test]
fn test_start_outside_creation() {
    let mut session = session(SessionConfig::new());
    assert!(matches!(session.start(), Err(SessionError::NotCreating)));
}

//! Save/load through a session, with the slot on disk.

use gamebook_core::persist::{FileStore, KeyValueStore, SAVE_KEY};
use gamebook_core::resolver::RollSchedule;
use gamebook_core::session::{GameSession, LoadOutcome, SessionConfig, SessionError};
use gamebook_core::state::Stat;
use gamebook_core::testing::{sample_repository, RecordingView, ScriptedDice};
use std::sync::Arc;
use tempfile::TempDir;

fn session(store: Arc<dyn KeyValueStore>) -> GameSession<RecordingView> {
    let config = SessionConfig::new()
        .with_language("en")
        .with_roll_schedule(RollSchedule::instant());
    GameSession::new(config, sample_repository(), store, RecordingView::default())
        .unwrap()
        .with_dice(Box::new(ScriptedDice::new(vec![5]).unwrap()))
}

fn start(session: &mut GameSession<RecordingView>) {
    let builder = session.new_game().unwrap();
    builder.adjust_stat(Stat::Intelligence, 3);
    builder.toggle_perk("tough").unwrap();
    builder.set_name("Ada");
    session.start().unwrap();
}

#[tokio::test]
async fn test_save_survives_a_new_session() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(dir.path()));

    let mut first = session(Arc::clone(&store));
    start(&mut first);
    first.select_choice(0).await.unwrap();
    first.select_choice(1).await.unwrap();
    first.change_language("it").unwrap();
    first.save().await.unwrap();
    let saved = first.state().unwrap().clone();

    let mut second = session(store);
    assert!(second.has_save().await.unwrap());
    assert_eq!(second.load().await.unwrap(), LoadOutcome::Restored);

    assert_eq!(second.state(), Some(&saved));
    assert_eq!(second.current_node(), Some("cellar"));
    assert_eq!(second.language(), "it");
    assert_eq!(second.view().last_node(), Some("cellar"));
}

#[tokio::test]
async fn test_save_file_layout() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = FileStore::new(dir.path());

    let mut session = session(Arc::new(store.clone()));
    start(&mut session);
    session.select_choice(0).await.unwrap();
    session.save().await.unwrap();

    let raw = std::fs::read_to_string(store.path_for(SAVE_KEY)).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["currentNode"], "start");
    assert_eq!(json["currentLang"], "en");
    assert_eq!(json["state"]["characterName"], "Ada");
    assert_eq!(json["state"]["stats"]["intelligence"], 3);
    assert_eq!(json["state"]["stats"]["maxHealth"], 5);
    assert_eq!(json["state"]["pointsToSpend"], 0);
    assert_eq!(json["state"]["perks"][0], "tough");
    assert_eq!(json["state"]["usedChoices"][0], "start_0");
    assert_eq!(json["state"]["inventory"][0]["id"], "key");
}

#[tokio::test]
async fn test_load_replaces_progress() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = session(Arc::new(FileStore::new(dir.path())));
    start(&mut session);
    session.save().await.unwrap();

    session.select_choice(0).await.unwrap();
    assert!(session.state().unwrap().has_item("key"));

    session.load().await.unwrap();
    assert!(!session.state().unwrap().has_item("key"));
    assert!(session.visible_choices().unwrap()[0].text == "Search the hall");
}

#[tokio::test]
async fn test_empty_slot_keeps_the_game() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let mut session = session(Arc::new(FileStore::new(dir.path())));
    start(&mut session);
    session.select_choice(0).await.unwrap();

    assert_eq!(session.load().await.unwrap(), LoadOutcome::NoSave);
    assert!(session.state().unwrap().has_item("key"));
    assert_eq!(session.view().notices(), vec!["No save found"]);
}

#[tokio::test]
async fn test_stale_save_is_rejected() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = Arc::new(FileStore::new(dir.path()));
    let mut session = session(store.clone());
    start(&mut session);
    session.save().await.unwrap();

    let raw = store.get(SAVE_KEY).await.unwrap().unwrap();
    let stale = raw.replace("\"currentNode\":\"start\"", "\"currentNode\":\"attic\"");
    store.set(SAVE_KEY, stale).await.unwrap();

    session.select_choice(0).await.unwrap();
    let err = session.load().await.unwrap_err();
    assert!(matches!(err, SessionError::Engine(_)));
    // The game in progress is untouched.
    assert!(session.state().unwrap().has_item("key"));
}

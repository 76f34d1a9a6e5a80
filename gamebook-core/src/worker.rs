//! Background game worker.
//!
//! Runs a [`GameSession`] on its own task and talks to a front end over
//! channels. Requests are handled one at a time, so input sent while a dice
//! reveal is playing waits until the transition has finished.

use crate::engine::Transition;
use crate::rules::ItemUse;
use crate::session::{GameSession, LoadOutcome, SessionError};
use crate::state::{ItemEntry, Stat};
use crate::view::GameView;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Request sent from the front end to the worker.
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    /// Begin character creation.
    NewGame,
    AdjustStat(Stat, i32),
    TogglePerk(String),
    SetName(String),
    /// Finish character creation and start playing.
    Start,
    SelectChoice(usize),
    UseItem(usize),
    DropItem(usize),
    ChangeLanguage(String),
    Save,
    Load,
    /// Back to the main menu.
    Restart,
    /// Stop the worker and hand the session back.
    Shutdown,
}

/// Response sent from the worker to the front end.
#[derive(Debug, Clone)]
pub enum WorkerResponse {
    /// Character creation state after a creation request.
    Character {
        points: i32,
        perk_points: i32,
        ready: bool,
    },
    Started { node: String },
    Transition(Transition),
    ItemUsed(ItemUse),
    ItemDropped(ItemEntry),
    LanguageChanged(String),
    SaveComplete,
    LoadComplete(LoadOutcome),
    Restarted,
    /// The worker has stopped.
    Stopped,
    /// The request failed; the session is unchanged.
    Error(String),
}

/// Spawn the worker on the current tokio runtime.
///
/// The join handle yields the session once the worker stops.
pub fn spawn_worker<V>(
    session: GameSession<V>,
) -> (
    mpsc::Sender<WorkerRequest>,
    mpsc::Receiver<WorkerResponse>,
    JoinHandle<GameSession<V>>,
)
where
    V: GameView + 'static,
{
    let (request_tx, request_rx) = mpsc::channel(8);
    let (response_tx, response_rx) = mpsc::channel(64);

    let handle = tokio::spawn(worker_loop(session, request_rx, response_tx));

    (request_tx, response_rx, handle)
}

/// The main worker loop that processes requests.
async fn worker_loop<V: GameView>(
    mut session: GameSession<V>,
    mut request_rx: mpsc::Receiver<WorkerRequest>,
    response_tx: mpsc::Sender<WorkerResponse>,
) -> GameSession<V> {
    loop {
        let Some(request) = request_rx.recv().await else {
            break;
        };

        tracing::debug!(?request, "Worker request");
        let shutdown = matches!(request, WorkerRequest::Shutdown);
        let response = handle_request(&mut session, request)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Worker request failed");
                WorkerResponse::Error(e.to_string())
            });

        if response_tx.send(response).await.is_err() {
            tracing::debug!("Response channel closed, stopping worker");
            break;
        }
        if shutdown {
            break;
        }
    }

    session
}

fn character_response<V: GameView>(
    session: &mut GameSession<V>,
) -> Result<WorkerResponse, SessionError> {
    let builder = session.builder_mut().ok_or(SessionError::NotCreating)?;
    Ok(WorkerResponse::Character {
        points: builder.points_to_spend(),
        perk_points: builder.perk_points_to_spend(),
        ready: builder.is_ready(),
    })
}

async fn handle_request<V: GameView>(
    session: &mut GameSession<V>,
    request: WorkerRequest,
) -> Result<WorkerResponse, SessionError> {
    match request {
        WorkerRequest::NewGame => {
            session.new_game()?;
            character_response(session)
        }
        WorkerRequest::AdjustStat(stat, delta) => {
            let builder = session.builder_mut().ok_or(SessionError::NotCreating)?;
            builder.adjust_stat(stat, delta);
            character_response(session)
        }
        WorkerRequest::TogglePerk(perk) => {
            let builder = session.builder_mut().ok_or(SessionError::NotCreating)?;
            builder.toggle_perk(&perk)?;
            character_response(session)
        }
        WorkerRequest::SetName(name) => {
            let builder = session.builder_mut().ok_or(SessionError::NotCreating)?;
            builder.set_name(name);
            character_response(session)
        }
        WorkerRequest::Start => {
            session.start()?;
            let node = session.current_node().unwrap_or_default().to_string();
            Ok(WorkerResponse::Started { node })
        }
        WorkerRequest::SelectChoice(index) => Ok(WorkerResponse::Transition(
            session.select_choice(index).await?,
        )),
        WorkerRequest::UseItem(index) => Ok(WorkerResponse::ItemUsed(session.use_item(index)?)),
        WorkerRequest::DropItem(index) => {
            Ok(WorkerResponse::ItemDropped(session.drop_item(index)?))
        }
        WorkerRequest::ChangeLanguage(language) => {
            session.change_language(&language)?;
            Ok(WorkerResponse::LanguageChanged(language))
        }
        WorkerRequest::Save => {
            session.save().await?;
            Ok(WorkerResponse::SaveComplete)
        }
        WorkerRequest::Load => Ok(WorkerResponse::LoadComplete(session.load().await?)),
        WorkerRequest::Restart => {
            session.restart();
            Ok(WorkerResponse::Restarted)
        }
        WorkerRequest::Shutdown => Ok(WorkerResponse::Stopped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemoryStore;
    use crate::resolver::RollSchedule;
    use crate::session::SessionConfig;
    use crate::testing::{sample_repository, ScriptedDice};
    use crate::view::NullView;
    use std::sync::Arc;

    fn session() -> GameSession<NullView> {
        let config = SessionConfig::new()
            .with_language("en")
            .with_roll_schedule(RollSchedule::instant());
        GameSession::new(
            config,
            sample_repository(),
            Arc::new(MemoryStore::new()),
            NullView,
        )
        .unwrap()
        .with_dice(Box::new(ScriptedDice::new(vec![6]).unwrap()))
    }

    async fn request(
        tx: &mpsc::Sender<WorkerRequest>,
        rx: &mut mpsc::Receiver<WorkerResponse>,
        request: WorkerRequest,
    ) -> WorkerResponse {
        tx.send(request).await.unwrap();
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_worker_plays_and_returns_session() {
        let (tx, mut rx, handle) = spawn_worker(session());

        request(&tx, &mut rx, WorkerRequest::NewGame).await;
        request(&tx, &mut rx, WorkerRequest::AdjustStat(Stat::Strength, 3)).await;
        request(&tx, &mut rx, WorkerRequest::TogglePerk("lucky".into())).await;
        let response = request(&tx, &mut rx, WorkerRequest::SetName("Ada".into())).await;
        assert!(matches!(
            response,
            WorkerResponse::Character { ready: true, .. }
        ));

        let response = request(&tx, &mut rx, WorkerRequest::Start).await;
        assert!(matches!(response, WorkerResponse::Started { ref node } if node == "start"));

        let response = request(&tx, &mut rx, WorkerRequest::SelectChoice(0)).await;
        assert!(matches!(response, WorkerResponse::Transition(_)));

        let response = request(&tx, &mut rx, WorkerRequest::Shutdown).await;
        assert!(matches!(response, WorkerResponse::Stopped));
        let session = handle.await.unwrap();
        assert_eq!(session.state().unwrap().inventory().len(), 1);
    }

    #[tokio::test]
    async fn test_worker_reports_errors() {
        let (tx, mut rx, handle) = spawn_worker(session());

        let response = request(&tx, &mut rx, WorkerRequest::SelectChoice(0)).await;
        assert!(matches!(response, WorkerResponse::Error(_)));

        let response = request(&tx, &mut rx, WorkerRequest::Start).await;
        assert!(matches!(response, WorkerResponse::Error(_)));

        drop(tx);
        let session = handle.await.unwrap();
        assert!(!session.is_playing());
    }
}

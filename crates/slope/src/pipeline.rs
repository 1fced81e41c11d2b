//! Async wrapper around [`SlopeEngine`].
//!
//! One task owns the engine and drains a single ordered input queue, so a
//! command always lands between two fixes. Presentation events fan out over a
//! broadcast channel where a slow subscriber loses the oldest updates. Finished
//! sessions are written by a second task so a slow store never holds up fixes.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
};

use crate::{
    engine::{EngineEvent, Output, SlopeEngine},
    errors::{PipelineError, SessionError},
    models::Fix,
    session::{Command, Session, StateKind},
    track_store::TrackStore,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub input_capacity: usize,
    pub event_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            input_capacity: 1024,
            event_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

enum Input {
    Fix(Fix),
    Command(Command, oneshot::Sender<Result<StateKind, SessionError>>),
}

pub struct PipelineHandle {
    input: mpsc::Sender<Input>,
    event_tx: broadcast::Sender<EngineEvent>,
    engine_task: JoinHandle<SlopeEngine>,
    persist_task: JoinHandle<()>,
}

pub fn spawn(engine: SlopeEngine, store: Arc<dyn TrackStore>, options: PipelineOptions) -> PipelineHandle {
    let (input, input_rx) = mpsc::channel(options.input_capacity);
    let (event_tx, _) = broadcast::channel(options.event_capacity);
    let (persist_tx, persist_rx) = mpsc::unbounded_channel();

    let persist_task = tokio::spawn(persist_sessions(
        store,
        persist_rx,
        event_tx.clone(),
        options.retry,
    ));
    let engine_task = tokio::spawn(run_engine(engine, input_rx, event_tx.clone(), persist_tx));

    PipelineHandle {
        input,
        event_tx,
        engine_task,
        persist_task,
    }
}

impl PipelineHandle {
    pub async fn submit(&self, fix: Fix) -> Result<(), PipelineError> {
        self.input
            .send(Input::Fix(fix))
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Queues a fix without waiting for room.
    pub fn try_submit(&self, fix: Fix) -> Result<(), PipelineError> {
        self.input.try_send(Input::Fix(fix)).map_err(|e| match e {
            TrySendError::Full(_) => PipelineError::Full,
            TrySendError::Closed(_) => PipelineError::Closed,
        })
    }

    /// Applies a command after every fix queued before it, returning the
    /// resulting state.
    pub async fn command(&self, command: Command) -> Result<StateKind, PipelineError> {
        let (reply, response) = oneshot::channel();
        self.input
            .send(Input::Command(command, reply))
            .await
            .map_err(|_| PipelineError::Closed)?;
        let state = response.await.map_err(|_| PipelineError::Closed)??;
        Ok(state)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Stops accepting input, waits for pending sessions to be written and
    /// hands the engine back.
    pub async fn shutdown(self) -> Result<SlopeEngine, PipelineError> {
        let Self {
            input,
            engine_task,
            persist_task,
            ..
        } = self;
        drop(input);

        let engine = engine_task
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        persist_task
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        Ok(engine)
    }
}

async fn run_engine(
    mut engine: SlopeEngine,
    mut input: mpsc::Receiver<Input>,
    event_tx: broadcast::Sender<EngineEvent>,
    persist_tx: mpsc::UnboundedSender<Session>,
) -> SlopeEngine {
    while let Some(next) = input.recv().await {
        match next {
            Input::Fix(fix) => {
                let output = engine.submit(&fix);
                dispatch(output, &event_tx, &persist_tx);
            }
            Input::Command(command, reply) => {
                let result = engine.command(command).map(|output| {
                    dispatch(output, &event_tx, &persist_tx);
                    engine.state()
                });
                if let Err(e) = &result {
                    tracing::warn!("Rejected command: {}", e);
                }
                // The caller may have stopped waiting.
                let _ = reply.send(result);
            }
        }
    }

    tracing::debug!("Input closed, engine task exiting");
    engine
}

fn dispatch(
    output: Output,
    event_tx: &broadcast::Sender<EngineEvent>,
    persist_tx: &mpsc::UnboundedSender<Session>,
) {
    for event in output.events {
        // No subscribers is fine.
        let _ = event_tx.send(event);
    }
    if let Some(session) = output.finalized
        && let Err(e) = persist_tx.send(session)
    {
        tracing::error!("Persistence task gone, dropping session {}", e.0.id);
    }
}

async fn persist_sessions(
    store: Arc<dyn TrackStore>,
    mut sessions: mpsc::UnboundedReceiver<Session>,
    event_tx: broadcast::Sender<EngineEvent>,
    retry: RetryPolicy,
) {
    while let Some(session) = sessions.recv().await {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let Err(e) = store.save(&session).await else {
                break;
            };

            let gave_up = attempt >= retry.max_attempts;
            tracing::error!(
                "Failed to persist session {} (attempt {}/{}): {}",
                session.id,
                attempt,
                retry.max_attempts,
                e
            );
            let _ = event_tx.send(EngineEvent::PersistenceFailed {
                session_id: session.id,
                attempt,
                error: e.to_string(),
                gave_up,
            });
            if gave_up {
                break;
            }
            tokio::time::sleep(retry.delay(attempt)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicU32, Ordering},
    };

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::{
        config::EngineConfig,
        errors::PersistenceError,
        models::AltitudeSource,
        track_store::ObjectTrackStore,
    };

    /// Fails the first `failures` saves, then keeps everything in memory.
    #[derive(Default)]
    struct FlakyStore {
        failures: u32,
        calls: AtomicU32,
        saved: Mutex<Vec<Session>>,
    }

    #[async_trait]
    impl TrackStore for FlakyStore {
        async fn save(&self, session: &Session) -> Result<(), PersistenceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(PersistenceError::Io(std::io::Error::other("disk full")));
            }
            self.saved.lock().unwrap().push(session.clone());
            Ok(())
        }

        async fn load(&self, id: Uuid) -> Result<Session, PersistenceError> {
            self.saved
                .lock()
                .unwrap()
                .iter()
                .find(|s| s.id == id)
                .cloned()
                .ok_or(PersistenceError::NotFound(id))
        }
    }

    fn fast_retry(max_attempts: u32) -> PipelineOptions {
        PipelineOptions {
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
            },
            ..PipelineOptions::default()
        }
    }

    fn ride() -> Vec<Fix> {
        (0..=20)
            .map(|t| {
                let lat = 46.0 + (t as f64 * 5.0 / 6_371_008.8).to_degrees();
                Fix::at_seconds(t as f64, lat, 7.0)
                    .with_altitude(100.0 + t as f64 * 0.25, AltitudeSource::Gps(3.0))
            })
            .collect()
    }

    fn drain(rx: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_retry_backoff_doubles_and_caps() {
        let retry = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(retry.delay(1), Duration::from_millis(100));
        assert_eq!(retry.delay(2), Duration::from_millis(200));
        assert_eq!(retry.delay(3), Duration::from_millis(400));
        assert_eq!(retry.delay(4), Duration::from_millis(500));
        assert_eq!(retry.delay(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_ride_through_pipeline_is_stored() {
        let store = Arc::new(ObjectTrackStore::in_memory());
        let handle = spawn(
            SlopeEngine::new(EngineConfig::default()),
            store.clone(),
            PipelineOptions::default(),
        );
        let mut events = handle.subscribe();

        assert_eq!(handle.command(Command::Start).await, Ok(StateKind::Recording));
        for fix in ride() {
            handle.submit(fix).await.unwrap();
        }
        assert_eq!(handle.command(Command::Stop).await, Ok(StateKind::Stopped));
        let engine = handle.shutdown().await.unwrap();

        let events = drain(&mut events);
        let updates = events
            .iter()
            .filter(|e| matches!(e, EngineEvent::GradeUpdate { .. }))
            .count();
        assert_eq!(updates, 20);

        let Some(EngineEvent::SessionFinalized { session_id, summary }) = events
            .iter()
            .find(|e| matches!(e, EngineEvent::SessionFinalized { .. }))
            .cloned()
        else {
            panic!("no finalized event in {events:?}");
        };
        assert!((summary.distance_m - 100.0).abs() < 0.01);

        let stored = store.load(session_id).await.unwrap();
        assert_eq!(Some(&stored), engine.session());
    }

    #[tokio::test]
    async fn test_invalid_command_is_returned_to_caller() {
        let handle = spawn(
            SlopeEngine::new(EngineConfig::default()),
            Arc::new(FlakyStore::default()),
            PipelineOptions::default(),
        );
        assert_eq!(
            handle.command(Command::Resume).await,
            Err(PipelineError::Session(SessionError::InvalidTransition {
                state: StateKind::Idle,
                command: Command::Resume,
            }))
        );
        let engine = handle.shutdown().await.unwrap();
        assert_eq!(engine.state(), StateKind::Idle);
    }

    #[tokio::test]
    async fn test_failed_writes_are_retried() {
        let store = Arc::new(FlakyStore {
            failures: 2,
            ..FlakyStore::default()
        });
        let handle = spawn(
            SlopeEngine::new(EngineConfig::default()),
            store.clone(),
            fast_retry(5),
        );
        let mut events = handle.subscribe();

        handle.command(Command::Start).await.unwrap();
        for fix in ride() {
            handle.submit(fix).await.unwrap();
        }
        handle.command(Command::Stop).await.unwrap();
        handle.shutdown().await.unwrap();

        let failures: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::PersistenceFailed {
                    attempt, gave_up, ..
                } => Some((attempt, gave_up)),
                _ => None,
            })
            .collect();
        assert_eq!(failures, vec![(1, false), (2, false)]);
        assert_eq!(store.saved.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = Arc::new(FlakyStore {
            failures: u32::MAX,
            ..FlakyStore::default()
        });
        let handle = spawn(
            SlopeEngine::new(EngineConfig::default()),
            store.clone(),
            fast_retry(3),
        );
        let mut events = handle.subscribe();

        handle.command(Command::Start).await.unwrap();
        handle.command(Command::Stop).await.unwrap();
        handle.shutdown().await.unwrap();

        let last = drain(&mut events)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::PersistenceFailed { .. }))
            .last();
        assert!(matches!(
            last,
            Some(EngineEvent::PersistenceFailed {
                attempt: 3,
                gave_up: true,
                ..
            })
        ));
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }
}

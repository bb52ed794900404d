//! Session registry
//!
//! Owns every live session by id. The transport layer calls `create` on
//! connect and `destroy` on disconnect; commands for unknown ids are no-ops.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;

use super::SessionEvent;
use super::runner::{LoopContext, LoopExit, SessionShared, spawn_session};
use crate::highscores::LeaderboardStore;
use crate::settings::Settings;
use crate::sim::{Action, DecisionPolicy, Mode, Session};

/// Events buffered per subscriber before it starts lagging
pub const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct EpisodeSlot {
    shared: Option<Arc<SessionShared>>,
    task: Option<JoinHandle<LoopExit>>,
}

/// One connection's slot in the registry
#[derive(Debug)]
pub struct SessionHandle {
    events: broadcast::Sender<SessionEvent>,
    current: Mutex<EpisodeSlot>,
}

impl SessionHandle {
    fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            events,
            current: Mutex::new(EpisodeSlot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EpisodeSlot> {
        self.current.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn running(&self) -> Option<Arc<SessionShared>> {
        self.lock().shared.clone().filter(|s| s.is_running())
    }

    pub fn is_running(&self) -> bool {
        self.running().is_some()
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    settings: Settings,
    context: Arc<LoopContext>,
}

impl SessionRegistry {
    pub fn new(settings: Settings, leaderboard: Arc<dyn LeaderboardStore>) -> Self {
        let context = Arc::new(LoopContext::from_settings(&settings, leaderboard));
        Self {
            sessions: RwLock::new(HashMap::new()),
            settings,
            context,
        }
    }

    /// Replace the policy used by autonomous sessions started afterwards
    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        Arc::make_mut(&mut self.context).policy = policy;
        self
    }

    async fn get(&self, id: &str) -> Option<Arc<SessionHandle>> {
        let handle = self.sessions.read().await.get(id).cloned();
        if handle.is_none() {
            log::debug!("Ignoring command for unknown session {}", id);
        }
        handle
    }

    /// Register a new Idle session. Returns false if the id is taken.
    pub async fn create(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(id) {
            log::warn!("Session {} already exists", id);
            return false;
        }
        sessions.insert(id.to_string(), Arc::new(SessionHandle::new()));
        log::info!("Session {} connected ({} active)", id, sessions.len());
        true
    }

    /// Stop and forget a session
    pub async fn destroy(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(handle) => {
                if let Some(shared) = handle.lock().shared.take() {
                    shared.stop();
                }
                log::info!("Session {} disconnected", id);
                true
            }
            None => false,
        }
    }

    /// Begin a fresh episode. Ignored while an episode is already running.
    pub async fn start(&self, id: &str, mode: Mode, player_name: &str) -> bool {
        let Some(handle) = self.get(id).await else {
            return false;
        };
        let mut current = handle.lock();
        if current.shared.as_ref().is_some_and(|s| s.is_running()) {
            log::debug!("Session {} is already running", id);
            return false;
        }

        let seed = self.settings.seed.unwrap_or_else(rand::random);
        let mut session = Session::new(id, seed);
        session.start(mode, player_name);
        log::info!(
            "Session {} started: mode={}, player={}, seed={}",
            id,
            mode.as_str(),
            session.player_name,
            seed
        );

        let shared = Arc::new(SessionShared::new(handle.events.clone()));
        current.task = Some(spawn_session(session, shared.clone(), self.context.clone()));
        current.shared = Some(shared);
        true
    }

    /// Queue an action for the next tick. Ignored unless running.
    pub async fn submit_action(&self, id: &str, action: Action) -> bool {
        let Some(handle) = self.get(id).await else {
            return false;
        };
        match handle.running() {
            Some(shared) => {
                shared.submit(action);
                true
            }
            None => {
                log::debug!("Ignoring {} for idle session {}", action.as_str(), id);
                false
            }
        }
    }

    /// Cancel the running episode, if any
    pub async fn stop(&self, id: &str) -> bool {
        let Some(handle) = self.get(id).await else {
            return false;
        };
        match handle.running() {
            Some(shared) => {
                shared.stop();
                true
            }
            None => false,
        }
    }

    pub async fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<SessionEvent>> {
        self.get(id).await.map(|h| h.events.subscribe())
    }

    pub async fn is_running(&self, id: &str) -> bool {
        match self.sessions.read().await.get(id) {
            Some(handle) => handle.is_running(),
            None => false,
        }
    }

    /// Wait for the current episode's task to return
    pub async fn join(&self, id: &str) -> Option<LoopExit> {
        let handle = self.get(id).await?;
        let task = handle.lock().task.take()?;
        match task.await {
            Ok(exit) => Some(exit),
            Err(err) => {
                log::error!("Session {} task failed: {}", id, err);
                None
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PolicyError;
    use crate::highscores::MemoryLeaderboardStore;
    use crate::sim::{ActionScorer, Observation};

    struct ExplodingScorer;

    impl ActionScorer for ExplodingScorer {
        fn name(&self) -> &str {
            "exploding"
        }

        fn score(&self, _observation: &Observation) -> Result<Vec<f32>, PolicyError> {
            panic!("scorer exploded")
        }
    }

    fn registry(dir: &std::path::Path) -> SessionRegistry {
        let settings = Settings {
            spawn_chance: 0.0,
            seed: Some(11),
            data_dir: dir.to_path_buf(),
            ..Default::default()
        };
        SessionRegistry::new(settings, Arc::new(MemoryLeaderboardStore::new()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_session_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(!registry.start("ghost", Mode::Human, "p").await);
        assert!(!registry.submit_action("ghost", Action::Jump).await);
        assert!(!registry.stop("ghost").await);
        assert!(!registry.destroy("ghost").await);
        assert!(registry.subscribe("ghost").await.is_none());
        assert!(registry.join("ghost").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_is_unique() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        assert!(registry.create("a").await);
        assert!(!registry.create("a").await);
        assert!(registry.create("b").await);
        assert_eq!(registry.len().await, 2);
        assert!(registry.destroy("a").await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_ignored_until_started() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create("s").await;
        assert!(!registry.submit_action("s", Action::Left).await);

        registry.start("s", Mode::Human, "p").await;
        assert!(registry.is_running("s").await);
        assert!(registry.submit_action("s", Action::Left).await);
        assert!(!registry.start("s", Mode::Human, "again").await);

        assert!(registry.stop("s").await);
        assert_eq!(registry.join("s").await, Some(LoopExit::Cancelled));
        assert!(!registry.is_running("s").await);
        assert!(!registry.submit_action("s", Action::Left).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create("s").await;
        let mut events = registry.subscribe("s").await.unwrap();

        registry.start("s", Mode::Human, "").await;
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Snapshot(_)));
        registry.stop("s").await;
        assert_eq!(registry.join("s").await, Some(LoopExit::Cancelled));

        // Fresh episode on the same subscription, counting from zero again
        assert!(registry.start("s", Mode::Autonomous, "bot").await);
        let mut restarted = None;
        while restarted.is_none() {
            match events.recv().await.unwrap() {
                SessionEvent::Snapshot(s) if s.mode == Mode::Autonomous => restarted = Some(s),
                _ => {}
            }
        }
        assert_eq!(restarted.map(|s| s.frame), Some(1));
        registry.destroy("s").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_tick_frees_session_for_restart() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            registry(dir.path()).with_policy(DecisionPolicy::learned(Arc::new(ExplodingScorer)));
        registry.create("s").await;
        let mut events = registry.subscribe("s").await.unwrap();

        assert!(registry.start("s", Mode::Autonomous, "bot").await);
        assert!(matches!(registry.join("s").await, Some(LoopExit::Faulted(_))));
        assert!(!registry.is_running("s").await);
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Aborted { .. }));

        assert!(registry.start("s", Mode::Human, "p").await);
        assert!(registry.is_running("s").await);
        registry.destroy("s").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_loop() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(dir.path());
        registry.create("s").await;
        let mut events = registry.subscribe("s").await.unwrap();
        registry.start("s", Mode::Autonomous, "bot").await;
        assert!(matches!(events.recv().await.unwrap(), SessionEvent::Snapshot(_)));

        registry.destroy("s").await;
        loop {
            match events.recv().await {
                Ok(SessionEvent::Aborted { .. }) => break,
                Ok(_) => continue,
                Err(err) => panic!("channel closed early: {err}"),
            }
        }
    }
}

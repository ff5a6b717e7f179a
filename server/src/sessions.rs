use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use dialogbot::{InteractionController, ResponseGenerator, Submission};
use shared::Turn;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// One browser or API conversation. Submissions are serialized by the
/// controller lock; the view follows the controller's change feed.
pub(crate) struct Session {
    controller: Mutex<InteractionController>,
    view: watch::Receiver<Vec<Turn>>,
    last_active: std::sync::Mutex<Instant>,
}

impl Session {
    fn new(generator: ResponseGenerator) -> Self {
        let controller = InteractionController::new(generator);
        let view = controller.subscribe();

        Self {
            controller: Mutex::new(controller),
            view,
            last_active: std::sync::Mutex::new(Instant::now()),
        }
    }

    pub(crate) async fn submit(&self, text: &str) -> Submission {
        self.touch();
        let submission = self.controller.lock().await.submit(text).await;
        self.touch();
        submission
    }

    pub(crate) fn turns(&self) -> Vec<Turn> {
        self.view.borrow().clone()
    }

    fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_active.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Bounds on the in-memory registry. Idle sessions are dropped first; when
/// the registry is still full the least recently active one goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SessionLimits {
    pub(crate) max_sessions: usize,
    pub(crate) idle_ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            idle_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Clone)]
pub(crate) struct SessionRegistry {
    generator: ResponseGenerator,
    limits: SessionLimits,
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
}

impl SessionRegistry {
    pub(crate) fn new(generator: ResponseGenerator, limits: SessionLimits) -> Self {
        Self {
            generator,
            limits,
            sessions: Arc::default(),
        }
    }

    pub(crate) fn open(&self) -> Uuid {
        let slug = Uuid::new_v4();
        self.get_or_open(slug);
        slug
    }

    pub(crate) fn get_or_open(&self, slug: Uuid) -> Arc<Session> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get(&slug) {
            session.touch();
            return session.clone();
        }

        self.evict(&mut sessions);
        info!(%slug, "opened session");
        let session = Arc::new(Session::new(self.generator.clone()));
        sessions.insert(slug, session.clone());
        session
    }

    pub(crate) fn get(&self, slug: Uuid) -> Option<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&slug)
            .cloned()?;

        session.touch();
        Some(session)
    }

    /// Drops the session and its transcript. Returns whether it existed.
    pub(crate) fn end(&self, slug: Uuid) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&slug)
            .is_some();

        if removed {
            info!(%slug, "ended session");
        }
        removed
    }

    /// Makes room for one more session.
    fn evict(&self, sessions: &mut HashMap<Uuid, Arc<Session>>) {
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, session| session.idle_for(now) < self.limits.idle_ttl);

        while !sessions.is_empty() && sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .max_by_key(|(_, session)| session.idle_for(now))
                .map(|(slug, _)| *slug);
            let Some(slug) = oldest else { break };
            sessions.remove(&slug);
        }

        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "evicted sessions");
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

//! Per-user conversation sessions.
//!
//! Sessions live in an arena keyed by user id: an outer `RwLock` map of
//! `Arc<tokio::sync::Mutex<Session>>` slots. The per-user mutex serializes
//! one user's turns — tokio's mutex hands the lock out in request-arrival
//! order, so a user's second message always observes the first message's
//! committed history — while different users proceed in parallel.
//!
//! A session is created on a user's first message, stays active while
//! messages keep arriving within the idle timeout, and expires afterwards:
//! its history is discarded and the next message starts fresh. Expired
//! slots are swept opportunistically whenever the arena is touched.
//! History length is bounded; the oldest turns are evicted. Nothing is
//! persisted across restart.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::config::SessionConfig;

/// One question/answer exchange in a session's history.
#[derive(Debug, Clone)]
pub struct Turn {
    pub question: String,
    pub chunk_ids: Vec<String>,
    /// Filled in by the adapter once the generation step completes.
    pub answer: Option<String>,
}

#[derive(Debug)]
pub struct Session {
    user_id: String,
    turns: VecDeque<Turn>,
    last_active: Instant,
}

impl Session {
    fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            turns: VecDeque::new(),
            last_active: Instant::now(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.last_active.elapsed() >= idle_timeout
    }

    /// Append a turn, evicting the oldest beyond `max_turns`, and refresh
    /// the activity clock.
    pub fn commit_turn(&mut self, turn: Turn, max_turns: usize) {
        self.turns.push_back(turn);
        while self.turns.len() > max_turns {
            self.turns.pop_front();
        }
        self.last_active = Instant::now();
    }

    /// Attach the generated answer to the most recent turn.
    pub fn record_answer(&mut self, answer: &str) -> bool {
        match self.turns.back_mut() {
            Some(turn) => {
                turn.answer = Some(answer.to_string());
                self.last_active = Instant::now();
                true
            }
            None => false,
        }
    }
}

pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    max_turns: usize,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: config.max_turns.max(1),
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Fetch the user's session slot, creating a fresh one on first message
    /// or after expiry. Expired idle sessions are swept on the way.
    pub async fn session(&self, user_id: &str) -> Arc<Mutex<Session>> {
        let mut sessions = self.sessions.write().await;

        sessions.retain(|_, slot| match slot.try_lock() {
            Ok(session) => !session.is_expired(self.idle_timeout),
            // A held lock means the session is mid-turn; leave it alone.
            Err(_) => true,
        });

        Arc::clone(
            sessions
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id)))),
        )
    }

    /// Attach a generated answer to the user's latest turn. Returns false
    /// if the user has no live session or no turns.
    pub async fn record_answer(&self, user_id: &str, answer: &str) -> bool {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(user_id).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.record_answer(answer),
            None => false,
        }
    }

    /// Snapshot of a user's history, oldest first.
    pub async fn history(&self, user_id: &str) -> Vec<Turn> {
        let slot = {
            let sessions = self.sessions.read().await;
            sessions.get(user_id).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.turns().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_turns: usize, idle_secs: u64) -> SessionManager {
        SessionManager::new(&SessionConfig {
            max_turns,
            idle_timeout_secs: idle_secs,
        })
    }

    fn turn(question: &str) -> Turn {
        Turn {
            question: question.to_string(),
            chunk_ids: vec!["c1".to_string()],
            answer: None,
        }
    }

    #[tokio::test]
    async fn test_created_on_first_message() {
        let mgr = manager(4, 60);
        assert_eq!(mgr.active_sessions().await, 0);
        let slot = mgr.session("alice").await;
        assert_eq!(slot.lock().await.user_id(), "alice");
        assert_eq!(mgr.active_sessions().await, 1);
    }

    #[tokio::test]
    async fn test_history_bounded() {
        let mgr = manager(2, 60);
        let slot = mgr.session("alice").await;
        {
            let mut session = slot.lock().await;
            session.commit_turn(turn("one"), mgr.max_turns());
            session.commit_turn(turn("two"), mgr.max_turns());
            session.commit_turn(turn("three"), mgr.max_turns());
        }
        let history = mgr.history("alice").await;
        let questions: Vec<&str> = history.iter().map(|t| t.question.as_str()).collect();
        assert_eq!(questions, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_record_answer_on_latest_turn() {
        let mgr = manager(4, 60);
        let slot = mgr.session("alice").await;
        slot.lock().await.commit_turn(turn("one"), 4);

        assert!(mgr.record_answer("alice", "the answer").await);
        let history = mgr.history("alice").await;
        assert_eq!(history[0].answer.as_deref(), Some("the answer"));

        assert!(!mgr.record_answer("nobody", "x").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_discarded() {
        let mgr = manager(4, 30);
        {
            let slot = mgr.session("alice").await;
            slot.lock().await.commit_turn(turn("one"), 4);
        }

        tokio::time::advance(Duration::from_secs(31)).await;

        // Next touch sweeps the expired slot and hands out a fresh session.
        let slot = mgr.session("alice").await;
        assert_eq!(slot.lock().await.turns().count(), 0);
    }

    #[tokio::test]
    async fn test_sessions_are_per_user() {
        let mgr = manager(4, 60);
        let alice = mgr.session("alice").await;
        let bob = mgr.session("bob").await;
        alice.lock().await.commit_turn(turn("from alice"), 4);
        assert_eq!(bob.lock().await.turns().count(), 0);
        assert_eq!(mgr.active_sessions().await, 2);
    }
}

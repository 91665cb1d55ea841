//! In-process conversation history keyed by session id.
//!
//! Each session sits behind its own async mutex, so appends and clears on
//! one conversation are serialized while different sessions proceed
//! independently. Expiry happens only when [`SessionStore::cleanup`] is
//! called.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

use super::error::SessionError;
use super::types::{ExportFormat, Session, SessionStatus, Turn, TurnRole};
use crate::config::SessionConfig;

const MAX_SESSION_ID_LEN: usize = 128;

/// Source of "now" for activity timestamps
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock();
        *now = now.checked_add_signed(step).unwrap_or(*now);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Session ids are 1-128 characters of ASCII letters, digits, `-` and `_`.
pub fn validate_session_id(session_id: &str) -> Result<(), SessionError> {
    let invalid = |reason: &str| {
        Err(SessionError::InvalidSessionId {
            session_id: session_id.chars().take(MAX_SESSION_ID_LEN).collect(),
            reason: reason.to_string(),
        })
    };
    if session_id.is_empty() {
        return invalid("must not be empty");
    }
    if session_id.len() > MAX_SESSION_ID_LEN {
        return invalid("must be at most 128 characters");
    }
    if !session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return invalid("only letters, digits, '-' and '_' are allowed");
    }
    Ok(())
}

pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

type SessionHandle = Arc<AsyncMutex<Session>>;

pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
    clock: Arc<dyn Clock>,
    max_turns: Option<usize>,
}

impl SessionStore {
    pub fn new(max_turns: Option<usize>) -> Self {
        Self::with_clock(Arc::new(SystemClock), max_turns)
    }

    pub fn with_clock(clock: Arc<dyn Clock>, max_turns: Option<usize>) -> Self {
        Self {
            sessions: DashMap::new(),
            clock,
            max_turns,
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.max_turns)
    }

    fn handle(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.get(session_id).map(|entry| Arc::clone(&entry))
    }

    fn handle_or_create(&self, session_id: &str) -> SessionHandle {
        let now = self.clock.now();
        let entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "Session created");
                Arc::new(AsyncMutex::new(Session::new(session_id, now)))
            });
        Arc::clone(&entry)
    }

    /// Append a turn, creating the session if needed. Returns the new turn
    /// count.
    pub async fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: impl Into<String>,
    ) -> Result<usize, SessionError> {
        validate_session_id(session_id)?;
        let content = content.into();

        loop {
            let handle = self.handle_or_create(session_id);
            let mut session = handle.lock().await;
            if session.status == SessionStatus::Expired {
                // Swept between lookup and lock; start over with a fresh entry
                continue;
            }

            let now = self.clock.now();
            session.turns.push(Turn {
                role,
                content,
                timestamp: now,
            });
            session.last_active = now;

            if let Some(cap) = self.max_turns {
                if session.turns.len() > cap {
                    let excess = session.turns.len() - cap;
                    session.turns.drain(..excess);
                }
            }
            return Ok(session.turns.len());
        }
    }

    /// Ordered turns; empty for a session that does not exist.
    pub async fn get_history(&self, session_id: &str) -> Result<Vec<Turn>, SessionError> {
        validate_session_id(session_id)?;
        let Some(handle) = self.handle(session_id) else {
            return Ok(Vec::new());
        };
        let turns = handle.lock().await.turns.clone();
        Ok(turns)
    }

    /// Remove all turns, keeping the session id usable. Returns the number
    /// of turns removed.
    pub async fn clear(&self, session_id: &str) -> Result<usize, SessionError> {
        validate_session_id(session_id)?;
        let Some(handle) = self.handle(session_id) else {
            return Ok(0);
        };
        let mut session = handle.lock().await;
        let removed = session.turns.len();
        session.turns.clear();
        session.last_active = self.clock.now();
        tracing::debug!(session_id, removed, "Session cleared");
        Ok(removed)
    }

    /// Remove sessions idle for longer than `inactivity_threshold`.
    ///
    /// A session whose lock is currently held is in use and never removed.
    pub fn cleanup(&self, inactivity_threshold: Duration) -> usize {
        let threshold =
            chrono::Duration::from_std(inactivity_threshold).unwrap_or(chrono::Duration::MAX);
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(threshold)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut removed = 0;
        self.sessions
            .retain(|_, handle| match handle.try_lock() {
                Ok(mut session) if session.idle_since(cutoff) => {
                    session.status = SessionStatus::Expired;
                    removed += 1;
                    false
                }
                _ => true,
            });

        tracing::info!(
            removed,
            remaining = self.sessions.len(),
            "Session cleanup complete"
        );
        removed
    }

    /// Serialize a session's turns for download.
    pub async fn export(
        &self,
        session_id: &str,
        format: ExportFormat,
    ) -> Result<String, SessionError> {
        validate_session_id(session_id)?;
        let handle = self
            .handle(session_id)
            .ok_or_else(|| SessionError::NotFound {
                session_id: session_id.to_string(),
            })?;
        let turns = handle.lock().await.turns.clone();

        let lines: Vec<String> = match format {
            ExportFormat::Plain => turns
                .iter()
                .map(|turn| {
                    format!(
                        "[{}] {}: {}",
                        turn.timestamp.to_rfc3339(),
                        turn.role,
                        turn.content
                    )
                })
                .collect(),
            ExportFormat::Jsonl => turns
                .iter()
                .map(serde_json::to_string)
                .collect::<Result<_, _>>()
                .map_err(|e| SessionError::Export {
                    reason: e.to_string(),
                })?,
        };
        Ok(lines.join("\n"))
    }

    /// Copy of the whole session, if it exists
    pub async fn snapshot(&self, session_id: &str) -> Option<Session> {
        let handle = self.handle(session_id)?;
        let session = handle.lock().await.clone();
        Some(session)
    }

    pub async fn turn_count(&self, session_id: &str) -> usize {
        let Some(handle) = self.handle(session_id) else {
            return 0;
        };
        let count = handle.lock().await.turns.len();
        count
    }

    /// Exists and has been active within `inactivity_threshold`
    pub async fn is_active(&self, session_id: &str, inactivity_threshold: Duration) -> bool {
        let Some(handle) = self.handle(session_id) else {
            return false;
        };
        let threshold =
            chrono::Duration::from_std(inactivity_threshold).unwrap_or(chrono::Duration::MAX);
        let session = handle.lock().await;
        session.status == SessionStatus::Active
            && self.clock.now().signed_duration_since(session.last_active) <= threshold
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_store() -> (Arc<ManualClock>, SessionStore) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = SessionStore::with_clock(clock.clone(), None);
        (clock, store)
    }

    #[tokio::test]
    async fn test_append_then_history_returns_last_turn() {
        let store = SessionStore::default();
        store.append_turn("s1", TurnRole::User, "hello").await.unwrap();
        let count = store
            .append_turn("s1", TurnRole::Assistant, "hi there")
            .await
            .unwrap();
        assert_eq!(count, 2);

        let history = store.get_history("s1").await.unwrap();
        assert_eq!(history.last().unwrap().content, "hi there");
        assert_eq!(history[0].role, TurnRole::User);
    }

    #[tokio::test]
    async fn test_unknown_session_has_empty_history() {
        let store = SessionStore::default();
        assert!(store.get_history("nobody").await.unwrap().is_empty());
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn test_clear_keeps_session() {
        let store = SessionStore::default();
        store.append_turn("s1", TurnRole::User, "a").await.unwrap();
        assert_eq!(store.clear("s1").await.unwrap(), 1);
        assert!(store.get_history("s1").await.unwrap().is_empty());
        assert_eq!(store.session_count(), 1);
        assert_eq!(store.clear("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_session_ids() {
        let store = SessionStore::default();
        let err = store
            .append_turn("bad id!", TurnRole::User, "x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "ValidationError");
        assert!(validate_session_id("").is_err());
        assert!(validate_session_id(&"a".repeat(129)).is_err());
        assert!(validate_session_id(&"a".repeat(128)).is_ok());
        assert!(validate_session_id("abc-DEF_123").is_ok());
    }

    #[tokio::test]
    async fn test_cleanup_removes_only_idle_sessions_and_is_idempotent() {
        let (clock, store) = manual_store();
        store.append_turn("old", TurnRole::User, "a").await.unwrap();
        clock.advance(Duration::from_secs(3 * 3600));
        store.append_turn("fresh", TurnRole::User, "b").await.unwrap();

        let removed = store.cleanup(Duration::from_secs(2 * 3600));
        assert_eq!(removed, 1);
        assert!(store.get_history("old").await.unwrap().is_empty());
        assert_eq!(store.get_history("fresh").await.unwrap().len(), 1);

        assert_eq!(store.cleanup(Duration::from_secs(2 * 3600)), 0);
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_append_after_cleanup_starts_fresh_session() {
        let (clock, store) = manual_store();
        store.append_turn("s1", TurnRole::User, "first").await.unwrap();
        clock.advance(Duration::from_secs(60));
        assert_eq!(store.cleanup(Duration::from_secs(30)), 1);

        let count = store.append_turn("s1", TurnRole::User, "again").await.unwrap();
        assert_eq!(count, 1);
        assert!(store.is_active("s1", Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_is_active_tracks_inactivity() {
        let (clock, store) = manual_store();
        store.append_turn("s1", TurnRole::User, "a").await.unwrap();
        assert!(store.is_active("s1", Duration::from_secs(10)).await);
        clock.advance(Duration::from_secs(11));
        assert!(!store.is_active("s1", Duration::from_secs(10)).await);
        assert!(!store.is_active("missing", Duration::from_secs(10)).await);
    }

    #[tokio::test]
    async fn test_max_turns_drops_oldest() {
        let store = SessionStore::new(Some(2));
        for i in 0..5 {
            store
                .append_turn("s1", TurnRole::User, format!("m{i}"))
                .await
                .unwrap();
        }
        let history = store.get_history("s1").await.unwrap();
        let contents: Vec<_> = history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);
    }

    #[tokio::test]
    async fn test_export_formats() {
        let store = SessionStore::default();
        store.append_turn("s1", TurnRole::User, "hello").await.unwrap();
        store.append_turn("s1", TurnRole::Assistant, "hi").await.unwrap();

        let plain = store.export("s1", ExportFormat::Plain).await.unwrap();
        let lines: Vec<&str> = plain.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("user: hello"));

        let jsonl = store.export("s1", ExportFormat::Jsonl).await.unwrap();
        let turns: Vec<Turn> = jsonl
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(turns[1].role, TurnRole::Assistant);

        let err = store.export("missing", ExportFormat::Plain).await.unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(SessionStore::default());
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .append_turn("shared", TurnRole::User, format!("m{i}"))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.turn_count("shared").await, 32);
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("JSONL".parse::<ExportFormat>().unwrap(), ExportFormat::Jsonl);
        assert_eq!("plain".parse::<ExportFormat>().unwrap(), ExportFormat::Plain);
        assert!("csv".parse::<ExportFormat>().is_err());
    }
}

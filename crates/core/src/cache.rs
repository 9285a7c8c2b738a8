use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};

use crate::domain::consultation::{ConsultationState, Message, Role, SessionId};

pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test clock that only moves when told to.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = match self.now.lock() {
            Ok(now) => now,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedConversation {
    pub messages: Vec<Message>,
    pub state: ConsultationState,
    pub last_updated: DateTime<Utc>,
}

/// Process-local session store with time-based expiry. An entry older than
/// the TTL is treated as absent and evicted on the next access or sweep.
#[derive(Clone)]
pub struct ConversationCache {
    entries: Arc<Mutex<HashMap<SessionId, CachedConversation>>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ConversationCache {
    pub fn new(clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        let ttl = Duration::seconds(ttl_secs.min(MAX_TTL_SECS) as i64);
        Self { entries: Arc::new(Mutex::new(HashMap::new())), clock, ttl }
    }

    pub fn with_system_clock(ttl_secs: u64) -> Self {
        Self::new(Arc::new(SystemClock), ttl_secs)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, CachedConversation>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_expired(&self, entry: &CachedConversation, now: DateTime<Utc>) -> bool {
        now - entry.last_updated > self.ttl
    }

    pub fn put(&self, session_id: &SessionId, messages: Vec<Message>, state: ConsultationState) {
        let entry = CachedConversation { messages, state, last_updated: self.clock.now() };
        self.lock().insert(session_id.clone(), entry);
    }

    pub fn get(&self, session_id: &SessionId) -> Option<CachedConversation> {
        let now = self.clock.now();
        let mut entries = self.lock();
        let expired = match entries.get(session_id) {
            None => return None,
            Some(entry) => self.is_expired(entry, now),
        };
        if expired {
            entries.remove(session_id);
            tracing::debug!(
                event_name = "cache.entry_expired",
                session_id = %session_id,
                "evicted expired conversation"
            );
            return None;
        }
        entries.get(session_id).cloned()
    }

    pub fn clear(&self, session_id: &SessionId) -> bool {
        self.lock().remove(session_id).is_some()
    }

    /// Removes every expired entry; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now - entry.last_updated <= self.ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `role: content` lines for model context, system messages excluded.
    pub fn conversation_history(&self, session_id: &SessionId) -> Vec<String> {
        self.get(session_id)
            .map(|entry| {
                entry
                    .messages
                    .iter()
                    .filter(|message| message.role != Role::System)
                    .map(Message::history_line)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn recent_messages(&self, session_id: &SessionId, count: usize) -> Vec<Message> {
        self.get(session_id)
            .map(|entry| {
                let skip = entry.messages.len().saturating_sub(count);
                entry.messages.into_iter().skip(skip).collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone, Utc};

    use super::{ConversationCache, ManualClock, DEFAULT_TTL_SECS};
    use crate::domain::consultation::{ConsultationState, Message, Role, SessionId};

    fn fixture() -> (ManualClock, ConversationCache) {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid start time");
        let clock = ManualClock::new(start);
        let cache = ConversationCache::new(Arc::new(clock.clone()), DEFAULT_TTL_SECS);
        (clock, cache)
    }

    fn session(id: &str) -> SessionId {
        SessionId(id.to_owned())
    }

    fn transcript(clock: &ManualClock) -> Vec<Message> {
        use super::Clock;
        vec![
            Message::new(Role::System, "session opened", clock.now()),
            Message::new(Role::User, "my throat hurts", clock.now()),
            Message::new(Role::Assistant, "When did this first start?", clock.now()),
        ]
    }

    #[test]
    fn entry_is_returned_unchanged_within_ttl() {
        let (clock, cache) = fixture();
        let messages = transcript(&clock);
        let state = ConsultationState { transcript: messages.clone(), ..Default::default() };
        cache.put(&session("a"), messages.clone(), state.clone());

        clock.advance(Duration::hours(24));
        let entry = cache.get(&session("a")).expect("entry at exactly the ttl is kept");
        assert_eq!(entry.messages, messages);
        assert_eq!(entry.state, state);
    }

    #[test]
    fn entry_is_absent_after_ttl() {
        let (clock, cache) = fixture();
        cache.put(&session("a"), transcript(&clock), ConsultationState::default());

        clock.advance(Duration::hours(24) + Duration::seconds(1));
        assert!(cache.get(&session("a")).is_none());
        assert!(cache.is_empty(), "expired entry is evicted on read");
    }

    #[test]
    fn put_refreshes_the_timestamp() {
        let (clock, cache) = fixture();
        cache.put(&session("a"), Vec::new(), ConsultationState::default());
        clock.advance(Duration::hours(20));
        cache.put(&session("a"), Vec::new(), ConsultationState::default());
        clock.advance(Duration::hours(20));
        assert!(cache.get(&session("a")).is_some());
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let (clock, cache) = fixture();
        cache.put(&session("old"), Vec::new(), ConsultationState::default());
        clock.advance(Duration::hours(23));
        cache.put(&session("fresh"), Vec::new(), ConsultationState::default());
        clock.advance(Duration::hours(2));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&session("fresh")).is_some());
    }

    #[test]
    fn clear_removes_entry() {
        let (clock, cache) = fixture();
        cache.put(&session("a"), transcript(&clock), ConsultationState::default());
        assert!(cache.clear(&session("a")));
        assert!(cache.get(&session("a")).is_none());
        assert!(!cache.clear(&session("a")));
    }

    #[test]
    fn history_skips_system_messages_and_recent_keeps_tail() {
        let (clock, cache) = fixture();
        cache.put(&session("a"), transcript(&clock), ConsultationState::default());

        assert_eq!(
            cache.conversation_history(&session("a")),
            vec!["user: my throat hurts", "assistant: When did this first start?"]
        );
        let recent = cache.recent_messages(&session("a"), 2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "my throat hurts");
        assert_eq!(cache.recent_messages(&session("a"), 10).len(), 3);
        assert!(cache.conversation_history(&session("missing")).is_empty());
    }
}

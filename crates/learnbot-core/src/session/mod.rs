use dashmap::DashMap;

/// Conversational state of a chat session.
///
/// A session with no entry is idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Greeted; waiting for (and absorbing) free-text messages.
    AwaitingFirstMessage,
}

/// In-memory session states keyed by session key.
///
/// Each key is written only by the lane handling that session.
#[derive(Debug, Default)]
pub struct SessionStates {
    states: DashMap<String, SessionState>,
}

impl SessionStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state, `None` when idle.
    pub fn get(&self, key: &str) -> Option<SessionState> {
        self.states.get(key).map(|s| *s)
    }

    /// Start (or restart) a session.
    pub fn begin(&self, key: &str) -> Option<SessionState> {
        self.states
            .insert(key.to_string(), SessionState::AwaitingFirstMessage)
    }

    /// Number of sessions currently tracked.
    /// Forget a session, returning its last state.
    pub fn end(&self, key: &str) -> Option<SessionState> {
        self.states.remove(key).map(|(_, state)| state)
    }

    pub fn active(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_lifecycle() {
        let sessions = SessionStates::new();
        assert_eq!(sessions.get("telegram:1"), None);

        assert_eq!(sessions.begin("telegram:1"), None);
        assert_eq!(sessions.get("telegram:1"), Some(SessionState::AwaitingFirstMessage));

        // Restarting replaces the previous state
        assert_eq!(
            sessions.begin("telegram:1"),
            Some(SessionState::AwaitingFirstMessage)
        );
        assert_eq!(sessions.active(), 1);

        assert_eq!(sessions.end("telegram:1"), Some(SessionState::AwaitingFirstMessage));
        assert_eq!(sessions.get("telegram:1"), None);
        assert_eq!(sessions.end("telegram:1"), None);
        assert_eq!(sessions.active(), 0);
    }

    #[test]
    fn test_sessions_are_independent() {
        let sessions = SessionStates::new();
        sessions.begin("telegram:1");
        assert_eq!(sessions.get("telegram:2"), None);
        sessions.begin("telegram:2");
        assert_eq!(sessions.active(), 2);
        assert_eq!(sessions.get("telegram:1"), Some(SessionState::AwaitingFirstMessage));
    }
}

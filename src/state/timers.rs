use dashmap::DashMap;
use tokio::task::AbortHandle;

/// Per-session table of deferred tasks (reveal-to-advance, completion
/// cleanup, disconnect grace checks, absolute-TTL purge).
///
/// Storing abort handles keyed by session makes the artificial delays safe
/// under races: when a session reaches `Completed` through another path, the
/// pending tasks are cancelled instead of firing against stale state.
#[derive(Debug, Default)]
pub struct TimerTable {
    advance: DashMap<String, AbortHandle>,
    cleanup: DashMap<String, AbortHandle>,
    expiry: DashMap<String, AbortHandle>,
    disconnects: DashMap<(String, String), AbortHandle>,
}

impl TimerTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track the pending advance task for a session, aborting any previous one.
    pub fn set_advance(&self, session_code: &str, handle: AbortHandle) {
        if let Some(previous) = self.advance.insert(session_code.to_owned(), handle) {
            previous.abort();
        }
    }

    /// Cancel the pending advance task, if any.
    pub fn cancel_advance(&self, session_code: &str) {
        if let Some((_, handle)) = self.advance.remove(session_code) {
            handle.abort();
        }
    }

    /// Drop the bookkeeping entry without aborting. A fired task calls this on
    /// itself before doing work, so later cancellations cannot abort it
    /// mid-flight.
    pub fn clear_advance(&self, session_code: &str) {
        self.advance.remove(session_code);
    }

    /// Track the deferred cleanup task for a session.
    pub fn set_cleanup(&self, session_code: &str, handle: AbortHandle) {
        if let Some(previous) = self.cleanup.insert(session_code.to_owned(), handle) {
            previous.abort();
        }
    }

    /// Drop the cleanup bookkeeping entry without aborting. The fired cleanup
    /// task calls this on itself before tearing the session down.
    pub fn clear_cleanup(&self, session_code: &str) {
        self.cleanup.remove(session_code);
    }

    /// Track the absolute-TTL purge task for a freshly created session.
    pub fn set_expiry(&self, session_code: &str, handle: AbortHandle) {
        if let Some(previous) = self.expiry.insert(session_code.to_owned(), handle) {
            previous.abort();
        }
    }

    /// Cancel the TTL purge; the session started (or completed) in time.
    pub fn cancel_expiry(&self, session_code: &str) {
        if let Some((_, handle)) = self.expiry.remove(session_code) {
            handle.abort();
        }
    }

    /// Drop the bookkeeping entry for a fired purge task.
    pub fn clear_expiry(&self, session_code: &str) {
        self.expiry.remove(session_code);
    }

    /// Track the disconnect grace check for one participant, aborting any
    /// previous check for the same pair.
    pub fn set_disconnect_check(
        &self,
        session_code: &str,
        participant_id: &str,
        handle: AbortHandle,
    ) {
        let key = (session_code.to_owned(), participant_id.to_owned());
        if let Some(previous) = self.disconnects.insert(key, handle) {
            previous.abort();
        }
    }

    /// Cancel the disconnect grace check for one participant (reconnect path).
    pub fn cancel_disconnect_check(&self, session_code: &str, participant_id: &str) {
        let key = (session_code.to_owned(), participant_id.to_owned());
        if let Some((_, handle)) = self.disconnects.remove(&key) {
            handle.abort();
        }
    }

    /// Drop the bookkeeping entry for a completed disconnect check.
    pub fn clear_disconnect_check(&self, session_code: &str, participant_id: &str) {
        let key = (session_code.to_owned(), participant_id.to_owned());
        self.disconnects.remove(&key);
    }

    /// Abort every pending task for a session (teardown).
    pub fn cancel_all(&self, session_code: &str) {
        self.cancel_advance(session_code);
        self.cancel_expiry(session_code);
        if let Some((_, handle)) = self.cleanup.remove(session_code) {
            handle.abort();
        }
        self.disconnects.retain(|(code, _), handle| {
            if code == session_code {
                handle.abort();
                false
            } else {
                true
            }
        });
    }
}

use axum::extract::ws::Message;
use dashmap::DashMap;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Registry of live WebSocket channels keyed by (session, participant).
///
/// One instance lives in [`crate::state::AppState`]; there is no ambient
/// global. All sends are best-effort: a closed writer channel gets the
/// connection pruned, never aborts delivery to remaining recipients.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    channels: DashMap<String, IndexMap<String, mpsc::UnboundedSender<Message>>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the writer channel for a (session, participant) pair,
    /// replacing any previous channel for the same pair.
    pub fn register(
        &self,
        session_code: &str,
        participant_id: &str,
        tx: mpsc::UnboundedSender<Message>,
    ) {
        self.channels
            .entry(session_code.to_owned())
            .or_default()
            .insert(participant_id.to_owned(), tx);
        debug!(session = %session_code, participant = %participant_id, "connection registered");
    }

    /// Remove the channel for a (session, participant) pair, but only when it
    /// is still `tx`. A reconnect replaces the channel before the old socket
    /// task winds down; the old task must not tear down the new connection.
    /// Returns whether a removal happened.
    pub fn unregister_if_current(
        &self,
        session_code: &str,
        participant_id: &str,
        tx: &mpsc::UnboundedSender<Message>,
    ) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.channels.get_mut(session_code) {
            if entry
                .get(participant_id)
                .is_some_and(|current| current.same_channel(tx))
            {
                entry.shift_remove(participant_id);
                removed = true;
            }
            if entry.is_empty() {
                drop(entry);
                self.channels
                    .remove_if(session_code, |_, channels| channels.is_empty());
            }
        }
        if removed {
            debug!(session = %session_code, participant = %participant_id, "connection unregistered");
        }
        removed
    }

    /// Whether a channel is registered for the pair.
    pub fn is_connected(&self, session_code: &str, participant_id: &str) -> bool {
        self.channels
            .get(session_code)
            .is_some_and(|channels| channels.contains_key(participant_id))
    }

    /// Deliver to exactly one participant. A missing or closed channel is
    /// logged and pruned, not fatal.
    pub fn send_to<T>(&self, session_code: &str, participant_id: &str, value: &T)
    where
        T: ?Sized + serde::Serialize,
    {
        let Some(message) = encode(value) else {
            return;
        };
        let Some(mut entry) = self.channels.get_mut(session_code) else {
            debug!(session = %session_code, participant = %participant_id, "send skipped: no session channels");
            return;
        };
        let delivered = entry
            .get(participant_id)
            .is_some_and(|tx| tx.send(message).is_ok());
        if !delivered {
            warn!(session = %session_code, participant = %participant_id, "send failed; pruning channel");
            entry.shift_remove(participant_id);
        }
    }

    /// Deliver to every registered channel for the session.
    pub fn broadcast<T>(&self, session_code: &str, value: &T)
    where
        T: ?Sized + serde::Serialize,
    {
        self.broadcast_filtered(session_code, value, |_| true);
    }

    /// Deliver to every registered channel for the session except one.
    pub fn broadcast_except<T>(&self, session_code: &str, excluded_participant: &str, value: &T)
    where
        T: ?Sized + serde::Serialize,
    {
        self.broadcast_filtered(session_code, value, |participant| {
            participant != excluded_participant
        });
    }

    /// Deliver solely to the channel registered for the host identity.
    pub fn send_to_host<T>(&self, session_code: &str, host_id: &str, value: &T)
    where
        T: ?Sized + serde::Serialize,
    {
        self.send_to(session_code, host_id, value);
    }

    fn broadcast_filtered<T>(
        &self,
        session_code: &str,
        value: &T,
        include: impl Fn(&str) -> bool,
    ) where
        T: ?Sized + serde::Serialize,
    {
        let Some(message) = encode(value) else {
            return;
        };
        let Some(mut entry) = self.channels.get_mut(session_code) else {
            return;
        };

        let mut dead = Vec::new();
        for (participant_id, tx) in entry.iter() {
            if !include(participant_id) {
                continue;
            }
            if tx.send(message.clone()).is_err() {
                dead.push(participant_id.clone());
            }
        }

        // Prune failures after the sweep so one dead channel never aborts
        // delivery to the rest.
        for participant_id in dead {
            warn!(session = %session_code, participant = %participant_id, "broadcast send failed; pruning channel");
            entry.shift_remove(&participant_id);
        }
    }
}

/// Serialize a payload into a WebSocket text frame.
///
/// Serialization failure is a bug in the payload type, not a connection
/// problem: it is logged and the send is skipped.
fn encode<T>(value: &T) -> Option<Message>
where
    T: ?Sized + serde::Serialize,
{
    match serde_json::to_string(value) {
        Ok(payload) => Some(Message::Text(payload.into())),
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn channel() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn send_to_reaches_single_participant() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        registry.register("S1", "a", tx_a);
        registry.register("S1", "b", tx_b);

        registry.send_to("S1", "a", &json!({"type": "pong"}));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn broadcast_except_skips_excluded() {
        let registry = ConnectionRegistry::new();
        let (tx_a, mut rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        registry.register("S1", "a", tx_a);
        registry.register("S1", "b", tx_b);

        registry.broadcast_except("S1", "a", &json!({"type": "question"}));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn dead_channel_pruned_without_aborting_broadcast() {
        let registry = ConnectionRegistry::new();
        let (tx_a, rx_a) = channel();
        let (tx_b, mut rx_b) = channel();
        registry.register("S1", "a", tx_a);
        registry.register("S1", "b", tx_b);
        drop(rx_a);

        registry.broadcast("S1", &json!({"type": "session_update"}));

        assert!(rx_b.try_recv().is_ok());
        assert!(!registry.is_connected("S1", "a"));
        assert!(registry.is_connected("S1", "b"));
    }

    #[test]
    fn stale_unregister_leaves_replacement_channel() {
        let registry = ConnectionRegistry::new();
        let (old_tx, _old_rx) = channel();
        let (new_tx, mut new_rx) = channel();
        registry.register("S1", "a", old_tx.clone());
        registry.register("S1", "a", new_tx);

        assert!(!registry.unregister_if_current("S1", "a", &old_tx));
        assert!(registry.is_connected("S1", "a"));

        registry.send_to("S1", "a", &json!({"type": "pong"}));
        assert!(new_rx.try_recv().is_ok());
    }

    #[test]
    fn unregister_is_noop_for_unknown() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        assert!(!registry.unregister_if_current("S1", "ghost", &tx));
        assert!(!registry.is_connected("S1", "ghost"));
    }
}

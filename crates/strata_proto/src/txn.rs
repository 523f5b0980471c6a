//! The logical transaction record carried on every transactional request.

use serde::{Deserialize, Serialize};

use crate::timestamp::Timestamp;

/// Isolation level requested for a transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationType {
    /// Serializable snapshot isolation: commit timestamp pushes force a
    /// restart so reads and writes land at one timestamp.
    #[default]
    Serializable,
    /// Plain snapshot isolation: the commit timestamp may drift forward
    /// without restarting the transaction.
    Snapshot,
}

/// Disposition of a transaction as known to the server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[default]
    Pending,
    Committed,
    Aborted,
}

/// Client-side record of one logical transaction.
///
/// The id is stable across retries of the same attempt group and is only
/// regenerated when the server reports the transaction aborted. The epoch
/// counts restarts of the same id; bumping it tells the server to treat
/// intents from earlier epochs as stale.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Concise description for debugging and log lines.
    pub name: String,
    /// Opaque unique id, assigned at creation.
    pub id: Vec<u8>,
    /// Priority used by the server-side push protocol. Random at creation.
    pub priority: i32,
    pub isolation: IsolationType,
    pub status: TransactionStatus,
    /// Restart counter for this id.
    pub epoch: i32,
    /// Proposed commit timestamp; the server may push it forward.
    pub timestamp: Timestamp,
    /// Upper bound of the uncertainty interval. Reads between `timestamp`
    /// and this bound cannot be ordered and force a restart. Ignored once
    /// it falls below `timestamp` after a push.
    pub max_timestamp: Timestamp,
    /// Most recent heartbeat observed by the client, if any.
    pub last_heartbeat: Option<Timestamp>,
}

impl Transaction {
    /// Adopt server-returned transaction state.
    ///
    /// The server is authoritative for status, timestamp, priority, and
    /// epoch. A returned record with a different id is a pristine
    /// replacement (the abort path) and is adopted wholesale.
    pub fn update(&mut self, other: &Transaction) {
        if !other.id.is_empty() && other.id != self.id {
            *self = other.clone();
            return;
        }
        self.status = other.status;
        self.timestamp = self.timestamp.forward(other.timestamp);
        self.priority = self.priority.max(other.priority);
        self.epoch = self.epoch.max(other.epoch);
        if other.last_heartbeat.is_some() {
            self.last_heartbeat = other.last_heartbeat;
        }
    }

    /// Short hex form of the id for log lines.
    pub fn short_id(&self) -> String {
        self.id
            .iter()
            .take(4)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn(id: &[u8], epoch: i32, ts: Timestamp) -> Transaction {
        Transaction {
            name: "test".to_string(),
            id: id.to_vec(),
            priority: 1,
            epoch,
            timestamp: ts,
            max_timestamp: ts,
            ..Transaction::default()
        }
    }

    #[test]
    fn update_adopts_server_fields_for_same_id() {
        let mut local = txn(b"aaaa", 0, Timestamp::new(10, 0));
        let mut remote = txn(b"aaaa", 1, Timestamp::new(20, 0));
        remote.status = TransactionStatus::Committed;
        remote.priority = 9;

        local.update(&remote);
        assert_eq!(local.id, b"aaaa");
        assert_eq!(local.epoch, 1);
        assert_eq!(local.priority, 9);
        assert_eq!(local.timestamp, Timestamp::new(20, 0));
        assert_eq!(local.status, TransactionStatus::Committed);
    }

    #[test]
    fn update_never_regresses_timestamp_or_epoch() {
        let mut local = txn(b"aaaa", 3, Timestamp::new(30, 0));
        let remote = txn(b"aaaa", 1, Timestamp::new(20, 0));
        local.update(&remote);
        assert_eq!(local.epoch, 3);
        assert_eq!(local.timestamp, Timestamp::new(30, 0));
    }

    #[test]
    fn update_with_new_id_replaces_wholesale() {
        let mut local = txn(b"aaaa", 5, Timestamp::new(30, 0));
        let remote = txn(b"bbbb", 0, Timestamp::new(40, 0));
        local.update(&remote);
        assert_eq!(local.id, b"bbbb");
        assert_eq!(local.epoch, 0);
        assert_eq!(local.timestamp, Timestamp::new(40, 0));
    }
}

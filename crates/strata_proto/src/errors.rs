//! The closed error taxonomy carried in response headers.
//!
//! The transaction coordinator dispatches its retry loop on these variants,
//! so the set is deliberately closed: anything a server can put in a
//! response header is one of these.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestamp::Timestamp;
use crate::txn::Transaction;

/// Every failure a call can surface, transport faults included.
#[derive(Clone, Debug, PartialEq, Error, Serialize, Deserialize)]
pub enum Error {
    /// A read found a value inside the transaction's uncertainty interval
    /// and cannot order itself against it. The server has already pushed
    /// the transaction timestamp past the conflicting value; the caller
    /// must re-read at the new timestamp.
    #[error("read within uncertainty interval: read at {read_timestamp}, existing value at {existing_timestamp}")]
    ReadWithinUncertaintyInterval {
        read_timestamp: Timestamp,
        existing_timestamp: Timestamp,
    },

    /// The server destroyed the transaction record; the response header
    /// carries a pristine replacement transaction.
    #[error("transaction aborted")]
    TransactionAborted { txn: Transaction },

    /// A conflicting transaction could not be pushed out of the way.
    #[error("failed to push conflicting transaction")]
    TransactionPush { pushee: Transaction },

    /// A serializable transaction had its timestamp pushed and must restart
    /// at a higher epoch.
    #[error("transaction must retry")]
    TransactionRetry { txn: Transaction },

    /// The transaction record is in a state that does not admit the
    /// attempted operation.
    #[error("transaction status: {message}")]
    TransactionStatus { txn: Transaction, message: String },

    /// No range containing the requested key is known to the addressed node.
    #[error("range {range_id} was not found")]
    RangeNotFound { range_id: u64 },

    /// The request reached a range that does not contain its key span.
    #[error("key range {} - {} outside of bounds of the addressed range",
            String::from_utf8_lossy(.request_start), String::from_utf8_lossy(.request_end))]
    RangeKeyMismatch {
        request_start: Vec<u8>,
        request_end: Vec<u8>,
    },

    /// Starting a transaction from an already-transactional handle.
    #[error("cannot start a transaction from within a transaction")]
    NestedTransaction,

    /// End-to-end checksum mismatch on a value envelope.
    #[error("integrity failure: {message}")]
    Integrity { message: String },

    /// A stored value failed structured decoding. Carries the write
    /// timestamp recovered before decoding failed, so callers can observe
    /// both.
    #[error("value decoding failed at {timestamp}: {message}")]
    Decode {
        timestamp: Timestamp,
        message: String,
    },

    /// A typed-integer value was read through a byte accessor (or vice
    /// versa).
    #[error("unexpected value type for key {}", String::from_utf8_lossy(.key))]
    UnexpectedValueType { key: Vec<u8> },

    /// Transport-level failure: connection refused, timeout, closed
    /// dispatcher. Retried by the dispatcher with an unchanged command id.
    #[error("transport failure: {message}")]
    Transport { message: String },

    /// Anything without a more specific classification.
    #[error("{message}")]
    Other { message: String },
}

impl Error {
    /// Build a transport error from anything printable.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Build a generic error from anything printable.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// True for transport-class faults the dispatcher may retry with the
    /// same command id. Conflict errors are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_transient() {
        assert!(Error::transport("connection reset").is_transient());
        for err in [
            Error::ReadWithinUncertaintyInterval {
                read_timestamp: Timestamp::zero(),
                existing_timestamp: Timestamp::zero(),
            },
            Error::TransactionAborted {
                txn: Transaction::default(),
            },
            Error::NestedTransaction,
            Error::other("boom"),
        ] {
            assert!(!err.is_transient(), "{err} should not be transient");
        }
    }

    #[test]
    fn errors_round_trip_through_serde() {
        let err = Error::TransactionRetry {
            txn: Transaction {
                id: vec![1, 2, 3],
                epoch: 2,
                ..Transaction::default()
            },
        };
        let json = serde_json::to_string(&err).unwrap();
        let back: Error = serde_json::from_str(&json).unwrap();
        assert_eq!(err, back);
    }
}

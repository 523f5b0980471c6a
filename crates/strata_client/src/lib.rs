//! Transactional client core for the Strata distributed KV store.
//!
//! The client is three layers, leaves first: the value envelope and wire
//! messages (in `strata_proto`), a single-call dispatcher that assigns
//! replay-dedup command ids and retries transport faults, and a
//! transaction coordinator that wraps the dispatcher, owns the logical
//! transaction record, and drives caller closures through the conflict
//! retry loop.
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_client::{Client, LocalSender, SystemClock, TransactionOptions};
//!
//! # async fn example() -> Result<(), strata_proto::Error> {
//! let clock = Arc::new(SystemClock);
//! let routing = Arc::new(LocalSender::new(clock.clone()));
//! let client = Client::new(routing, clock);
//!
//! client
//!     .run_transaction(TransactionOptions::default(), |txn| async move {
//!         txn.put_bytes(b"greeting", &b"hello"[..]).await?;
//!         txn.increment(b"visits", 1).await?;
//!         Ok(())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod clock;
pub mod dispatch;
pub mod local;
pub mod retry;
pub mod sender;
pub mod txn;

pub use client::{Client, ClientConfig};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::SingleCallSender;
pub use local::LocalSender;
pub use retry::{Backoff, RetryOptions};
pub use sender::{Call, Sender};
pub use txn::{TransactionOptions, TxnSender};

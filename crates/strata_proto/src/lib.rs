//! Wire-shape types shared by the Strata client and anything that speaks to it.
//!
//! This crate defines the value envelope with its keyed checksum, hybrid
//! logical timestamps, the logical transaction record, the request/response
//! message set, and the closed error taxonomy that the transaction
//! coordinator dispatches on. It performs no I/O.

pub mod api;
pub mod errors;
pub mod timestamp;
pub mod txn;
pub mod value;

pub use api::{
    ClientCmdId, KeyValue, Method, Request, RequestHeader, Response, ResponseHeader,
};
pub use errors::Error;
pub use timestamp::Timestamp;
pub use txn::{IsolationType, Transaction, TransactionStatus};
pub use value::{MvccValue, Value};

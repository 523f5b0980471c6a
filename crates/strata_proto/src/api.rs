//! Request and response messages for the KV API.
//!
//! Every request carries a [`RequestHeader`], every response a
//! [`ResponseHeader`]. The `Internal*` family is issued by servers talking
//! to each other (intent resolution, txn pushes, range lookups); the client
//! defines the messages so the wire schema is complete, but only
//! `EndTransaction` among the write-side internals is ever sent by the
//! coordinator itself.

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::timestamp::Timestamp;
use crate::txn::Transaction;
use crate::value::Value;

/// Names for every operation the API supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Put,
    ConditionalPut,
    Increment,
    Delete,
    DeleteRange,
    Scan,
    EndTransaction,
    InternalEndTxn,
    InternalHeartbeatTxn,
    InternalPushTxn,
    InternalResolveIntent,
    InternalRangeLookup,
    InternalSnapshotCopy,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "Get",
            Method::Put => "Put",
            Method::ConditionalPut => "ConditionalPut",
            Method::Increment => "Increment",
            Method::Delete => "Delete",
            Method::DeleteRange => "DeleteRange",
            Method::Scan => "Scan",
            Method::EndTransaction => "EndTransaction",
            Method::InternalEndTxn => "InternalEndTxn",
            Method::InternalHeartbeatTxn => "InternalHeartbeatTxn",
            Method::InternalPushTxn => "InternalPushTxn",
            Method::InternalResolveIntent => "InternalResolveIntent",
            Method::InternalRangeLookup => "InternalRangeLookup",
            Method::InternalSnapshotCopy => "InternalSnapshotCopy",
        }
    }

    /// True for the server-to-server message family.
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            Method::InternalEndTxn
                | Method::InternalHeartbeatTxn
                | Method::InternalPushTxn
                | Method::InternalResolveIntent
                | Method::InternalRangeLookup
                | Method::InternalSnapshotCopy
        )
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-assigned token that lets the server-side response cache
/// deduplicate replays of the same logical call.
///
/// Stable across transport retries, unique across logical calls on one
/// handle. A wall-clock/nonce pair is sufficient for that.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientCmdId {
    pub wall_time: i64,
    pub random: i64,
}

impl ClientCmdId {
    /// True when no id has been assigned yet.
    pub fn is_empty(self) -> bool {
        self.wall_time == 0 && self.random == 0
    }
}

/// Header present on every request.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub key: Vec<u8>,
    /// Originating user; filled in from the handle when empty.
    pub user: String,
    /// Priority of the user, for the server-side push protocol.
    pub user_priority: Option<i32>,
    /// The transaction this request runs inside, if any.
    pub txn: Option<Transaction>,
    /// Replay-dedup token; assigned by the dispatcher.
    pub cmd_id: ClientCmdId,
}

impl RequestHeader {
    pub fn with_key(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            ..Self::default()
        }
    }
}

/// Header present on every response.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseHeader {
    pub error: Option<Error>,
    /// Timestamp at which the operation executed.
    pub timestamp: Timestamp,
    /// Updated transaction state; the client adopts it when present.
    pub txn: Option<Transaction>,
}

impl ResponseHeader {
    /// Record an error outcome.
    pub fn set_error(&mut self, err: Error) {
        self.error = Some(err);
    }

    /// View the outcome as a `Result`, cloning any error.
    pub fn result(&self) -> Result<(), Error> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// One key/value row in scan and snapshot responses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Value,
}

/// Addressing entry returned by range lookups.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub range_id: u64,
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub header: RequestHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GetResponse {
    pub header: ResponseHeader,
    pub value: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PutRequest {
    pub header: RequestHeader,
    pub value: Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PutResponse {
    pub header: ResponseHeader,
}

/// Put that only applies when the existing value matches `exp_value`
/// (`None` = expect absent).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalPutRequest {
    pub header: RequestHeader,
    pub value: Value,
    pub exp_value: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionalPutResponse {
    pub header: ResponseHeader,
    /// The actual value found when the condition failed.
    pub actual_value: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementRequest {
    pub header: RequestHeader,
    pub increment: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IncrementResponse {
    pub header: ResponseHeader,
    pub new_value: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub header: RequestHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub header: ResponseHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRangeRequest {
    pub header: RequestHeader,
    /// Exclusive end of the deleted span; `header.key` is the start.
    pub end_key: Vec<u8>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteRangeResponse {
    pub header: ResponseHeader,
    pub num_deleted: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanRequest {
    pub header: RequestHeader,
    /// Exclusive end of the scanned span; `header.key` is the start.
    pub end_key: Vec<u8>,
    /// Maximum number of rows to return; 0 means no limit.
    pub max_results: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResponse {
    pub header: ResponseHeader,
    pub rows: Vec<KeyValue>,
}

/// Commit or abort the transaction in the request header.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndTransactionRequest {
    pub header: RequestHeader,
    pub commit: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EndTransactionResponse {
    pub header: ResponseHeader,
    /// Commit timestamp finally assigned by the server.
    pub commit_timestamp: Timestamp,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalEndTxnRequest {
    pub header: RequestHeader,
    pub commit: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalEndTxnResponse {
    pub header: ResponseHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalHeartbeatTxnRequest {
    pub header: RequestHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalHeartbeatTxnResponse {
    pub header: ResponseHeader,
}

/// Force a conflicting transaction's timestamp forward, or abort it,
/// depending on relative priorities.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalPushTxnRequest {
    pub header: RequestHeader,
    pub pushee_txn: Transaction,
    /// True to abort the pushee instead of pushing its timestamp.
    pub abort: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalPushTxnResponse {
    pub header: ResponseHeader,
    pub pushee_txn: Option<Transaction>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalResolveIntentRequest {
    pub header: RequestHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalResolveIntentResponse {
    pub header: ResponseHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalRangeLookupRequest {
    pub header: RequestHeader,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalRangeLookupResponse {
    pub header: ResponseHeader,
    pub ranges: Vec<RangeDescriptor>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalSnapshotCopyRequest {
    pub header: RequestHeader,
    /// Identifies the engine snapshot to read from.
    pub snapshot_id: String,
    pub end_key: Vec<u8>,
    pub max_results: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct InternalSnapshotCopyResponse {
    pub header: ResponseHeader,
    pub rows: Vec<KeyValue>,
}

/// Any request, tagged by method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Get(GetRequest),
    Put(PutRequest),
    ConditionalPut(ConditionalPutRequest),
    Increment(IncrementRequest),
    Delete(DeleteRequest),
    DeleteRange(DeleteRangeRequest),
    Scan(ScanRequest),
    EndTransaction(EndTransactionRequest),
    InternalEndTxn(InternalEndTxnRequest),
    InternalHeartbeatTxn(InternalHeartbeatTxnRequest),
    InternalPushTxn(InternalPushTxnRequest),
    InternalResolveIntent(InternalResolveIntentRequest),
    InternalRangeLookup(InternalRangeLookupRequest),
    InternalSnapshotCopy(InternalSnapshotCopyRequest),
}

impl Request {
    pub fn method(&self) -> Method {
        match self {
            Request::Get(_) => Method::Get,
            Request::Put(_) => Method::Put,
            Request::ConditionalPut(_) => Method::ConditionalPut,
            Request::Increment(_) => Method::Increment,
            Request::Delete(_) => Method::Delete,
            Request::DeleteRange(_) => Method::DeleteRange,
            Request::Scan(_) => Method::Scan,
            Request::EndTransaction(_) => Method::EndTransaction,
            Request::InternalEndTxn(_) => Method::InternalEndTxn,
            Request::InternalHeartbeatTxn(_) => Method::InternalHeartbeatTxn,
            Request::InternalPushTxn(_) => Method::InternalPushTxn,
            Request::InternalResolveIntent(_) => Method::InternalResolveIntent,
            Request::InternalRangeLookup(_) => Method::InternalRangeLookup,
            Request::InternalSnapshotCopy(_) => Method::InternalSnapshotCopy,
        }
    }

    pub fn header(&self) -> &RequestHeader {
        match self {
            Request::Get(r) => &r.header,
            Request::Put(r) => &r.header,
            Request::ConditionalPut(r) => &r.header,
            Request::Increment(r) => &r.header,
            Request::Delete(r) => &r.header,
            Request::DeleteRange(r) => &r.header,
            Request::Scan(r) => &r.header,
            Request::EndTransaction(r) => &r.header,
            Request::InternalEndTxn(r) => &r.header,
            Request::InternalHeartbeatTxn(r) => &r.header,
            Request::InternalPushTxn(r) => &r.header,
            Request::InternalResolveIntent(r) => &r.header,
            Request::InternalRangeLookup(r) => &r.header,
            Request::InternalSnapshotCopy(r) => &r.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut RequestHeader {
        match self {
            Request::Get(r) => &mut r.header,
            Request::Put(r) => &mut r.header,
            Request::ConditionalPut(r) => &mut r.header,
            Request::Increment(r) => &mut r.header,
            Request::Delete(r) => &mut r.header,
            Request::DeleteRange(r) => &mut r.header,
            Request::Scan(r) => &mut r.header,
            Request::EndTransaction(r) => &mut r.header,
            Request::InternalEndTxn(r) => &mut r.header,
            Request::InternalHeartbeatTxn(r) => &mut r.header,
            Request::InternalPushTxn(r) => &mut r.header,
            Request::InternalResolveIntent(r) => &mut r.header,
            Request::InternalRangeLookup(r) => &mut r.header,
            Request::InternalSnapshotCopy(r) => &mut r.header,
        }
    }
}

/// Any response, tagged by method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Get(GetResponse),
    Put(PutResponse),
    ConditionalPut(ConditionalPutResponse),
    Increment(IncrementResponse),
    Delete(DeleteResponse),
    DeleteRange(DeleteRangeResponse),
    Scan(ScanResponse),
    EndTransaction(EndTransactionResponse),
    InternalEndTxn(InternalEndTxnResponse),
    InternalHeartbeatTxn(InternalHeartbeatTxnResponse),
    InternalPushTxn(InternalPushTxnResponse),
    InternalResolveIntent(InternalResolveIntentResponse),
    InternalRangeLookup(InternalRangeLookupResponse),
    InternalSnapshotCopy(InternalSnapshotCopyResponse),
}

impl Response {
    /// An empty reply of the right shape for `method`, ready for the
    /// routing layer to populate.
    pub fn empty_for(method: Method) -> Self {
        match method {
            Method::Get => Response::Get(GetResponse::default()),
            Method::Put => Response::Put(PutResponse::default()),
            Method::ConditionalPut => Response::ConditionalPut(ConditionalPutResponse::default()),
            Method::Increment => Response::Increment(IncrementResponse::default()),
            Method::Delete => Response::Delete(DeleteResponse::default()),
            Method::DeleteRange => Response::DeleteRange(DeleteRangeResponse::default()),
            Method::Scan => Response::Scan(ScanResponse::default()),
            Method::EndTransaction => Response::EndTransaction(EndTransactionResponse::default()),
            Method::InternalEndTxn => Response::InternalEndTxn(InternalEndTxnResponse::default()),
            Method::InternalHeartbeatTxn => {
                Response::InternalHeartbeatTxn(InternalHeartbeatTxnResponse::default())
            }
            Method::InternalPushTxn => {
                Response::InternalPushTxn(InternalPushTxnResponse::default())
            }
            Method::InternalResolveIntent => {
                Response::InternalResolveIntent(InternalResolveIntentResponse::default())
            }
            Method::InternalRangeLookup => {
                Response::InternalRangeLookup(InternalRangeLookupResponse::default())
            }
            Method::InternalSnapshotCopy => {
                Response::InternalSnapshotCopy(InternalSnapshotCopyResponse::default())
            }
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Response::Get(_) => Method::Get,
            Response::Put(_) => Method::Put,
            Response::ConditionalPut(_) => Method::ConditionalPut,
            Response::Increment(_) => Method::Increment,
            Response::Delete(_) => Method::Delete,
            Response::DeleteRange(_) => Method::DeleteRange,
            Response::Scan(_) => Method::Scan,
            Response::EndTransaction(_) => Method::EndTransaction,
            Response::InternalEndTxn(_) => Method::InternalEndTxn,
            Response::InternalHeartbeatTxn(_) => Method::InternalHeartbeatTxn,
            Response::InternalPushTxn(_) => Method::InternalPushTxn,
            Response::InternalResolveIntent(_) => Method::InternalResolveIntent,
            Response::InternalRangeLookup(_) => Method::InternalRangeLookup,
            Response::InternalSnapshotCopy(_) => Method::InternalSnapshotCopy,
        }
    }

    pub fn header(&self) -> &ResponseHeader {
        match self {
            Response::Get(r) => &r.header,
            Response::Put(r) => &r.header,
            Response::ConditionalPut(r) => &r.header,
            Response::Increment(r) => &r.header,
            Response::Delete(r) => &r.header,
            Response::DeleteRange(r) => &r.header,
            Response::Scan(r) => &r.header,
            Response::EndTransaction(r) => &r.header,
            Response::InternalEndTxn(r) => &r.header,
            Response::InternalHeartbeatTxn(r) => &r.header,
            Response::InternalPushTxn(r) => &r.header,
            Response::InternalResolveIntent(r) => &r.header,
            Response::InternalRangeLookup(r) => &r.header,
            Response::InternalSnapshotCopy(r) => &r.header,
        }
    }

    pub fn header_mut(&mut self) -> &mut ResponseHeader {
        match self {
            Response::Get(r) => &mut r.header,
            Response::Put(r) => &mut r.header,
            Response::ConditionalPut(r) => &mut r.header,
            Response::Increment(r) => &mut r.header,
            Response::Delete(r) => &mut r.header,
            Response::DeleteRange(r) => &mut r.header,
            Response::Scan(r) => &mut r.header,
            Response::EndTransaction(r) => &mut r.header,
            Response::InternalEndTxn(r) => &mut r.header,
            Response::InternalHeartbeatTxn(r) => &mut r.header,
            Response::InternalPushTxn(r) => &mut r.header,
            Response::InternalResolveIntent(r) => &mut r.header,
            Response::InternalRangeLookup(r) => &mut r.header,
            Response::InternalSnapshotCopy(r) => &mut r.header,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_response_matches_request_method() {
        let methods = [
            Method::Get,
            Method::Put,
            Method::ConditionalPut,
            Method::Increment,
            Method::Delete,
            Method::DeleteRange,
            Method::Scan,
            Method::EndTransaction,
            Method::InternalEndTxn,
            Method::InternalHeartbeatTxn,
            Method::InternalPushTxn,
            Method::InternalResolveIntent,
            Method::InternalRangeLookup,
            Method::InternalSnapshotCopy,
        ];
        for method in methods {
            assert_eq!(Response::empty_for(method).method(), method);
        }
    }

    #[test]
    fn internal_family_is_flagged() {
        assert!(Method::InternalPushTxn.is_internal());
        assert!(Method::InternalSnapshotCopy.is_internal());
        assert!(!Method::Get.is_internal());
        assert!(!Method::EndTransaction.is_internal());
    }

    #[test]
    fn header_mutation_through_the_enum() {
        let mut req = Request::Put(PutRequest {
            header: RequestHeader::with_key(&b"k"[..]),
            value: Value::from_bytes(&b"v"[..]),
        });
        req.header_mut().user = "root".to_string();
        assert_eq!(req.header().user, "root");
        assert_eq!(req.method(), Method::Put);
    }

    #[test]
    fn unassigned_cmd_id_is_empty() {
        assert!(ClientCmdId::default().is_empty());
        assert!(!ClientCmdId {
            wall_time: 1,
            random: 2
        }
        .is_empty());
    }
}

//! In-process routing sender backed by a latest-value map.
//!
//! Serves the non-internal request set against an in-memory store so tests
//! and the workload tool can drive the full client stack without a
//! cluster. It applies operations at wall-clock timestamps and knows
//! nothing about intents or conflict detection; it is a harness, not a
//! storage engine.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use strata_proto::api::{
    ConditionalPutResponse, DeleteRangeResponse, DeleteResponse, EndTransactionResponse,
    GetResponse, IncrementResponse, KeyValue, PutResponse, ResponseHeader, ScanResponse,
};
use strata_proto::txn::TransactionStatus;
use strata_proto::{Error, Request, Response, Timestamp, Value};

use crate::clock::Clock;
use crate::sender::{Call, Sender};

pub struct LocalSender {
    clock: Arc<dyn Clock>,
    store: RwLock<BTreeMap<Vec<u8>, Value>>,
}

impl LocalSender {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            store: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of live keys, for assertions and workload reporting.
    pub fn len(&self) -> usize {
        self.store.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now(), 0)
    }

    fn header(&self) -> ResponseHeader {
        ResponseHeader {
            timestamp: self.now(),
            ..ResponseHeader::default()
        }
    }

    fn header_with_error(&self, err: Error) -> ResponseHeader {
        ResponseHeader {
            error: Some(err),
            timestamp: self.now(),
            ..ResponseHeader::default()
        }
    }
}

/// Payload equality as conditional put sees it: tags and contents, not
/// checksum or timestamp.
fn payload_matches(actual: Option<&Value>, expected: Option<&Value>) -> bool {
    match (actual, expected) {
        (None, None) => true,
        (Some(actual), Some(expected)) => {
            actual.bytes == expected.bytes && actual.integer == expected.integer
        }
        _ => false,
    }
}

#[async_trait]
impl Sender for LocalSender {
    async fn send(&self, call: &mut Call) {
        call.reply = match &call.args {
            Request::Get(req) => {
                let store = self.store.read().unwrap();
                Response::Get(GetResponse {
                    header: self.header(),
                    value: store.get(&req.header.key).cloned(),
                })
            }
            Request::Put(req) => {
                let now = self.now();
                let mut value = req.value.clone();
                value.timestamp = Some(now);
                self.store
                    .write()
                    .unwrap()
                    .insert(req.header.key.clone(), value);
                Response::Put(PutResponse {
                    header: self.header(),
                })
            }
            Request::ConditionalPut(req) => {
                let now = self.now();
                let mut store = self.store.write().unwrap();
                let existing = store.get(&req.header.key);
                if payload_matches(existing, req.exp_value.as_ref()) {
                    let mut value = req.value.clone();
                    value.timestamp = Some(now);
                    store.insert(req.header.key.clone(), value);
                    Response::ConditionalPut(ConditionalPutResponse {
                        header: self.header(),
                        actual_value: None,
                    })
                } else {
                    let actual = existing.cloned();
                    Response::ConditionalPut(ConditionalPutResponse {
                        header: self.header_with_error(Error::other(format!(
                            "unexpected value for key {:?}",
                            String::from_utf8_lossy(&req.header.key)
                        ))),
                        actual_value: actual,
                    })
                }
            }
            Request::Increment(req) => {
                let now = self.now();
                let mut store = self.store.write().unwrap();
                match store.get(&req.header.key) {
                    Some(existing) if existing.integer.is_none() => {
                        Response::Increment(IncrementResponse {
                            header: self.header_with_error(Error::UnexpectedValueType {
                                key: req.header.key.clone(),
                            }),
                            new_value: 0,
                        })
                    }
                    existing => {
                        let old = existing.and_then(|value| value.integer).unwrap_or(0);
                        let new_value = old.wrapping_add(req.increment);
                        let mut value = Value::from_integer(new_value);
                        value.init_checksum(&req.header.key);
                        value.timestamp = Some(now);
                        store.insert(req.header.key.clone(), value);
                        Response::Increment(IncrementResponse {
                            header: self.header(),
                            new_value,
                        })
                    }
                }
            }
            Request::Delete(req) => {
                self.store.write().unwrap().remove(&req.header.key);
                Response::Delete(DeleteResponse {
                    header: self.header(),
                })
            }
            Request::DeleteRange(req) => {
                let mut store = self.store.write().unwrap();
                let doomed: Vec<Vec<u8>> = if req.end_key <= req.header.key {
                    Vec::new()
                } else {
                    store
                        .range(req.header.key.clone()..req.end_key.clone())
                        .map(|(k, _)| k.clone())
                        .collect()
                };
                for key in &doomed {
                    store.remove(key);
                }
                Response::DeleteRange(DeleteRangeResponse {
                    header: self.header(),
                    num_deleted: doomed.len() as i64,
                })
            }
            Request::Scan(req) => {
                let store = self.store.read().unwrap();
                let mut rows = Vec::new();
                if req.end_key > req.header.key {
                    for (key, value) in store.range(req.header.key.clone()..req.end_key.clone()) {
                        if req.max_results > 0 && rows.len() as i64 >= req.max_results {
                            break;
                        }
                        rows.push(KeyValue {
                            key: key.clone(),
                            value: value.clone(),
                        });
                    }
                }
                Response::Scan(ScanResponse {
                    header: self.header(),
                    rows,
                })
            }
            Request::EndTransaction(req) => {
                // Echo the transaction back with its final status so the
                // coordinator's merge observes the outcome.
                let txn = req.header.txn.as_ref().map(|txn| {
                    let mut txn = txn.clone();
                    txn.status = if req.commit {
                        TransactionStatus::Committed
                    } else {
                        TransactionStatus::Aborted
                    };
                    txn
                });
                let mut header = self.header();
                header.txn = txn;
                Response::EndTransaction(EndTransactionResponse {
                    header,
                    commit_timestamp: self.now(),
                })
            }
            other => {
                let method = other.method();
                let mut reply = Response::empty_for(method);
                reply.header_mut().set_error(Error::other(format!(
                    "{method} is not served by the local sender"
                )));
                reply
            }
        };
    }
}

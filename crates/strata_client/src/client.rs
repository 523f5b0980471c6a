//! The client handle: synchronous calls, typed wrappers, and the
//! transaction retry driver.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::FutureExt;
use tracing::error;

use strata_proto::api::KeyValue;
use strata_proto::{Error, Response, Timestamp, Value};

use crate::clock::Clock;
use crate::dispatch::SingleCallSender;
use crate::retry::{Backoff, RetryOptions};
use crate::sender::{Call, Sender};
use crate::txn::{TransactionOptions, TxnSender};

/// Client-side tunables. Process-wide configuration; clone per handle.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Transport-fault retry policy applied by the dispatcher.
    pub dispatch_retry: RetryOptions,
    /// Conflict retry policy applied by the transaction driver.
    pub txn_retry: RetryOptions,
    /// Assumed maximum clock offset between nodes; bounds the uncertainty
    /// interval of new transactions.
    pub max_clock_skew: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            dispatch_retry: RetryOptions::default().with_tag("dispatch"),
            txn_retry: RetryOptions::default().with_tag("txn"),
            max_clock_skew: Duration::from_millis(250),
        }
    }
}

/// The two dispatcher variants a handle can hold. Both expose the routing
/// sender directly, so nothing ever needs to recover it by inspecting the
/// concrete wrapper type.
enum ClientSender {
    Single(Arc<SingleCallSender>),
    Txn(Arc<TxnSender>),
}

/// Handle to the KV store.
///
/// A handle constructed with [`Client::new`] is non-transactional; the
/// handle passed to a `run_transaction` closure is a transactional child
/// that lives for the duration of that call. Handles may be shared across
/// tasks; concurrent sends are safe.
pub struct Client {
    /// Default user stamped on calls whose header has none.
    pub user: String,
    /// Default user priority stamped on calls whose header has none.
    pub user_priority: Option<i32>,
    sender: ClientSender,
    clock: Arc<dyn Clock>,
    config: ClientConfig,
}

impl Client {
    /// A non-transactional handle over the given routing sender.
    pub fn new(routing: Arc<dyn Sender>, clock: Arc<dyn Clock>) -> Self {
        Self::with_config(routing, clock, ClientConfig::default())
    }

    pub fn with_config(
        routing: Arc<dyn Sender>,
        clock: Arc<dyn Clock>,
        config: ClientConfig,
    ) -> Self {
        let dispatcher = SingleCallSender::with_retry_options(
            routing,
            clock.clone(),
            config.dispatch_retry.clone(),
        );
        Self {
            user: String::new(),
            user_priority: None,
            sender: ClientSender::Single(Arc::new(dispatcher)),
            clock,
            config,
        }
    }

    /// The routing sender underneath whichever dispatcher this handle holds.
    pub fn routing(&self) -> Arc<dyn Sender> {
        match &self.sender {
            ClientSender::Single(s) => s.routing().clone(),
            ClientSender::Txn(s) => s.routing(),
        }
    }

    /// True for handles handed to `run_transaction` closures.
    pub fn is_transactional(&self) -> bool {
        matches!(self.sender, ClientSender::Txn(_))
    }

    /// Execute one call and surface the reply-header outcome.
    pub async fn call(&self, call: &mut Call) -> Result<(), Error> {
        {
            let header = call.args.header_mut();
            if header.user.is_empty() {
                header.user = self.user.clone();
            }
            if header.user_priority.is_none() {
                header.user_priority = self.user_priority;
            }
        }
        match &self.sender {
            ClientSender::Single(s) => s.send(call).await,
            ClientSender::Txn(s) => s.send(call).await,
        }
        call.result()
    }

    /// Run `retryable` as a distributed transaction.
    ///
    /// The closure may run any number of times, so it must have no
    /// externally visible side effects beyond the database itself; reads
    /// and writes through the provided handle are retried together. On a
    /// clean return the transaction is committed (unless the closure ended
    /// it explicitly); on error it is aborted and the closure's error is
    /// returned.
    pub async fn run_transaction<F, Fut>(
        &self,
        opts: TransactionOptions,
        mut retryable: F,
    ) -> Result<(), Error>
    where
        F: FnMut(Arc<Client>) -> Fut + Send,
        Fut: Future<Output = Result<(), Error>> + Send,
    {
        if self.is_transactional() {
            return Err(Error::NestedTransaction);
        }

        let txn_sender = Arc::new(TxnSender::new(
            self.routing(),
            self.clock.clone(),
            self.config.dispatch_retry.clone(),
            opts.clone(),
            self.user.clone(),
            self.user_priority,
            self.config.max_clock_skew,
        ));
        let child = Arc::new(Client {
            user: self.user.clone(),
            user_priority: self.user_priority,
            sender: ClientSender::Txn(txn_sender.clone()),
            clock: self.clock.clone(),
            config: self.config.clone(),
        });

        let retry = self.config.txn_retry.clone().with_tag(opts.name.clone());
        let mut backoff = Backoff::new(&retry);
        let result = loop {
            // Each iteration is one epoch of the transaction.
            txn_sender.begin_epoch();
            let prev_id = txn_sender.txn().id;

            let closure_result = std::panic::AssertUnwindSafe(retryable(child.clone()))
                .catch_unwind()
                .await;
            let outcome = match closure_result {
                Ok(outcome) => outcome,
                Err(panic) => {
                    // Leave no transaction pending behind a panicking caller.
                    abort_pending(&child, &txn_sender, "closure panicked").await;
                    txn_sender.close();
                    std::panic::resume_unwind(panic);
                }
            };

            let err = match outcome {
                // Closure succeeded without ending the txn itself: commit.
                Ok(()) if !txn_sender.txn_ended() => child.end_transaction(true).await.err(),
                Ok(()) => None,
                Err(err) => Some(err),
            };

            match err {
                None => break Ok(()),
                Some(Error::ReadWithinUncertaintyInterval { .. }) => {
                    // The server already pushed our timestamp past the
                    // conflicting value; re-read immediately at the same
                    // epoch.
                    backoff.reset();
                }
                Some(Error::TransactionRetry { .. }) => {
                    // Serializable restart at a higher epoch, immediately.
                    txn_sender.restart();
                    backoff.reset();
                }
                Some(err @ Error::TransactionAborted { .. }) => {
                    // The server destroyed the txn record; continue under a
                    // fresh identity.
                    txn_sender.replace_if_stale(&prev_id, &self.clock);
                    match backoff.next_delay() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => break Err(err),
                    }
                }
                Some(err @ Error::TransactionPush { .. }) => {
                    match backoff.next_delay() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => break Err(err),
                    }
                }
                Some(err) => break Err(err),
            }
        };

        if let Err(err) = &result {
            abort_pending(&child, &txn_sender, &err.to_string()).await;
        }
        txn_sender.close();
        result
    }

    /// Commit or abort the current transaction explicitly.
    pub async fn end_transaction(&self, commit: bool) -> Result<(), Error> {
        let mut call = Call::end_transaction(commit);
        self.call(&mut call).await
    }

    /// Fetch and verify the value at `key`. Absent keys are `Ok(None)`.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Value>, Error> {
        let mut call = Call::get(key);
        self.call(&mut call).await?;
        let Response::Get(reply) = &call.reply else {
            return Err(mismatched_reply(&call));
        };
        match &reply.value {
            Some(value) => {
                value.verify(key)?;
                Ok(Some(value.clone()))
            }
            None => Ok(None),
        }
    }

    /// Fetch an opaque byte value with its write timestamp.
    pub async fn get_bytes(&self, key: &[u8]) -> Result<Option<(Bytes, Timestamp)>, Error> {
        let Some(value) = self.get(key).await? else {
            return Ok(None);
        };
        if value.integer.is_some() {
            return Err(Error::UnexpectedValueType { key: key.to_vec() });
        }
        let timestamp = value.timestamp.unwrap_or_default();
        Ok(Some((value.bytes.unwrap_or_default(), timestamp)))
    }

    /// Fetch and decode a structured message into `msg`.
    ///
    /// Returns `(found, write timestamp)`. A value that fails decoding
    /// surfaces [`Error::Decode`] carrying the recovered timestamp.
    pub async fn get_message<M>(&self, key: &[u8], msg: &mut M) -> Result<(bool, Timestamp), Error>
    where
        M: prost::Message + Default,
    {
        let Some(value) = self.get(key).await? else {
            return Ok((false, Timestamp::zero()));
        };
        if value.integer.is_some() {
            return Err(Error::UnexpectedValueType { key: key.to_vec() });
        }
        let timestamp = value.timestamp.unwrap_or_default();
        let bytes = value.bytes.unwrap_or_default();
        match M::decode(bytes.as_ref()) {
            Ok(decoded) => {
                *msg = decoded;
                Ok((true, timestamp))
            }
            Err(err) => Err(Error::Decode {
                timestamp,
                message: err.to_string(),
            }),
        }
    }

    /// Store an opaque byte value.
    pub async fn put_bytes(&self, key: &[u8], bytes: impl Into<Bytes>) -> Result<(), Error> {
        self.put_value(key, Value::from_bytes(bytes.into())).await
    }

    /// Encode and store a structured message.
    pub async fn put_message<M: prost::Message>(&self, key: &[u8], msg: &M) -> Result<(), Error> {
        self.put_value(key, Value::from_bytes(msg.encode_to_vec()))
            .await
    }

    /// Store a value envelope, stamping its keyed checksum.
    pub async fn put_value(&self, key: &[u8], mut value: Value) -> Result<(), Error> {
        value.init_checksum(key);
        let mut call = Call::put(key, value);
        self.call(&mut call).await
    }

    /// Store `value` only if the existing value matches `exp_value`
    /// (`None` = expect absent).
    pub async fn conditional_put(
        &self,
        key: &[u8],
        mut value: Value,
        exp_value: Option<Value>,
    ) -> Result<(), Error> {
        value.init_checksum(key);
        let mut call = Call::conditional_put(key, value, exp_value);
        self.call(&mut call).await
    }

    /// Atomically add `delta` to the integer value at `key`, returning the
    /// new value.
    pub async fn increment(&self, key: &[u8], delta: i64) -> Result<i64, Error> {
        let mut call = Call::increment(key, delta);
        self.call(&mut call).await?;
        let Response::Increment(reply) = &call.reply else {
            return Err(mismatched_reply(&call));
        };
        Ok(reply.new_value)
    }

    /// True if any value exists at `key`.
    pub async fn contains(&self, key: &[u8]) -> Result<bool, Error> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn delete(&self, key: &[u8]) -> Result<(), Error> {
        let mut call = Call::delete(key);
        self.call(&mut call).await
    }

    /// Delete every key in `[start, end)`, returning how many were removed.
    pub async fn delete_range(&self, start: &[u8], end: &[u8]) -> Result<i64, Error> {
        let mut call = Call::delete_range(start, end);
        self.call(&mut call).await?;
        let Response::DeleteRange(reply) = &call.reply else {
            return Err(mismatched_reply(&call));
        };
        Ok(reply.num_deleted)
    }

    /// Fetch and verify up to `max_results` rows from `[start, end)`.
    pub async fn scan(
        &self,
        start: &[u8],
        end: &[u8],
        max_results: i64,
    ) -> Result<Vec<KeyValue>, Error> {
        let mut call = Call::scan(start, end, max_results);
        self.call(&mut call).await?;
        let Response::Scan(reply) = &call.reply else {
            return Err(mismatched_reply(&call));
        };
        for row in &reply.rows {
            row.value.verify(&row.key)?;
        }
        Ok(reply.rows.clone())
    }

    /// Close this handle's dispatcher. The routing sender is shared and
    /// stays open for other handles.
    pub fn close(&self) {
        match &self.sender {
            ClientSender::Single(s) => s.close(),
            ClientSender::Txn(s) => s.close(),
        }
    }
}

/// Best-effort abort of a still-pending transaction. Failures are logged,
/// never propagated, so they cannot mask the primary error.
async fn abort_pending(child: &Client, txn_sender: &TxnSender, cause: &str) {
    if txn_sender.txn_ended() {
        return;
    }
    if let Err(abort_err) = child.end_transaction(false).await {
        error!(
            txn = %txn_sender.txn().short_id(),
            error = %abort_err,
            cause,
            "failure aborting transaction"
        );
    }
}

fn mismatched_reply(call: &Call) -> Error {
    Error::other(format!(
        "reply shape does not match {} request",
        call.method()
    ))
}

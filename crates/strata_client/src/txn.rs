//! Transactional dispatcher: header injection and response interception.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use strata_proto::txn::{IsolationType, Transaction};
use strata_proto::{Method, Timestamp};

use crate::clock::Clock;
use crate::dispatch::SingleCallSender;
use crate::retry::RetryOptions;
use crate::sender::{Call, Sender};

/// Caller-facing settings for one `run_transaction` invocation.
#[derive(Clone, Debug, Default)]
pub struct TransactionOptions {
    /// Concise description of the transaction for debugging.
    pub name: String,
    pub isolation: IsolationType,
}

/// Length of the random transaction id.
const TXN_ID_LEN: usize = 16;

/// Build a pristine transaction record with fresh random identity.
fn fresh_txn(
    opts: &TransactionOptions,
    clock: &Arc<dyn Clock>,
    max_clock_skew: Duration,
) -> Transaction {
    let mut rng = rand::thread_rng();
    let mut id = vec![0u8; TXN_ID_LEN];
    rng.fill(id.as_mut_slice());
    let timestamp = Timestamp::new(clock.now(), 0);
    Transaction {
        name: opts.name.clone(),
        id,
        priority: rng.gen(),
        isolation: opts.isolation,
        timestamp,
        max_timestamp: timestamp.add_wall(max_clock_skew.as_nanos().min(i64::MAX as u128) as i64),
        ..Transaction::default()
    }
}

/// Dispatcher wrapper that owns the in-flight transaction record.
///
/// Every outgoing request gets the current record attached (plus user
/// defaults when the header has none); every incoming response with a txn
/// in its header is merged back, the server being authoritative. The
/// record is only touched from the caller's own call stack, but a lock
/// keeps closures that fan out concurrent calls safe.
pub struct TxnSender {
    inner: SingleCallSender,
    user: String,
    user_priority: Option<i32>,
    opts: TransactionOptions,
    max_clock_skew: Duration,
    txn: RwLock<Transaction>,
    txn_ended: AtomicBool,
}

impl TxnSender {
    pub(crate) fn new(
        routing: Arc<dyn Sender>,
        clock: Arc<dyn Clock>,
        dispatch_retry: RetryOptions,
        opts: TransactionOptions,
        user: String,
        user_priority: Option<i32>,
        max_clock_skew: Duration,
    ) -> Self {
        let txn = fresh_txn(&opts, &clock, max_clock_skew);
        Self {
            inner: SingleCallSender::with_retry_options(routing, clock, dispatch_retry),
            user,
            user_priority,
            opts,
            max_clock_skew,
            txn: RwLock::new(txn),
            txn_ended: AtomicBool::new(false),
        }
    }

    /// Snapshot of the current transaction record.
    pub fn txn(&self) -> Transaction {
        self.txn.read().unwrap().clone()
    }

    /// The wrapped routing sender.
    pub fn routing(&self) -> Arc<dyn Sender> {
        self.inner.routing().clone()
    }

    /// True once any `EndTransaction` has passed through, success or not.
    pub(crate) fn txn_ended(&self) -> bool {
        self.txn_ended.load(Ordering::Acquire)
    }

    /// Clear the end-of-transaction latch before [re]running the closure.
    pub(crate) fn begin_epoch(&self) {
        self.txn_ended.store(false, Ordering::Release);
    }

    /// Bump the epoch for a serializable restart at a pushed timestamp.
    pub(crate) fn restart(&self) {
        let mut txn = self.txn.write().unwrap();
        txn.epoch += 1;
    }

    /// After an abort, make sure the record carries a fresh identity.
    ///
    /// The server normally returns a pristine replacement in the response
    /// header and the merge has already adopted it; only regenerate locally
    /// when the id is still the aborted one.
    pub(crate) fn replace_if_stale(&self, prev_id: &[u8], clock: &Arc<dyn Clock>) {
        let mut txn = self.txn.write().unwrap();
        if txn.id == prev_id {
            *txn = fresh_txn(&self.opts, clock, self.max_clock_skew);
        }
    }
}

#[async_trait]
impl Sender for TxnSender {
    async fn send(&self, call: &mut Call) {
        {
            let header = call.args.header_mut();
            if header.user.is_empty() {
                header.user = self.user.clone();
            }
            if header.user_priority.is_none() {
                header.user_priority = self.user_priority;
            }
            header.txn = Some(self.txn.read().unwrap().clone());
        }

        self.inner.send(call).await;

        if let Some(reply_txn) = call.reply.header().txn.as_ref() {
            self.txn.write().unwrap().update(reply_txn);
        }
        // Latch regardless of outcome so the driver never double-ends.
        if matches!(call.method(), Method::EndTransaction | Method::InternalEndTxn) {
            self.txn_ended.store(true, Ordering::Release);
        }
    }

    fn close(&self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::clock::ManualClock;
    use strata_proto::txn::TransactionStatus;
    use strata_proto::RequestHeader;

    /// Routing stand-in that records decorated request headers and
    /// optionally returns a txn in the reply header.
    struct RecordingSender {
        headers: Mutex<Vec<RequestHeader>>,
        reply_txn: Mutex<Option<Transaction>>,
    }

    #[async_trait]
    impl Sender for RecordingSender {
        async fn send(&self, call: &mut Call) {
            self.headers
                .lock()
                .unwrap()
                .push(call.args.header().clone());
            call.reply.header_mut().txn = self.reply_txn.lock().unwrap().clone();
        }
    }

    fn txn_sender(routing: Arc<RecordingSender>) -> TxnSender {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000_000));
        TxnSender::new(
            routing,
            clock,
            RetryOptions::default(),
            TransactionOptions {
                name: "test".to_string(),
                isolation: IsolationType::Serializable,
            },
            "root".to_string(),
            Some(7),
            Duration::from_millis(250),
        )
    }

    fn recording() -> Arc<RecordingSender> {
        Arc::new(RecordingSender {
            headers: Mutex::new(Vec::new()),
            reply_txn: Mutex::new(None),
        })
    }

    #[tokio::test]
    async fn attaches_txn_and_user_defaults_to_every_request() {
        let routing = recording();
        let sender = txn_sender(routing.clone());
        let expected = sender.txn();

        let mut call = Call::get(&b"k"[..]);
        sender.send(&mut call).await;

        let headers = routing.headers.lock().unwrap();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].user, "root");
        assert_eq!(headers[0].user_priority, Some(7));
        assert_eq!(headers[0].txn.as_ref(), Some(&expected));
    }

    #[tokio::test]
    async fn merges_reply_txn_into_the_record() {
        let routing = recording();
        let sender = txn_sender(routing.clone());
        let mut pushed = sender.txn();
        pushed.timestamp = pushed.timestamp.add_wall(500);
        pushed.status = TransactionStatus::Committed;
        *routing.reply_txn.lock().unwrap() = Some(pushed.clone());

        let mut call = Call::get(&b"k"[..]);
        sender.send(&mut call).await;

        assert_eq!(sender.txn(), pushed);
    }

    #[tokio::test]
    async fn end_transaction_latches_even_on_failure() {
        let routing = recording();
        let sender = txn_sender(routing.clone());
        assert!(!sender.txn_ended());

        let mut call = Call::end_transaction(true);
        sender.send(&mut call).await;
        assert!(sender.txn_ended());

        sender.begin_epoch();
        assert!(!sender.txn_ended());
    }

    #[tokio::test]
    async fn restart_bumps_the_epoch_and_keeps_the_id() {
        let routing = recording();
        let sender = txn_sender(routing);
        let before = sender.txn();
        sender.restart();
        let after = sender.txn();
        assert_eq!(after.id, before.id);
        assert_eq!(after.epoch, before.epoch + 1);
    }

    #[tokio::test]
    async fn replace_if_stale_only_replaces_the_aborted_id() {
        let routing = recording();
        let sender = txn_sender(routing);
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(2_000_000));

        let original = sender.txn();
        sender.replace_if_stale(&original.id, &clock);
        let replaced = sender.txn();
        assert_ne!(replaced.id, original.id);
        assert_eq!(replaced.epoch, 0);

        // A second call with the old id must leave the fresh record alone.
        sender.replace_if_stale(&original.id, &clock);
        assert_eq!(sender.txn().id, replaced.id);
    }
}

//! Single-call dispatcher: command-id assignment and transport retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::warn;

use strata_proto::api::ClientCmdId;
use strata_proto::Error;

use crate::clock::Clock;
use crate::retry::{Backoff, RetryOptions};
use crate::sender::{Call, Sender};

/// Wraps the routing sender with per-call idempotency and fault retry.
///
/// Each logical call gets a command id exactly once; transport-class
/// failures are retried under exponential backoff with that same id so the
/// server-side response cache can swallow replays. Logical errors and
/// successes pass straight through.
pub struct SingleCallSender {
    routing: Arc<dyn Sender>,
    clock: Arc<dyn Clock>,
    retry: RetryOptions,
    closed: AtomicBool,
}

impl SingleCallSender {
    pub fn new(routing: Arc<dyn Sender>, clock: Arc<dyn Clock>) -> Self {
        Self::with_retry_options(routing, clock, RetryOptions::default().with_tag("dispatch"))
    }

    pub fn with_retry_options(
        routing: Arc<dyn Sender>,
        clock: Arc<dyn Clock>,
        retry: RetryOptions,
    ) -> Self {
        Self {
            routing,
            clock,
            retry,
            closed: AtomicBool::new(false),
        }
    }

    /// The wrapped routing sender.
    pub fn routing(&self) -> &Arc<dyn Sender> {
        &self.routing
    }

    /// Assign a command id unless one already survives from an earlier
    /// attempt group.
    fn ensure_cmd_id(&self, call: &mut Call) {
        if call.args.header().cmd_id.is_empty() {
            call.args.header_mut().cmd_id = ClientCmdId {
                wall_time: self.clock.now(),
                random: rand::thread_rng().gen(),
            };
        }
    }
}

#[async_trait]
impl Sender for SingleCallSender {
    async fn send(&self, call: &mut Call) {
        if self.closed.load(Ordering::Acquire) {
            call.reply
                .header_mut()
                .set_error(Error::transport("send on closed client"));
            return;
        }
        self.ensure_cmd_id(call);

        let mut backoff = Backoff::new(&self.retry);
        loop {
            call.reply.header_mut().error = None;
            self.routing.send(call).await;

            match call.reply.header().error.as_ref() {
                Some(err) if err.is_transient() => {
                    let Some(delay) = backoff.next_delay() else {
                        // Attempt budget spent; surface the transport error.
                        return;
                    };
                    warn!(
                        method = %call.method(),
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "transport failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                _ => return,
            }
        }
    }

    /// Refuse further sends. The routing sender is shared and stays open.
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::clock::ManualClock;
    use strata_proto::api::ClientCmdId;

    /// Routing stand-in that fails transiently a fixed number of times and
    /// records the command id of every arrival.
    struct FlakySender {
        failures_left: Mutex<usize>,
        seen_cmd_ids: Mutex<Vec<ClientCmdId>>,
    }

    #[async_trait]
    impl Sender for FlakySender {
        async fn send(&self, call: &mut Call) {
            self.seen_cmd_ids
                .lock()
                .unwrap()
                .push(call.args.header().cmd_id);
            let mut left = self.failures_left.lock().unwrap();
            if *left > 0 {
                *left -= 1;
                call.reply
                    .header_mut()
                    .set_error(Error::transport("connection refused"));
            }
        }
    }

    fn fast_retry() -> RetryOptions {
        RetryOptions {
            backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            ..RetryOptions::default()
        }
    }

    #[tokio::test]
    async fn retries_transport_faults_with_a_stable_cmd_id() {
        let routing = Arc::new(FlakySender {
            failures_left: Mutex::new(2),
            seen_cmd_ids: Mutex::new(Vec::new()),
        });
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        let sender =
            SingleCallSender::with_retry_options(routing.clone(), clock, fast_retry());

        let mut call = Call::get(&b"k"[..]);
        sender.send(&mut call).await;
        assert!(call.result().is_ok());

        let seen = routing.seen_cmd_ids.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert!(!seen[0].is_empty());
        assert!(seen.iter().all(|id| *id == seen[0]));
    }

    #[tokio::test]
    async fn distinct_logical_calls_get_distinct_cmd_ids() {
        let routing = Arc::new(FlakySender {
            failures_left: Mutex::new(0),
            seen_cmd_ids: Mutex::new(Vec::new()),
        });
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        let sender = SingleCallSender::new(routing.clone(), clock);

        let mut first = Call::get(&b"a"[..]);
        let mut second = Call::get(&b"b"[..]);
        sender.send(&mut first).await;
        sender.send(&mut second).await;

        let seen = routing.seen_cmd_ids.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
    }

    #[tokio::test]
    async fn exhausted_attempts_surface_the_transport_error() {
        let routing = Arc::new(FlakySender {
            failures_left: Mutex::new(usize::MAX),
            seen_cmd_ids: Mutex::new(Vec::new()),
        });
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        let retry = RetryOptions {
            max_attempts: 3,
            ..fast_retry()
        };
        let sender = SingleCallSender::with_retry_options(routing.clone(), clock, retry);

        let mut call = Call::get(&b"k"[..]);
        sender.send(&mut call).await;
        assert!(matches!(call.result(), Err(Error::Transport { .. })));
        assert_eq!(routing.seen_cmd_ids.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn closed_sender_rejects_sends_without_wire_traffic() {
        let routing = Arc::new(FlakySender {
            failures_left: Mutex::new(0),
            seen_cmd_ids: Mutex::new(Vec::new()),
        });
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000));
        let sender = SingleCallSender::new(routing.clone(), clock);
        sender.close();

        let mut call = Call::get(&b"k"[..]);
        sender.send(&mut call).await;
        assert!(matches!(call.result(), Err(Error::Transport { .. })));
        assert!(routing.seen_cmd_ids.lock().unwrap().is_empty());
    }
}

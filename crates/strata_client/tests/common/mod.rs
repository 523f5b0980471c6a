//! Shared helpers for client integration tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use strata_client::{Call, Client, ClientConfig, Clock, ManualClock, RetryOptions, Sender};
use strata_proto::{Method, Request};

/// Scriptable routing stand-in: records every decorated request it sees,
/// then lets the test's handler populate the reply.
pub struct MockSender {
    handler: Box<dyn Fn(&mut Call) + Send + Sync>,
    requests: Mutex<Vec<Request>>,
}

impl MockSender {
    pub fn new(handler: impl Fn(&mut Call) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every request that reached the wire, in arrival order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn methods(&self) -> Vec<Method> {
        self.requests().iter().map(|req| req.method()).collect()
    }

    pub fn count_of(&self, method: Method) -> usize {
        self.methods().iter().filter(|m| **m == method).count()
    }
}

#[async_trait]
impl Sender for MockSender {
    async fn send(&self, call: &mut Call) {
        self.requests.lock().unwrap().push(call.args.clone());
        (self.handler)(call);
    }
}

/// Retry options fast enough for tests that exercise backoff paths.
pub fn fast_retry() -> RetryOptions {
    RetryOptions {
        backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        ..RetryOptions::default()
    }
}

/// A client over `routing` with millisecond retries and a manual clock.
pub fn test_client(routing: Arc<dyn Sender>) -> Client {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000_000));
    Client::with_config(
        routing,
        clock,
        ClientConfig {
            dispatch_retry: fast_retry(),
            txn_retry: fast_retry(),
            max_clock_skew: Duration::from_millis(250),
        },
    )
}

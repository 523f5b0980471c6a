//! The sending contract between the client and the routing layer.

use async_trait::async_trait;

use strata_proto::api::{
    ConditionalPutRequest, DeleteRangeRequest, DeleteRequest, EndTransactionRequest, GetRequest,
    IncrementRequest, PutRequest, RequestHeader, ScanRequest,
};
use strata_proto::{Error, Method, Request, Response, Value};

/// One logical operation: a request paired with the reply the routing
/// layer will populate.
#[derive(Clone, Debug)]
pub struct Call {
    pub args: Request,
    pub reply: Response,
}

impl Call {
    /// Wrap a request with an empty reply of the matching shape.
    pub fn new(args: Request) -> Self {
        let reply = Response::empty_for(args.method());
        Self { args, reply }
    }

    pub fn method(&self) -> Method {
        self.args.method()
    }

    /// Outcome recorded in the reply header.
    pub fn result(&self) -> Result<(), Error> {
        self.reply.header().result()
    }

    pub fn get(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Request::Get(GetRequest {
            header: RequestHeader::with_key(key),
        }))
    }

    pub fn put(key: impl Into<Vec<u8>>, value: Value) -> Self {
        Self::new(Request::Put(PutRequest {
            header: RequestHeader::with_key(key),
            value,
        }))
    }

    /// Put applied only when the existing value matches `exp_value`
    /// (`None` expects the key to be absent).
    pub fn conditional_put(
        key: impl Into<Vec<u8>>,
        value: Value,
        exp_value: Option<Value>,
    ) -> Self {
        Self::new(Request::ConditionalPut(ConditionalPutRequest {
            header: RequestHeader::with_key(key),
            value,
            exp_value,
        }))
    }

    pub fn increment(key: impl Into<Vec<u8>>, increment: i64) -> Self {
        Self::new(Request::Increment(IncrementRequest {
            header: RequestHeader::with_key(key),
            increment,
        }))
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self::new(Request::Delete(DeleteRequest {
            header: RequestHeader::with_key(key),
        }))
    }

    pub fn delete_range(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self::new(Request::DeleteRange(DeleteRangeRequest {
            header: RequestHeader::with_key(start),
            end_key: end.into(),
        }))
    }

    pub fn scan(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>, max_results: i64) -> Self {
        Self::new(Request::Scan(ScanRequest {
            header: RequestHeader::with_key(start),
            end_key: end.into(),
            max_results,
        }))
    }

    pub fn end_transaction(commit: bool) -> Self {
        Self::new(Request::EndTransaction(EndTransactionRequest {
            header: RequestHeader::default(),
            commit,
        }))
    }
}

/// Anything that can execute a [`Call`]: the routing layer itself, or one
/// of the client's two dispatcher wrappers.
///
/// `send` populates `call.reply` (its header always, the body on success)
/// before returning; errors travel in the reply header rather than a
/// return value so the outcome survives intact across retries and header
/// interception.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, call: &mut Call);

    /// Release resources. Senders shared by reference stay usable for
    /// other owners.
    fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pair_request_and_reply_shapes() {
        let call = Call::scan(&b"a"[..], &b"z"[..], 10);
        assert_eq!(call.method(), Method::Scan);
        assert_eq!(call.reply.method(), Method::Scan);
        assert!(call.result().is_ok());
    }

    #[test]
    fn result_reflects_reply_header_error() {
        let mut call = Call::get(&b"k"[..]);
        call.reply
            .header_mut()
            .set_error(Error::transport("unreachable"));
        assert!(matches!(
            call.result(),
            Err(Error::Transport { .. })
        ));
    }
}

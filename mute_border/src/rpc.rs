use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub type RpcResult = Result<Value, RpcError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RpcError {
    #[error("websocket not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
    #[error("rpc call \"{method}\" timed out")]
    Timeout { method: String },
    #[error("rpc call \"{method}\" failed: {detail}")]
    Server { method: String, detail: String },
    #[error("rpc result decode failed: {0}")]
    Decode(String),
}

struct PendingCall {
    method: String,
    deadline: Instant,
    resolver: oneshot::Sender<RpcResult>,
}

/// Outstanding requests keyed by id.
///
/// Ids start at 1 and increase by one per call. At `u64::MAX` the counter
/// wraps back to 1, skipping any id that is still outstanding.
pub struct PendingCalls {
    next_id: u64,
    timeout: Duration,
    pending: HashMap<u64, PendingCall>,
}

impl PendingCalls {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: 0,
            timeout,
            pending: HashMap::new(),
        }
    }

    /// Registers a call and hands back its id plus the receiver its outcome
    /// will be delivered on.
    pub fn issue(&mut self, method: &str, now: Instant) -> (u64, oneshot::Receiver<RpcResult>) {
        let id = self.allocate_id();
        let (resolver, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                deadline: now + self.timeout,
                resolver,
            },
        );
        (id, rx)
    }

    /// Completes call `id`. Returns `false` for ids with no pending entry
    /// (late or duplicate responses).
    pub fn resolve(&mut self, id: u64, outcome: Result<Value, String>) -> bool {
        let Some(call) = self.pending.remove(&id) else {
            return false;
        };
        let outcome = outcome.map_err(|detail| RpcError::Server {
            method: call.method,
            detail,
        });
        let _ = call.resolver.send(outcome);
        true
    }

    /// Rejects every call whose deadline is at or before `now`.
    pub fn expire(&mut self, now: Instant) -> usize {
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(call) = self.pending.remove(id) {
                tracing::warn!(id, method = %call.method, "rpc call timed out");
                let _ = call.resolver.send(Err(RpcError::Timeout {
                    method: call.method,
                }));
            }
        }
        expired.len()
    }

    pub fn fail_all(&mut self) {
        for (_, call) in self.pending.drain() {
            let _ = call.resolver.send(Err(RpcError::Closed));
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|c| c.deadline).min()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn allocate_id(&mut self) -> u64 {
        loop {
            self.next_id = self.next_id.wrapping_add(1);
            if self.next_id != 0 && !self.pending.contains_key(&self.next_id) {
                return self.next_id;
            }
        }
    }
}

/// Waits on an optional in-flight call; never completes when there is none.
pub async fn wait_for(call: &mut Option<oneshot::Receiver<RpcResult>>) -> RpcResult {
    match call {
        Some(rx) => rx.await.unwrap_or(Err(RpcError::Closed)),
        None => std::future::pending().await,
    }
}

pub async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::oneshot::error::TryRecvError;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[test]
    fn ids_increase_from_one() {
        let mut calls = PendingCalls::new(TIMEOUT);
        let now = Instant::now();
        let (a, _ra) = calls.issue("getInputConfigs", now);
        let (b, _rb) = calls.issue("getInputConfigs", now);
        assert_eq!((a, b), (1, 2));
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn response_resolves_and_removes_entry() {
        let mut calls = PendingCalls::new(TIMEOUT);
        let (id, mut rx) = calls.issue("getInputConfigs", Instant::now());

        assert!(calls.resolve(id, Ok(json!([]))));
        assert_eq!(rx.try_recv().unwrap(), Ok(json!([])));
        assert!(calls.is_empty());
        assert!(!calls.resolve(id, Ok(json!([]))), "duplicate must be ignored");
    }

    #[test]
    fn error_field_rejects() {
        let mut calls = PendingCalls::new(TIMEOUT);
        let (id, mut rx) = calls.issue("getInputConfigs", Instant::now());
        calls.resolve(id, Err("{\"code\":-32601}".to_string()));
        assert!(matches!(rx.try_recv().unwrap(), Err(RpcError::Server { .. })));
    }

    #[test]
    fn timeout_rejects_and_late_response_is_ignored() {
        let mut calls = PendingCalls::new(TIMEOUT);
        let start = Instant::now();
        let (id, mut rx) = calls.issue("getInputConfigs", start);

        assert_eq!(calls.expire(start + Duration::from_secs(9)), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        assert_eq!(calls.next_deadline(), Some(start + TIMEOUT));
        assert_eq!(calls.expire(start + TIMEOUT), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(RpcError::Timeout {
                method: "getInputConfigs".to_string()
            })
        );
        assert!(!calls.contains(id));
        assert!(!calls.resolve(id, Ok(json!([]))));
        assert_eq!(calls.next_deadline(), None);
    }

    #[test]
    fn fail_all_closes_everything() {
        let mut calls = PendingCalls::new(TIMEOUT);
        let now = Instant::now();
        let (_, mut a) = calls.issue("a", now);
        let (_, mut b) = calls.issue("b", now);
        calls.fail_all();
        assert_eq!(a.try_recv().unwrap(), Err(RpcError::Closed));
        assert_eq!(b.try_recv().unwrap(), Err(RpcError::Closed));
        assert!(calls.is_empty());
    }

    #[test]
    fn counter_wraps_to_one_and_skips_outstanding_ids() {
        let mut calls = PendingCalls::new(TIMEOUT);
        let now = Instant::now();
        calls.next_id = u64::MAX - 1;
        let (max, _r1) = calls.issue("a", now);
        assert_eq!(max, u64::MAX);
        let (one, _r2) = calls.issue("b", now);
        assert_eq!(one, 1);

        calls.next_id = u64::MAX;
        let (next, _r3) = calls.issue("c", now);
        assert_eq!(next, 2, "id 1 is still outstanding");
    }
}

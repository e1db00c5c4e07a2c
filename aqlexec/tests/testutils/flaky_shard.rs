//! Shard connection that is not ready on every other request

use aqlexec::{ExecutionError, RemoteResponse, ShardConnection};
use serde_json::Value as JsonValue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct FlakyShard {
    inner: Arc<dyn ShardConnection>,
    requests: AtomicUsize,
    waits: AtomicUsize,
}

impl FlakyShard {
    pub fn new(inner: Arc<dyn ShardConnection>) -> Self {
        Self {
            inner,
            requests: AtomicUsize::new(0),
            waits: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn waits(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

impl ShardConnection for FlakyShard {
    fn execute(&self, request: &JsonValue) -> Result<RemoteResponse, ExecutionError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 0 {
            self.waits.fetch_add(1, Ordering::SeqCst);
            return Ok(RemoteResponse::Waiting);
        }
        self.inner.execute(request)
    }
}

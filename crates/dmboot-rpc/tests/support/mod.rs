//! Scripted transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use dmboot_common::RpcError;
use dmboot_rpc::RpcTransport;
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Default)]
struct Script {
    replies: HashMap<String, VecDeque<Result<Value, RpcError>>>,
    calls: Vec<(String, Value)>,
}

/// Answers each method from its own queue; an exhausted queue is a transport error.
#[derive(Clone, Default)]
pub struct ScriptedTransport(Arc<Mutex<Script>>);

impl ScriptedTransport {
    pub fn reply(&self, method: &str, reply: Result<Value, RpcError>) -> &Self {
        self.0
            .lock()
            .replies
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.0.lock().calls.clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.0.lock().calls.iter().filter(|(m, _)| m == method).count()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let mut script = self.0.lock();
        script.calls.push((method.to_string(), params));
        script
            .replies
            .get_mut(method)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(RpcError::Transport {
                    message: format!("connection refused ({method})"),
                })
            })
    }
}

pub fn refused() -> RpcError {
    RpcError::Transport {
        message: "connection refused".to_string(),
    }
}

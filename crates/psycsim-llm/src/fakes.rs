//! Scripted capability for tests
//!
//! `ScriptedCapability` answers every request through a caller-supplied
//! responder and records the requests it saw, so tests can assert on the
//! exact prompts the pipeline built.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::capability::{Generation, GenerationCapability, GenerationRequest, TokenUsage};
use crate::error::LlmError;
use crate::LlmResult;

type Responder = dyn Fn(&GenerationRequest) -> LlmResult<Value> + Send + Sync;

/// In-memory [`GenerationCapability`] driven by a closure.
pub struct ScriptedCapability {
    responder: Box<Responder>,
    usage_per_call: TokenUsage,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: AtomicUsize,
}

impl ScriptedCapability {
    pub fn new(
        responder: impl Fn(&GenerationRequest) -> LlmResult<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            usage_per_call: TokenUsage::default(),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with the same JSON value.
    pub fn constant(value: Value) -> Self {
        Self::new(move |_| Ok(value.clone()))
    }

    /// Always fail with an API error.
    pub fn failing() -> Self {
        Self::new(|_| {
            Err(LlmError::Api {
                status: 503,
                body: "scripted failure".to_string(),
            })
        })
    }

    /// Report this token usage for every successful call.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage_per_call = usage;
        self
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<GenerationRequest>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl GenerationCapability for ScriptedCapability {
    async fn generate(&self, request: GenerationRequest) -> LlmResult<Generation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = (self.responder)(&request);
        self.lock().push(request);
        outcome.map(|json| Generation {
            json,
            usage: self.usage_per_call,
        })
    }
}

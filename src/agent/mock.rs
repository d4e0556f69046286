//! Scripted runtime for tests and dry runs.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::runtime::{AgentRequest, AgentRuntime, AgentTranscript, RuntimeError};

type Responder = dyn Fn(&AgentRequest) -> Result<AgentTranscript, RuntimeError> + Send + Sync;

/// Answers every request with a caller-supplied function and records the
/// requests it saw. Tool calls the request's policy forbids are marked
/// refused, like a real runtime would.
pub struct ScriptedRuntime {
    responder: Box<Responder>,
    requests: Arc<Mutex<Vec<AgentRequest>>>,
}

impl ScriptedRuntime {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&AgentRequest) -> Result<AgentTranscript, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of the requests received so far.
    pub fn requests_handle(&self) -> Arc<Mutex<Vec<AgentRequest>>> {
        Arc::clone(&self.requests)
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn run(&self, request: AgentRequest) -> Result<AgentTranscript, RuntimeError> {
        let result = (self.responder)(&request);
        let policy = request.policy.clone();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let mut transcript = result?;
        for call in &mut transcript.tool_calls {
            call.refused = !policy.authorize(&call.name);
        }
        Ok(transcript)
    }
}

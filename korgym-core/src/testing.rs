//! Scripted doubles for the transport, agent and provider seams.
//!
//! Each double plays back a queue of replies; the last reply repeats once
//! the queue is drained, so a single scripted reply serves every call.

use crate::agent::{Agent, AgentOutput};
use crate::client::GameTransport;
use crate::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderError, Usage,
};
use korgym_error::{Error, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

fn next_step<S: Clone>(queue: &mut VecDeque<S>) -> Option<S> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

// ============================================================================
// Transport
// ============================================================================

#[derive(Debug, Clone)]
enum Reply {
    Body(Value),
    Fail(String),
}

/// Game server stand-in keyed by endpoint.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON reply for `endpoint`
    pub fn reply(self, endpoint: &str, body: Value) -> Self {
        self.push(endpoint, Reply::Body(body));
        self
    }

    /// Queue a `GameUnavailable` failure for `endpoint`
    pub fn fail(self, endpoint: &str, reason: &str) -> Self {
        self.push(endpoint, Reply::Fail(reason.to_string()));
        self
    }

    fn push(&self, endpoint: &str, reply: Reply) {
        let mut replies = self.replies.lock().unwrap();
        replies.entry(endpoint.to_string()).or_default().push_back(reply);
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| e == endpoint)
            .count()
    }
}

impl GameTransport for ScriptedTransport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        self.requests
            .lock()
            .unwrap()
            .push((endpoint.to_string(), body.clone()));

        let step = self
            .replies
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(next_step);

        match step {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail(reason)) => Err(Error::game_unavailable(endpoint, reason)),
            None => Err(Error::game_unavailable(endpoint, "no scripted reply")),
        }
    }
}

// ============================================================================
// Agent
// ============================================================================

#[derive(Debug, Clone)]
enum Turn {
    Say(Option<String>),
    Fail(String),
}

/// Agent that answers from a script and remembers every prompt.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    turns: Mutex<VecDeque<Turn>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: impl Into<String>) -> Self {
        self.turns.lock().unwrap().push_back(Turn::Say(Some(text.into())));
        self
    }

    /// Queue a turn with no final output
    pub fn silent(self) -> Self {
        self.turns.lock().unwrap().push_back(Turn::Say(None));
        self
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.turns.lock().unwrap().push_back(Turn::Fail(message.into()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Agent for ScriptedAgent {
    async fn run(&self, prompt: &str) -> Result<AgentOutput> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        tokio::task::yield_now().await;

        let turn = {
            let mut turns = self.turns.lock().unwrap();
            next_step(&mut *turns)
        };
        match turn {
            Some(Turn::Say(final_output)) => Ok(AgentOutput { final_output }),
            Some(Turn::Fail(message)) => Err(Error::agent_failed(message)),
            None => Ok(AgentOutput::default()),
        }
    }
}

// ============================================================================
// Provider
// ============================================================================

type Responder = Box<dyn Fn(&CompletionRequest) -> std::result::Result<String, ProviderError> + Send + Sync>;

/// Provider driven by a closure; tracks how many calls overlap.
pub struct ScriptedProvider {
    responder: Responder,
    requests: Mutex<Vec<CompletionRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&CompletionRequest) -> std::result::Result<String, ProviderError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always answer `text`
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Always fail with a 503
    pub fn failing() -> Self {
        Self::new(|_| {
            Err(ProviderError::Api {
                status: 503,
                message: "scripted outage".into(),
            })
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Highest number of overlapping `complete` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        tokio::task::yield_now().await;
        let outcome = (self.responder)(&request);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let content = outcome?;
        Ok(CompletionResponse {
            id: format!("scripted-{}", self.calls()),
            model: request.model.unwrap_or_else(|| self.default_model().to_string()),
            usage: Usage {
                prompt_tokens: request_len(&request.messages),
                completion_tokens: content.len(),
                total_tokens: request_len(&request.messages) + content.len(),
            },
            content: Some(content),
            finish_reason: FinishReason::Stop,
        })
    }
}

fn request_len(messages: &[crate::provider::ChatMessage]) -> usize {
    messages.iter().map(|m| m.content.len()).sum()
}

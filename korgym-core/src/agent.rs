//! The agent capability a game session plays against.
//!
//! A session only ever calls [`Agent::run`] once per round. [`LlmAgent`] is
//! the provider-backed implementation; anything else (a human at a terminal,
//! a scripted double, a remote agent service) can implement the trait.

use crate::experience::Experience;
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, UsageTracker};
use korgym_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::debug;

/// What an agent returns for one prompt
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub final_output: Option<String>,
}

impl AgentOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            final_output: Some(text.into()),
        }
    }
}

#[allow(async_fn_in_trait)]
pub trait Agent {
    /// Answer one rendered game prompt
    async fn run(&self, prompt: &str) -> Result<AgentOutput>;
}

impl<A: Agent> Agent for &A {
    async fn run(&self, prompt: &str) -> Result<AgentOutput> {
        (**self).run(prompt).await
    }
}

/// Agent that forwards each prompt to an LLM provider as a user message.
pub struct LlmAgent<P> {
    provider: P,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    system_prompt: Option<String>,
    usage: Mutex<UsageTracker>,
}

impl<P: LlmProvider> LlmAgent<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            model: None,
            temperature: None,
            max_tokens: None,
            system_prompt: None,
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Prepend previously learned lessons as a system prompt.
    ///
    /// An empty slice leaves the agent unchanged.
    pub fn with_experiences(self, experiences: &[Experience]) -> Self {
        if experiences.is_empty() {
            return self;
        }

        let mut prompt = String::from(
            "Lessons learned from earlier games. Apply them when they fit the current board:\n",
        );
        for (i, experience) in experiences.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, experience));
        }
        prompt.push_str("\nEnd your reply with a line of the form 'Answer: <action>'.");
        self.with_system_prompt(prompt)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Token usage accumulated over every `run`
    pub fn usage(&self) -> UsageTracker {
        self.usage
            .lock()
            .map(|tracker| tracker.clone())
            .unwrap_or_default()
    }
}

impl<P: LlmProvider> Agent for LlmAgent<P> {
    async fn run(&self, prompt: &str) -> Result<AgentOutput> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ChatMessage::system(system.as_str()));
        }
        messages.push(ChatMessage::user(prompt));

        let request = CompletionRequest::new(messages)
            .with_model(self.model.as_deref())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self.provider.complete(request).await.map_err(|e| {
            let cause = e.into_error();
            let retryable = cause.is_retryable();
            let err = Error::agent_failed(cause.message().to_string())
                .with_operation("agent::run")
                .with_context("provider", self.provider.name());
            let err = if retryable { err.temporary() } else { err };
            err.set_source(cause)
        })?;

        if let Ok(mut tracker) = self.usage.lock() {
            tracker.track(&response.model, &response.usage);
        }
        debug!(
            model = %response.model,
            tokens = response.usage.total_tokens,
            "agent completion"
        );

        Ok(AgentOutput {
            final_output: response.content,
        })
    }
}

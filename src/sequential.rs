use std::sync::Arc;

use serde_json::Value;

use crate::{
    agents::{Agent, AgentError, AgentTurn, Context, INPUT_KEY},
    LLMProvider,
};

#[derive(Debug, Clone)]
pub enum SequentialEvent {
    Step {
        agent: String,
        prompt: String,
        output: String,
    },
    Completed {
        agent: String,
        output: String,
    },
}

#[derive(Debug, Clone)]
pub struct SequentialRun {
    pub final_output: String,
    pub events: Vec<SequentialEvent>,
    pub turns: Vec<AgentTurn>,
    pub context: Context,
}

impl SequentialRun {
    /// Output of the step whose agent writes to `key`.
    pub fn output(&self, key: &str) -> Option<&str> {
        self.context.get(key).and_then(Value::as_str)
    }
}

/// Runs agents one after another. Each agent sees the task context plus the
/// outputs of every earlier agent, stored under their output keys, and the
/// latest output under `input`.
pub struct SequentialOrchestrator {
    provider: Arc<dyn LLMProvider>,
    model: String,
    pipeline: Vec<Agent>,
}

impl SequentialOrchestrator {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            pipeline: Vec::new(),
        }
    }

    pub fn with_agents<I>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = Agent>,
    {
        self.pipeline.extend(agents);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn run(&self, task: impl Into<String>) -> Result<SequentialRun, AgentError> {
        let mut context = Context::new();
        context.insert(INPUT_KEY.to_string(), Value::String(task.into()));
        self.run_with_context(context).await
    }

    pub async fn run_with_context(&self, mut context: Context) -> Result<SequentialRun, AgentError> {
        let Some(last) = self.pipeline.last() else {
            return Err(AgentError::NoAgentsRegistered);
        };

        let mut events = Vec::with_capacity(self.pipeline.len() + 1);
        let mut turns = Vec::with_capacity(self.pipeline.len());

        for agent in &self.pipeline {
            tracing::info!(agent = agent.name(), "running step");
            let turn = agent
                .execute(self.provider.as_ref(), &self.model, &context)
                .await
                .inspect_err(|error| {
                    tracing::warn!(agent = agent.name(), %error, "step failed");
                })?;

            context.insert(
                agent.output_key().to_string(),
                Value::String(turn.output.clone()),
            );
            context.insert(INPUT_KEY.to_string(), Value::String(turn.output.clone()));

            events.push(SequentialEvent::Step {
                agent: turn.agent.clone(),
                prompt: turn.prompt.clone(),
                output: turn.output.clone(),
            });
            turns.push(turn);
        }

        let final_output = turns
            .last()
            .map(|turn| turn.output.clone())
            .unwrap_or_default();

        events.push(SequentialEvent::Completed {
            agent: last.name().to_string(),
            output: final_output.clone(),
        });

        Ok(SequentialRun {
            final_output,
            events,
            turns,
            context,
        })
    }
}

use std::fmt;

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    types::{ChatMessage, CompletionRequest},
    LLMError, LLMProvider,
};

/// Shared variables an agent's prompt template is rendered against.
pub type Context = Map<String, Value>;

/// Context key holding the most recent step output (or the initial task).
pub const INPUT_KEY: &str = "input";

const DEFAULT_PROMPT: &str = "{{input}}";

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("template render error: {0}")]
    TemplateRender(#[from] handlebars::RenderError),
    #[error("agent {0} returned an empty response")]
    EmptyResponse(String),
    #[error("no agents registered")]
    NoAgentsRegistered,
    #[error(transparent)]
    Provider(#[from] LLMError),
}

#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    prompt: String,
    output_key: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    model_override: Option<String>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("output_key", &self.output_key)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("model_override", &self.model_override)
            .finish()
    }
}

impl Agent {
    pub fn from_string(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        let name = name.into();
        let output_key = output_key_for(&name);
        Self {
            name,
            instructions: instructions.into(),
            prompt: DEFAULT_PROMPT.to_string(),
            output_key,
            temperature: None,
            max_tokens: None,
            model_override: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_key(&self) -> &str {
        &self.output_key
    }

    /// Handlebars template for the user message. Values are inserted unescaped.
    pub fn with_prompt(mut self, template: impl Into<String>) -> Self {
        self.prompt = template.into();
        self
    }

    pub fn with_output_key(mut self, key: impl Into<String>) -> Self {
        self.output_key = key.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn render_prompt(&self, context: &Context) -> Result<String, AgentError> {
        let mut hb = Handlebars::new();
        hb.register_escape_fn(handlebars::no_escape);
        Ok(hb.render_template(&self.prompt, context)?)
    }

    pub(crate) async fn execute(
        &self,
        provider: &dyn LLMProvider,
        model: &str,
        context: &Context,
    ) -> Result<AgentTurn, AgentError> {
        let prompt = self.render_prompt(context)?;
        let messages = vec![
            ChatMessage::system(self.instructions.clone()),
            ChatMessage::user(prompt.clone()),
        ];

        let target_model = self.model_override.as_deref().unwrap_or(model);

        let mut request = CompletionRequest::new(target_model.to_string(), messages);

        if let Some(max_tokens) = self.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        tracing::debug!(
            agent = %self.name,
            provider = provider.name(),
            model = target_model,
            prompt_chars = prompt.len(),
            "executing agent"
        );

        let response = provider.complete(request).await?;
        let output = clean_output(response.message.text().unwrap_or_default());

        if output.is_empty() {
            return Err(AgentError::EmptyResponse(self.name.clone()));
        }

        Ok(AgentTurn {
            agent: self.name.clone(),
            prompt,
            output,
        })
    }
}

/// One completed model call made on behalf of an agent.
#[derive(Debug, Clone)]
pub struct AgentTurn {
    pub agent: String,
    pub prompt: String,
    pub output: String,
}

// Reasoning models (e.g. deepseek-r1 on Groq) prefix their answer with a <think> block.
static RE_THINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").unwrap());

pub fn clean_output(content: &str) -> String {
    RE_THINK.replace_all(content, "").trim().to_string()
}

fn output_key_for(name: &str) -> String {
    let key: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if key.is_empty() {
        "output".to_string()
    } else {
        key
    }
}

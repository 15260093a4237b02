//! The research-then-write pipeline behind every article.
//!
//! A researcher agent identifies the next big trend for a topic, then a writer
//! agent turns that research into an article. The writer's prompt embeds the
//! researcher's output, so the two calls always run in that order.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    agents::{Agent, AgentError, Context},
    config::{ProviderKind, Settings},
    providers::openai::{OpenAI, OpenAIConfig},
    search::{format_headlines, DuckDuckGo, Headline, NewsSearch, SearchError},
    sequential::SequentialOrchestrator,
    LLMError, LLMProvider,
};

pub const MIN_SEARCH_DEPTH: usize = 3;
pub const MAX_SEARCH_DEPTH: usize = 10;
pub const DEFAULT_SEARCH_DEPTH: usize = 5;

pub const RESEARCH_KEY: &str = "research";
pub const ARTICLE_KEY: &str = "article";

pub fn clamp_search_depth(depth: usize) -> usize {
    depth.clamp(MIN_SEARCH_DEPTH, MAX_SEARCH_DEPTH)
}

const RESEARCH_INSTRUCTIONS: &str = "You are a senior research analyst at a technology think tank. \
You spot emerging trends early and assess them with balanced, evidence-based reasoning.";

const RESEARCH_PROMPT: &str = "Identify the next big trend in {{topic}}.

Cover:
1. What the trend is and why it is gaining momentum
2. Its pros and cons
3. The opportunities it opens up
4. The risks involved
{{#if headlines}}
Ground your analysis in these recent news results:

{{headlines}}
{{/if}}
Return a structured research report with a short section for each point.";

const WRITER_INSTRUCTIONS: &str = "You are a tech content strategist known for insightful, \
engaging articles. You turn complex research into compelling narratives for a general audience.";

const WRITER_PROMPT: &str = "Write an engaging article on the following research about {{topic}}.

{{style_guidance}}

Use clear section headers and end with a short conclusion.

Research:
{{research}}";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ArticleStyle {
    #[default]
    Comprehensive,
    QuickSummary,
    Technical,
    Simplified,
}

impl ArticleStyle {
    pub const ALL: [ArticleStyle; 4] = [
        ArticleStyle::Comprehensive,
        ArticleStyle::QuickSummary,
        ArticleStyle::Technical,
        ArticleStyle::Simplified,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArticleStyle::Comprehensive => "comprehensive",
            ArticleStyle::QuickSummary => "quick_summary",
            ArticleStyle::Technical => "technical",
            ArticleStyle::Simplified => "simplified",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArticleStyle::Comprehensive => "Comprehensive",
            ArticleStyle::QuickSummary => "Quick Summary",
            ArticleStyle::Technical => "Technical",
            ArticleStyle::Simplified => "Simplified",
        }
    }

    pub fn guidance(self) -> &'static str {
        match self {
            ArticleStyle::Comprehensive => {
                "Write a thorough article of several sections that covers every point in the research."
            }
            ArticleStyle::QuickSummary => {
                "Keep it brief: a headline and at most three short paragraphs with the key takeaways."
            }
            ArticleStyle::Technical => {
                "Write for a technical audience and keep the precise terminology, mechanisms and figures from the research."
            }
            ArticleStyle::Simplified => {
                "Write for newcomers in plain language without jargon, using a relatable example or analogy."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRequest {
    pub topic: String,
    #[serde(default)]
    pub style: ArticleStyle,
    #[serde(default)]
    pub news_search: bool,
    #[serde(default = "default_search_depth")]
    pub search_depth: usize,
}

fn default_search_depth() -> usize {
    DEFAULT_SEARCH_DEPTH
}

impl ArticleRequest {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            style: ArticleStyle::default(),
            news_search: false,
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }

    pub fn with_style(mut self, style: ArticleStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_news_search(mut self, depth: usize) -> Self {
        self.news_search = true;
        self.search_depth = clamp_search_depth(depth);
        self
    }
}

/// Prompt and output of one model call, shown as the agent activity log.
#[derive(Debug, Clone, Serialize)]
pub struct StepLog {
    pub agent: String,
    pub prompt: String,
    pub output: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub topic: String,
    pub style: ArticleStyle,
    pub research: String,
    pub body: String,
    pub steps: Vec<StepLog>,
    pub headlines: Vec<Headline>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Agent(#[from] AgentError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error("news search was requested but no search backend is configured")]
    SearchUnavailable,
    #[error("failed to create model client: {0}")]
    Client(#[from] LLMError),
}

pub fn researcher() -> Agent {
    Agent::from_string("Senior Research Analyst", RESEARCH_INSTRUCTIONS)
        .with_prompt(RESEARCH_PROMPT)
        .with_output_key(RESEARCH_KEY)
}

pub fn writer() -> Agent {
    Agent::from_string("Tech Content Strategist", WRITER_INSTRUCTIONS)
        .with_prompt(WRITER_PROMPT)
        .with_output_key(ARTICLE_KEY)
}

pub struct ArticlePipeline {
    orchestrator: SequentialOrchestrator,
    search: Option<Arc<dyn NewsSearch>>,
}

impl ArticlePipeline {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        Self::with_agents(provider, model, researcher(), writer())
    }

    /// Uses custom agents for the two steps. Their output keys are fixed so the
    /// writer prompt can always reach the research.
    pub fn with_agents(
        provider: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        researcher: Agent,
        writer: Agent,
    ) -> Self {
        let orchestrator = SequentialOrchestrator::new(provider, model).with_agents([
            researcher.with_output_key(RESEARCH_KEY),
            writer.with_output_key(ARTICLE_KEY),
        ]);

        Self {
            orchestrator,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Arc<dyn NewsSearch>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, PipelineError> {
        let mut config = match settings.provider {
            ProviderKind::Groq => OpenAIConfig::groq(settings.api_key.clone()),
            ProviderKind::OpenAI => OpenAIConfig::new(settings.api_key.clone()),
        }
        .with_timeout(settings.request_timeout);

        if let Some(base_url) = &settings.base_url {
            config = config.with_base_url(base_url.clone());
        }

        let provider: Arc<dyn LLMProvider> = Arc::new(OpenAI::from_config(config)?);

        let researcher = researcher()
            .with_model(settings.research_model())
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens);
        let writer = writer()
            .with_model(settings.writer_model())
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens);

        Ok(
            Self::with_agents(provider, settings.model.clone(), researcher, writer)
                .with_search(Arc::new(DuckDuckGo::new()?)),
        )
    }

    pub fn model(&self) -> &str {
        self.orchestrator.model()
    }

    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    pub async fn run(&self, request: &ArticleRequest) -> Result<Article, PipelineError> {
        tracing::info!(
            topic = %request.topic,
            style = request.style.as_str(),
            news_search = request.news_search,
            "generating article"
        );

        let headlines = if request.news_search {
            let search = self.search.as_ref().ok_or(PipelineError::SearchUnavailable)?;
            let query = format!("Latest news about {} last 7 days", request.topic);
            let depth = clamp_search_depth(request.search_depth);
            let headlines = search.news(&query, depth).await.inspect_err(|error| {
                tracing::warn!(backend = search.name(), %error, "news search failed");
            })?;
            tracing::debug!(count = headlines.len(), "collected headlines");
            headlines
        } else {
            Vec::new()
        };

        let mut context = Context::new();
        context.insert("topic".to_string(), Value::String(request.topic.clone()));
        context.insert(
            "style_guidance".to_string(),
            Value::String(request.style.guidance().to_string()),
        );
        context.insert(
            "headlines".to_string(),
            Value::String(format_headlines(&headlines)),
        );

        let run = self.orchestrator.run_with_context(context).await?;

        let research = run.output(RESEARCH_KEY).unwrap_or_default().to_string();
        let steps = run
            .turns
            .into_iter()
            .map(|turn| StepLog {
                agent: turn.agent,
                prompt: turn.prompt,
                output: turn.output,
            })
            .collect();

        Ok(Article {
            topic: request.topic.clone(),
            style: request.style,
            research,
            body: run.final_output,
            steps,
            headlines,
        })
    }
}

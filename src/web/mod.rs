//! HTML form, JSON API and health check in front of an [`ArticlePipeline`].

use std::{fmt, net::SocketAddr, sync::Arc};

use axum::{
    extract::{
        rejection::{FormRejection, JsonRejection},
        Form, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    agents::AgentError,
    config::{ConfigError, Settings},
    pipeline::{
        clamp_search_depth, Article, ArticlePipeline, ArticleRequest, ArticleStyle, PipelineError,
        StepLog, DEFAULT_SEARCH_DEPTH, MAX_SEARCH_DEPTH, MIN_SEARCH_DEPTH,
    },
    search::Headline,
};

const INDEX_TEMPLATE: &str = include_str!("index.html.hbs");

/// Initial values of the form controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormDefaults {
    pub style: ArticleStyle,
    pub news_search: bool,
    pub search_depth: usize,
}

impl Default for FormDefaults {
    fn default() -> Self {
        Self {
            style: ArticleStyle::default(),
            news_search: false,
            search_depth: DEFAULT_SEARCH_DEPTH,
        }
    }
}

pub struct AppState {
    pipeline: Result<Arc<ArticlePipeline>, String>,
    defaults: FormDefaults,
    pages: Handlebars<'static>,
}

impl AppState {
    pub fn new(pipeline: Arc<ArticlePipeline>, defaults: FormDefaults) -> Self {
        Self {
            pipeline: Ok(pipeline),
            defaults,
            pages: Handlebars::new(),
        }
    }

    /// State for a server whose configuration failed to load. Every submission
    /// reports `error` and nothing is sent upstream.
    pub fn unconfigured(error: impl fmt::Display) -> Self {
        Self {
            pipeline: Err(error.to_string()),
            defaults: FormDefaults::default(),
            pages: Handlebars::new(),
        }
    }

    /// Builds the state from loaded settings. A configuration error, or a
    /// pipeline that fails to build, leaves the server up but unconfigured;
    /// `build` is only called once settings loaded.
    pub fn from_settings<F>(settings: Result<Settings, ConfigError>, build: F) -> Self
    where
        F: FnOnce(&Settings) -> Result<ArticlePipeline, PipelineError>,
    {
        let settings = match settings {
            Ok(settings) => settings,
            Err(error) => {
                tracing::error!("configuration error: {error}; submissions will be rejected");
                return Self::unconfigured(error);
            }
        };

        match build(&settings) {
            Ok(pipeline) => {
                tracing::info!(
                    provider = ?settings.provider,
                    research_model = settings.research_model(),
                    writer_model = settings.writer_model(),
                    "pipeline ready"
                );
                Self::new(
                    Arc::new(pipeline),
                    FormDefaults {
                        style: ArticleStyle::default(),
                        news_search: settings.news_search,
                        search_depth: settings.search_depth,
                    },
                )
            }
            Err(error) => {
                tracing::error!("failed to build pipeline: {error}; submissions will be rejected");
                Self::unconfigured(error)
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.pipeline.is_ok()
    }

    fn config_error(&self) -> Option<String> {
        self.pipeline.as_ref().err().cloned()
    }

    fn model(&self) -> &str {
        match &self.pipeline {
            Ok(pipeline) => pipeline.model(),
            Err(_) => "an unconfigured model",
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/generate", post(generate))
        .route("/api/articles", post(create_article))
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await
}

#[derive(Debug, Deserialize)]
struct ArticleForm {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    style: Option<ArticleStyle>,
    #[serde(default)]
    news_search: Option<String>,
    #[serde(default)]
    search_depth: Option<String>,
}

impl ArticleForm {
    fn into_request(self) -> ArticleRequest {
        let search_depth = self
            .search_depth
            .as_deref()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .map(clamp_search_depth)
            .unwrap_or(DEFAULT_SEARCH_DEPTH);

        ArticleRequest {
            topic: self.topic,
            style: self.style.unwrap_or_default(),
            news_search: self.news_search.is_some_and(|value| value != "off"),
            search_depth,
        }
    }
}

#[derive(Serialize)]
struct PageView {
    topic: String,
    styles: Vec<StyleOption>,
    news_search: bool,
    search_depth: usize,
    min_depth: usize,
    max_depth: usize,
    model: String,
    config_error: Option<String>,
    error: Option<String>,
    article: Option<ArticleView>,
}

#[derive(Serialize)]
struct StyleOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

#[derive(Serialize)]
struct ArticleView {
    body: String,
    research: String,
    steps: Vec<StepLog>,
    headline_count: usize,
    headlines: Vec<HeadlineView>,
}

#[derive(Serialize)]
struct HeadlineView {
    title: String,
    source: String,
    date: String,
    url: Option<String>,
}

impl From<&Headline> for HeadlineView {
    fn from(headline: &Headline) -> Self {
        Self {
            title: headline
                .title
                .clone()
                .unwrap_or_else(|| "Untitled".to_string()),
            source: headline
                .source
                .clone()
                .unwrap_or_else(|| "Unknown source".to_string()),
            date: headline
                .date
                .map(|date| date.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "undated".to_string()),
            url: headline
                .url
                .clone()
                .filter(|url| url.starts_with("https://") || url.starts_with("http://")),
        }
    }
}

impl From<Article> for ArticleView {
    fn from(article: Article) -> Self {
        Self {
            headline_count: article.headlines.len(),
            headlines: article.headlines.iter().map(HeadlineView::from).collect(),
            body: article.body,
            research: article.research,
            steps: article.steps,
        }
    }
}

impl PageView {
    fn new(state: &AppState, request: &ArticleRequest) -> Self {
        Self {
            topic: request.topic.clone(),
            styles: ArticleStyle::ALL
                .iter()
                .map(|style| StyleOption {
                    value: style.as_str(),
                    label: style.label(),
                    selected: *style == request.style,
                })
                .collect(),
            news_search: request.news_search,
            search_depth: request.search_depth,
            min_depth: MIN_SEARCH_DEPTH,
            max_depth: MAX_SEARCH_DEPTH,
            model: state.model().to_string(),
            config_error: state.config_error(),
            error: None,
            article: None,
        }
    }
}

fn render_page(state: &AppState, status: StatusCode, view: &PageView) -> Response {
    match state.pages.render_template(INDEX_TEMPLATE, view) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to render page");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to render page: {error}"),
            )
                .into_response()
        }
    }
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Agent(AgentError::Provider(_))
        | PipelineError::Agent(AgentError::EmptyResponse(_))
        | PipelineError::Search(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Agent(AgentError::TemplateRender(_))
        | PipelineError::Agent(AgentError::NoAgentsRegistered)
        | PipelineError::SearchUnavailable
        | PipelineError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn default_request(defaults: FormDefaults) -> ArticleRequest {
    ArticleRequest {
        topic: String::new(),
        style: defaults.style,
        news_search: defaults.news_search,
        search_depth: defaults.search_depth,
    }
}

async fn index(State(state): State<Arc<AppState>>) -> Response {
    let request = default_request(state.defaults);
    render_page(&state, StatusCode::OK, &PageView::new(&state, &request))
}

async fn generate(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ArticleForm>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::warn!(%rejection, "rejecting malformed submission");
            let mut view = PageView::new(&state, &default_request(state.defaults));
            view.error = Some(rejection.body_text());
            return render_page(&state, rejection.status(), &view);
        }
    };

    let request = form.into_request();
    let mut view = PageView::new(&state, &request);

    // the configuration banner already carries the message
    let Ok(pipeline) = &state.pipeline else {
        tracing::warn!("rejecting submission: server is not configured");
        return render_page(&state, StatusCode::SERVICE_UNAVAILABLE, &view);
    };

    match pipeline.run(&request).await {
        Ok(article) => {
            view.article = Some(article.into());
            render_page(&state, StatusCode::OK, &view)
        }
        Err(error) => {
            tracing::error!(%error, "article generation failed");
            view.error = Some(error.to_string());
            render_page(&state, status_for(&error), &view)
        }
    }
}

#[derive(Serialize)]
struct ApiResponse<T> {
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    success: bool,
}

async fn create_article(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ArticleRequest>, JsonRejection>,
) -> Response {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(%rejection, "rejecting malformed request");
            return (rejection.status(), Json(ApiResponse {
                data: Option::<Article>::None,
                message: Some(rejection.body_text()),
                success: false,
            }))
            .into_response();
        }
    };

    let pipeline = match &state.pipeline {
        Ok(pipeline) => pipeline,
        Err(message) => {
            return (StatusCode::SERVICE_UNAVAILABLE, Json(ApiResponse {
                data: Option::<Article>::None,
                message: Some(message.clone()),
                success: false,
            }))
            .into_response();
        }
    };

    match pipeline.run(&request).await {
        Ok(article) => Json(ApiResponse {
            data: Some(article),
            message: None,
            success: true,
        })
        .into_response(),
        Err(error) => {
            tracing::error!(%error, "article generation failed");
            (status_for(&error), Json(ApiResponse {
                data: Option::<Article>::None,
                message: Some(error.to_string()),
                success: false,
            }))
            .into_response()
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    configured: bool,
    search: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let search = state
        .pipeline
        .as_ref()
        .map(|pipeline| pipeline.has_search())
        .unwrap_or(false);

    Json(ApiResponse {
        data: Health {
            status: "ok",
            configured: state.is_configured(),
            search,
        },
        message: state.config_error(),
        success: true,
    })
}

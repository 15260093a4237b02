use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use trendpress::{
    config::load_dotenv,
    pipeline::DEFAULT_SEARCH_DEPTH,
    web::{self, AppState},
    ArticlePipeline, ArticleRequest, ArticleStyle, Settings,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "trendpress")]
#[command(about = "Research the next big trend in a topic and write an article about it")]
struct Args {
    /// Env file to load instead of ./.env
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the web UI
    Serve {
        #[arg(long, env = "TRENDPRESS_BIND", default_value = "127.0.0.1:8501")]
        bind: SocketAddr,
    },
    /// Generate one article and print it
    Write {
        topic: String,

        #[arg(long, value_enum, default_value_t = ArticleStyle::Comprehensive)]
        style: ArticleStyle,

        /// Ground the research in recent news headlines
        #[arg(long)]
        news: bool,

        /// Number of headlines to fetch (3-10)
        #[arg(long, default_value_t = DEFAULT_SEARCH_DEPTH)]
        depth: usize,

        /// Print the research notes before the article
        #[arg(long)]
        show_research: bool,

        /// Print every prompt and output
        #[arg(long)]
        show_log: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let dotenv = load_dotenv(args.env_file.as_deref());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,trendpress=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match dotenv? {
        Some(path) => tracing::debug!("loaded environment from {}", path.display()),
        None => tracing::debug!("no .env file found, using process environment"),
    }

    match args.command {
        Command::Serve { bind } => serve(bind).await?,
        Command::Write {
            topic,
            style,
            news,
            depth,
            show_research,
            show_log,
        } => {
            let settings = Settings::from_env()?;
            let pipeline = ArticlePipeline::from_settings(&settings)?;

            let mut request = ArticleRequest::new(topic).with_style(style);
            if news {
                request = request.with_news_search(depth);
            }

            let article = pipeline.run(&request).await?;

            if show_log {
                for step in &article.steps {
                    println!("=== {} :: prompt\n{}\n", step.agent, step.prompt);
                    println!("=== {} :: output\n{}\n", step.agent, step.output);
                }
            } else if show_research {
                println!("=== Research\n{}\n\n=== Article", article.research);
            }

            println!("{}", article.body);
        }
    }

    Ok(())
}

async fn serve(bind: SocketAddr) -> std::io::Result<()> {
    let state = AppState::from_settings(Settings::from_env(), ArticlePipeline::from_settings);
    web::serve(bind, Arc::new(state)).await
}

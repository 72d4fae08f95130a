mod app;
mod config;
mod constants;
mod logger;

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    logger::init_logging()?;

    let questions = match std::env::args().nth(1) {
        Some(path) => config::load_questions(&path)?,
        None => constants::DEFAULT_QUESTIONS
            .iter()
            .map(|q| q.to_string())
            .collect(),
    };

    let api_key = config::load_api_key()?;
    app::run(questions, api_key).await
}

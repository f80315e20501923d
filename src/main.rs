mod config;
mod pipeline;
mod pr;
mod report;
mod review;
mod web;

use clap::Parser;
use std::error::Error;
use std::net::SocketAddr;
use std::process::ExitCode;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use crate::pipeline::Pipeline;
use crate::report::OutputFormat;

/// PR Reviewer: web tool that takes a GitHub Pull Request URL and returns
/// an AI-generated code review.
#[derive(Parser, Debug)]
#[command(name = "pr-reviewer", version, about)]
struct Cli {
    /// Review a single PR URL (e.g., https://github.com/org/repo/pull/42) and
    /// print the result instead of starting the web server
    pr_url: Option<String>,

    /// Address the web server listens on
    #[arg(long, env = "PR_REVIEWER_LISTEN", default_value = "127.0.0.1:8080")]
    listen: SocketAddr,

    /// Output format for a single-URL review
    #[arg(long, value_enum, default_value_t = OutputFormat::Terminal)]
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before anything reads the environment, RUST_LOG included.
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pr_reviewer=info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match dotenv {
        Ok(path) => debug!(path = %path.display(), "loaded .env"),
        Err(err) if err.not_found() => debug!("no .env file"),
        Err(err) => error!(error = %err, "could not read .env file"),
    }

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "startup failed");
            eprintln!("Error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    info!("loading configuration");
    let config = config::Config::load()?;
    debug!(
        github = %config.github_api_url,
        anthropic = %config.anthropic_base_url,
        model = %config.model,
        "configuration loaded"
    );

    let pipeline = Pipeline::from_config(&config)?;

    match cli.pr_url {
        Some(url) => Ok(review_once(&pipeline, &url, cli.format).await),
        None => {
            let state = web::AppState::new(pipeline)?;
            let listener = TcpListener::bind(cli.listen).await?;
            web::serve(listener, state).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn review_once(pipeline: &Pipeline, url: &str, format: OutputFormat) -> ExitCode {
    match pipeline.run(url).await {
        Ok(reviewed) => {
            let built_report =
                report::build(&reviewed.pr_ref, &reviewed.pr, Some(reviewed.review));
            report::output(&built_report, format);
            ExitCode::SUCCESS
        }
        Err(failure) => {
            if let (Some(pr_ref), Some(pr)) = (&failure.pr_ref, &failure.pr) {
                report::output(&report::build(pr_ref, pr, None), format);
            }
            eprintln!("{}: {}", failure.error.title(), failure.error.user_message());
            ExitCode::FAILURE
        }
    }
}

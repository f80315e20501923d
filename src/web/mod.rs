pub mod markdown;

use axum::extract::{Form, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use minijinja::{context, Environment, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::pipeline::{ErrorKind, Failure, Pipeline, PipelineError, Stage};
use crate::report::{self, Report};

#[derive(Debug, Error)]
pub enum WebError {
    #[error("failed to render page: {0}")]
    Template(#[from] minijinja::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
}

/// Shared by every request; nothing in it is mutated after startup.
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Result<Self, WebError> {
        let mut env = Environment::new();
        env.add_template("layout.html", include_str!("templates/layout.html"))?;
        env.add_template("index.html", include_str!("templates/index.html"))?;
        env.add_template("report.html", include_str!("templates/report.html"))?;
        env.add_filter("markdown", markdown_filter);
        Ok(Self {
            pipeline: Arc::new(pipeline),
            templates: Arc::new(env),
        })
    }

    fn render(
        &self,
        stage: Stage,
        url: &str,
        report: Option<&Report>,
        error: Option<&ErrorView>,
    ) -> Result<String, WebError> {
        let template = self.templates.get_template("index.html")?;
        Ok(template.render(context! {
            stage => stage.to_string(),
            url => url,
            report => report,
            error => error,
        })?)
    }
}

fn markdown_filter(text: &str) -> Value {
    Value::from_safe_string(markdown::render_markdown(text))
}

#[derive(Debug, Default, Deserialize)]
struct ReviewForm {
    #[serde(default)]
    url: String,
}

/// What the error panel shows.
#[derive(Debug, Serialize)]
struct ErrorView {
    kind: ErrorKind,
    title: &'static str,
    message: String,
}

impl From<&PipelineError> for ErrorView {
    fn from(error: &PipelineError) -> Self {
        ErrorView {
            kind: error.kind(),
            title: error.title(),
            message: error.user_message(),
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimit => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Auth | ErrorKind::Network | ErrorKind::Model | ErrorKind::Upstream => {
            StatusCode::BAD_GATEWAY
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/review", get(review_query).post(review_form))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Result<Html<String>, WebError> {
    Ok(Html(state.render(Stage::Idle, "", None, None)?))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn review_form(
    State(state): State<AppState>,
    Form(form): Form<ReviewForm>,
) -> Result<Response, WebError> {
    review(&state, &form.url).await
}

async fn review_query(
    State(state): State<AppState>,
    Query(form): Query<ReviewForm>,
) -> Result<Response, WebError> {
    review(&state, &form.url).await
}

async fn review(state: &AppState, url: &str) -> Result<Response, WebError> {
    match state.pipeline.run(url).await {
        Ok(reviewed) => {
            let report = report::build(&reviewed.pr_ref, &reviewed.pr, Some(reviewed.review));
            let page = state.render(Stage::Displaying, url, Some(&report), None)?;
            Ok((StatusCode::OK, Html(page)).into_response())
        }
        Err(Failure { error, pr_ref, pr }) => {
            // Keep the PR details on screen when only the review step failed.
            let report = match (&pr_ref, &pr) {
                (Some(pr_ref), Some(pr)) => Some(report::build(pr_ref, pr, None)),
                _ => None,
            };
            let view = ErrorView::from(&error);
            let page = state.render(Stage::Error, url, report.as_ref(), Some(&view))?;
            Ok((status_for(view.kind), Html(page)).into_response())
        }
    }
}

/// Serve the app on `listener` until ctrl-c.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "listening on http://{}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "could not install ctrl-c handler; serving until killed");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

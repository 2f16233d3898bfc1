use axum::{
    Router,
    extract::Query,
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::post,
};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{ConfigError, LoadOptions, config_from_str};
use crate::core::{Config, EngineError, Projection, run_projection};
use crate::report::render_html;

pub const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(
    name = "networth",
    about = "Year-by-year net worth projection (income, expenses, taxes, rebalancing)"
)]
pub struct Cli {
    /// Log level for this crate; `RUST_LOG` takes precedence.
    #[arg(long, global = true)]
    pub log_level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a projection from a config file and write the report.
    Run(RunArgs),
    /// Serve the projection over HTTP.
    Serve {
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    #[arg(short, long, default_value = "Configuration.json")]
    pub config: PathBuf,
    #[arg(short, long, help = "Age at which the projection ends")]
    pub age: Option<i32>,
    #[arg(short, long, default_value = "Results.html")]
    pub output: PathBuf,
    #[arg(long, help = "Print the JSON summary to stdout instead of writing HTML")]
    pub json: bool,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectQuery {
    age: Option<i32>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub fn router() -> Router {
    Router::new()
        .route("/api/project", post(project_handler))
        .route("/api/report", post(report_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "networth HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_handler(Query(query): Query<ProjectQuery>, body: String) -> Response {
    match project(&body, query.age) {
        Ok((config, projection)) => json_response(StatusCode::OK, projection.summary(&config)),
        Err(response) => response,
    }
}

async fn report_handler(Query(query): Query<ProjectQuery>, body: String) -> Response {
    match project(&body, query.age) {
        Ok((config, projection)) => with_cache_control(Html(render_html(&projection, &config))),
        Err(response) => response,
    }
}

fn project(body: &str, age: Option<i32>) -> Result<(Config, Projection), Response> {
    let options = LoadOptions {
        end_age: age,
        ..LoadOptions::default()
    };
    let config = config_from_str(body, &options).map_err(config_error_response)?;
    let projection = run_projection(&config).map_err(engine_error_response)?;
    info!(
        years = projection.years.len(),
        insolvent_year = ?projection.insolvent_year,
        final_net_worth = projection.final_net_worth(),
        "projection served"
    );
    Ok((config, projection))
}

fn config_error_response(err: ConfigError) -> Response {
    warn!(error = %err, "rejected config");
    error_response(StatusCode::BAD_REQUEST, &err.to_string())
}

fn engine_error_response(err: EngineError) -> Response {
    let status = match err {
        EngineError::ConfigInvalid(_) => StatusCode::BAD_REQUEST,
        EngineError::ArithmeticDomain { .. } | EngineError::InvariantViolation { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
    };
    warn!(error = %err, %status, "projection failed");
    error_response(status, &err.to_string())
}

fn with_cache_control<R: IntoResponse>(response: R) -> Response {
    let mut response = response.into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    with_cache_control((status, axum::Json(body)))
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn sample_config() -> Value {
        json!({
            "inflation": 0,
            "birthYear": 1980,
            "startYear": 2025,
            "endYear": 2027,
            "federalIncomeTaxRate": 0.45,
            "capitalGainsTaxRate": 0.34,
            "incomeExpenses": [ { "name": "Salary", "type": "basic", "amount": 5000 } ],
            "accounts": {
                "Savings": { "type": "basic", "balance": 10000, "targetBalance": 5000 },
                "Investment": { "type": "investment", "balance": 20000, "basis": 15000 }
            }
        })
    }

    async fn send(uri: &str, body: String) -> (StatusCode, Option<String>, String) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .expect("request");
        let response = router().oneshot(request).await.expect("response");
        let status = response.status();
        let cache = response
            .headers()
            .get(header::CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        (status, cache, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[test]
    fn cli_parses_run_and_serve() {
        let cli = Cli::try_parse_from([
            "networth", "run", "--config", "plan.json", "--age", "90", "--json",
        ])
        .expect("run args");
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.config, PathBuf::from("plan.json"));
                assert_eq!(args.age, Some(90));
                assert_eq!(args.output, PathBuf::from("Results.html"));
                assert!(args.json);
            }
            other => panic!("unexpected command {other:?}"),
        }

        let cli = Cli::try_parse_from(["networth", "serve"]).expect("serve args");
        assert!(matches!(cli.command, Command::Serve { port: DEFAULT_PORT }));
        assert!(Cli::try_parse_from(["networth"]).is_err());
    }

    #[tokio::test]
    async fn project_returns_json_summary() {
        let (status, cache, body) = send("/api/project", sample_config().to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("no-store"));

        let summary: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(summary["years"].as_array().map(Vec::len), Some(3));
        let first = summary["years"][0]["netWorth"].as_f64().expect("net worth");
        assert!((first - 32_750.0).abs() < 1e-6);
        assert!(summary["insolventYear"].is_null());
    }

    #[tokio::test]
    async fn age_query_overrides_horizon() {
        let (status, _, body) = send("/api/project?age=46", sample_config().to_string()).await;
        assert_eq!(status, StatusCode::OK);
        let summary: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(summary["endYear"], 2026);
    }

    #[tokio::test]
    async fn report_returns_html() {
        let (status, cache, body) = send("/api/report", sample_config().to_string()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(cache.as_deref(), Some("no-store"));
        assert!(body.contains("<TABLE>"));
        assert!(body.contains("Income Salary"));
    }

    #[tokio::test]
    async fn bad_config_is_a_bad_request() {
        let (status, _, body) = send("/api/project", "{ not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("error"));

        let mut config = sample_config();
        config["accounts"]["Savings"]["type"] = json!("crypto");
        let (status, _, body) = send("/api/report", config.to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("crypto"));
    }

    #[test]
    fn engine_failures_map_to_unprocessable() {
        let response = engine_error_response(EngineError::invariant(2030, "phase order"));
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let response = engine_error_response(EngineError::config("bad"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() {
        let (status, _, body) = send("/api/simulate", String::new()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: Value = serde_json::from_str(&body).expect("json");
        assert_eq!(error["error"], "Not found");
    }
}

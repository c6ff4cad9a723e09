use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tally_core::CalculationRecord;

const BASE_URL_ENV: &str = "TALLY_BASE_URL";
const TIMEOUT_MS_ENV: &str = "TALLY_TIMEOUT_MS";
const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4020";
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Parser)]
#[command(name = "tally")]
#[command(about = "Client for the Tally calculation service")]
struct Cli {
    /// Base URL of the calculation service instance to talk to.
    #[arg(long)]
    base_url: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate one expression, then refresh and print the history.
    Eval(EvalArgs),
    /// Print every past calculation, oldest first.
    History,
    /// Probe the service health endpoint.
    Health,
}

#[derive(Debug, Args)]
struct EvalArgs {
    expression: String,
}

#[derive(Debug, Deserialize)]
struct CalculateResponseBody {
    result: f64,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

struct ServiceClient {
    agent: ureq::Agent,
    base_url: String,
}

impl ServiceClient {
    fn new(base_url: String, timeout_ms: u64) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .build();
        Self { agent, base_url }
    }

    fn calculate(&self, expression: &str) -> Result<f64> {
        let url = format!("{}/calculate", self.base_url);
        let response = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "expression": expression }));

        match response {
            Ok(response) => {
                let body: CalculateResponseBody = response
                    .into_json()
                    .context("calculate response is not a valid JSON body")?;
                Ok(body.result)
            }
            Err(ureq::Error::Status(code, response)) => {
                let detail = response
                    .into_json::<ErrorBody>()
                    .map(|body| body.detail)
                    .unwrap_or_else(|_| format!("calculation failed with HTTP {code}"));
                Err(anyhow!("{detail}"))
            }
            Err(err) => Err(anyhow!("service unavailable at {}: {err}", self.base_url)),
        }
    }

    fn history(&self) -> Result<Vec<CalculationRecord>> {
        let url = format!("{}/history", self.base_url);
        let response = self.agent.get(&url).call().map_err(|err| match err {
            ureq::Error::Status(code, _) => anyhow!("history request failed with HTTP {code}"),
            other => anyhow!("service unavailable at {}: {other}", self.base_url),
        })?;
        response.into_json().context("history response is not a valid JSON body")
    }

    fn health(&self) -> Result<Value> {
        let url = format!("{}/health", self.base_url);
        let response = self.agent.get(&url).call().map_err(|err| match err {
            ureq::Error::Status(code, _) => anyhow!("health request failed with HTTP {code}"),
            other => anyhow!("service unavailable at {}: {other}", self.base_url),
        })?;
        response.into_json().context("health response is not a valid JSON body")
    }
}

fn resolve_base_url(flag: Option<String>) -> String {
    flag.or_else(|| std::env::var(BASE_URL_ENV).ok())
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
}

fn resolve_timeout_ms(flag: Option<u64>) -> u64 {
    flag.or_else(|| {
        std::env::var(TIMEOUT_MS_ENV)
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
    })
    .map(|value| value.clamp(100, 30_000))
    .unwrap_or(DEFAULT_TIMEOUT_MS)
}

fn emit_json(value: Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(&value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

fn run_eval(client: &ServiceClient, expression: &str) -> Result<()> {
    let result = client.calculate(expression)?;
    // Successful mutation; refresh the history the way a front end would.
    let history = client.history()?;
    emit_json(serde_json::json!({
        "result": result,
        "history": history,
    }))
}

fn run_history(client: &ServiceClient) -> Result<()> {
    let records = client.history()?;
    emit_json(serde_json::json!({ "records": records }))
}

fn run_health(client: &ServiceClient) -> Result<()> {
    let payload = client.health()?;
    emit_json(payload)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let base_url = resolve_base_url(cli.base_url);
    let timeout_ms = resolve_timeout_ms(cli.timeout_ms);
    let client = ServiceClient::new(base_url, timeout_ms);

    match cli.command {
        Command::Eval(args) => run_eval(&client, &args.expression),
        Command::History => run_history(&client),
        Command::Health => run_health(&client),
    }
}

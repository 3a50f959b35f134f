use axum::{
    Router,
    extract::{
        Json, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::core::{
    DEFAULT_MAX_MONTHS, Debt, DebtPlan, PayoffSummary, PlanError, SimulationTrace, Strategy,
    StrategyComparison, compare_strategies, run_plan,
};

/// Most debts accepted in one request, matching the calculator form.
pub const MAX_API_DEBTS: usize = 5;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliStrategy {
    Avalanche,
    Snowball,
}

impl From<CliStrategy> for Strategy {
    fn from(value: CliStrategy) -> Self {
        match value {
            CliStrategy::Avalanche => Strategy::Avalanche,
            CliStrategy::Snowball => Strategy::Snowball,
        }
    }
}

impl From<Strategy> for CliStrategy {
    fn from(value: Strategy) -> Self {
        match value {
            Strategy::Avalanche => CliStrategy::Avalanche,
            Strategy::Snowball => CliStrategy::Snowball,
        }
    }
}

/// A debt as entered by a person: the rate is an annual percentage.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebtInput {
    balance: f64,
    #[serde(alias = "rate", alias = "annualRatePercent")]
    rate_percent: f64,
    #[serde(alias = "minimum", alias = "minimumPayment")]
    min_payment: f64,
}

impl From<DebtInput> for Debt {
    fn from(value: DebtInput) -> Self {
        Debt::new(value.balance, value.rate_percent / 100.0, value.min_payment)
    }
}

fn parse_debt_arg(raw: &str) -> Result<DebtInput, String> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    let [balance, rate, minimum] = parts.as_slice() else {
        return Err(format!(
            "expected BALANCE:RATE_PERCENT:MIN_PAYMENT, got '{raw}'"
        ));
    };

    let number = |name: &str, value: &str| {
        value
            .trim_start_matches('$')
            .trim_end_matches('%')
            .replace(',', "")
            .parse::<f64>()
            .map_err(|_| format!("invalid {name} '{value}' in '{raw}'"))
    };

    Ok(DebtInput {
        balance: number("balance", *balance)?,
        rate_percent: number("rate", *rate)?,
        min_payment: number("minimum payment", *minimum)?,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct SimulatePayload {
    debts: Option<Vec<DebtInput>>,
    budget: Option<f64>,
    strategy: Option<String>,
    max_months: Option<u32>,
    compare: Option<bool>,
    summary_only: Option<bool>,
}

/// Query-string form of [`SimulatePayload`]: `debts` is a comma-separated
/// list of `BALANCE:RATE_PERCENT:MIN_PAYMENT` entries.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
struct SimulateQuery {
    debts: Option<String>,
    budget: Option<f64>,
    strategy: Option<String>,
    max_months: Option<u32>,
    compare: Option<bool>,
    summary_only: Option<bool>,
}

impl TryFrom<SimulateQuery> for SimulatePayload {
    type Error = String;

    fn try_from(query: SimulateQuery) -> Result<Self, Self::Error> {
        let debts = query
            .debts
            .map(|raw| {
                raw.split(',')
                    .filter(|entry| !entry.trim().is_empty())
                    .map(parse_debt_arg)
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?;

        Ok(SimulatePayload {
            debts,
            budget: query.budget,
            strategy: query.strategy,
            max_months: query.max_months,
            compare: query.compare,
            summary_only: query.summary_only,
        })
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "payoff",
    about = "Debt payoff simulator (avalanche or snowball under a fixed monthly budget)"
)]
struct Cli {
    #[arg(
        long = "debt",
        value_name = "BALANCE:RATE_PERCENT:MIN_PAYMENT",
        value_parser = parse_debt_arg,
        required = true,
        help = "A debt to repay, e.g. 10000:5:250 for 10,000 at 5% with a 250 minimum; repeatable"
    )]
    debts: Vec<DebtInput>,
    #[arg(long, help = "Total amount paid toward all debts each month")]
    budget: f64,
    #[arg(long, value_enum, default_value_t = CliStrategy::Avalanche)]
    strategy: CliStrategy,
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_MONTHS,
        help = "Give up if the debts are not cleared within this many months"
    )]
    max_months: u32,
    #[arg(long, help = "Also run the other strategy and report the difference")]
    compare: bool,
    #[arg(long, help = "Print only the summary, without the month-by-month schedule")]
    summary_only: bool,
}

#[derive(Copy, Clone, Debug)]
struct ApiOptions {
    max_months: u32,
    compare: bool,
    summary_only: bool,
}

#[derive(Debug)]
struct ApiRequest {
    plan: DebtPlan,
    options: ApiOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    strategy: Strategy,
    budget: f64,
    debt_indices: Vec<usize>,
    #[serde(flatten)]
    schedule: Option<SimulationTrace>,
    summary: PayoffSummary,
    comparison: Option<StrategyComparison>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    if cli.debts.is_empty() {
        return Err(PlanError::NoDebts.to_string());
    }

    if cli.debts.len() > MAX_API_DEBTS {
        return Err(format!("at most {MAX_API_DEBTS} debts are supported"));
    }

    if cli.max_months == 0 {
        return Err("--max-months must be > 0".to_string());
    }

    for (idx, debt) in cli.debts.iter().enumerate() {
        if !(0.0..=100.0).contains(&debt.rate_percent) {
            return Err(format!(
                "debt {} interest rate must be between 0 and 100 percent",
                idx + 1
            ));
        }
    }

    let plan = DebtPlan::new(
        cli.debts.into_iter().map(Debt::from).collect(),
        cli.budget,
        cli.strategy.into(),
    );
    plan.validate().map_err(|e| e.to_string())?;

    Ok(ApiRequest {
        plan,
        options: ApiOptions {
            max_months: cli.max_months,
            compare: cli.compare,
            summary_only: cli.summary_only,
        },
    })
}

fn evaluate(request: &ApiRequest) -> Result<SimulateResponse, PlanError> {
    let plan = &request.plan;
    let outcome = run_plan(plan, request.options.max_months)?;
    let comparison = if request.options.compare {
        Some(compare_strategies(plan, request.options.max_months)?)
    } else {
        None
    };

    debug!(
        strategy = %plan.strategy,
        debts = plan.debts.len(),
        months = outcome.summary.total_months,
        "payoff simulated"
    );

    Ok(SimulateResponse {
        strategy: plan.strategy,
        budget: plan.budget,
        debt_indices: plan.source_indices.clone(),
        schedule: (!request.options.summary_only).then_some(outcome.trace),
        summary: outcome.summary,
        comparison,
    })
}

/// Parses the process arguments, runs one simulation and returns the JSON
/// report.
pub fn run_cli() -> Result<String, String> {
    let request = build_request(Cli::parse())?;
    let response = evaluate(&request).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to encode report: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "payoff HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(query: Result<Query<SimulateQuery>, QueryRejection>) -> Response {
    let payload = match query {
        Ok(Query(query)) => SimulatePayload::try_from(query),
        Err(rejection) => Err(rejection.body_text()),
    };
    match payload {
        Ok(payload) => simulate_handler_impl(payload).await,
        Err(msg) => reject_request(&msg),
    }
}

async fn simulate_post_handler(payload: Result<Json<SimulatePayload>, JsonRejection>) -> Response {
    match payload {
        Ok(Json(payload)) => simulate_handler_impl(payload).await,
        Err(rejection) => reject_request(&rejection.body_text()),
    }
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return reject_request(&msg),
    };

    match evaluate(&request) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(err) => {
            let (status, msg) = plan_error_status(&err);
            warn!(error = %msg, "simulation failed");
            error_response(status, &msg)
        }
    }
}

fn reject_request(msg: &str) -> Response {
    warn!(error = %msg, "rejected simulate request");
    error_response(StatusCode::BAD_REQUEST, msg)
}

fn plan_error_status(err: &PlanError) -> (StatusCode, String) {
    let status = match err {
        PlanError::Simulation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, err.to_string())
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
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
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.debts {
        cli.debts = v;
    }
    if let Some(v) = payload.budget {
        cli.budget = v;
    }
    if let Some(v) = payload.strategy {
        cli.strategy = v.parse::<Strategy>().map_err(|e| e.to_string())?.into();
    }
    if let Some(v) = payload.max_months {
        cli.max_months = v;
    }
    if let Some(v) = payload.compare {
        cli.compare = v;
    }
    if let Some(v) = payload.summary_only {
        cli.summary_only = v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        debts: vec![
            DebtInput {
                balance: 10_000.0,
                rate_percent: 5.0,
                min_payment: 250.0,
            },
            DebtInput {
                balance: 5_000.0,
                rate_percent: 10.0,
                min_payment: 100.0,
            },
        ],
        budget: 600.0,
        strategy: CliStrategy::Avalanche,
        max_months: DEFAULT_MAX_MONTHS,
        compare: false,
        summary_only: false,
    }
}

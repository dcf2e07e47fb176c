use axum::{
    Router,
    extract::{Json, Path, RawQuery, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get},
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tracing::info;

use crate::core::numeric::money;
use crate::core::{Allocation, Inputs, Locale, SplitMode, calculate_with_locale};
use crate::store::{
    HistoryItem, HistoryPeriod, HistoryStore, InputSource, JsonFileStore, KeyValueStore,
    QueryParams, StoreError, StoreResult, StoredInputSource, inputs_to_shareable_url,
    parse_inputs_from_query,
};

/// Bias range offered to users; the engine itself tolerates a wider one.
const MAX_INPUT_BIAS_PTS: f64 = 10.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliSplitMode {
    Proportional,
    #[value(alias = "equal_leftover")]
    EqualLeftover,
}

impl From<CliSplitMode> for SplitMode {
    fn from(value: CliSplitMode) -> Self {
        match value {
            CliSplitMode::Proportional => SplitMode::Proportional,
            CliSplitMode::EqualLeftover => SplitMode::EqualLeftover,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLocale {
    En,
    Fr,
}

impl From<CliLocale> for Locale {
    fn from(value: CliLocale) -> Self {
        match value {
            CliLocale::En => Locale::En,
            CliLocale::Fr => Locale::Fr,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliHistoryPeriod {
    All,
    #[value(name = "3m")]
    ThreeMonths,
    #[value(name = "6m")]
    SixMonths,
    #[value(name = "12m")]
    TwelveMonths,
}

impl From<CliHistoryPeriod> for HistoryPeriod {
    fn from(value: CliHistoryPeriod) -> Self {
        match value {
            CliHistoryPeriod::All => HistoryPeriod::All,
            CliHistoryPeriod::ThreeMonths => HistoryPeriod::ThreeMonths,
            CliHistoryPeriod::SixMonths => HistoryPeriod::SixMonths,
            CliHistoryPeriod::TwelveMonths => HistoryPeriod::TwelveMonths,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ApiSplitMode {
    Proportional,
    #[serde(alias = "equalLeftover", alias = "equal-leftover")]
    EqualLeftover,
}

impl From<ApiSplitMode> for CliSplitMode {
    fn from(value: ApiSplitMode) -> Self {
        match value {
            ApiSplitMode::Proportional => CliSplitMode::Proportional,
            ApiSplitMode::EqualLeftover => CliSplitMode::EqualLeftover,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalculatePayload {
    name_a: Option<String>,
    name_b: Option<String>,
    a1: Option<f64>,
    a2: Option<f64>,
    b2: Option<f64>,
    tr_pct: Option<f64>,
    b: Option<f64>,
    m: Option<f64>,
    advanced: Option<bool>,
    #[serde(rename = "E", alias = "eligible")]
    eligible: Option<f64>,
    bias_pts: Option<f64>,
    mode: Option<ApiSplitMode>,
    lang: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryPayload {
    #[serde(flatten)]
    inputs: CalculatePayload,
    note: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "fairsplit",
    about = "Split a shared monthly budget between two partners, meal vouchers included"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "FAIRSPLIT_STORE",
        default_value = "fairsplit-store.json",
        help = "JSON file holding the saved inputs and history"
    )]
    store: PathBuf,
    #[arg(
        long,
        global = true,
        value_enum,
        env = "FAIRSPLIT_LANG",
        default_value_t = CliLocale::En,
        help = "Language of steps, warnings and placeholder names"
    )]
    lang: CliLocale,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Compute the split; flags override the saved inputs")]
    Calc(CalcArgs),
    #[command(about = "Print a link that reproduces the inputs")]
    Share {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, help = "Page the link points at, e.g. https://example.org/split")]
        base_url: String,
    },
    #[command(about = "Manage saved calculations")]
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    #[command(about = "Serve the JSON API")]
    Serve {
        #[arg(long, env = "FAIRSPLIT_PORT", default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Args, Debug)]
struct CalcArgs {
    #[command(flatten)]
    inputs: InputArgs,
    #[arg(long, help = "Print the full allocation as JSON")]
    json: bool,
    #[arg(long, help = "Persist the resulting inputs as the new saved state")]
    save: bool,
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List {
        #[arg(long)]
        json: bool,
        #[arg(long, default_value = "", help = "Keep entries whose note or month contains this text")]
        search: String,
        #[arg(long, value_enum, default_value_t = CliHistoryPeriod::All)]
        period: CliHistoryPeriod,
    },
    Add {
        #[command(flatten)]
        inputs: InputArgs,
        #[arg(long, default_value = "")]
        note: String,
    },
    Delete {
        id: String,
    },
    Clear,
}

#[derive(Args, Debug, Default, Clone)]
struct InputArgs {
    #[arg(long, help = "Display name of partner A")]
    name_a: Option<String>,
    #[arg(long, help = "Display name of partner B")]
    name_b: Option<String>,
    #[arg(long, allow_negative_numbers = true, help = "Partner A net monthly income")]
    a1: Option<f64>,
    #[arg(long, help = "Partner A monthly meal vouchers (face value)")]
    a2: Option<f64>,
    #[arg(long, help = "Partner B monthly meal vouchers (face value)")]
    b2: Option<f64>,
    #[arg(long, help = "Share of vouchers usable on shared groceries, in percent")]
    tr_pct: Option<f64>,
    #[arg(long, allow_negative_numbers = true, help = "Partner B net monthly income")]
    b: Option<f64>,
    #[arg(long, help = "Monthly cash budget for shared expenses")]
    m: Option<f64>,
    #[arg(long, help = "Cap voucher use at the eligible spend (true/false)")]
    advanced: Option<bool>,
    #[arg(long, help = "Monthly voucher-eligible spend, used with --advanced true")]
    eligible: Option<f64>,
    #[arg(
        long,
        allow_negative_numbers = true,
        help = "Points added to partner A's share, between -10 and 10"
    )]
    bias_pts: Option<f64>,
    #[arg(long, value_enum)]
    mode: Option<CliSplitMode>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct ShareResponse {
    url: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct DeletedResponse {
    deleted: String,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: Inputs,
    locale: Locale,
}

pub async fn run(cli: Cli) -> Result<(), String> {
    let store = JsonFileStore::new(&cli.store);
    let locale = Locale::from(cli.lang);
    match cli.command {
        Command::Calc(args) => run_calc(store, locale, &args),
        Command::Share { inputs, base_url } => {
            let inputs = build_inputs(&inputs, StoredInputSource::new(store).load())?;
            let url = inputs_to_shareable_url(&inputs, &base_url)
                .map_err(|e| format!("--base-url is not a valid absolute URL: {e}"))?;
            println!("{url}");
            Ok(())
        }
        Command::History { action } => run_history(store, locale, action),
        Command::Serve { port } => {
            run_http_server(port, HistoryStore::with_locale(store, locale))
                .await
                .map_err(|e| format!("HTTP server failed: {e}"))
        }
    }
}

fn run_calc(store: JsonFileStore, locale: Locale, args: &CalcArgs) -> Result<(), String> {
    let mut source = StoredInputSource::new(store);
    let inputs = build_inputs(&args.inputs, source.load())?;
    let allocation = calculate_with_locale(&inputs, locale);

    if args.save {
        source
            .save(&inputs)
            .map_err(|e| format!("Could not save inputs: {e}"))?;
    }

    if args.json {
        let json = serde_json::to_string_pretty(&allocation)
            .map_err(|e| format!("Could not encode allocation: {e}"))?;
        println!("{json}");
    } else {
        println!("{}", render_allocation(&allocation));
    }
    Ok(())
}

fn run_history(store: JsonFileStore, locale: Locale, action: HistoryAction) -> Result<(), String> {
    let defaults = StoredInputSource::new(store.clone()).load();
    let mut history = HistoryStore::with_locale(store, locale);
    let failed = |e: StoreError| format!("History store failed: {e}");

    match action {
        HistoryAction::List {
            json,
            search,
            period,
        } => {
            let items = history.filter(&search, period.into()).map_err(failed)?;
            if json {
                let json = serde_json::to_string_pretty(&items)
                    .map_err(|e| format!("Could not encode history: {e}"))?;
                println!("{json}");
            } else if items.is_empty() {
                println!("No saved calculations.");
            } else {
                for item in &items {
                    println!("{}", render_history_item(item));
                }
            }
        }
        HistoryAction::Add { inputs, note } => {
            let inputs = build_inputs(&inputs, defaults)?;
            let item = history.add(&inputs, &note).map_err(failed)?;
            println!("{}", render_history_item(&item));
        }
        HistoryAction::Delete { id } => {
            if !history.delete(&id).map_err(failed)? {
                return Err(format!("No history entry with id {id}"));
            }
        }
        HistoryAction::Clear => history.clear().map_err(failed)?,
    }
    Ok(())
}

fn render_allocation(allocation: &Allocation) -> String {
    let mut lines = allocation
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| format!("{}. {step}", i + 1))
        .collect::<Vec<_>>();

    if !allocation.warnings.is_empty() {
        lines.push(String::new());
        lines.extend(allocation.warnings.iter().map(|w| format!("! {w}")));
    }

    lines.push(String::new());
    lines.push(format!(
        "{}: {} €",
        allocation.partner_a_name,
        money(allocation.deposit_a)
    ));
    lines.push(format!(
        "{}: {} €",
        allocation.partner_b_name,
        money(allocation.deposit_b)
    ));
    lines.join("\n")
}

fn render_history_item(item: &HistoryItem) -> String {
    let result = &item.result;
    let mut line = format!(
        "{}  {}  {} {} € / {} {} €",
        item.id,
        item.date_iso,
        result.partner_a_name,
        money(result.deposit_a),
        result.partner_b_name,
        money(result.deposit_b)
    );
    if !item.note.is_empty() {
        line.push_str("  ");
        line.push_str(&item.note);
    }
    line
}

/// How validation messages refer to a field.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum FieldNames {
    /// `--bias-pts`
    Flags,
    /// `biasPts`, as in JSON bodies and query strings.
    WireKeys,
}

impl FieldNames {
    fn pick(self, flag: &'static str, key: &'static str) -> &'static str {
        match self {
            FieldNames::Flags => flag,
            FieldNames::WireKeys => key,
        }
    }
}

/// Overlays the flags that were given onto `base` and checks the result.
fn build_inputs(args: &InputArgs, base: Inputs) -> Result<Inputs, String> {
    let inputs = overlay_inputs(args, base);
    validate_inputs(&inputs, FieldNames::Flags)?;
    Ok(inputs)
}

fn overlay_inputs(args: &InputArgs, base: Inputs) -> Inputs {
    Inputs {
        partner_a_name: args.name_a.clone().unwrap_or(base.partner_a_name),
        partner_b_name: args.name_b.clone().unwrap_or(base.partner_b_name),
        a1: args.a1.unwrap_or(base.a1),
        a2: args.a2.unwrap_or(base.a2),
        b2: args.b2.unwrap_or(base.b2),
        tr_pct: args.tr_pct.unwrap_or(base.tr_pct),
        b: args.b.unwrap_or(base.b),
        m: args.m.unwrap_or(base.m),
        advanced: args.advanced.unwrap_or(base.advanced),
        eligible: args.eligible.unwrap_or(base.eligible),
        bias_pts: args.bias_pts.unwrap_or(base.bias_pts),
        mode: args.mode.map_or(base.mode, SplitMode::from),
    }
}

fn validate_inputs(inputs: &Inputs, names: FieldNames) -> Result<(), String> {
    let a1 = names.pick("--a1", "a1");
    let a2 = names.pick("--a2", "a2");
    let b2 = names.pick("--b2", "b2");
    let tr_pct = names.pick("--tr-pct", "trPct");
    let b = names.pick("--b", "b");
    let m = names.pick("--m", "m");
    let eligible = names.pick("--eligible", "E");
    let bias_pts = names.pick("--bias-pts", "biasPts");

    let numbers = [
        (a1, inputs.a1),
        (a2, inputs.a2),
        (b2, inputs.b2),
        (tr_pct, inputs.tr_pct),
        (b, inputs.b),
        (m, inputs.m),
        (eligible, inputs.eligible),
        (bias_pts, inputs.bias_pts),
    ];
    for (name, value) in numbers {
        if !value.is_finite() {
            return Err(format!("{name} must be a finite number"));
        }
    }

    for (name, value) in [
        (a2, inputs.a2),
        (b2, inputs.b2),
        (m, inputs.m),
        (eligible, inputs.eligible),
    ] {
        if value < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if !(0.0..=100.0).contains(&inputs.tr_pct) {
        return Err(format!("{tr_pct} must be between 0 and 100"));
    }

    if !(-MAX_INPUT_BIAS_PTS..=MAX_INPUT_BIAS_PTS).contains(&inputs.bias_pts) {
        return Err(format!("{bias_pts} must be between -10 and 10"));
    }

    Ok(())
}

fn parse_lang(raw: Option<&str>) -> Result<Locale, String> {
    match raw {
        None => Ok(Locale::default()),
        Some(raw) if raw.trim().is_empty() => Ok(Locale::default()),
        Some(raw) => {
            Locale::parse(raw).ok_or_else(|| format!("Unsupported lang '{raw}'; use en or fr"))
        }
    }
}

type SharedHistory<S> = Arc<Mutex<HistoryStore<S>>>;

pub async fn run_http_server<S>(port: u16, history: HistoryStore<S>) -> std::io::Result<()>
where
    S: KeyValueStore + Send + 'static,
{
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router(history);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "fairsplit API listening");
    info!("local access: http://127.0.0.1:{port}/api/health");

    axum::serve(listener, app).await
}

pub fn router<S>(history: HistoryStore<S>) -> Router
where
    S: KeyValueStore + Send + 'static,
{
    Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/calculate",
            get(calculate_get_handler).post(calculate_post_handler),
        )
        .route("/api/share", get(share_handler))
        .route(
            "/api/history",
            get(history_list_handler::<S>)
                .post(history_add_handler::<S>)
                .delete(history_clear_handler::<S>),
        )
        .route("/api/history/:id", delete(history_delete_handler::<S>))
        .fallback(not_found_handler)
        .with_state(Arc::new(Mutex::new(history)))
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn calculate_get_handler(RawQuery(query): RawQuery) -> Response {
    match api_request_from_query(query.as_deref().unwrap_or("")) {
        Ok(request) => calculate_response(&request),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn calculate_post_handler(Json(payload): Json<CalculatePayload>) -> Response {
    match api_request_from_payload(payload) {
        Ok(request) => calculate_response(&request),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn calculate_response(request: &ApiRequest) -> Response {
    let allocation = calculate_with_locale(&request.inputs, request.locale);
    json_response(StatusCode::OK, allocation)
}

async fn share_handler(RawQuery(query): RawQuery) -> Response {
    let params = QueryParams::parse(query.as_deref().unwrap_or(""));
    let Some(base_url) = params.get("baseUrl").filter(|url| !url.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "baseUrl is required");
    };
    let inputs = parse_inputs_from_query(&params, &Inputs::default());
    if let Err(msg) = validate_inputs(&inputs, FieldNames::WireKeys) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }
    match inputs_to_shareable_url(&inputs, base_url) {
        Ok(url) => json_response(StatusCode::OK, ShareResponse { url }),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &format!("Invalid baseUrl: {e}")),
    }
}

async fn history_list_handler<S>(
    State(history): State<SharedHistory<S>>,
    RawQuery(query): RawQuery,
) -> Response
where
    S: KeyValueStore + Send + 'static,
{
    let params = QueryParams::parse(query.as_deref().unwrap_or(""));
    let term = params.get("q").unwrap_or("").to_string();
    let Some(period) = HistoryPeriod::parse(params.get("period").unwrap_or("")) else {
        return error_response(StatusCode::BAD_REQUEST, "period must be one of all, 3m, 6m, 12m");
    };
    match with_history(&history, |history| history.filter(&term, period)) {
        Ok(items) => json_response(StatusCode::OK, items),
        Err(response) => response,
    }
}

async fn history_add_handler<S>(
    State(history): State<SharedHistory<S>>,
    Json(payload): Json<HistoryPayload>,
) -> Response
where
    S: KeyValueStore + Send + 'static,
{
    let note = payload.note.unwrap_or_default();
    let request = match api_request_from_payload(payload.inputs) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    match with_history(&history, |history| history.add(&request.inputs, &note)) {
        Ok(item) => json_response(StatusCode::CREATED, item),
        Err(response) => response,
    }
}

async fn history_delete_handler<S>(
    State(history): State<SharedHistory<S>>,
    Path(id): Path<String>,
) -> Response
where
    S: KeyValueStore + Send + 'static,
{
    match with_history(&history, |history| history.delete(&id)) {
        Ok(true) => json_response(StatusCode::OK, DeletedResponse { deleted: id }),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "History entry not found"),
        Err(response) => response,
    }
}

async fn history_clear_handler<S>(State(history): State<SharedHistory<S>>) -> Response
where
    S: KeyValueStore + Send + 'static,
{
    match with_history(&history, HistoryStore::clear) {
        Ok(()) => json_response(StatusCode::OK, Vec::<HistoryItem>::new()),
        Err(response) => response,
    }
}

fn with_history<S, T>(
    history: &SharedHistory<S>,
    op: impl FnOnce(&mut HistoryStore<S>) -> StoreResult<T>,
) -> Result<T, Response>
where
    S: KeyValueStore,
{
    let mut history = history.lock().map_err(|_| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "History store is unavailable",
        )
    })?;
    op(&mut history).map_err(|e| {
        error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("History store failed: {e}"),
        )
    })
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
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

/// Query strings follow share-link semantics: unparseable numbers keep their defaults.
fn api_request_from_query(query: &str) -> Result<ApiRequest, String> {
    let params = QueryParams::parse(query);
    let inputs = parse_inputs_from_query(&params, &Inputs::default());
    validate_inputs(&inputs, FieldNames::WireKeys)?;
    Ok(ApiRequest {
        inputs,
        locale: parse_lang(params.get("lang"))?,
    })
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<CalculatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: CalculatePayload) -> Result<ApiRequest, String> {
    let locale = parse_lang(payload.lang.as_deref())?;
    let args = InputArgs {
        name_a: payload.name_a,
        name_b: payload.name_b,
        a1: payload.a1,
        a2: payload.a2,
        b2: payload.b2,
        tr_pct: payload.tr_pct,
        b: payload.b,
        m: payload.m,
        advanced: payload.advanced,
        eligible: payload.eligible,
        bias_pts: payload.bias_pts,
        mode: payload.mode.map(CliSplitMode::from),
    };
    let inputs = overlay_inputs(&args, Inputs::default());
    validate_inputs(&inputs, FieldNames::WireKeys)?;
    Ok(ApiRequest { inputs, locale })
}

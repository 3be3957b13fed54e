use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use clap::Parser;
use routine_core::{
    query::RoutineQuery, scheduler::DEFAULT_POLL_SECONDS, store::RECENT_LIMIT_MAX, Command,
    CommandError, Notification, Outcome, RoutineForm, SchedulerPoll, Settings, SqliteStore,
    SystemClock, Tracker,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 17610;
// Undrained notifications beyond this are dropped oldest-first.
const PENDING_NOTIFICATIONS_MAX: usize = 50;

#[derive(Parser, Debug)]
#[command(name = "routine_core", version)]
struct Args {
    /// Listen address.
    ///
    /// Accepts:
    /// - ip:port (recommended), e.g. 127.0.0.1:17610
    /// - ip (implies port 17610), e.g. 127.0.0.1
    #[arg(long, default_value = "127.0.0.1:17610")]
    listen: String,

    /// SQLite database path.
    #[arg(long, default_value = "./data/routines.db")]
    db: PathBuf,

    /// Seconds between time-of-day checks.
    #[arg(long, default_value_t = DEFAULT_POLL_SECONDS)]
    poll_seconds: u64,

    /// Insert a sample routine when the record is empty.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    seed_demo: bool,

    /// Initial notification setting, used only until one is saved.
    #[arg(long, default_value_t = false, action = clap::ArgAction::Set)]
    notify: bool,
}

type AppTracker = Tracker<SqliteStore, SystemClock>;

#[derive(Clone)]
struct AppState {
    tracker: Arc<Mutex<AppTracker>>,
    settings: Arc<Mutex<Settings>>,
    pending: Arc<Mutex<VecDeque<Notification>>>,
}

#[derive(Serialize)]
struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

#[derive(Deserialize)]
struct ConfirmRequest {
    #[serde(default)]
    confirmed: bool,
}

#[derive(Deserialize)]
struct CommentRequest {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct RecentQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
struct SettingsUpdate {
    #[serde(default)]
    notifications_enabled: Option<bool>,
    #[serde(default)]
    recent_limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routine_core=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let default_settings = Settings {
        notifications_enabled: args.notify,
        ..Settings::default()
    };

    let mut store = SqliteStore::open(&args.db)?;
    let settings = store.load_or_init_settings(default_settings)?;
    let mut tracker = Tracker::new(store, SystemClock);
    if args.seed_demo && tracker.seed_demo_if_empty() {
        info!("seeded demo routine");
    }

    let state = AppState {
        tracker: Arc::new(Mutex::new(tracker)),
        settings: Arc::new(Mutex::new(settings)),
        pending: Arc::new(Mutex::new(VecDeque::new())),
    };

    tokio::spawn(poll_loop(
        state.clone(),
        Duration::from_secs(args.poll_seconds.max(1)),
    ));

    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/health", get(health))
        .route(
            "/routines",
            get(get_routines).post(post_routine).options(options_ok),
        )
        .route(
            "/routines/complete_all",
            post(post_complete_all).options(options_ok),
        )
        .route("/routines/clear", post(post_clear_all).options(options_ok))
        .route("/routines/:id/toggle", post(post_toggle).options(options_ok))
        .route("/routines/:id/delete", post(post_delete).options(options_ok))
        .route(
            "/routines/:id/comments",
            post(post_comment).options(options_ok),
        )
        .route(
            "/routines/:id/comments/:comment_id",
            delete(delete_comment).options(options_ok),
        )
        .route("/summary", get(get_summary))
        .route("/reports/by_day", get(get_by_day))
        .route("/activities/recent", get(get_recent_activities))
        .route("/export", get(get_export))
        .route("/import", post(post_import).options(options_ok))
        .route(
            "/settings",
            get(get_settings).post(post_settings).options(options_ok),
        )
        .route("/notifications", get(get_notifications))
        .with_state(state)
        .layer(cors);

    let addr = parse_listen(&args.listen)?;
    info!("Core listening on http://{addr}");
    info!("DB: {}", args.db.display());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn poll_loop(state: AppState, period: Duration) {
    info!("routine poll every {}s", period.as_secs());
    let mut poll = SchedulerPoll::new();
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let notify = { state.settings.lock().await.notifications_enabled };
        let shown = {
            let mut tracker = state.tracker.lock().await;
            poll.tick(&mut *tracker, notify)
        };
        if shown.is_empty() {
            continue;
        }
        let mut pending = state.pending.lock().await;
        for n in shown {
            if pending.len() >= PENDING_NOTIFICATIONS_MAX {
                if let Some(dropped) = pending.pop_front() {
                    warn!("notification queue full, dropping: {}", dropped.title);
                }
            }
            pending.push_back(n);
        }
    }
}

fn parse_listen(input: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    if let Some((host, port_str)) = input.rsplit_once(':') {
        if host == "localhost" {
            let port: u16 = port_str.parse().map_err(|_| {
                anyhow::anyhow!(
                    "invalid --listen '{}': bad port. Example: 127.0.0.1:{}",
                    input,
                    DEFAULT_PORT
                )
            })?;
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), port));
        }
    }

    if input == "localhost" {
        return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), DEFAULT_PORT));
    }

    Err(anyhow::anyhow!(
        "invalid --listen '{}'. Use ip:port (e.g. 127.0.0.1:{}) or ip (e.g. 127.0.0.1).",
        input,
        DEFAULT_PORT
    ))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested");
}

async fn options_ok() -> impl IntoResponse {
    StatusCode::OK
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response()
}

fn err(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

fn command_error_status(e: &CommandError) -> StatusCode {
    if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(e, CommandError::ConfirmationRequired) {
        StatusCode::CONFLICT
    } else {
        StatusCode::BAD_REQUEST
    }
}

async fn run_command(state: &AppState, cmd: Command) -> Response {
    let result = {
        let mut tracker = state.tracker.lock().await;
        tracker.dispatch(cmd)
    };
    match result {
        Ok(outcome) => ok::<Outcome>(outcome),
        Err(e) => {
            info!("command rejected: {e}");
            err(command_error_status(&e), e.code())
        }
    }
}

#[derive(Serialize)]
struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "routine_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

async fn get_routines(State(state): State<AppState>, Query(q): Query<RoutineQuery>) -> Response {
    let tracker = state.tracker.lock().await;
    ok(tracker.routines(&q))
}

async fn post_routine(State(state): State<AppState>, Json(form): Json<RoutineForm>) -> Response {
    run_command(&state, Command::SaveRoutine(form)).await
}

async fn post_toggle(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    run_command(&state, Command::ToggleComplete { id }).await
}

async fn post_delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ConfirmRequest>,
) -> Response {
    run_command(
        &state,
        Command::DeleteRoutine {
            id,
            confirmed: req.confirmed,
        },
    )
    .await
}

async fn post_comment(
    State(state): State<AppState>,
    Path(routine_id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> Response {
    run_command(
        &state,
        Command::AddComment {
            routine_id,
            text: req.text,
        },
    )
    .await
}

async fn delete_comment(
    State(state): State<AppState>,
    Path((routine_id, comment_id)): Path<(String, String)>,
) -> Response {
    run_command(
        &state,
        Command::RemoveComment {
            routine_id,
            comment_id,
        },
    )
    .await
}

async fn post_complete_all(State(state): State<AppState>) -> Response {
    run_command(&state, Command::CompleteAll).await
}

async fn post_clear_all(State(state): State<AppState>, Json(req): Json<ConfirmRequest>) -> Response {
    run_command(
        &state,
        Command::ClearAll {
            confirmed: req.confirmed,
        },
    )
    .await
}

#[derive(Serialize)]
struct SummaryView {
    #[serde(flatten)]
    summary: routine_core::Summary,
    next_routine_label: String,
}

async fn get_summary(State(state): State<AppState>) -> Response {
    let summary = { state.tracker.lock().await.summary() };
    let next_routine_label = summary.next_routine_label();
    ok(SummaryView {
        summary,
        next_routine_label,
    })
}

async fn get_by_day(State(state): State<AppState>) -> Response {
    let report = { state.tracker.lock().await.by_weekday() };
    ok(report)
}

async fn get_recent_activities(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> Response {
    let limit = match q.limit {
        Some(v) => v,
        None => state.settings.lock().await.recent_limit,
    };
    let tracker = state.tracker.lock().await;
    ok(tracker.recent(limit))
}

async fn get_export(State(state): State<AppState>) -> Response {
    let json = { state.tracker.lock().await.export_json() };
    match json {
        Ok(body) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "application/json; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"routines_export.json\"",
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("export failed: {e}");
            err(StatusCode::INTERNAL_SERVER_ERROR, "export_failed")
        }
    }
}

async fn post_import(State(state): State<AppState>, body: String) -> Response {
    run_command(&state, Command::Import { json: body }).await
}

async fn get_settings(State(state): State<AppState>) -> Response {
    let settings = { *state.settings.lock().await };
    ok(settings)
}

fn recent_limit_in_range(limit: usize) -> bool {
    (1..=RECENT_LIMIT_MAX).contains(&limit)
}

async fn post_settings(State(state): State<AppState>, Json(req): Json<SettingsUpdate>) -> Response {
    if let Some(limit) = req.recent_limit {
        if !recent_limit_in_range(limit) {
            return err(StatusCode::BAD_REQUEST, "invalid_recent_limit");
        }
    }

    let mut settings = { *state.settings.lock().await };
    if let Some(v) = req.notifications_enabled {
        settings.notifications_enabled = v;
    }
    if let Some(v) = req.recent_limit {
        settings.recent_limit = v;
    }

    {
        let mut tracker = state.tracker.lock().await;
        if let Err(e) = tracker.store_mut().save_settings(settings) {
            error!("save_settings failed: {e}");
            return err(StatusCode::INTERNAL_SERVER_ERROR, "db_error");
        }
    }

    {
        let mut guard = state.settings.lock().await;
        *guard = settings;
    }
    info!(
        "settings updated: notifications_enabled={}, recent_limit={}",
        settings.notifications_enabled, settings.recent_limit
    );

    ok(settings)
}

/// Hands out queued notifications and forgets them.
async fn get_notifications(State(state): State<AppState>) -> Response {
    let drained: Vec<Notification> = { state.pending.lock().await.drain(..).collect() };
    ok(drained)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_listen_accepts_common_forms() {
        assert_eq!(
            parse_listen("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(parse_listen("0.0.0.0").unwrap().port(), DEFAULT_PORT);
        assert_eq!(parse_listen("localhost:8123").unwrap().port(), 8123);
        assert_eq!(parse_listen("localhost").unwrap().port(), DEFAULT_PORT);
        assert!(parse_listen("example.com:80").is_err());
        assert!(parse_listen("localhost:abc").is_err());
    }

    #[test]
    fn command_errors_map_to_statuses() {
        assert_eq!(
            command_error_status(&CommandError::RoutineNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            command_error_status(&CommandError::ConfirmationRequired),
            StatusCode::CONFLICT
        );
        assert_eq!(
            command_error_status(&CommandError::EmptyTitle),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn recent_limit_range_matches_settings_clamp() {
        assert!(!recent_limit_in_range(0));
        assert!(recent_limit_in_range(1));
        assert!(recent_limit_in_range(RECENT_LIMIT_MAX));
        assert!(!recent_limit_in_range(RECENT_LIMIT_MAX + 1));
    }
}

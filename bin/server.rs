// Scout Graduation - Web Server
// REST API over the graduation engine with Axum

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use clap::Parser;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use scout_graduation::{
    get_member, load_config, open_database, review_progress, setup_database, update_config,
    Config, EligibilityFeed, EligibilityReport, GraduationEngine, GraduationError,
    GraduationOutcome, Member, NumberingConfig, ProgressRecord, Rank, ReviewDecision, ReviewError,
};

#[derive(Parser)]
#[command(name = "graduation-server")]
#[command(about = "HTTP API for rank progression and certificate issuance")]
struct Cli {
    #[arg(short, long, env = "SCOUT_CONFIG", default_value = "scout.toml")]
    config: PathBuf,

    #[arg(long, env = "SCOUT_DB")]
    db: Option<PathBuf>,

    /// Listen address (overrides config file)
    #[arg(long)]
    bind: Option<String>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    engine: Arc<GraduationEngine>,
    feed: Arc<EligibilityFeed>,
}

impl AppState {
    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "database lock poisoned"))
    }

    /// Republish the projection after a write; a failed refresh only delays the feed
    fn refresh_feed(&self, conn: &Connection) {
        if let Err(e) = self.feed.refresh(conn) {
            warn!("Eligibility refresh failed: {}", e);
        }
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn internal(err: impl std::fmt::Display) -> Self {
        error!("Request failed: {}", err);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse {
            success: false,
            data: (),
            error: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<GraduationError> for ApiError {
    fn from(err: GraduationError) -> Self {
        let status = match &err {
            GraduationError::MemberNotFound(_) => StatusCode::NOT_FOUND,
            GraduationError::ConfigurationMissing => StatusCode::PRECONDITION_FAILED,
            GraduationError::RankMismatch { .. }
            | GraduationError::EligibilityStale { .. }
            | GraduationError::AlreadyGraduated { .. }
            | GraduationError::EvidenceConsumed { .. }
            | GraduationError::TransactionConflict { .. }
            | GraduationError::CounterRace => StatusCode::CONFLICT,
            GraduationError::Database(_) | GraduationError::Store(_) => {
                return Self::internal(err);
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<ReviewError> for ApiError {
    fn from(err: ReviewError) -> Self {
        match &err {
            ReviewError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            ReviewError::AlreadyReviewed { .. } => Self::new(StatusCode::CONFLICT, err.to_string()),
            ReviewError::Database(_) | ReviewError::Store(_) => Self::internal(err),
        }
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

#[derive(Deserialize)]
struct GraduationRequest {
    member_id: String,
    /// The member's current rank
    rank: Rank,
    #[serde(default)]
    actor: Option<String>,
}

#[derive(Deserialize)]
struct ReviewRequest {
    verifier: String,
    decision: ReviewDecision,
}

#[derive(Deserialize)]
struct NumberingUpdate {
    #[serde(default)]
    pattern: Option<String>,
    #[serde(default)]
    parent_series: Option<String>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/eligibility - Current promotion-center projection
async fn get_eligibility(State(state): State<AppState>) -> ApiResult<EligibilityReport> {
    Ok(Json(ApiResponse::ok(state.feed.current().as_ref().clone())))
}

/// GET /api/members/:id - Member with issued certificates
async fn get_member_detail(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> ApiResult<Member> {
    let conn = state.conn()?;
    match get_member(&conn, &member_id).map_err(ApiError::internal)? {
        Some(member) => Ok(Json(ApiResponse::ok(member))),
        None => Err(GraduationError::MemberNotFound(member_id).into()),
    }
}

/// POST /api/graduations - Promote a member and issue their certificate
async fn post_graduation(
    State(state): State<AppState>,
    Json(request): Json<GraduationRequest>,
) -> Result<(StatusCode, Json<ApiResponse<GraduationOutcome>>), ApiError> {
    let worker = state.clone();

    // Retry backoff sleeps the thread
    let outcome = tokio::task::spawn_blocking(move || -> Result<GraduationOutcome, ApiError> {
        let mut conn = worker.conn()?;
        let actor = request.actor.as_deref().unwrap_or("api");
        let outcome = worker
            .engine
            .graduate_as(&mut conn, &request.member_id, request.rank, actor)?;
        worker.refresh_feed(&conn);
        Ok(outcome)
    })
    .await
    .map_err(ApiError::internal)??;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(outcome))))
}

/// POST /api/progress/:id/review - Approve or reject a pending record
async fn post_review(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    Json(request): Json<ReviewRequest>,
) -> ApiResult<ProgressRecord> {
    let conn = state.conn()?;
    let record = review_progress(&conn, &record_id, &request.verifier, request.decision)?;
    state.refresh_feed(&conn);
    Ok(Json(ApiResponse::ok(record)))
}

/// GET /api/numbering - Pattern, parent series and last counter
async fn get_numbering(State(state): State<AppState>) -> ApiResult<NumberingConfig> {
    let conn = state.conn()?;
    match load_config(&conn).map_err(ApiError::internal)? {
        Some(config) => Ok(Json(ApiResponse::ok(config))),
        None => Err(GraduationError::ConfigurationMissing.into()),
    }
}

/// PUT /api/numbering - Administrator update
async fn put_numbering(
    State(state): State<AppState>,
    Json(update): Json<NumberingUpdate>,
) -> ApiResult<NumberingConfig> {
    let conn = state.conn()?;
    let config = update_config(&conn, update.pattern.as_deref(), update.parent_series.as_deref())?;
    info!(pattern = %config.pattern, series = %config.parent_series, "Numbering config updated");
    Ok(Json(ApiResponse::ok(config)))
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/eligibility", get(get_eligibility))
        .route("/members/:id", get(get_member_detail))
        .route("/graduations", post(post_graduation))
        .route("/progress/:id/review", post(post_review))
        .route("/numbering", get(get_numbering).put(put_numbering))
        .with_state(state);

    Router::new().nest("/api", api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scout_graduation=info".parse()?)
                .add_directive("graduation_server=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    let db_path = cli.db.unwrap_or_else(|| config.database.path.clone());

    let conn = open_database(&db_path, config.busy_timeout())?;
    setup_database(&conn)?;
    info!("Database opened: {:?}", db_path);

    let feed = EligibilityFeed::load(&conn)?;
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        engine: Arc::new(config.engine()),
        feed: Arc::new(feed),
    };

    let app = router(state);

    let addr = cli.bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

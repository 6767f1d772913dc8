use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{request::Parts, HeaderMap, Method, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use quiniela_shared::protocol::{EventView, RankingEntry, SubmissionReceipt, UserResults};
use quiniela_shared::{Outcome, TeamRef};
use quiniela_store::scoring::ResultUpdate;
use quiniela_store::{
    Database, Event, Match, NewEvent, NewUser, Participation, PredictionInput, Round, StoreError,
    TeamName, User,
};

use crate::config::ServerConfig;
use crate::error::ServerError;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub config: Arc<ServerConfig>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: Database, config: ServerConfig) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    /// Open the database named by `config.database_path`.
    pub fn open(config: ServerConfig) -> Result<Self, StoreError> {
        let db = Database::open_at(&config.database_path)?;
        Ok(Self::new(db, config))
    }

    /// Run a store operation on the blocking pool.  SQLite calls may wait on
    /// the busy timeout, which must not stall the async workers.
    async fn run<T, F>(&self, op: F) -> Result<T, ServerError>
    where
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|_| ServerError::Internal("database lock poisoned".into()))?;
            op(&mut guard).map_err(ServerError::from)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("database task failed: {e}")))?
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/info", get(server_info))
        // Users
        .route("/users", post(register_user))
        .route("/users/:user_id/tickets", get(user_tickets))
        // Events
        .route("/events/current", get(current_event))
        .route("/events/current/teams/:value", get(current_team_name))
        .route("/events/:id", get(event_detail))
        .route("/events/:id/teams/:value", get(team_name))
        .route("/events/:id/join", post(join_event))
        .route("/events/:id/participation", get(participation_status))
        .route("/events/:id/predictions", post(submit_predictions))
        .route("/events/:id/results", get(user_results))
        .route("/events/:id/rankings", get(rankings))
        // Organizer
        .route("/admin/users", get(admin_list_users))
        .route("/admin/users/:user_id", delete(admin_delete_user))
        .route("/admin/users/:user_id/tickets", post(admin_update_tickets))
        .route("/admin/events", get(admin_list_events).post(admin_create_event))
        .route("/admin/events/:id", delete(admin_delete_event))
        .route("/admin/events/:id/rounds", post(admin_add_round))
        .route("/admin/events/:id/teams/:value", put(admin_set_team_name))
        .route("/admin/events/:id/toggle-current", post(admin_toggle_current))
        .route("/admin/events/:id/toggle-results", post(admin_toggle_results))
        .route("/admin/events/:id/toggle-ranking", post(admin_toggle_ranking))
        .route("/admin/rounds/:id/matches", post(admin_add_match))
        .route("/admin/matches/:id/result", put(admin_set_result))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─── Extractors ───

/// `Json` whose rejection is a [`ServerError::BadRequest`].
struct ApiJson<T>(T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query` whose rejection is a [`ServerError::BadRequest`].
struct ApiQuery<T>(T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

// ─── Payloads ───

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfoResponse {
    name: String,
    version: &'static str,
    started_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TicketBalance {
    user_id: String,
    event_tickets: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TeamNameResponse {
    value: i64,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ParticipationStatus {
    participated: bool,
    submitted: bool,
}

#[derive(Deserialize)]
struct UserRequest {
    #[serde(alias = "userId")]
    user_id: String,
}

#[derive(Deserialize)]
struct UserQuery {
    #[serde(alias = "userId")]
    user_id: String,
}

#[derive(Deserialize)]
struct PredictionsRequest {
    #[serde(alias = "userId")]
    user_id: String,
    /// Match id to outcome token.
    predictions: BTreeMap<i64, String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct SearchQuery {
    search: String,
}

#[derive(Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
#[serde(rename_all = "lowercase")]
enum TicketAction {
    Add,
    Subtract,
}

#[derive(Deserialize)]
struct TicketRequest {
    action: TicketAction,
    /// Only used by `add`; a subtraction always takes one ticket.
    amount: Option<i64>,
}

#[derive(Deserialize)]
struct RoundRequest {
    number: i64,
}

#[derive(Deserialize)]
struct MatchRequest {
    team1: TeamRef,
    team2: TeamRef,
}

#[derive(Deserialize)]
struct TeamNameRequest {
    name: String,
}

#[derive(Deserialize)]
struct ResultRequest {
    /// `null` or `""` clears the result.
    result: Option<String>,
}

// ─── Public handlers ───

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn server_info(State(state): State<AppState>) -> Json<ServerInfoResponse> {
    Json(ServerInfoResponse {
        name: state.config.instance_name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
    })
}

async fn register_user(
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<User>), ServerError> {
    let user = state.run(move |db| db.register_user(&new)).await?;
    info!(user = %user.user_id, "User registered via API");
    Ok((StatusCode::CREATED, Json(user)))
}

async fn user_tickets(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<TicketBalance>, ServerError> {
    let event_tickets = {
        let user_id = user_id.clone();
        state.run(move |db| db.ticket_balance(&user_id)).await?
    };
    Ok(Json(TicketBalance {
        user_id,
        event_tickets,
    }))
}

async fn current_event(State(state): State<AppState>) -> Result<Json<EventView>, ServerError> {
    Ok(Json(state.run(|db| db.current_event_view()).await?))
}

async fn current_team_name(
    State(state): State<AppState>,
    Path(value): Path<i64>,
) -> Result<Json<TeamNameResponse>, ServerError> {
    let name = state.run(move |db| db.resolve_current_team(value)).await?;
    Ok(Json(TeamNameResponse { value, name }))
}

async fn event_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EventView>, ServerError> {
    Ok(Json(state.run(move |db| db.event_view(id)).await?))
}

async fn team_name(
    State(state): State<AppState>,
    Path((id, value)): Path<(i64, i64)>,
) -> Result<Json<TeamNameResponse>, ServerError> {
    let name = state.run(move |db| db.resolve_team(id, value)).await?;
    Ok(Json(TeamNameResponse { value, name }))
}

async fn join_event(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<UserRequest>,
) -> Result<(StatusCode, Json<Participation>), ServerError> {
    let participation = state.run(move |db| db.join_event(&req.user_id, id)).await?;
    Ok((StatusCode::CREATED, Json(participation)))
}

async fn participation_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiQuery(q): ApiQuery<UserQuery>,
) -> Result<Json<ParticipationStatus>, ServerError> {
    let status = state
        .run(move |db| {
            Ok(ParticipationStatus {
                participated: db.has_participated(&q.user_id, id)?,
                submitted: db.has_submitted(&q.user_id, id)?,
            })
        })
        .await?;
    Ok(Json(status))
}

async fn submit_predictions(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<PredictionsRequest>,
) -> Result<Json<SubmissionReceipt>, ServerError> {
    let inputs: Vec<PredictionInput> = req
        .predictions
        .into_iter()
        .map(|(match_id, outcome)| PredictionInput::new(match_id, outcome))
        .collect();
    let user_id = req.user_id;

    let receipt = state
        .run(move |db| db.submit_predictions(&user_id, id, &inputs))
        .await?;
    Ok(Json(receipt))
}

async fn user_results(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiQuery(q): ApiQuery<UserQuery>,
) -> Result<Json<UserResults>, ServerError> {
    Ok(Json(state.run(move |db| db.user_results(&q.user_id, id)).await?))
}

async fn rankings(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<RankingEntry>>, ServerError> {
    Ok(Json(state.run(move |db| db.rankings(id)).await?))
}

// ─── Organizer handlers ───

fn verify_organizer_token(headers: &HeaderMap, config: &ServerConfig) -> Result<(), ServerError> {
    let Some(ref expected) = config.organizer_token else {
        return Err(ServerError::Forbidden(
            "Organizer API is disabled (no ORGANIZER_TOKEN configured)".into(),
        ));
    };

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or(auth);

    // Constant-time comparison to prevent timing attacks on the token.
    use subtle::ConstantTimeEq;
    let token_bytes = token.as_bytes();
    let expected_bytes = expected.as_bytes();
    if token_bytes.len() != expected_bytes.len()
        || token_bytes.ct_eq(expected_bytes).unwrap_u8() != 1
    {
        return Err(ServerError::Forbidden("Invalid organizer token".into()));
    }

    Ok(())
}

async fn admin_list_users(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiQuery(q): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<User>>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    Ok(Json(state.run(move |db| db.search_users(&q.search)).await?))
}

async fn admin_delete_user(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    state.run(move |db| db.delete_user(&user_id)).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn admin_update_tickets(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    ApiJson(req): ApiJson<TicketRequest>,
) -> Result<Json<TicketBalance>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;

    let TicketRequest { action, amount } = req;
    let event_tickets = {
        let user_id = user_id.clone();
        state
            .run(move |db| match action {
                TicketAction::Add => db.credit_ticket(&user_id, amount.unwrap_or(1)),
                TicketAction::Subtract => db.debit_ticket(&user_id),
            })
            .await?
    };

    info!(user = %user_id, ?action, event_tickets, "Organizer adjusted tickets");
    Ok(Json(TicketBalance {
        user_id,
        event_tickets,
    }))
}

async fn admin_list_events(
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Result<Json<Vec<Event>>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    Ok(Json(state.run(|db| db.list_events()).await?))
}

async fn admin_create_event(
    headers: HeaderMap,
    State(state): State<AppState>,
    ApiJson(new): ApiJson<NewEvent>,
) -> Result<(StatusCode, Json<Event>), ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    let event = state.run(move |db| db.create_event(&new)).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

async fn admin_delete_event(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    state.run(move |db| db.delete_event(id)).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn admin_add_round(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ApiJson(req): ApiJson<RoundRequest>,
) -> Result<Json<Round>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    Ok(Json(state.run(move |db| db.add_round(id, req.number)).await?))
}

async fn admin_add_match(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(round_id): Path<i64>,
    ApiJson(req): ApiJson<MatchRequest>,
) -> Result<(StatusCode, Json<Match>), ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    let m = state
        .run(move |db| db.add_match(round_id, &req.team1, &req.team2))
        .await?;
    Ok((StatusCode::CREATED, Json(m)))
}

async fn admin_set_team_name(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path((id, value)): Path<(i64, i64)>,
    ApiJson(req): ApiJson<TeamNameRequest>,
) -> Result<Json<TeamName>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    Ok(Json(
        state.run(move |db| db.set_team_name(id, value, &req.name)).await?,
    ))
}

async fn admin_set_result(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(match_id): Path<i64>,
    ApiJson(req): ApiJson<ResultRequest>,
) -> Result<Json<ResultUpdate>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;

    let result = match req.result.as_deref() {
        None => None,
        Some(raw) => {
            Outcome::parse_result(raw).map_err(|e| ServerError::BadRequest(e.to_string()))?
        }
    };

    Ok(Json(
        state.run(move |db| db.set_match_result(match_id, result)).await?,
    ))
}

async fn admin_toggle_current(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    let current = state.run(move |db| db.toggle_current(id)).await?;
    Ok(Json(serde_json::json!({ "current": current })))
}

async fn admin_toggle_results(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    let visible = state.run(move |db| db.toggle_results_visible(id)).await?;
    Ok(Json(serde_json::json!({ "resultsVisible": visible })))
}

async fn admin_toggle_ranking(
    headers: HeaderMap,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ServerError> {
    verify_organizer_token(&headers, &state.config)?;
    let visible = state.run(move |db| db.toggle_ranking_visible(id)).await?;
    Ok(Json(serde_json::json!({ "rankingVisible": visible })))
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

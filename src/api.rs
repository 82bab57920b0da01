//! REST API for the rack planner.
//!
//! Exposes the optimizer and the room evaluation over HTTP.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::layout::{CandidateSummary, Layout, LayoutItem, RackLayout};
use crate::model::{ItemRecord, RackBonusOption, ValidationError};
use crate::optimizer::{
    OptimizationOutcome, PlannerConfig, PlanningInput, optimize, optimize_with_progress,
};
use crate::report::AggregateReport;
use crate::room::{self, RoomPower, RoomRack, rack_budget_for_room_level};

/// Shared state of all handlers.
#[derive(Clone)]
pub struct ApiState {
    optimizer_config: OptimizerConfig,
}

impl ApiState {
    pub fn new(optimizer_config: OptimizerConfig) -> Self {
        Self { optimizer_config }
    }
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>rack_planner API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                window.ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                });
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Request structure for the optimize endpoints.
///
/// The rack budget is taken from `rack_budget` if given, otherwise from
/// `room_level`, otherwise from the configured default room level. Fallback
/// bonuses and `top_n` override the configured defaults.
#[derive(Deserialize, Clone, ToSchema)]
#[schema(
    example = json!({
        "items": [
            { "name": "Antminer", "level": 1, "power": 100.0, "width": 1, "bonus_percent": 500 },
            { "name": "Antminer", "level": 1, "power": 100.0, "width": 1, "bonus_percent": 500 },
            { "name": "Hashbox", "level": 2, "power": 50.0, "width": 2, "bonus_percent": 0 }
        ],
        "rack_bonuses": [
            { "height": 4, "bonus_percent": 300, "name": "Golden Rack" }
        ],
        "rack_budget": 1
    })
)]
pub struct OptimizeRequest {
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub rack_bonuses: Vec<RackBonusOption>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub rack_budget: Option<u32>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub room_level: Option<u8>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub rack3_fallback: Option<i64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub rack4_fallback: Option<i64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub top_n: Option<usize>,
}

#[derive(Debug)]
struct ValidatedOptimizeRequest {
    input: PlanningInput,
    planner: PlannerConfig,
}

impl OptimizeRequest {
    fn rack_budget(&self, defaults: &OptimizerConfig) -> u32 {
        match (self.rack_budget, self.room_level) {
            (Some(budget), _) => budget,
            (None, Some(level)) => rack_budget_for_room_level(level),
            (None, None) => defaults.default_rack_budget(),
        }
    }

    fn into_validated(
        self,
        defaults: &OptimizerConfig,
    ) -> Result<ValidatedOptimizeRequest, ValidationError> {
        let rack_budget = self.rack_budget(defaults);

        let mut planner = defaults.planner_config().clone();
        if let Some(fallback) = self.rack3_fallback {
            planner.rack3_fallback = fallback;
        }
        if let Some(fallback) = self.rack4_fallback {
            planner.rack4_fallback = fallback;
        }
        if let Some(top_n) = self.top_n {
            planner.top_n = top_n;
        }
        planner.validate()?;

        if rack_budget > planner.max_rack_budget {
            return Err(ValidationError::InvalidRackBudget(format!(
                "rack budget {} exceeds the limit of {}",
                rack_budget, planner.max_rack_budget
            )));
        }
        for item in &self.items {
            item.validate()?;
        }
        for option in &self.rack_bonuses {
            option.validate()?;
        }

        Ok(ValidatedOptimizeRequest {
            input: PlanningInput::new(self.items, self.rack_bonuses, rack_budget),
            planner,
        })
    }
}

/// Response of the optimize endpoint.
///
/// # Fields
/// * `layout` - Placement of the winning rack mix
/// * `alternatives` - Ranked rack mixes, the winner first
/// * `aggregates` - Upper bounds over the whole inventory
/// * `summary` - Human-readable rack listing
#[derive(Serialize, Deserialize, ToSchema)]
pub struct OptimizeResponse {
    pub layout: Layout,
    pub alternatives: Vec<CandidateSummary>,
    pub aggregates: AggregateReport,
    pub summary: Vec<String>,
}

impl From<OptimizationOutcome> for OptimizeResponse {
    fn from(outcome: OptimizationOutcome) -> Self {
        let summary = outcome.layout.summary_lines();
        Self {
            layout: outcome.layout,
            alternatives: outcome.alternatives,
            aggregates: outcome.aggregates,
            summary,
        }
    }
}

/// Request structure for the room evaluation endpoint.
#[derive(Deserialize, Clone, ToSchema)]
pub struct EvaluateRequest {
    pub racks: Vec<RoomRack>,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(err: &ValidationError) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        err.to_string(),
    )
}

fn internal_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Optimization failed",
        details,
    )
}

fn parse_optimize_request(
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
    defaults: &OptimizerConfig,
) -> Result<ValidatedOptimizeRequest, Response> {
    let Json(payload) = payload.map_err(json_deserialize_error)?;
    payload.into_validated(defaults).map_err(|err| {
        warn!(error = %err, "rejected optimize request");
        validation_error(&err)
    })
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_optimize, handle_optimize_stream, handle_evaluate),
    components(
        schemas(
            OptimizeRequest,
            OptimizeResponse,
            EvaluateRequest,
            ErrorResponse,
            ItemRecord,
            RackBonusOption,
            Layout,
            RackLayout,
            LayoutItem,
            CandidateSummary,
            AggregateReport,
            RoomRack,
            RoomPower
        )
    ),
    tags(
        (name = "planning", description = "Rack layout optimization"),
        (name = "room", description = "Power of an existing room")
    )
)]
struct ApiDoc;

/// Builds the application router with CORS and all routes.
pub fn build_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/optimize", post(handle_optimize))
        .route("/optimize_stream", post(handle_optimize_stream))
        .route("/evaluate", post(handle_evaluate))
        // API documentation
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and serves until it terminates.
///
/// # Errors
/// Returns the I/O error if the listener cannot be bound or serving fails.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let app = build_router(ApiState::new(optimizer_config));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!(
        host = config.display_host(),
        port = config.port(),
        "server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        info!("local access: http://localhost:{}", config.port());
    }
    info!("endpoints: POST /optimize, POST /optimize_stream, POST /evaluate, GET /docs");

    axum::serve(listener, app).await
}

/// Handler for POST /optimize endpoint.
///
/// Runs the optimizer on the blocking pool and returns the layout of the
/// best rack mix.
#[utoipa::path(
    post,
    path = "/optimize",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Optimized rack layout", body = OptimizeResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid miners, rack budget or parameters",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_optimize(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_optimize_request(payload, &state.optimizer_config) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        items = request.input.items.len(),
        rack_bonuses = request.input.rack_bonuses.len(),
        rack_budget = request.input.rack_budget,
        "new optimize request"
    );

    let ValidatedOptimizeRequest { input, planner } = request;
    let result = tokio::task::spawn_blocking(move || optimize(&input, &planner)).await;

    match result {
        Ok(Ok(outcome)) => {
            (StatusCode::OK, Json(OptimizeResponse::from(outcome))).into_response()
        }
        Ok(Err(err)) => validation_error(&err),
        Err(err) => {
            error!(error = %err, "optimizer task failed");
            internal_error(err.to_string())
        }
    }
}

/// Handler for POST /optimize_stream endpoint (SSE).
///
/// Streams optimizer events as Server-Sent Events (text/event-stream), ending
/// with a `Finished` event.
#[utoipa::path(
    post,
    path = "/optimize_stream",
    request_body = OptimizeRequest,
    responses(
        (
            status = 200,
            description = "Streams optimizer events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid miners, rack budget or parameters",
            body = ErrorResponse
        )
    ),
    tag = "planning"
)]
async fn handle_optimize_stream(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_optimize_request(payload, &state.optimizer_config) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let ValidatedOptimizeRequest { input, planner } = request;

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let result = optimize_with_progress(&input, &planner, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // A closed receiver only drops the remaining events.
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = result {
            let message = json!({ "type": "Error", "details": err.to_string() }).to_string();
            let _ = tx.blocking_send(message);
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /evaluate endpoint.
///
/// Computes raw, bonus and final power of an existing room.
#[utoipa::path(
    post,
    path = "/evaluate",
    request_body = EvaluateRequest,
    responses(
        (status = 200, description = "Power of the room", body = RoomPower),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid miners", body = ErrorResponse)
    ),
    tag = "room"
)]
async fn handle_evaluate(payload: Result<Json<EvaluateRequest>, JsonRejection>) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };

    match room::evaluate(&request.racks) {
        Ok(power) => (StatusCode::OK, Json(power)).into_response(),
        Err(err) => validation_error(&err),
    }
}

async fn serve_openapi_json() -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> OptimizeRequest {
        serde_json::from_str(json).expect("Should parse valid JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in ["/optimize", "/optimize_stream", "/evaluate"] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        let expected = [
            "OptimizeRequest",
            "OptimizeResponse",
            "Layout",
            "RoomPower",
            "ErrorResponse",
        ];
        for name in expected {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn explicit_rack_budget_wins_over_room_level() {
        let defaults = OptimizerConfig::default();
        let req = request(r#"{"items": [], "rack_budget": 5, "room_level": 0}"#);
        assert_eq!(req.rack_budget(&defaults), 5);
    }

    #[test]
    fn room_level_sets_the_rack_budget() {
        let defaults = OptimizerConfig::default();
        let req = request(r#"{"items": [], "room_level": 1}"#);
        assert_eq!(req.rack_budget(&defaults), 30);
    }

    #[test]
    fn missing_budget_uses_the_default_room() {
        let defaults = OptimizerConfig::default();
        let validated = request(r#"{"items": []}"#)
            .into_validated(&defaults)
            .expect("Should validate successfully");
        assert_eq!(validated.input.rack_budget, 66);
        assert!(validated.input.rack_bonuses.is_empty());
    }

    #[test]
    fn request_overrides_replace_configured_defaults() {
        let defaults = OptimizerConfig::default();
        let body = r#"{
            "items": [],
            "rack_budget": 2,
            "rack3_fallback": 150,
            "rack4_fallback": 300,
            "top_n": 4
        }"#;
        let validated = request(body)
            .into_validated(&defaults)
            .expect("Should validate successfully");
        assert_eq!(validated.planner.rack3_fallback, 150);
        assert_eq!(validated.planner.rack4_fallback, 300);
        assert_eq!(validated.planner.top_n, 4);
        assert_eq!(
            validated.planner.max_rack_budget,
            defaults.planner_config().max_rack_budget
        );
    }

    #[test]
    fn invalid_requests_are_rejected_before_optimizing() {
        let defaults = OptimizerConfig::default();

        let wide =
            request(r#"{"items": [{"name": "X", "power": 1.0, "width": 3}], "rack_budget": 1}"#);
        assert!(matches!(
            wide.into_validated(&defaults),
            Err(ValidationError::InvalidWidth(_))
        ));

        let zero_top = request(r#"{"items": [], "top_n": 0}"#);
        assert!(matches!(
            zero_top.into_validated(&defaults),
            Err(ValidationError::InvalidConfiguration(_))
        ));

        let huge = request(r#"{"items": [], "rack_budget": 100000}"#);
        assert!(matches!(
            huge.into_validated(&defaults),
            Err(ValidationError::InvalidRackBudget(_))
        ));

        let fallback = request(r#"{"items": [], "rack3_fallback": 9223372036854775807}"#);
        assert!(matches!(
            fallback.into_validated(&defaults),
            Err(ValidationError::InvalidBonus(_))
        ));

        let option = request(
            r#"{
                "items": [],
                "rack_bonuses": [{"height": 4, "bonus_percent": -9223372036854775808}]
            }"#,
        );
        assert!(matches!(
            option.into_validated(&defaults),
            Err(ValidationError::InvalidBonus(_))
        ));
    }

    #[test]
    fn unknown_rack_height_fails_to_parse() {
        let json = r#"{"items": [], "rack_bonuses": [{"height": 5, "bonus_percent": 100}]}"#;
        assert!(serde_json::from_str::<OptimizeRequest>(json).is_err());
    }
}

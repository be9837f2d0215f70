//! REST API for the cutting service.
//!
//! Uses Axum as the web framework and supports CORS. The engine is CPU
//! bound, so every request runs it on the blocking thread pool.

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
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, OptimizerConfig};
use crate::model::{Bin, BinType, Box2D, CutAxis, Stacking, ValidationError, validate_margin};
use crate::optimizer::{ErrorCode, PackEngine, PackingConfig, PackingResult};
use crate::packer::Performance;
use crate::types::Rect;

#[derive(Clone)]
struct ApiState {
    optimizer_config: OptimizerConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>cut-it-now API Docs</title>
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
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// A piece to cut. `data` is returned untouched with its placement.
#[derive(Deserialize, Clone, ToSchema)]
pub struct BoxRequest {
    pub length: f64,
    pub width: f64,
    #[serde(default)]
    #[schema(value_type = Object, nullable = true, example = json!({"label": "door"}))]
    pub data: serde_json::Value,
}

/// A leftover sheet. A dimension of 0 is sized from the largest piece.
#[derive(Deserialize, Clone, ToSchema)]
pub struct BinRequest {
    pub length: f64,
    pub width: f64,
}

/// Per-request overrides of the configured optimizer defaults.
#[derive(Deserialize, Clone, Default, ToSchema)]
pub struct PackOptions {
    #[serde(default)]
    #[schema(nullable = true)]
    pub stacking: Option<Stacking>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub trimsize: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub saw_kerf: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub base_bin_length: Option<f64>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub base_bin_width: Option<f64>,
}

impl PackOptions {
    fn apply(&self, mut config: PackingConfig) -> Result<PackingConfig, ValidationError> {
        if let Some(stacking) = self.stacking {
            config.stacking = stacking;
        }
        if let Some(trimsize) = self.trimsize {
            validate_margin(trimsize, "Trim size")?;
            config.trimsize = trimsize;
        }
        if let Some(saw_kerf) = self.saw_kerf {
            validate_margin(saw_kerf, "Saw kerf")?;
            config.saw_kerf = saw_kerf;
        }
        if let Some(length) = self.base_bin_length {
            validate_margin(length, "Base sheet length")?;
            config.base_bin_length = length;
        }
        if let Some(width) = self.base_bin_width {
            validate_margin(width, "Base sheet width")?;
            config.base_bin_width = width;
        }
        Ok(config)
    }
}

#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "boxes": [
            { "length": 500.0, "width": 300.0, "data": { "label": "door" } },
            { "length": 500.0, "width": 300.0 }
        ],
        "bins": [
            { "length": 1000.0, "width": 600.0 }
        ],
        "options": { "saw_kerf": 3.0, "base_bin_length": 2800.0, "base_bin_width": 2070.0 }
    })
)]
pub struct PackRequest {
    pub boxes: Vec<BoxRequest>,
    #[serde(default)]
    pub bins: Vec<BinRequest>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub options: Option<PackOptions>,
}

#[derive(Debug)]
struct ValidatedPackRequest {
    boxes: Vec<(f64, f64, serde_json::Value)>,
    bins: Vec<Bin>,
    config: PackingConfig,
}

impl ValidatedPackRequest {
    fn box_count(&self) -> usize {
        self.boxes.len()
    }

    fn bin_count(&self) -> usize {
        self.bins.len()
    }

    fn into_engine(self) -> PackEngine<serde_json::Value> {
        let mut engine = PackEngine::new(self.config);
        for bin in self.bins {
            engine.add_bin(bin.length, bin.width);
        }
        for (length, width, data) in self.boxes {
            engine.add_box(length, width, data);
        }
        engine
    }
}

#[derive(Debug)]
enum PackRequestValidationError {
    MissingBoxes,
    InvalidBox(usize, ValidationError),
    InvalidBin(usize, ValidationError),
    InvalidOptions(ValidationError),
}

impl PackRequest {
    fn into_validated(
        self,
        defaults: PackingConfig,
    ) -> Result<ValidatedPackRequest, PackRequestValidationError> {
        if self.boxes.is_empty() {
            return Err(PackRequestValidationError::MissingBoxes);
        }

        let config = self
            .options
            .unwrap_or_default()
            .apply(defaults)
            .map_err(PackRequestValidationError::InvalidOptions)?;

        let bins = self
            .bins
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| {
                Bin::checked(spec.length, spec.width)
                    .map_err(|err| PackRequestValidationError::InvalidBin(idx, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let boxes = self
            .boxes
            .into_iter()
            .enumerate()
            .map(|(idx, spec)| {
                Box2D::new(idx, spec.length, spec.width)
                    .map(|_| (spec.length, spec.width, spec.data))
                    .map_err(|err| PackRequestValidationError::InvalidBox(idx, err))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ValidatedPackRequest {
            boxes,
            bins,
            config,
        })
    }
}

/// Result of a cutting run.
///
/// When the run produced no layout, `bins` is empty and `unplaced` lists
/// every piece.
#[derive(Serialize, ToSchema)]
pub struct PackResponse {
    pub error_code: ErrorCode,
    pub message: String,
    pub is_complete: bool,
    pub bins: Vec<PackedBin>,
    pub unused_bins: Vec<Bin>,
    pub unplaced: Vec<UnplacedPiece>,
    #[schema(nullable = true)]
    pub performance: Option<Performance>,
    pub efficiency: f64,
}

/// One opened sheet with its pieces, leftovers and cut plan.
#[derive(Serialize, ToSchema)]
pub struct PackedBin {
    pub index: usize,
    pub bin_type: BinType,
    pub length: f64,
    pub width: f64,
    pub efficiency: f64,
    pub placements: Vec<PlacedPiece>,
    pub leftovers: Vec<Rect>,
    pub cuts: Vec<CutLine>,
}

/// A piece at its position. `id` is the index of the piece in the request.
#[derive(Serialize, ToSchema)]
pub struct PlacedPiece {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub length: f64,
    pub width: f64,
    #[schema(value_type = Object, nullable = true)]
    pub data: serde_json::Value,
}

#[derive(Serialize, ToSchema)]
pub struct UnplacedPiece {
    pub id: usize,
    pub length: f64,
    pub width: f64,
    #[schema(value_type = Object, nullable = true)]
    pub data: serde_json::Value,
}

/// One guillotine cut, in the order it was made.
#[derive(Serialize, ToSchema)]
pub struct CutLine {
    pub axis: CutAxis,
    pub x: f64,
    pub y: f64,
    pub extent: f64,
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

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn parse_pack_request(
    payload: Result<Json<PackRequest>, JsonRejection>,
    defaults: PackingConfig,
) -> Result<ValidatedPackRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated(defaults) {
        Ok(validated) => Ok(validated),
        Err(PackRequestValidationError::MissingBoxes) => {
            Err(validation_error("At least one piece must be specified"))
        }
        Err(PackRequestValidationError::InvalidBox(idx, err)) => {
            Err(validation_error(format!("Piece {}: {}", idx, err)))
        }
        Err(PackRequestValidationError::InvalidBin(idx, err)) => {
            Err(validation_error(format!("Sheet {}: {}", idx, err)))
        }
        Err(PackRequestValidationError::InvalidOptions(err)) => Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Invalid cutting options",
            err.to_string(),
        )),
    }
}

impl PackResponse {
    /// Builds the response of a finished run. `requested` is used when the
    /// run returned no layout, so every piece is reported unplaced.
    pub fn from_run(
        result: Option<PackingResult<serde_json::Value>>,
        code: ErrorCode,
        requested: &[(f64, f64, serde_json::Value)],
    ) -> Self {
        let Some(result) = result else {
            return Self {
                error_code: code,
                message: code.to_string(),
                is_complete: false,
                bins: Vec::new(),
                unused_bins: Vec::new(),
                unplaced: requested
                    .iter()
                    .enumerate()
                    .map(|(id, (length, width, data))| UnplacedPiece {
                        id,
                        length: *length,
                        width: *width,
                        data: data.clone(),
                    })
                    .collect(),
                performance: None,
                efficiency: 0.0,
            };
        };

        let payload_of = |b: &Box2D| {
            result
                .payload(b)
                .cloned()
                .unwrap_or(serde_json::Value::Null)
        };

        let bins = result
            .container_bins
            .iter()
            .map(|bin| PackedBin {
                index: bin.index,
                bin_type: bin.bin.bin_type,
                length: bin.bin.length,
                width: bin.bin.width,
                efficiency: bin.efficiency(),
                placements: bin
                    .placed()
                    .iter()
                    .map(|p| PlacedPiece {
                        id: p.object.id,
                        x: p.position.0,
                        y: p.position.1,
                        length: p.object.length,
                        width: p.object.width,
                        data: payload_of(&p.object),
                    })
                    .collect(),
                leftovers: bin.leftovers(),
                cuts: bin
                    .cuts()
                    .iter()
                    .map(|cut| CutLine {
                        axis: cut.axis,
                        x: cut.x,
                        y: cut.y,
                        extent: cut.extent,
                    })
                    .collect(),
            })
            .collect();

        let unplaced = result
            .unplaced_boxes
            .iter()
            .map(|b| UnplacedPiece {
                id: b.id,
                length: b.length,
                width: b.width,
                data: payload_of(b),
            })
            .collect();

        Self {
            error_code: code,
            message: code.to_string(),
            is_complete: result.is_complete(),
            bins,
            unused_bins: result.unused_bins.clone(),
            unplaced,
            performance: Some(result.performance),
            efficiency: result.efficiency(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_pack, handle_pack_stream),
    components(
        schemas(
            PackRequest,
            BoxRequest,
            BinRequest,
            PackOptions,
            PackResponse,
            PackedBin,
            PlacedPiece,
            UnplacedPiece,
            CutLine,
            ErrorResponse,
            ErrorCode,
            Performance,
            Bin,
            BinType,
            CutAxis,
            Stacking,
            Rect
        )
    ),
    tags((name = "cutting", description = "Endpoints for guillotine cutting optimization"))
)]
struct ApiDoc;

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(
    config: ApiConfig,
    optimizer_config: OptimizerConfig,
) -> std::io::Result<()> {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { optimizer_config };

    let app = Router::new()
        .route("/pack", post(handle_pack))
        .route("/pack_stream", post(handle_pack_stream))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!(
        "🚀 Server running on http://{}:{}",
        config.display_host(),
        config.port()
    );
    if config.binds_to_all_interfaces() {
        println!("💡 Local access: http://localhost:{}", config.port());
    }
    println!("✂️ API Endpoints:");
    println!("   - POST /pack");
    println!("   - POST /pack_stream");
    println!("📑 Documentation:");
    println!("   - GET /docs");
    println!("   - GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /pack endpoint.
///
/// Cuts the requested pieces from the given leftover sheets, falling back
/// to fresh base stock when configured.
#[utoipa::path(
    post,
    path = "/pack",
    request_body = PackRequest,
    responses(
        (status = 200, description = "Cutting plan computed", body = PackResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or cutting options",
            body = ErrorResponse
        )
    ),
    tag = "cutting"
)]
async fn handle_pack(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload, state.optimizer_config.packing_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };

    log::info!(
        "New pack request: {} pieces, {} leftover sheets",
        request.box_count(),
        request.bin_count()
    );
    let requested = request.boxes.clone();
    let engine = request.into_engine();

    let (result, code) = match tokio::task::spawn_blocking(move || engine.run()).await {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("Cutting task failed: {}", err);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Cutting task failed",
                err.to_string(),
            );
        }
    };

    let response = PackResponse::from_run(result, code, &requested);
    log::info!(
        "Result: {} sheets, {} unplaced pieces ({})",
        response.bins.len(),
        response.unplaced.len(),
        code.code()
    );
    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for POST /pack_stream endpoint (SSE).
///
/// Streams `progress` events while the trials run and a final `result`
/// event carrying the same body as POST /pack.
#[utoipa::path(
    post,
    path = "/pack_stream",
    request_body = PackRequest,
    responses(
        (
            status = 200,
            description = "Streams progress events and the final result",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or cutting options",
            body = ErrorResponse
        )
    ),
    tag = "cutting"
)]
async fn handle_pack_stream(
    State(state): State<ApiState>,
    payload: Result<Json<PackRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_pack_request(payload, state.optimizer_config.packing_config()) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let requested = request.boxes.clone();
    let engine = request.into_engine();
    let (tx, rx) = mpsc::channel::<Event>(32);

    tokio::task::spawn_blocking(move || {
        let (result, code) = engine.run_with_progress(|evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // a closed receiver only means the client went away
                let _ = tx.blocking_send(Event::default().event("progress").data(json));
            }
        });
        let response = PackResponse::from_run(result, code, &requested);
        if let Ok(json) = serde_json::to_string(&response) {
            let _ = tx.blocking_send(Event::default().event("result").data(json));
        }
    });

    let stream = ReceiverStream::new(rx).map(Ok::<_, std::convert::Infallible>);
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PackRequest {
        serde_json::from_str(json).expect("Should parse valid JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        assert!(
            paths.contains_key("/pack"),
            "OpenAPI documentation is missing the /pack path"
        );
        assert!(
            paths.contains_key("/pack_stream"),
            "OpenAPI documentation is missing the /pack_stream path"
        );
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["PackRequest", "PackResponse", "PackedBin", "ErrorResponse", "ErrorCode"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn pack_request_defaults_optional_parts() {
        let request = parse(r#"{ "boxes": [{ "length": 500.0, "width": 300.0 }] }"#);
        assert!(request.bins.is_empty());
        assert!(request.options.is_none());
        assert_eq!(request.boxes[0].data, serde_json::Value::Null);
    }

    #[test]
    fn options_override_configured_defaults() {
        let request = parse(
            r#"{
                "boxes": [{ "length": 500.0, "width": 300.0 }],
                "options": { "stacking": "length", "saw_kerf": 4.0 }
            }"#,
        );
        let defaults = PackingConfig::builder().trimsize(10.0).saw_kerf(3.0).build();
        let validated = request.into_validated(defaults).expect("Should validate");

        assert_eq!(validated.config.stacking, Stacking::Length);
        assert_eq!(validated.config.saw_kerf, 4.0);
        assert_eq!(validated.config.trimsize, 10.0);
    }

    #[test]
    fn invalid_pieces_sheets_and_options_are_rejected() {
        let defaults = PackingConfig::default();

        let request = parse(r#"{ "boxes": [] }"#);
        assert!(matches!(
            request.into_validated(defaults),
            Err(PackRequestValidationError::MissingBoxes)
        ));

        let request = parse(r#"{ "boxes": [{ "length": 10.0, "width": 10.0 }, { "length": -1.0, "width": 10.0 }] }"#);
        assert!(matches!(
            request.into_validated(defaults),
            Err(PackRequestValidationError::InvalidBox(1, _))
        ));

        let request = parse(
            r#"{ "boxes": [{ "length": 10.0, "width": 10.0 }], "bins": [{ "length": -5.0, "width": 10.0 }] }"#,
        );
        assert!(matches!(
            request.into_validated(defaults),
            Err(PackRequestValidationError::InvalidBin(0, _))
        ));

        let request = parse(
            r#"{ "boxes": [{ "length": 10.0, "width": 10.0 }], "options": { "trimsize": -2.0 } }"#,
        );
        assert!(matches!(
            request.into_validated(defaults),
            Err(PackRequestValidationError::InvalidOptions(_))
        ));
    }

    #[test]
    fn response_carries_payloads_and_cut_plan() {
        let request = parse(
            r#"{
                "boxes": [
                    { "length": 500.0, "width": 300.0, "data": { "label": "door" } },
                    { "length": 500.0, "width": 300.0, "data": "shelf" }
                ],
                "bins": [{ "length": 1000.0, "width": 600.0 }]
            }"#,
        );
        let validated = request
            .into_validated(PackingConfig::builder().parallel_trials(false).build())
            .expect("Should validate");
        let requested = validated.boxes.clone();
        let (result, code) = validated.into_engine().run();
        let response = PackResponse::from_run(result, code, &requested);

        assert_eq!(response.error_code, ErrorCode::None);
        assert!(response.is_complete);
        assert_eq!(response.bins.len(), 1);
        let bin = &response.bins[0];
        assert_eq!(bin.placements.len(), 2);
        assert!(!bin.cuts.is_empty());
        let door = bin.placements.iter().find(|p| p.id == 0).expect("piece 0 placed");
        assert_eq!(door.data, json!({ "label": "door" }));
        let shelf = bin.placements.iter().find(|p| p.id == 1).expect("piece 1 placed");
        assert_eq!(shelf.data, json!("shelf"));
    }

    #[test]
    fn response_without_layout_lists_every_piece_unplaced() {
        let request = parse(r#"{ "boxes": [{ "length": 10.0, "width": 10.0, "data": 7 }] }"#);
        let validated = request
            .into_validated(PackingConfig::default())
            .expect("Should validate");
        let requested = validated.boxes.clone();
        let (result, code) = validated.into_engine().run();
        let response = PackResponse::from_run(result, code, &requested);

        assert_eq!(response.error_code, ErrorCode::NoBin);
        assert!(!response.is_complete);
        assert!(response.bins.is_empty());
        assert_eq!(response.unplaced.len(), 1);
        assert_eq!(response.unplaced[0].data, json!(7));
        let body = serde_json::to_value(&response).expect("Should serialize");
        assert_eq!(body["error_code"], json!("no_bin"));
    }
}

use crate::error::{Error, Result};
use crate::inference::{decode_image, ClassificationResult, InferenceService};
use axum::{
	body::Bytes,
	extract::{
		multipart::{MultipartError, MultipartRejection},
		DefaultBodyLimit, Multipart, State,
	},
	http::StatusCode,
	response::{Html, IntoResponse, Response},
	routing::{get, post},
	Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const INDEX_HTML: &str = include_str!("../../static/index.html");

/// Everything a request needs. Only constructible once the model is loaded.
#[derive(Clone)]
pub struct AppState {
	service: InferenceService,
	device_name: String,
	ready_since: DateTime<Utc>,
	max_upload_bytes: usize,
}

impl AppState {
	pub fn new(service: InferenceService, device_name: String, max_upload_bytes: usize) -> Self {
		Self {
			service,
			device_name,
			ready_since: Utc::now(),
			max_upload_bytes,
		}
	}
}

#[derive(Serialize)]
pub struct HealthResponse {
	pub status: String,
	pub model: String,
	pub device: String,
	pub labels: Vec<String>,
	pub ready_since: String,
}

impl IntoResponse for Error {
	fn into_response(self) -> Response {
		let (status, message) = match self {
			Error::InvalidInput(_) => (StatusCode::BAD_REQUEST, self.to_string()),
			Error::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, self.to_string()),
			Error::InvalidImage(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.to_string()),
			_ => {
				tracing::error!("Request failed: {}", self);
				(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
			}
		};

		let body = Json(serde_json::json!({
			"error": message,
		}));

		(status, body).into_response()
	}
}

async fn homepage_handler() -> Html<&'static str> {
	Html(INDEX_HTML)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok".to_string(),
		model: state.service.model_name().to_string(),
		device: state.device_name.clone(),
		labels: state.service.labels().to_vec(),
		ready_since: state.ready_since.to_rfc3339(),
	})
}

fn multipart_error(err: MultipartError) -> Error {
	if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
		Error::PayloadTooLarge(err.body_text())
	} else {
		Error::InvalidInput(err.body_text())
	}
}

/// Pulls the bytes of the `file` field out of the form, ignoring any other fields.
async fn read_file_field(multipart: &mut Multipart) -> Result<Bytes> {
	while let Some(field) = multipart
		.next_field()
		.await
		.map_err(multipart_error)?
	{
		if field.name() != Some("file") {
			continue;
		}

		let bytes = field
			.bytes()
			.await
			.map_err(multipart_error)?;

		if bytes.is_empty() {
			return Err(Error::InvalidInput("Uploaded file is empty".to_string()));
		}

		return Ok(bytes);
	}

	Err(Error::InvalidInput("Missing 'file' field".to_string()))
}

async fn analyze_handler(
	State(state): State<AppState>,
	multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<ClassificationResult>> {
	let mut multipart = multipart.map_err(|e| Error::InvalidInput(e.to_string()))?;
	let bytes = read_file_field(&mut multipart).await?;

	tracing::debug!("Classifying upload of {} bytes", bytes.len());

	// Decoding and the forward pass are CPU-bound; keep them off the async workers.
	let service = state.service.clone();
	let result = tokio::task::spawn_blocking(move || {
		let image = decode_image(&bytes)?;
		service.classify(&image)
	})
	.await
	.map_err(|e| Error::InferenceError(format!("Inference task failed: {}", e)))??;

	Ok(Json(result))
}

pub fn create_router(state: AppState) -> Router {
	let body_limit = state.max_upload_bytes;

	Router::new()
		.route("/", get(homepage_handler))
		.route("/analyze", post(analyze_handler))
		.route("/api/health", get(health_handler))
		.layer(DefaultBodyLimit::max(body_limit))
		.layer(CorsLayer::permissive())
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

pub async fn serve(host: &str, port: u16, state: AppState) -> Result<()> {
	let app = create_router(state);
	let addr = format!("{}:{}", host, port);

	tracing::info!("Starting server on {}", addr);

	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.map_err(|e| Error::ConfigError(format!("Failed to bind to {}: {}", addr, e)))?;

	axum::serve(listener, app)
		.await
		.map_err(|e| Error::ConfigError(format!("Server error: {}", e)))?;

	Ok(())
}

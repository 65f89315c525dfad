use axum::{
    routing::{ get, post, delete },
    Router,
    extract::{ Path, State, rejection::JsonRejection },
    response::{ IntoResponse, Response },
    http::{ header, HeaderValue, Method, StatusCode },
    Json,
};
use log::{ info, warn };
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::sync::Arc;
use tower_http::cors::{ AllowOrigin, CorsLayer };

use crate::chat::{ ChatService, ServiceStats };
use crate::models::chat::{ ChatRequest, ChatResult };
use super::client::ClientAddr;
use super::error::ApiError;

const SERVICE_NAME: &str = "Portfolio Chatbot API";

/// Configuration the HTTP layer reports back to operators. Never holds secrets.
#[derive(Debug, Clone, Default)]
pub struct ApiSettings {
    pub trust_proxy: bool,
    pub backend: String,
    pub model: String,
    pub base_url: String,
    pub credential_present: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ChatService>,
    pub settings: Arc<ApiSettings>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub dataset_size: usize,
    pub uptime: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearResponse {
    pub message: String,
}

/// Allow-list CORS with credentials. A `*` entry cannot be combined with
/// credentials, so it is dropped and only the explicit origins are kept.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| {
            if o.trim() == "*" {
                warn!("Ignoring wildcard CORS origin; list the allowed origins explicitly");
                false
            } else {
                true
            }
        })
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!("Ignoring invalid CORS origin '{}': {}", o, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

pub fn create_router(state: AppState, origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/setup", get(setup_handler))
        .route("/api/v1/chat", post(chat_handler))
        .route("/api/v1/chat/{conversation_id}", delete(clear_handler))
        .route("/api/v1/stats", get(stats_handler))
        .layer(cors_layer(origins))
        .with_state(state)
}

async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    let persona = state.service.persona();
    let description = format!("{}'s AI knowledge database", persona.owner_name);

    let Some(provider) = state.service.provider() else {
        return Json(json!({
            "name": SERVICE_NAME,
            "assistant": persona.assistant_name,
            "description": description,
            "version": env!("CARGO_PKG_VERSION"),
            "status": "NOT CONFIGURED",
            "setup_required": "Configure the chat provider (CHAT_LLM_TYPE with GROQ_API_KEY or OLLAMA_URL) and restart",
            "endpoints": {
                "health": "/api/v1/health",
                "setup": "/api/v1/setup",
            },
            "instructions": "Visit /api/v1/setup for configuration help",
        }));
    };

    let (connected, message) = provider.check_connection().await;
    let status = if connected { "READY".to_string() } else { format!("PROVIDER ISSUE: {}", message) };

    Json(json!({
        "name": SERVICE_NAME,
        "assistant": persona.assistant_name,
        "description": description,
        "version": env!("CARGO_PKG_VERSION"),
        "status": status,
        "endpoints": {
            "chat": "/api/v1/chat",
            "health": "/api/v1/health",
            "stats": "/api/v1/stats",
            "setup": "/api/v1/setup",
        },
    }))
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let dataset_size = state.service.knowledge().len();
    let uptime = state.service.uptime().as_secs_f64();

    let Some(provider) = state.service.provider() else {
        let body = HealthResponse {
            status: "unavailable".into(),
            model: "not_connected".into(),
            dataset_size,
            uptime,
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    };

    let (connected, message) = provider.check_connection().await;
    let (code, status, model) = if !provider.is_configured() {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable", format!("error: {}", message))
    } else if !connected {
        (StatusCode::OK, "degraded", format!("error: {}", message))
    } else {
        (StatusCode::OK, "healthy", provider.model())
    };

    let body = HealthResponse {
        status: status.into(),
        model,
        dataset_size,
        uptime,
    };
    (code, Json(body)).into_response()
}

async fn setup_handler(State(state): State<AppState>) -> Json<Value> {
    let settings = &state.settings;
    let provider = state.service.provider();

    let provider_step = if settings.backend == "ollama" {
        json!({
            "step": 2,
            "title": "Run Ollama and pull the model",
            "command": format!("ollama pull {}", settings.model),
            "note": "OLLAMA_URL must point at a reachable Ollama instance",
        })
    } else {
        json!({
            "step": 2,
            "title": "Provide a Groq API key",
            "variables": { "GROQ_API_KEY": "your Groq API key" },
        })
    };

    let mut info = json!({
        "title": "Portfolio Chatbot API setup",
        "current_config": {
            "CHAT_LLM_TYPE": settings.backend,
            "model": settings.model,
            "base_url": settings.base_url,
            "credential_present": settings.credential_present,
            "provider_initialized": provider.is_some(),
        },
        "steps": [
            {
                "step": 1,
                "title": "Set environment variables",
                "variables": {
                    "CHAT_LLM_TYPE": "groq or ollama",
                    "GROQ_MODEL / OLLAMA_MODEL": "model name",
                    "OLLAMA_URL": "http://localhost:11434 (ollama only)",
                    "ALLOWED_ORIGINS": "comma separated site origins",
                },
            },
            provider_step,
            {
                "step": 3,
                "title": "Restart the service",
                "note": "Configuration is read once at startup",
            },
        ],
        "test_endpoints": {
            "health": "/api/v1/health",
        },
    });

    if let Some(provider) = provider {
        let (connected, message) = provider.check_connection().await;
        info["connection_test"] = json!({
            "connected": connected,
            "message": message,
        });
    }

    Json(info)
}

async fn chat_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResult>, ApiError> {
    let Json(request) = payload.map_err(|rejection| match rejection {
        JsonRejection::JsonDataError(e) => ApiError::Validation(e.body_text()),
        other => ApiError::BadRequest(other.body_text()),
    })?;

    let result = state.service.chat(&client, request).await?;
    if let Some(reason) = result.fallback {
        info!("Served fallback reply ({:?}) to client {}", reason, client);
    }
    Ok(Json(result))
}

async fn clear_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
    Path(conversation_id): Path<String>,
) -> Result<Json<ClearResponse>, ApiError> {
    state.service.admit(&client).await?;
    state.service.clear_conversation(&conversation_id).await?;
    Ok(Json(ClearResponse {
        message: format!("Conversation {} cleared", conversation_id),
    }))
}

async fn stats_handler(
    State(state): State<AppState>,
    ClientAddr(client): ClientAddr,
) -> Result<Json<ServiceStats>, ApiError> {
    state.service.admit(&client).await?;
    Ok(Json(state.service.stats().await))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_only_origin_list_builds() {
        let _layer = cors_layer(&["*".to_string(), " * ".to_string()]);
    }

    #[test]
    fn invalid_and_wildcard_origins_are_skipped_together() {
        let _layer = cors_layer(&["*".to_string(), "bad\norigin".to_string(), "https://ok.example".to_string()]);
    }
}

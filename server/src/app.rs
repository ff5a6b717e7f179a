use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use dialogbot::{GenerationConfig, ResponseGenerator, SharedModel};
use serde::Deserialize;
use shared::{ApiError, ChatRequest, ConversationResponse, StatusResponse};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::pages;
use crate::sessions::{SessionLimits, SessionRegistry};

#[derive(Clone)]
pub(crate) struct AppState {
    model: Arc<SharedModel>,
    sessions: SessionRegistry,
}

impl AppState {
    pub(crate) fn new(
        model: Arc<SharedModel>,
        config: GenerationConfig,
        limits: SessionLimits,
    ) -> Self {
        let generator = ResponseGenerator::new(model.clone(), config);

        Self {
            model,
            sessions: SessionRegistry::new(generator, limits),
        }
    }
}

pub(crate) fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        // allow `GET` and `POST` when accessing the API
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let api = Router::new()
        .route("/chat", post(start_chat))
        .route("/conversations/:conversation_slug", get(get_conversation))
        .route("/status", get(status))
        .layer(cors);

    Router::new()
        .route("/", get(index))
        .route(
            "/conversations/:conversation_slug",
            get(show_conversation).post(post_message),
        )
        .route("/conversations/:conversation_slug/end", post(end_conversation))
        .nest("/api/v0", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn conversation_path(slug: Uuid) -> String {
    format!("/conversations/{slug}")
}

async fn index(State(state): State<AppState>) -> Redirect {
    let slug = state.sessions.open();
    Redirect::to(&conversation_path(slug))
}

async fn show_conversation(
    State(state): State<AppState>,
    Path(slug): Path<Uuid>,
) -> Response {
    let Some(session) = state.sessions.get(slug) else {
        return (StatusCode::NOT_FOUND, Html(pages::not_found(slug))).into_response();
    };

    Html(pages::conversation(
        slug,
        &session.turns(),
        state.model.load_error(),
    ))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct MessageForm {
    #[serde(default)]
    message: String,
}

async fn post_message(
    State(state): State<AppState>,
    Path(slug): Path<Uuid>,
    Form(form): Form<MessageForm>,
) -> Response {
    let Some(session) = state.sessions.get(slug) else {
        return (StatusCode::NOT_FOUND, Html(pages::not_found(slug))).into_response();
    };

    session.submit(&form.message).await;
    Redirect::to(&conversation_path(slug)).into_response()
}

async fn end_conversation(State(state): State<AppState>, Path(slug): Path<Uuid>) -> Redirect {
    state.sessions.end(slug);
    Redirect::to("/")
}

struct ApiFailure(ApiError);

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ApiError::ConversationNotFound { .. } => StatusCode::NOT_FOUND,
        };
        (status, Json(self.0)).into_response()
    }
}

async fn start_chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> Json<ConversationResponse> {
    let slug = body.conversation_slug;
    let session = state.sessions.get_or_open(slug);
    session.submit(&body.question).await;

    Json(ConversationResponse {
        slug,
        turns: session.turns(),
    })
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(slug): Path<Uuid>,
) -> Result<Json<ConversationResponse>, ApiFailure> {
    let session = state
        .sessions
        .get(slug)
        .ok_or(ApiFailure(ApiError::ConversationNotFound { slug }))?;

    Ok(Json(ConversationResponse {
        slug,
        turns: session.turns(),
    }))
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        model_ready: state.model.is_ready(),
        model_error: state.model.load_error().map(ToOwned::to_owned),
    })
}

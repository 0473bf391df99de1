use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json as JsonResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use application::{ApplicationError, PartialPersonRequest, PersonRequest, PersonService};
use domain::PersonId;

/// OpenAPI description of the HTTP surface, served at `/docs`.
const OPENAPI_DOCUMENT: &str = include_str!("openapi.json");

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub person_service: Arc<PersonService>,
}

#[derive(Deserialize, Debug)]
pub struct ListPeopleParams {
    pub name: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    let persons = Router::new()
        .route(
            "/persons",
            post(create_person_handler).get(list_people_handler),
        )
        .route(
            "/persons/:person_id",
            get(get_person_handler)
                .put(replace_person_handler)
                .patch(patch_person_handler)
                .delete(delete_person_handler),
        )
        .route("/persons/:person_id/friends", get(list_friends_handler))
        .route("/persons/:person_id/add-friends", post(add_friends_handler))
        .route(
            "/persons/:person_id/remove-friends",
            post(remove_friends_handler),
        );

    Router::new()
        .route("/", get(root_redirect))
        .route("/docs", get(api_docs))
        .route("/health", get(health_check))
        .nest("/api", persons)
        .with_state(state)
}

// --- API Handlers ---

async fn root_redirect() -> Redirect {
    Redirect::temporary("/docs")
}

async fn api_docs() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], OPENAPI_DOCUMENT)
}

async fn health_check() -> impl IntoResponse {
    info!("Health check endpoint called");
    (StatusCode::OK, "OK")
}

/// Handler for creating a person (POST /api/persons).
async fn create_person_handler(
    State(state): State<AppState>,
    Json(payload): Json<PersonRequest>,
) -> Response {
    info!(name = %payload.name, "Received request to create person");
    match state.person_service.create_person(payload).await {
        Ok(person) => (StatusCode::CREATED, JsonResponse(person)).into_response(),
        Err(e) => {
            error!("Failed to create person via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for listing people (GET /api/persons?name=...).
async fn list_people_handler(
    State(state): State<AppState>,
    Query(params): Query<ListPeopleParams>,
) -> Response {
    info!(name = ?params.name, "Received request to list people");
    match state.person_service.list_people(params.name.as_deref()).await {
        Ok(people) => (StatusCode::OK, JsonResponse(people)).into_response(),
        Err(e) => {
            error!("Failed to list people via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn get_person_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
) -> Response {
    info!(person_id = %person_id, "Received request to get person");
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.get_person(&id).await {
        Ok(person) => (StatusCode::OK, JsonResponse(person)).into_response(),
        Err(e) => {
            error!(person_id = %id, "Failed to get person via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for full replacement (PUT /api/persons/:person_id).
async fn replace_person_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
    Json(payload): Json<PersonRequest>,
) -> Response {
    info!(person_id = %person_id, "Received request to replace person");
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.replace_person(&id, payload).await {
        Ok(person) => (StatusCode::OK, JsonResponse(person)).into_response(),
        Err(e) => {
            error!(person_id = %id, "Failed to replace person via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for partial updates (PATCH /api/persons/:person_id).
async fn patch_person_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
    Json(payload): Json<PartialPersonRequest>,
) -> Response {
    info!(person_id = %person_id, "Received request to patch person");
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.patch_person(&id, payload).await {
        Ok(person) => (StatusCode::OK, JsonResponse(person)).into_response(),
        Err(e) => {
            error!(person_id = %id, "Failed to patch person via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn delete_person_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
) -> Response {
    info!(person_id = %person_id, "Received request to delete person");
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.delete_person(&id).await {
        Ok(()) => {
            info!(person_id = %id, "Person deleted successfully via handler");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            error!(person_id = %id, "Failed to delete person via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

async fn list_friends_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
) -> Response {
    info!(person_id = %person_id, "Received request to list friends");
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.list_friends(&id).await {
        Ok(friends) => (StatusCode::OK, JsonResponse(friends)).into_response(),
        Err(e) => {
            error!(person_id = %id, "Failed to list friends via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for adding friends (POST /api/persons/:person_id/add-friends).
/// The body is a JSON array of person ids.
async fn add_friends_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
    Json(friend_ids): Json<Vec<PersonId>>,
) -> Response {
    info!(
        person_id = %person_id,
        candidates = friend_ids.len(),
        "Received request to add friends"
    );
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.add_friends(&id, &friend_ids).await {
        Ok(person) => (StatusCode::OK, JsonResponse(person)).into_response(),
        Err(e) => {
            error!(person_id = %id, "Failed to add friends via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

/// Handler for removing friends (POST /api/persons/:person_id/remove-friends).
async fn remove_friends_handler(
    State(state): State<AppState>,
    Path(person_id): Path<String>,
    Json(friend_ids): Json<Vec<PersonId>>,
) -> Response {
    info!(
        person_id = %person_id,
        candidates = friend_ids.len(),
        "Received request to remove friends"
    );
    let id = match parse_person_id(&person_id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match state.person_service.remove_friends(&id, &friend_ids).await {
        Ok(person) => (StatusCode::OK, JsonResponse(person)).into_response(),
        Err(e) => {
            error!(person_id = %id, "Failed to remove friends via handler: {}", e);
            map_application_error_to_response(e)
        }
    }
}

fn parse_person_id(raw: &str) -> Result<PersonId, Response> {
    raw.parse::<PersonId>()
        .map_err(|e| map_application_error_to_response(e.into()))
}

/// Maps ApplicationError to an HTTP status and a `{"detail": ...}` body.
fn map_application_error_to_response(err: ApplicationError) -> Response {
    let (status, detail) = match err {
        ApplicationError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            format!("person with id {} not found.", id),
        ),
        ApplicationError::DomainError(domain_err) => {
            warn!("Rejected request: {}", domain_err);
            (StatusCode::UNPROCESSABLE_ENTITY, domain_err.to_string())
        }
        ApplicationError::Repository(msg) => {
            error!("Underlying repository error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "An internal server error occurred".to_string(),
            )
        }
    };
    (status, JsonResponse(json!({ "detail": detail }))).into_response()
}

//! User REST API Routes
//!
//! CRUD surface for users plus their task listing. The write operations
//! (POST/PUT/DELETE) are registered as idempotent; the middleware guards
//! them, so the handlers here stay plain.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::types::{CreateUserRequest, Task, UpdateUserRequest, User};

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /usuarios - list all users
pub async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.repo.list())
}

/// GET /usuarios/:id - fetch a single user
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    state
        .repo
        .get(user_id)
        .map(Json)
        .ok_or_else(|| ApiError::user_not_found(user_id))
}

/// POST /usuarios - create a user
pub async fn create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let user = state.repo.create(request);
    tracing::info!(user_id = %user.user_id, "user created");
    (StatusCode::CREATED, Json(user))
}

/// PUT /usuarios/:id - replace a user's mutable fields
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<User>> {
    state
        .repo
        .update(user_id, request)
        .map(Json)
        .ok_or_else(|| ApiError::user_not_found(user_id))
}

/// DELETE /usuarios/:id - delete a user
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.repo.delete(user_id) {
        tracing::info!(user_id = %user_id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::user_not_found(user_id))
    }
}

/// GET /usuarios/:id/tarefas - list a user's tasks
pub async fn list_user_tasks(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<Vec<Task>> {
    Json(state.repo.tasks_for_user(user_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::UserRepo;
    use axum::{body::Body, http::Request, routing::get, Router};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, AppState) {
        let state = AppState::new(Arc::new(UserRepo::new()));
        let router = Router::new()
            .route("/usuarios", get(list_users).post(create_user))
            .route(
                "/usuarios/:id",
                get(get_user).put(update_user).delete(delete_user),
            )
            .route("/usuarios/:id/tarefas", get(list_user_tasks))
            .with_state(state.clone());
        (router, state)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_returns_201_with_the_user() {
        let (app, state) = app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/usuarios",
                serde_json::json!({"nome": "Maria", "email": "maria@example.com"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = json_body(response).await;
        assert_eq!(body["nome"], "Maria");
        assert_eq!(state.repo.user_count(), 1);
    }

    #[tokio::test]
    async fn get_unknown_user_returns_404() {
        let (app, _) = app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/usuarios/{}", Uuid::now_v7()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["code"], "USER_NOT_FOUND");
    }

    #[tokio::test]
    async fn update_replaces_fields() {
        let (app, state) = app();
        let user = state.repo.create(CreateUserRequest {
            nome: "Maria".to_string(),
            email: "maria@example.com".to_string(),
        });

        let response = app
            .oneshot(json_request(
                "PUT",
                &format!("/usuarios/{}", user.user_id),
                serde_json::json!({"nome": "Maria Souza", "email": "souza@example.com"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["nome"], "Maria Souza");
    }

    #[tokio::test]
    async fn delete_returns_204_then_404() {
        let (app, state) = app();
        let user = state.repo.create(CreateUserRequest {
            nome: "Maria".to_string(),
            email: "maria@example.com".to_string(),
        });
        let uri = format!("/usuarios/{}", user.user_id);

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(&uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::NO_CONTENT);

        let second = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(&uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn task_listing_returns_the_users_tasks() {
        let (app, state) = app();
        let user = state.repo.create(CreateUserRequest {
            nome: "Maria".to_string(),
            email: "maria@example.com".to_string(),
        });
        state.repo.add_task(user.user_id, "estudar Rust");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/usuarios/{}/tarefas", user.user_id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["descricao"], "estudar Rust");
    }
}

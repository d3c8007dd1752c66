use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum::Json;
use serde::Serialize;

use crate::auth::{AuthContext, StaticSessionProvider};
use crate::models::Coordinates;
use crate::store::Backend;
use crate::sync::SessionHandle;
use crate::utils::error::AppError;
use crate::utils::response::{accepted, empty_success, ok, success};
use crate::wizard::WizardInput;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle<Backend>,
    pub auth: AuthContext<StaticSessionProvider>,
}

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

#[derive(Serialize)]
struct RenderHints {
    tracking_enabled: bool,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "pickup-sync",
    };

    success(payload, "Health check successful")
}

/// Rejects every request once the client is signed out.
pub async fn require_session(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !state.auth.is_authorized() {
        return Err(AppError::AuthError("Sign in to view events".to_string()));
    }
    Ok(next.run(request).await)
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let view = state.session.call(|session| session.view()).await?;
    Ok(ok(view))
}

pub async fn render_hints(State(state): State<AppState>) -> Result<Response, AppError> {
    let tracking_enabled = state
        .session
        .call(|session| session.tracking_enabled())
        .await?;
    Ok(ok(RenderHints { tracking_enabled }))
}

pub async fn focus(State(state): State<AppState>) -> Result<Response, AppError> {
    state.session.call(|session| session.on_focus()).await?;
    Ok(empty_success("Map focused"))
}

pub async fn blur(State(state): State<AppState>) -> Result<Response, AppError> {
    state.session.call(|session| session.on_blur()).await?;
    Ok(empty_success("Map blurred"))
}

pub async fn dismiss_notice(
    State(state): State<AppState>,
    Path(index): Path<usize>,
) -> Result<Response, AppError> {
    let notice = state
        .session
        .call(move |session| session.dismiss_notice(index))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No notice at index {}", index)))?;
    Ok(success(notice, "Notice dismissed"))
}

pub async fn open_wizard(
    State(state): State<AppState>,
    Json(at): Json<Coordinates>,
) -> Result<Response, AppError> {
    let view = state
        .session
        .call(move |session| session.open_wizard(at))
        .await??;
    Ok(success(view, "Event creation started"))
}

pub async fn get_wizard(State(state): State<AppState>) -> Result<Response, AppError> {
    let view = state
        .session
        .call(|session| session.wizard_view())
        .await?
        .ok_or_else(|| AppError::NotFound("No event is being created".to_string()))?;
    Ok(ok(view))
}

pub async fn wizard_input(
    State(state): State<AppState>,
    Json(input): Json<WizardInput>,
) -> Result<Response, AppError> {
    let view = state
        .session
        .call(move |session| session.wizard_input(input))
        .await??;
    Ok(ok(view))
}

pub async fn wizard_next(State(state): State<AppState>) -> Result<Response, AppError> {
    let view = state
        .session
        .call(|session| session.wizard_next())
        .await??;
    if view.submitting {
        Ok(accepted(view, "Creating event"))
    } else {
        Ok(ok(view))
    }
}

pub async fn wizard_previous(State(state): State<AppState>) -> Result<Response, AppError> {
    let view = state
        .session
        .call(|session| session.wizard_previous())
        .await??;
    Ok(ok(view))
}

pub async fn close_wizard(State(state): State<AppState>) -> Result<Response, AppError> {
    state
        .session
        .call(|session| session.close_wizard())
        .await??;
    Ok(empty_success("Event creation closed"))
}

pub async fn sign_out(State(state): State<AppState>) -> Response {
    state.auth.sign_out().await;
    empty_success("Signed out")
}

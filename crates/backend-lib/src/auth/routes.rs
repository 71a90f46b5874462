//! HTTP surface for the credential service.
use crate::auth::{LoginOutcome, SignupOutcome};
use crate::error::AppError;
use crate::AppState;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    pub user_name: String,
    pub user_email: String,
}

/// `POST /signup`
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<SignupResponse>, AppError> {
    match state.auth.signup(&req.name, &req.email, &req.password).await? {
        SignupOutcome::Created => {
            info!(name = %req.name, "account created");
            Ok(Json(SignupResponse {
                success: true,
                message: "Signup successful!".to_string(),
            }))
        },
        SignupOutcome::NameTaken => Err(AppError::NameTaken),
        SignupOutcome::EmailTaken => Err(AppError::EmailTaken),
    }
}

/// `POST /login`
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    match state.auth.login(&req.email, &req.password).await {
        LoginOutcome::Success(profile) => Ok(Json(LoginResponse {
            success: true,
            user_name: profile.name,
            user_email: profile.email,
        })),
        LoginOutcome::UnknownEmail | LoginOutcome::WrongPassword => {
            Err(AppError::InvalidCredentials)
        },
    }
}

use serde::{Deserialize, Serialize};

use crate::store::{Role, User};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Response returned after register or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct TokenSubject {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub user: TokenSubject,
    pub issued_at: String,
    pub expires_at: String,
}

//! Request extractors whose rejections go through [`AppError`], so a
//! malformed body, query or path gets the usual JSON error envelope.

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query},
    Json,
};

use crate::error::AppError;

#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Query), rejection(AppError))]
pub struct AppQuery<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct AppPath<T>(pub T);

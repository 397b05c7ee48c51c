//! Product endpoints.
//!
//! Every handler runs under a fresh [`CallContext`] carrying the request
//! deadline. The guarded dependency call comes first; storage is only touched
//! once it has succeeded.

use crate::app::AppState;
use crate::error::ApiError;
use crate::repository::Product;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted product name, in characters.
pub const MAX_NAME_LEN: usize = 256;

#[derive(Debug, Deserialize)]
pub struct ProductPayload {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductIdResponse {
    pub id: String,
}

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("name must not be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "name must be at most {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn parse_payload(
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(payload) = payload.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    validate_name(&payload.name)
}

pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> Result<Json<ProductIdResponse>, ApiError> {
    let name = parse_payload(payload)?;
    let ctx = state.request_context();
    state.dependency.check(&ctx).await?;

    let product = Product {
        id: Uuid::new_v4().to_string(),
        name,
    };
    let id = product.id.clone();
    ctx.run(state.repository.create(product)).await??;

    tracing::info!(product_id = %id, "product created");
    Ok(Json(ProductIdResponse { id }))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Product>, ApiError> {
    let ctx = state.request_context();
    state.dependency.check(&ctx).await?;

    let product = ctx.run(state.repository.get(&id)).await??;
    Ok(Json(product))
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ProductPayload>, JsonRejection>,
) -> Result<Json<ProductIdResponse>, ApiError> {
    let name = parse_payload(payload)?;
    let ctx = state.request_context();
    state.dependency.check(&ctx).await?;

    let product = Product {
        id: id.clone(),
        name,
    };
    ctx.run(state.repository.update(product)).await??;

    tracing::info!(product_id = %id, "product updated");
    Ok(Json(ProductIdResponse { id }))
}

//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the small REST boundary: issuing session
//! cookies, landing the directory credential, and the purchase check.

use crate::adapters::LicensePurchaseAdapter;
use crate::web::registry::{Resource, ResourceKey, SESSION_TTL};
use crate::web::session::sign;
use crate::web::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use photosync_core::ports::PurchaseService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    session_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    access_token: String,
}

#[derive(Deserialize)]
pub struct PurchaseRequest {
    email: String,
}

#[derive(Serialize)]
pub struct PurchaseResponse {
    purchased: bool,
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Issues a fresh session and its signed cookie.
pub async fn create_session_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let session_id = Uuid::new_v4();
    let cookie = format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax",
        sign(state.config.cookie_secret.as_bytes(), &session_id)
    );
    (
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(SessionResponse { session_id }),
    )
}

/// Stores the directory OAuth credential for this session.
pub async fn store_token_handler(
    State(state): State<Arc<AppState>>,
    Extension(session_id): Extension<Uuid>,
    Json(request): Json<TokenRequest>,
) -> StatusCode {
    state.registry.put(
        session_id,
        ResourceKey::DirectoryCredential,
        Resource::DirectoryCredential(request.access_token),
        SESSION_TTL,
    );
    StatusCode::NO_CONTENT
}

/// Checks the purchase state of this session's user.
///
/// On the first successful check the email is bound to the session; purchase
/// state survives the session's deferred teardown.
pub async fn verify_purchase_handler(
    State(state): State<Arc<AppState>>,
    Extension(session_id): Extension<Uuid>,
    Json(request): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, (StatusCode, String)> {
    let Some(purchase_config) = state.config.purchase.as_ref() else {
        // Enforcement inactive: every session counts as purchased.
        return Ok(Json(PurchaseResponse { purchased: true }));
    };

    let adapter = LicensePurchaseAdapter::new(
        state.http.clone(),
        purchase_config.api_url.clone(),
        purchase_config.product_id.clone(),
    );
    match adapter.is_purchased(&request.email).await {
        Ok(true) => {
            info!(%session_id, "purchase verified");
            state.registry.put(
                session_id,
                ResourceKey::Purchased,
                Resource::Purchased(true),
                SESSION_TTL,
            );
            state.registry.put(
                session_id,
                ResourceKey::VerifiedEmail,
                Resource::VerifiedEmail(request.email),
                SESSION_TTL,
            );
            Ok(Json(PurchaseResponse { purchased: true }))
        }
        Ok(false) => Ok(Json(PurchaseResponse { purchased: false })),
        Err(e) => {
            error!(%session_id, error = %e, "purchase verification failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to verify purchase".to_string(),
            ))
        }
    }
}

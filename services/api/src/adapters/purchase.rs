//! services/api/src/adapters/purchase.rs
//!
//! This module contains the adapter for the license-check API. It implements
//! the `PurchaseService` port from the `core` crate.

use async_trait::async_trait;
use photosync_core::ports::{PortError, PortResult, PurchaseService};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    product_id: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
struct VerifyResponse {
    purchased: bool,
}

/// An adapter that implements the `PurchaseService` port against the
/// license-check API of the storefront.
#[derive(Clone)]
pub struct LicensePurchaseAdapter {
    http: reqwest::Client,
    base_url: String,
    product_id: String,
}

impl LicensePurchaseAdapter {
    pub fn new(http: reqwest::Client, base_url: String, product_id: String) -> Self {
        Self {
            http,
            base_url,
            product_id,
        }
    }
}

#[async_trait]
impl PurchaseService for LicensePurchaseAdapter {
    async fn is_purchased(&self, email: &str) -> PortResult<bool> {
        let response = self
            .http
            .post(format!("{}/licenses/verify", self.base_url))
            .json(&VerifyRequest {
                product_id: &self.product_id,
                email,
            })
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        // The storefront answers 404 for an email with no purchase record.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(PortError::Unexpected(format!(
                "license API returned {}",
                response.status()
            )));
        }
        let verdict: VerifyResponse = response
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(verdict.purchased)
    }
}

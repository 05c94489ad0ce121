//! services/api/src/adapters/directory.rs
//!
//! This module contains the adapter for the external contact-directory API.
//! It implements the `DirectoryService` port from the `core` crate.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use photosync_core::domain::DirectoryContact;
use photosync_core::ports::{DirectoryService, PortError, PortResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const PAGE_SIZE: u32 = 100;

//=========================================================================================
// Directory Wire Types
//=========================================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContactsPage {
    #[serde(default)]
    contacts: Vec<WireContact>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireContact {
    id: String,
    name: Option<String>,
    #[serde(default)]
    numbers: Vec<String>,
    #[serde(default)]
    has_photo: bool,
    photo_url: Option<String>,
}

#[derive(Serialize)]
struct UpdatePhotoRequest<'a> {
    photo: &'a str,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `DirectoryService` port against the
/// directory's REST API, authenticated with the session's OAuth credential.
#[derive(Clone)]
pub struct RestDirectoryAdapter {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl RestDirectoryAdapter {
    pub fn new(http: reqwest::Client, base_url: String, access_token: String) -> Self {
        Self {
            http,
            base_url,
            access_token,
        }
    }

    fn map_status(status: reqwest::StatusCode, context: &str) -> PortError {
        if status == reqwest::StatusCode::UNAUTHORIZED {
            PortError::Unauthorized
        } else {
            PortError::Unexpected(format!("directory API returned {status} for {context}"))
        }
    }
}

/// Reduces a phone number to canonical form: digits only, no leading `+`,
/// no separators.
fn canonicalize(number: &str) -> String {
    number.chars().filter(|c| c.is_ascii_digit()).collect()
}

//=========================================================================================
// `DirectoryService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DirectoryService for RestDirectoryAdapter {
    /// Lists every contact with at least one phone number, following
    /// pagination to the end.
    async fn list_contacts(&self) -> PortResult<Vec<DirectoryContact>> {
        let mut contacts = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(format!("{}/v1/contacts", self.base_url))
                .bearer_auth(&self.access_token)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.clone())]);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PortError::Unavailable(e.to_string()))?;
            if !response.status().is_success() {
                return Err(Self::map_status(response.status(), "contact listing"));
            }
            let page: ContactsPage = response
                .json()
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;

            for contact in page.contacts {
                let numbers: Vec<String> = contact
                    .numbers
                    .iter()
                    .map(|n| canonicalize(n))
                    .filter(|n| !n.is_empty())
                    .collect();
                if numbers.is_empty() {
                    continue;
                }
                contacts.push(DirectoryContact {
                    id: contact.id,
                    name: contact.name,
                    numbers,
                    has_photo: contact.has_photo,
                    photo_url: contact.photo_url,
                });
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        debug!(count = contacts.len(), "loaded directory contacts");
        Ok(contacts)
    }

    async fn update_photo(&self, contact_id: &str, photo_b64: &str) -> PortResult<()> {
        let response = self
            .http
            .put(format!("{}/v1/contacts/{}/photo", self.base_url, contact_id))
            .bearer_auth(&self.access_token)
            .json(&UpdatePhotoRequest { photo: photo_b64 })
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::map_status(
                response.status(),
                &format!("photo update of {contact_id}"),
            ));
        }
        Ok(())
    }

    /// Fetches a contact's current photo bytes; any failure is reported as
    /// an absent photo since existing photos are only advisory context.
    async fn fetch_photo(&self, photo_url: &str) -> PortResult<Option<String>> {
        let response = match self
            .http
            .get(photo_url)
            .bearer_auth(&self.access_token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "existing photo fetch failed");
                return Ok(None);
            }
        };
        if !response.status().is_success() {
            return Ok(None);
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        Ok(Some(BASE64.encode(&bytes)))
    }
}

//! services/api/src/web/sync_task.rs
//!
//! This module contains the asynchronous "worker" function responsible for
//! one sync job: load both contact sets, match by phone number, optionally
//! gate each upload on human confirmation, and report progress over the
//! session's connection.

use crate::web::{
    channel::{ChannelError, Connection, REQUEST_TIMEOUT},
    protocol::{ClientEvent, ClientEventKind, ConfirmRequest, ServerEvent, SyncProgress},
    rate_limit::UploadLimiter,
};
use photosync_core::domain::{DirectoryContact, MessagingIndex, SyncOptions};
use photosync_core::matching::match_contact;
use photosync_core::ports::{DirectoryService, MessagingService, PortError, PortResult};
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The main asynchronous task for one sync job.
///
/// The job is single-shot: a fatal error publishes a terminal
/// `sync_progress` carrying the error string; both outcomes close the
/// connection. Per-contact failures never abort the job.
pub async fn sync_process(
    limiter: Arc<UploadLimiter>,
    messaging: Arc<dyn MessagingService>,
    directory: Arc<dyn DirectoryService>,
    connection: Arc<Connection>,
    options: SyncOptions,
    session_id: Uuid,
) {
    info!(%session_id, manual = options.manual_sync, "sync job started");

    let mut progress = SyncProgress {
        progress: 0,
        sync_count: 0,
        total_contacts: None,
        image: None,
        error: None,
        is_manual_sync: Some(options.manual_sync),
    };

    match run_job(
        &limiter,
        &*messaging,
        &*directory,
        &connection,
        options,
        &mut progress,
    )
    .await
    {
        Ok(()) => {
            info!(%session_id, synced = progress.sync_count, "sync job completed");
        }
        Err(e) => {
            error!(%session_id, error = %e, "sync job failed");
            progress.progress = 100;
            progress.error = Some(e.to_string());
            let _ = connection.publish(&ServerEvent::SyncProgress(progress.clone()));
        }
    }
    connection.close();
}

async fn run_job(
    limiter: &UploadLimiter,
    messaging: &dyn MessagingService,
    directory: &dyn DirectoryService,
    connection: &Connection,
    options: SyncOptions,
    progress: &mut SyncProgress,
) -> PortResult<()> {
    // --- Loading ---
    let (contacts, index) =
        tokio::join!(directory.list_contacts(), messaging.load_contacts());
    let mut contacts = contacts?;
    let index = index?;

    // Decorrelate reported progress from directory ordering.
    contacts.shuffle(&mut rand::thread_rng());

    let total = contacts.len();
    progress.total_contacts = Some(total);
    info!(total, "loaded contact sets, starting sync");

    if total == 0 {
        progress.progress = 100;
        return publish_progress(connection, progress);
    }

    // --- Matching & Syncing ---
    for (processed, contact) in contacts.iter().enumerate() {
        sync_one_contact(
            limiter, messaging, directory, connection, options, contact, &index, progress,
        )
        .await?;

        progress.progress = ((processed + 1) * 100 / total) as u32;
        publish_progress(connection, progress)?;
    }

    Ok(())
}

/// Processes a single directory contact; increments `sync_count` on upload.
///
/// Only loss of the session's resources is fatal; everything else is a skip.
#[allow(clippy::too_many_arguments)]
async fn sync_one_contact(
    limiter: &UploadLimiter,
    messaging: &dyn MessagingService,
    directory: &dyn DirectoryService,
    connection: &Connection,
    options: SyncOptions,
    contact: &DirectoryContact,
    index: &MessagingIndex,
    progress: &mut SyncProgress,
) -> PortResult<()> {
    // Manual mode always offers the contact for review, even when a photo
    // exists and overwriting is off.
    if contact.has_photo && !options.overwrite_photos && !options.manual_sync {
        debug!(contact = %contact.id, "contact already has a photo, skipping");
        return Ok(());
    }

    let matched = match_contact(&contact.numbers, index);
    let Some(identity) = matched.identity else {
        debug!(contact = %contact.id, "no messaging identity matched");
        return Ok(());
    };

    let photo = match messaging.download_photo(&identity).await {
        Ok(Some(photo)) => photo,
        Ok(None) => {
            debug!(contact = %contact.id, "no profile photo available");
            return Ok(());
        }
        // Loss of the messaging client means the session was torn down.
        Err(PortError::Unavailable(e)) => return Err(PortError::Unavailable(e)),
        Err(e) => {
            warn!(contact = %contact.id, error = %e, "photo download failed, skipping contact");
            return Ok(());
        }
    };

    if options.manual_sync && !confirm_with_user(directory, connection, contact, &photo).await? {
        debug!(contact = %contact.id, "photo rejected by user");
        return Ok(());
    }

    limiter.acquire().await;
    match directory.update_photo(&contact.id, &photo).await {
        Ok(()) => {
            progress.sync_count += 1;
            progress.image = Some(photo);
        }
        Err(e) => {
            warn!(contact = %contact.id, error = %e, "photo upload failed, skipping contact");
        }
    }
    Ok(())
}

/// Asks the user to accept or reject one contact's new photo.
///
/// A timeout is treated identically to an explicit reject.
async fn confirm_with_user(
    directory: &dyn DirectoryService,
    connection: &Connection,
    contact: &DirectoryContact,
    photo: &str,
) -> PortResult<bool> {
    let existing_photo = match (&contact.photo_url, contact.has_photo) {
        (Some(url), true) => directory.fetch_photo(url).await.unwrap_or(None),
        _ => None,
    };

    let request = ServerEvent::SyncConfirm(ConfirmRequest {
        existing_photo,
        new_photo: photo.to_string(),
        contact_name: contact.name.clone(),
    });

    match connection
        .request_and_await(&request, ClientEventKind::SyncPhotoConfirm, REQUEST_TIMEOUT)
        .await
    {
        Ok(ClientEvent::SyncPhotoConfirm(verdict)) => Ok(verdict.accept),
        Ok(_) => Ok(false),
        Err(ChannelError::TimedOut(_)) => {
            info!(contact = %contact.id, "confirmation timed out, treating as reject");
            Ok(false)
        }
        Err(e) => Err(PortError::Unavailable(e.to_string())),
    }
}

fn publish_progress(connection: &Connection, progress: &SyncProgress) -> PortResult<()> {
    connection
        .publish(&ServerEvent::SyncProgress(progress.clone()))
        .map_err(|e| PortError::Unavailable(e.to_string()))
}

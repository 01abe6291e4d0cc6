//! Attachment endpoints.
//!
//! - GET    /tickets/:id/attachments                 - List
//! - POST   /tickets/:id/attachments                 - Upload (`multipart/form-data`)
//! - DELETE /tickets/:id/attachments/:attachment_id  - Remove
//!
//! Uploads carry a `file` part and an optional `description` part. The bytes
//! are written to the attachment store before the command runs and removed
//! again unless the ticket ended up referencing them.

use super::{authorize, organization, permissions, unexpected};
use crate::aggregate::{AttachmentUpload, Outcome, TicketCommand};
use crate::queries;
use crate::server::AppState;
use crate::storage::storage_key;
use crate::types::{Attachment, AttachmentId, TicketId};
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use supportdesk_web::{ApiPath, AppError, Principal};
use uuid::Uuid;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A parsed upload form
struct UploadForm {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
    description: Option<String>,
}

async fn read_form(mut multipart: Multipart, max_bytes: usize) -> Result<UploadForm, AppError> {
    let mut file = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::validation(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field
                    .file_name()
                    .map(ToString::to_string)
                    .filter(|name| !name.trim().is_empty())
                    .ok_or_else(|| AppError::validation("The file part needs a file name"))?;
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(format!("Could not read upload: {e}")))?;
                file = Some((file_name, content_type, bytes.to_vec()));
            },
            Some("description") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::validation(format!("Could not read description: {e}")))?;
                description = Some(text);
            },
            _ => {},
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| AppError::validation("Missing file part"))?;
    if bytes.is_empty() {
        return Err(AppError::validation("Uploaded file is empty"));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::validation(format!(
            "File too large: {} bytes (max {max_bytes})",
            bytes.len()
        )));
    }

    Ok(UploadForm {
        file_name,
        content_type,
        bytes,
        description,
    })
}

/// Delete stored bytes, logging failures; the record is already gone.
pub(crate) async fn discard(state: &AppState, key: &str) {
    if let Err(error) = state.attachments.delete(key).await {
        tracing::warn!(key, error = %error, "Failed to delete attachment bytes");
    }
}

/// List attachments of a ticket.
pub async fn list_attachments(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Vec<Attachment>>, AppError> {
    let organization_id = organization(&principal, permissions::READ)?;
    let attachments = state
        .tickets
        .read(|s| queries::list_attachments(s, organization_id, TicketId::from_uuid(id)))
        .await?;
    Ok(Json(attachments))
}

/// Upload a file to a ticket.
///
/// ```bash
/// curl -X POST http://localhost:8080/api/v1/tickets/<id>/attachments \
///   -H "Authorization: Bearer <token>" \
///   -F "file=@screenshot.png" -F "description=Error dialog"
/// ```
pub async fn upload_attachment(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Attachment>), AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let ticket_id = TicketId::from_uuid(id);

    // Fail fast before accepting any bytes
    state
        .tickets
        .read(|s| queries::get_ticket(s, actor.organization_id, ticket_id))
        .await?;

    let multipart = multipart.map_err(|e| AppError::validation(e.body_text()))?;
    let form = read_form(multipart, state.attachment_max_bytes).await?;

    let key = storage_key(ticket_id, Uuid::new_v4());
    state.attachments.put(&key, &form.bytes).await.map_err(|error| {
        AppError::internal("Failed to store attachment").with_source(error.into())
    })?;

    let upload = AttachmentUpload {
        file_name: form.file_name,
        content_type: form.content_type,
        size_bytes: form.bytes.len() as u64,
        storage_key: key.clone(),
        description: form.description,
    };

    match state
        .tickets
        .execute(actor, TicketCommand::AddAttachment { ticket_id, upload })
        .await
    {
        Ok(Outcome::Attachment(attachment)) => {
            tracing::info!(
                ticket_id = %ticket_id,
                attachment_id = %attachment.id,
                size = attachment.size_bytes,
                "Attachment uploaded"
            );
            Ok((StatusCode::CREATED, Json(attachment)))
        },
        Ok(other) => {
            discard(&state, &key).await;
            Err(unexpected(&other))
        },
        Err(error) => {
            // A late reply does not mean the command was rejected
            let recorded = state
                .tickets
                .view(|s| {
                    s.attachments_of(ticket_id)
                        .iter()
                        .any(|attachment| attachment.storage_key == key)
                })
                .await;
            if recorded {
                tracing::warn!(
                    %ticket_id,
                    key = %key,
                    "Attachment recorded without a reply, keeping its bytes"
                );
            } else {
                discard(&state, &key).await;
            }
            Err(error)
        },
    }
}

/// Remove an attachment and its bytes.
pub async fn delete_attachment(
    principal: Principal,
    State(state): State<AppState>,
    ApiPath((id, attachment_id)): ApiPath<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let actor = authorize(&principal, permissions::UPDATE)?;
    let outcome = state
        .tickets
        .execute(
            actor,
            TicketCommand::RemoveAttachment {
                ticket_id: TicketId::from_uuid(id),
                attachment_id: AttachmentId::from_uuid(attachment_id),
            },
        )
        .await?;

    match outcome {
        Outcome::AttachmentRemoved(attachment) => {
            discard(&state, &attachment.storage_key).await;
            Ok(StatusCode::NO_CONTENT)
        },
        other => Err(unexpected(&other)),
    }
}

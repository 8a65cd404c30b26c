//! Chat UI to backend request conversion
//!
//! This module converts the content blocks of a submitted UI message into
//! the content blocks the agent backend consumes, decoding inline file and
//! image attachments from their data URLs.

use crate::conversion::data_url::{self, DataUrlError};
use crate::core::constants::role;
use crate::models::backend::{BackendContentBlock, ImageUrl, InputMessage, SourceType};
use crate::models::ui::{ChatRequest, ContentBlock};
use thiserror::Error;
use tracing::debug;

/// Errors that reject a submitted message as a whole
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("Content block {position}: {source}")]
    Attachment {
        position: usize,
        #[source]
        source: DataUrlError,
    },

    #[error("Request contains no user message")]
    NoUserMessage,
}

/// Translate UI content blocks into backend content blocks
///
/// Output order matches input order. Blocks of unrecognized kinds are
/// skipped; a malformed attachment fails the whole translation.
///
/// # Errors
///
/// Returns `TranslateError::Attachment` when a file or image data URL
/// cannot be decoded.
pub fn translate(blocks: &[ContentBlock]) -> Result<Vec<BackendContentBlock>, TranslateError> {
    let mut translated = Vec::with_capacity(blocks.len());

    for (position, block) in blocks.iter().enumerate() {
        let attachment_error = |source| TranslateError::Attachment { position, source };

        match block {
            ContentBlock::Text { text } => {
                translated.push(BackendContentBlock::Text { text: text.clone() });
            }
            ContentBlock::File { data } => {
                let decoded = data_url::decode(data).map_err(attachment_error)?;
                translated.push(BackendContentBlock::File {
                    source_type: SourceType::Base64,
                    filename: decoded.filename,
                    mime_type: decoded.mimetype,
                    data: decoded.payload,
                });
            }
            ContentBlock::Image { image } => {
                // Images only need an embeddable URL; the filename is dropped.
                let decoded = data_url::decode(image).map_err(attachment_error)?;
                translated.push(BackendContentBlock::ImageUrl {
                    image_url: ImageUrl {
                        url: decoded.to_embeddable_url(),
                    },
                });
            }
            ContentBlock::Unknown => {
                debug!("Skipping content block {} of unrecognized type", position);
            }
        }
    }

    Ok(translated)
}

/// Build the backend input for a chat submission
///
/// Only the latest user message is forwarded; earlier turns live in the
/// backend's session for the conversation.
///
/// # Errors
///
/// Returns `TranslateError::NoUserMessage` if the request has no user
/// message, or any error from `translate`.
pub fn convert_chat_request(request: &ChatRequest) -> Result<Vec<InputMessage>, TranslateError> {
    let message = request
        .messages
        .iter()
        .rev()
        .find(|message| message.role == role::USER)
        .ok_or(TranslateError::NoUserMessage)?;

    let content = translate(&message.content)?;
    debug!(
        "Converted user message: {} of {} block(s) forwarded",
        content.len(),
        message.content.len()
    );

    Ok(vec![InputMessage::user(content)])
}

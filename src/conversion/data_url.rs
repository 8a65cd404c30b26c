//! Data URL decoding for UI attachments
//!
//! The UI embeds files and images as
//! `data:<mimetype>;base64,<payload>,filename:<percent-encoded-name>`.
//! Only the structure is split here; the base64 payload is forwarded as-is.

use thiserror::Error;

const SCHEME_PREFIX: &str = "data:";
const FILENAME_PREFIX: &str = "filename:";

/// Errors raised while splitting a data URL
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataUrlError {
    #[error("Invalid data URL format: {0}")]
    MalformedInput(&'static str),

    #[error("Invalid header format: {0}")]
    MalformedHeader(String),
}

/// Structural parts of a decoded data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrlPayload {
    pub mimetype: String,
    /// Base64 text exactly as it appeared in the URL
    pub payload: String,
    pub filename: Option<String>,
}

impl DataUrlPayload {
    /// Rebuild a plain `data:<mimetype>;base64,<payload>` URL (no filename)
    pub fn to_embeddable_url(&self) -> String {
        format!("data:{};base64,{}", self.mimetype, self.payload)
    }
}

/// Decode a data URL into its mimetype, payload and optional filename
///
/// # Errors
///
/// - `MalformedInput` if the string does not start with `data:` or has no `,`
/// - `MalformedHeader` if the header lacks the `:` / `;` delimiters
pub fn decode(input: &str) -> Result<DataUrlPayload, DataUrlError> {
    if !input.starts_with(SCHEME_PREFIX) {
        return Err(DataUrlError::MalformedInput("not a data URL"));
    }

    let parts: Vec<&str> = input.split(',').collect();
    if parts.len() < 2 {
        return Err(DataUrlError::MalformedInput("missing payload segment"));
    }

    let header = parts[0];
    let mimetype = match header.split_once(':') {
        Some((_, rest)) => match rest.split_once(';') {
            Some((mimetype, _)) => mimetype.to_string(),
            None => return Err(DataUrlError::MalformedHeader(header.to_string())),
        },
        None => return Err(DataUrlError::MalformedHeader(header.to_string())),
    };

    // Anything other than a `filename:` third segment is ignored.
    let filename = parts
        .get(2)
        .and_then(|segment| segment.strip_prefix(FILENAME_PREFIX))
        .map(percent_decode);

    Ok(DataUrlPayload {
        mimetype,
        payload: parts[1].to_string(),
        filename,
    })
}

/// Percent-decode a filename, falling back to a lossy UTF-8 decode
fn percent_decode(encoded: &str) -> String {
    match urlencoding::decode(encoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(encoded.as_bytes()))
            .into_owned(),
    }
}

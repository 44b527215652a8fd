//! Display-only rendering of binary payloads.
//!
//! Binary frames cross the transport boundary as base64 text. Observers get a
//! printable listing of the decoded bytes instead, e.g. `ArrayBuffer {0,1,2}`.
//! The rendering is one-way and is never parsed back.

use base64::Engine as _;
use thiserror::Error;

/// Rendering used when a binary payload is absent.
pub const NO_VALUE: &str = "(no value)";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("binary payload is not valid base64: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// Render raw bytes as `ArrayBuffer {b0,b1,...}`.
pub fn render_bytes(bytes: Option<&[u8]>) -> String {
    let Some(bytes) = bytes else {
        return NO_VALUE.to_string();
    };

    let listing: Vec<String> = bytes.iter().map(|b| b.to_string()).collect();
    format!("ArrayBuffer {{{}}}", listing.join(","))
}

/// Decode a base64 payload and render its bytes.
pub fn render_binary(encoded: Option<&str>) -> Result<String, RenderError> {
    match encoded {
        None => Ok(NO_VALUE.to_string()),
        Some(encoded) => {
            let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;
            Ok(render_bytes(Some(&bytes)))
        }
    }
}

/// Like [`render_binary`], but a malformed payload is logged and rendered as
/// [`NO_VALUE`].
pub fn render_binary_lossy(encoded: Option<&str>) -> String {
    render_binary(encoded).unwrap_or_else(|err| {
        tracing::warn!(%err, "could not render binary payload");
        NO_VALUE.to_string()
    })
}

use base64::Engine as _;

use super::types::{EncodedImage, ImageBlob};
use super::GatewayError;

/// Encode an image for transport as standard base64.
///
/// Reads the blob once. The original bytes are carried exactly, and the MIME
/// type and filename are copied over for downstream display.
pub fn encode(blob: &ImageBlob) -> Result<EncodedImage, GatewayError> {
    let bytes = blob.read().map_err(|e| GatewayError::Encoding {
        filename: blob.filename.clone(),
        reason: e.to_string(),
    })?;

    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);

    tracing::debug!(
        filename = %blob.filename,
        mime_type = %blob.mime_type,
        bytes = bytes.len(),
        encoded_len = data.len(),
        "Image encoded"
    );

    Ok(EncodedImage {
        data,
        mime_type: blob.mime_type.clone(),
        filename: blob.filename.clone(),
    })
}

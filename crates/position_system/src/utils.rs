//! # Utility Functions
//!
//! Small helpers shared by the library and the server binary.
//!
//! - [`encode_data_uri()`] - Embeds image bytes as a `data:` URI
//! - [`mime_for_path()`] - Guesses an image MIME type from a file extension
//! - [`create_position_store()`] - Store factory

use crate::store::PositionStore;
use base64::{engine::general_purpose, Engine as _};
use std::path::Path;
use std::sync::Arc;

// ============================================================================
// Utility Functions
// ============================================================================

/// Encodes `bytes` as a `data:<mime>;base64,...` URI.
pub fn encode_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, general_purpose::STANDARD.encode(bytes))
}

/// Returns `true` if `value` is already an inline `data:` URI.
pub fn is_data_uri(value: &str) -> bool {
    value.starts_with("data:")
}

/// Image MIME type for a background image path, judged by its extension.
///
/// # Returns
///
/// `Some("image/...")` for the supported image extensions and `None` for
/// anything else, so that non-image files are never embedded.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let mime = match extension.as_deref()? {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => return None,
    };
    Some(mime)
}

/// Creates a new, unconfigured position store ready to be shared.
pub fn create_position_store() -> Arc<PositionStore> {
    Arc::new(PositionStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_data_uri() {
        assert_eq!(encode_data_uri(b"hi", "image/png"), "data:image/png;base64,aGk=");
        assert!(is_data_uri(&encode_data_uri(&[], "image/gif")));
        assert!(!is_data_uri("public/map.png"));
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("map.PNG")), Some("image/png"));
        assert_eq!(mime_for_path(Path::new("a/b/floor.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_for_path(Path::new("plan.svg")), Some("image/svg+xml"));
        assert_eq!(mime_for_path(Path::new("notes.txt")), None);
        assert_eq!(mime_for_path(Path::new("README")), None);
    }

    #[test]
    fn test_created_store_is_unconfigured() {
        let store = create_position_store();
        assert!(!store.is_configured());
        assert_eq!(store.client_count(), 0);
    }
}

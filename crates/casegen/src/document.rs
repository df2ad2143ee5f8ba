use std::path::Path;

use crate::errors::ExtractError;

/// Turns an uploaded document into plain text for the pipeline.
pub trait DocumentExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractError>;
}

/// Extractor for UTF-8 text and Markdown files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    const EXTENSIONS: [&'static str; 3] = ["txt", "md", "markdown"];

    pub fn supports(filename: &str) -> bool {
        Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                Self::EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}

impl DocumentExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
        if !Self::supports(filename) {
            return Err(ExtractError::UnsupportedFormat(filename.to_string()));
        }
        let text = std::str::from_utf8(bytes).map_err(|_| ExtractError::InvalidEncoding {
            filename: filename.to_string(),
        })?;
        // Strip a UTF-8 byte-order mark left by some editors.
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }
}

use std::path::Path;

use mime_guess::mime::{self, Mime};

use super::ClientError;

/// Where the user picked the file from. Both paths go through the same filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Picker,
    DragDrop,
}

#[derive(Debug, Clone)]
pub struct VideoFile {
    file_name: String,
    mime: String,
    bytes: Vec<u8>,
}

/// A well-formed `video/<subtype>` media type, parameters allowed.
pub fn accepts_media_type(media_type: &str) -> bool {
    match media_type.parse::<Mime>() {
        Ok(parsed) => parsed.type_() == mime::VIDEO && !parsed.subtype().as_str().is_empty(),
        Err(_) => false,
    }
}

impl VideoFile {
    pub fn new(
        source: SelectionSource,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, ClientError> {
        let file_name = file_name.into();
        let mime = mime.into();

        if !accepts_media_type(&mime) {
            tracing::debug!(?source, file = %file_name, mime = %mime, "rejected non-video selection");
            return Err(ClientError::NotAVideo { file_name, mime });
        }

        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }

    /// Reads a file from disk, guessing its type from the extension.
    pub fn from_selection(source: SelectionSource, path: &Path) -> Result<Self, ClientError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        // Checked before reading so a rejected selection never touches the disk.
        if !accepts_media_type(mime.essence_str()) {
            return Self::new(source, file_name, mime.essence_str(), Vec::new());
        }

        let bytes = std::fs::read(path)?;
        Self::new(source, file_name, mime.essence_str(), bytes)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Test-only escape hatch for building a value that bypasses the filter.
    #[cfg(test)]
    pub(crate) fn unchecked(file_name: &str, mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            mime: mime.to_string(),
            bytes,
        }
    }
}

//! Uploaded files staged on disk for the duration of one read

use super::IngestError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// An uploaded file written to a transient location
///
/// The file is removed when the value is dropped, so every exit path of the
/// operation that owns it cleans up. [`ScopedUpload::read_once`] consumes the
/// value, so the bytes can be read a single time.
#[derive(Debug)]
pub struct ScopedUpload {
    file: NamedTempFile,
    file_name: String,
}

impl ScopedUpload {
    pub fn stage(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<Self, IngestError> {
        std::fs::create_dir_all(dir)?;
        let suffix = super::extension_suffix(file_name);
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(suffix)
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        tracing::debug!(
            file_name = %file_name,
            path = %file.path().display(),
            bytes = bytes.len(),
            "Staged upload"
        );

        Ok(Self {
            file,
            file_name: file_name.to_string(),
        })
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the staged bytes and delete the file
    pub fn read_once(self) -> Result<(String, Vec<u8>), IngestError> {
        let bytes = std::fs::read(self.file.path())?;
        self.file.close()?;
        Ok((self.file_name, bytes))
    }
}

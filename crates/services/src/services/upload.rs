use std::path::{Path, PathBuf};

use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::services::config::AppConfig;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file type for '{0}'")]
    InvalidExtension(String),

    #[error("File '{name}' is too large: {size} bytes (max: {max} bytes)")]
    TooLarge { name: String, size: u64, max: u64 },

    #[error("File '{0}' is not valid UTF-8 text")]
    NotUtf8(String),
}

/// A file field as received from the upload form.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    /// Browsers submit an empty, nameless part when no file was picked.
    pub fn is_unselected(&self) -> bool {
        self.file_name.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct UploadService {
    upload_dir: PathBuf,
    allowed_extensions: Vec<String>,
    max_size_bytes: u64,
    keep_uploads: bool,
}

impl UploadService {
    pub fn new(config: &AppConfig) -> Result<Self, UploadError> {
        std::fs::create_dir_all(&config.upload_dir)?;
        Ok(Self {
            upload_dir: config.upload_dir.clone(),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            max_size_bytes: config.max_upload_bytes as u64,
            keep_uploads: config.keep_uploads,
        })
    }

    /// The name needs a `.` and its last extension, lower-cased, must be allowed.
    pub fn is_allowed(&self, file_name: &str) -> bool {
        file_name.rsplit_once('.').is_some_and(|(_, ext)| {
            let ext = ext.to_lowercase();
            self.allowed_extensions.iter().any(|allowed| *allowed == ext)
        })
    }

    /// Human readable list of allowed extensions, e.g. `.txt`.
    pub fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(|ext| format!(".{ext}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Opens a scratch directory owned by a single request.
    pub async fn begin_batch(&self) -> Result<UploadBatch, UploadError> {
        let dir = self.upload_dir.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        tracing::debug!("Created upload batch directory {}", dir.display());
        Ok(UploadBatch {
            dir,
            service: self.clone(),
            stored: 0,
        })
    }
}

pub struct UploadBatch {
    dir: PathBuf,
    service: UploadService,
    stored: usize,
}

impl UploadBatch {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes the upload into the batch directory and reads it back as text.
    pub async fn store_text(&mut self, file: &UploadedFile) -> Result<String, UploadError> {
        if !self.service.is_allowed(&file.file_name) {
            return Err(UploadError::InvalidExtension(file.file_name.clone()));
        }

        let size = file.data.len() as u64;
        if size > self.service.max_size_bytes {
            return Err(UploadError::TooLarge {
                name: file.file_name.clone(),
                size,
                max: self.service.max_size_bytes,
            });
        }

        let mut name = utils::text::secure_filename(&file.file_name);
        if name.is_empty() {
            name = "upload.txt".to_string();
        }
        // index prefix keeps same-named uploads apart
        let path = self.dir.join(format!("{:03}-{}", self.stored, name));
        self.stored += 1;

        tokio::fs::write(&path, &file.data).await?;
        let raw = tokio::fs::read(&path).await?;
        String::from_utf8(raw).map_err(|_| UploadError::NotUtf8(file.file_name.clone()))
    }

    pub async fn cleanup(self) {
        if self.service.keep_uploads {
            tracing::debug!("Keeping uploads in {}", self.dir.display());
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            tracing::warn!(
                "Failed to remove upload batch {}: {}",
                self.dir.display(),
                e
            );
        }
    }
}

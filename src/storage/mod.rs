//! On-disk media: uploaded images and synthesized narration.
//!
//! Files live under the uploads directory and are referred to by a relative
//! path with the `uploads/` prefix, which is also the URL they are served at.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

/// URL and path prefix under which media is served.
pub const PUBLIC_PREFIX: &str = "uploads";

const AUDIO_DIR: &str = "audio";

/// An image received from a client, not yet written anywhere.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl ImageUpload {
    /// MIME type for the data URL sent to the vision model. Falls back to the
    /// file extension, then to JPEG.
    pub fn mime(&self) -> String {
        self.content_type
            .as_deref()
            .filter(|ct| ct.starts_with("image/"))
            .map(str::to_string)
            .or_else(|| {
                mime_guess::from_path(&self.file_name)
                    .first()
                    .filter(|m| m.type_() == mime_guess::mime::IMAGE)
                    .map(|m| m.essence_str().to_string())
            })
            .unwrap_or_else(|| "image/jpeg".to_string())
    }

    /// Lower-cased alphanumeric extension of the original file name.
    fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .filter(|ext| !ext.is_empty() && ext.len() <= 8)
            .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
    }
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the uploads and audio directories.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.root.join(AUDIO_DIR)).await
    }

    /// Write an uploaded image and return its public relative path.
    pub async fn save_image(&self, upload: &ImageUpload) -> io::Result<String> {
        let file_name = match upload.extension() {
            Some(ext) => format!("images-{}.{}", uuid::Uuid::now_v7().simple(), ext),
            None => format!("images-{}", uuid::Uuid::now_v7().simple()),
        };
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.root.join(&file_name), &upload.bytes).await?;
        Ok(format!("{}/{}", PUBLIC_PREFIX, file_name))
    }

    /// Write narration audio for a story and return its public relative path.
    /// Every call yields a fresh path so clients never see a cached old file.
    pub async fn save_audio(&self, story_id: &str, audio: &[u8]) -> io::Result<String> {
        let file_name = format!("{}-{}.mp3", story_id, uuid::Uuid::now_v7().simple());
        let dir = self.root.join(AUDIO_DIR);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(dir.join(&file_name), audio).await?;
        Ok(format!("{}/{}/{}", PUBLIC_PREFIX, AUDIO_DIR, file_name))
    }

    /// Map a public relative path back to a file under the root. Returns
    /// `None` for paths outside the uploads prefix or containing `..`.
    pub fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let rest = public_path
            .strip_prefix(PUBLIC_PREFIX)?
            .strip_prefix('/')?;
        let relative = Path::new(rest);
        let safe = relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)));
        if rest.is_empty() || !safe {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Best-effort removal, used to roll back files of a failed creation.
    pub async fn remove(&self, public_path: &str) {
        if let Some(path) = self.resolve(public_path) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove media file");
            }
        }
    }
}

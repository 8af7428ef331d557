//! Persistence of finished generation images.
//!
//! [`ArtifactStorage`] is the seam the orchestrator writes through;
//! [`LocalImageStorage`] keeps one PNG per generation in a directory and
//! hands back the URL path the API serves it under.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::GenerationId;

/// URL prefix under which stored images are served.
pub const IMAGE_URL_PREFIX: &str = "/api/images";

/// Stores image bytes for a generation and returns a resolvable location.
#[async_trait]
pub trait ArtifactStorage: Send + Sync {
    async fn store(&self, id: &GenerationId, bytes: &[u8]) -> Result<String, CoreError>;
}

/// Writes images to `<output_dir>/<generation id>.png`.
#[derive(Debug, Clone)]
pub struct LocalImageStorage {
    output_dir: PathBuf,
}

impl LocalImageStorage {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// On-disk path of the image for `id` (which may not exist yet).
    pub fn image_path(&self, id: &GenerationId) -> PathBuf {
        self.output_dir.join(format!("{id}.png"))
    }

    /// URL path clients use to fetch the image for `id`.
    pub fn image_url(id: &GenerationId) -> String {
        format!("{IMAGE_URL_PREFIX}/{id}")
    }

    /// Read a stored image back, or `None` if it was never written.
    pub async fn load(&self, id: &GenerationId) -> Result<Option<Vec<u8>>, CoreError> {
        match tokio::fs::read(self.image_path(id)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CoreError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl ArtifactStorage for LocalImageStorage {
    async fn store(&self, id: &GenerationId, bytes: &[u8]) -> Result<String, CoreError> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| {
                CoreError::Storage(format!(
                    "cannot create {}: {e}",
                    self.output_dir.display()
                ))
            })?;

        let path = self.image_path(id);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| CoreError::Storage(format!("cannot write {}: {e}", path.display())))?;

        tracing::info!(generation_id = %id, path = %path.display(), "Image saved");
        Ok(Self::image_url(id))
    }
}

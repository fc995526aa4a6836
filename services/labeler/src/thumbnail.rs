//! Thumbnail generation.
//!
//! Each invocation downloads the original into its own scoped temporary
//! directory, renders a square cover-cropped thumbnail next to it, uploads the
//! result and then removes the directory, whether or not any step failed.

use crate::error::{Error, Result};
use crate::object_store::{get_content_type, ObjectStore};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

const SOURCE_FILE: &str = "source";
const THUMBNAIL_FILE: &str = "thumbnail";

/// Renders and uploads thumbnails for uploaded images
pub struct ThumbnailGenerator {
    object_store: Arc<dyn ObjectStore>,
    thumbnail_bucket: String,
    size: u32,
    quality: u8,
    temp_root: Option<PathBuf>,
}

impl ThumbnailGenerator {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        thumbnail_bucket: impl Into<String>,
        size: u32,
        quality: u8,
    ) -> Self {
        Self {
            object_store,
            thumbnail_bucket: thumbnail_bucket.into(),
            size,
            quality,
            temp_root: None,
        }
    }

    /// Place scoped work directories under `root` instead of the system temp dir
    pub fn with_temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.temp_root = Some(root.into());
        self
    }

    /// Generate the thumbnail for `key` and store it under the same key.
    #[instrument(skip(self), fields(thumbnail_bucket = %self.thumbnail_bucket))]
    pub async fn generate(&self, source_bucket: &str, key: &str) -> Result<()> {
        let data = self
            .object_store
            .get(source_bucket, key)
            .await?
            .filter(|data| !data.is_empty())
            .ok_or_else(|| Error::Fetch {
                bucket: source_bucket.to_string(),
                key: key.to_string(),
                message: "object is missing or has an empty body".to_string(),
            })?;

        let workspace = self.create_workspace()?;
        let result = self.render_and_upload(workspace.path(), key, data).await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(
                error = %e,
                path = %workspace_path.display(),
                "Failed to remove thumbnail workspace"
            );
        }

        result
    }

    fn create_workspace(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("labeler-thumb-");

        let workspace = match self.temp_root {
            Some(ref root) => builder.tempdir_in(root)?,
            None => builder.tempdir()?,
        };

        debug!(path = %workspace.path().display(), "Created thumbnail workspace");
        Ok(workspace)
    }

    async fn render_and_upload(&self, workspace: &Path, key: &str, data: Vec<u8>) -> Result<()> {
        let source_path = workspace.join(SOURCE_FILE);
        let target_path = workspace.join(THUMBNAIL_FILE);

        tokio::fs::write(&source_path, &data).await?;
        debug!(path = %source_path.display(), size_bytes = data.len(), "Original written");
        drop(data);

        let (size, quality) = (self.size, self.quality);
        let render_target = target_path.clone();
        let format = tokio::task::spawn_blocking(move || {
            render_thumbnail(&source_path, &render_target, size, quality)
        })
        .await
        .map_err(|e| Error::Image {
            key: key.to_string(),
            message: format!("render task failed: {e}"),
        })?
        .map_err(|e| Error::Image {
            key: key.to_string(),
            message: e.to_string(),
        })?;

        let thumbnail = tokio::fs::read(&target_path).await?;
        let size_bytes = thumbnail.len();
        let content_type = get_content_type(format.extensions_str().first().unwrap_or(&""));

        self.object_store
            .put(&self.thumbnail_bucket, key, thumbnail, content_type)
            .await?;

        metrics::counter!("labeler.thumbnails.generated").increment(1);

        info!(
            key = %key,
            size_bytes = size_bytes,
            content_type = content_type,
            "Thumbnail uploaded"
        );

        Ok(())
    }
}

/// Decode `source`, cover-resize it to `size`x`size` and encode it to `target`
/// in the source's own format. JPEG output uses `quality`.
fn render_thumbnail(
    source: &Path,
    target: &Path,
    size: u32,
    quality: u8,
) -> image::ImageResult<ImageFormat> {
    let reader = ImageReader::open(source)?.with_guessed_format()?;
    let format = reader.format().unwrap_or(ImageFormat::Jpeg);
    let thumbnail = reader.decode()?.resize_to_fill(size, size, FilterType::Lanczos3);

    let mut writer = BufWriter::new(File::create(target)?);
    match format {
        ImageFormat::Jpeg => {
            // JPEG has no alpha channel
            let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
            DynamicImage::ImageRgb8(thumbnail.to_rgb8()).write_with_encoder(encoder)?;
        }
        other => thumbnail.write_to(&mut writer, other)?,
    }
    writer.flush()?;

    Ok(format)
}

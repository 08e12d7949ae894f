//! Stored image uploads
//!
//! Uploads land here once and every platform adapter dereferences the
//! returned UUID to get bytes for its own re-upload. Oversized images are
//! resized and recompressed on the way in so no adapter has to care about
//! per-platform byte limits.

use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

use crate::config::FilesConfig;
use crate::db::Database;
use crate::error::{CrosscastError, PlatformError, Result};
use crate::types::{ImageMimeType, Upload};

/// JPEG quality steps tried before falling back to shrinking.
const JPEG_QUALITY_STEPS: [u8; 4] = [80, 70, 60, 50];

/// Bounded number of shrink-by-20% rounds.
const MAX_SHRINK_ROUNDS: u32 = 4;

#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
    public_url: String,
    max_upload_bytes: u64,
    max_dimension: u32,
    db: Database,
}

impl FileStore {
    pub fn new(config: &FilesConfig, public_url: &str, db: Database) -> Result<Self> {
        let dir = PathBuf::from(shellexpand::tilde(&config.dir).to_string());
        std::fs::create_dir_all(&dir).map_err(crate::error::DbError::IoError)?;

        Ok(Self {
            dir,
            public_url: public_url.trim_end_matches('/').to_string(),
            max_upload_bytes: config.max_upload_bytes,
            max_dimension: config.max_dimension,
            db,
        })
    }

    /// Validate, optimize, and persist an uploaded image.
    ///
    /// The declared MIME type is cross-checked against magic bytes; the
    /// sniffed type wins. Returns the stored metadata with a fresh UUID.
    pub async fn save(
        &self,
        bytes: Vec<u8>,
        declared_mime: Option<&str>,
        alt_text: Option<String>,
    ) -> Result<Upload> {
        let sniffed = ImageMimeType::from_magic(&bytes);
        let mime = match (sniffed, declared_mime.and_then(ImageMimeType::from_mime_str)) {
            (Some(sniffed), _) => sniffed,
            (None, Some(declared)) => declared,
            (None, None) => {
                return Err(PlatformError::Validation(
                    "Unsupported upload: expected a JPEG, PNG, GIF, or WebP image".to_string(),
                )
                .into())
            }
        };

        let (stored, mime, width, height) = self.optimize(bytes, mime)?;

        let mut hasher = Sha256::new();
        hasher.update(&stored);
        let content_hash = hex::encode(hasher.finalize());

        let upload = Upload {
            id: uuid::Uuid::new_v4().to_string(),
            content_hash,
            mime_type: mime,
            width,
            height,
            alt_text,
            byte_size: stored.len() as u64,
            created_at: chrono::Utc::now().timestamp(),
        };

        std::fs::write(self.file_path(&upload.id), &stored)
            .map_err(crate::error::DbError::IoError)?;
        self.db.create_upload(&upload).await?;

        debug!(
            "Stored upload {} ({}, {}x{}, {} bytes)",
            upload.id, upload.mime_type, width, height, upload.byte_size
        );

        Ok(upload)
    }

    /// Load a stored upload and its bytes by UUID.
    pub async fn load(&self, upload_id: &str) -> Result<(Upload, Vec<u8>)> {
        let upload = self.get(upload_id).await?;
        let bytes =
            std::fs::read(self.file_path(upload_id)).map_err(crate::error::DbError::IoError)?;
        Ok((upload, bytes))
    }

    /// Metadata only.
    pub async fn get(&self, upload_id: &str) -> Result<Upload> {
        self.db
            .get_upload(upload_id)
            .await?
            .ok_or_else(|| CrosscastError::InvalidInput(format!("Unknown upload: {}", upload_id)))
    }

    /// On-disk path of an upload's bytes.
    pub fn file_path(&self, upload_id: &str) -> PathBuf {
        self.dir.join(upload_id)
    }

    /// Externally reachable URL, used by platforms that fetch media
    /// themselves (Threads) and for RSS enclosures.
    pub fn public_url(&self, upload_id: &str) -> String {
        format!("{}/api/files/{}", self.public_url, upload_id)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resize past `max_dimension` and recompress past `max_upload_bytes`,
    /// both with bounded iteration. GIFs pass through untouched so
    /// animations survive.
    fn optimize(
        &self,
        bytes: Vec<u8>,
        mime: ImageMimeType,
    ) -> Result<(Vec<u8>, ImageMimeType, u32, u32)> {
        let img = image::load_from_memory(&bytes).map_err(|e| {
            PlatformError::Validation(format!("Could not decode uploaded image: {}", e))
        })?;
        let (width, height) = img.dimensions();

        if mime == ImageMimeType::Gif {
            return Ok((bytes, mime, width, height));
        }

        let mut img = if width > self.max_dimension || height > self.max_dimension {
            img.resize(
                self.max_dimension,
                self.max_dimension,
                image::imageops::FilterType::Lanczos3,
            )
        } else if bytes.len() as u64 <= self.max_upload_bytes {
            // Within bounds both ways; keep the original bytes untouched.
            return Ok((bytes, mime, width, height));
        } else {
            img
        };

        let mut encoded = encode_image(&img, mime, JPEG_QUALITY_STEPS[0])?;

        if encoded.len() as u64 > self.max_upload_bytes && mime == ImageMimeType::Jpeg {
            for quality in &JPEG_QUALITY_STEPS[1..] {
                encoded = encode_image(&img, mime, *quality)?;
                if encoded.len() as u64 <= self.max_upload_bytes {
                    break;
                }
            }
        }

        let mut rounds = 0;
        while encoded.len() as u64 > self.max_upload_bytes && rounds < MAX_SHRINK_ROUNDS {
            let (w, h) = img.dimensions();
            img = img.resize(
                (w * 4 / 5).max(1),
                (h * 4 / 5).max(1),
                image::imageops::FilterType::Lanczos3,
            );
            encoded = encode_image(&img, mime, *JPEG_QUALITY_STEPS.last().unwrap())?;
            rounds += 1;
        }

        let (width, height) = img.dimensions();
        Ok((encoded, mime, width, height))
    }
}

fn encode_image(img: &DynamicImage, mime: ImageMimeType, jpeg_quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match mime {
        ImageMimeType::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, jpeg_quality);
            rgb.write_with_encoder(encoder)
                .map_err(|e| PlatformError::Internal(format!("JPEG encode failed: {}", e)))?;
        }
        ImageMimeType::Png => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .map_err(|e| PlatformError::Internal(format!("PNG encode failed: {}", e)))?;
        }
        ImageMimeType::WebP => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::WebP)
                .map_err(|e| PlatformError::Internal(format!("WebP encode failed: {}", e)))?;
        }
        ImageMimeType::Gif => {
            img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Gif)
                .map_err(|e| PlatformError::Internal(format!("GIF encode failed: {}", e)))?;
        }
    }
    Ok(buf)
}

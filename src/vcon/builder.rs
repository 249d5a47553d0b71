//! Build a vCon from one fax image file plus its parsed parties.

use std::io::Cursor;
use std::path::Path;

use base64::Engine;
use chrono::{DateTime, Utc};
use image::{ImageFormat, ImageReader};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{FaxError, Result};
use crate::ingest::filename::FaxIdentity;
use crate::vcon::{Attachment, Vcon, FAX_IMAGE_ATTACHMENT};

/// Value of the `source` tag on every vCon this adapter emits
pub const SOURCE_TAG: &str = "fax_adapter";

/// Turns image files into vCons.
///
/// A build fails only when the file cannot be read or is not one of the
/// supported image formats. Dimensions and timestamps are best-effort: a tag
/// that cannot be determined is left out.
#[derive(Debug, Clone, Default)]
pub struct RecordBuilder;

fn is_supported(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Jpeg
            | ImageFormat::Png
            | ImageFormat::Gif
            | ImageFormat::Tiff
            | ImageFormat::Bmp
            | ImageFormat::WebP
    )
}

impl RecordBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, path: &Path, identity: &FaxIdentity) -> Result<Vcon> {
        let bytes = std::fs::read(path)
            .map_err(|e| FaxError::Build(format!("cannot read {}: {}", path.display(), e)))?;

        if bytes.is_empty() {
            return Err(FaxError::Build(format!("{} is empty", path.display())));
        }

        let format = image::guess_format(&bytes).map_err(|e| {
            FaxError::Build(format!("{} is not a recognised image: {}", path.display(), e))
        })?;
        if !is_supported(format) {
            return Err(FaxError::Build(format!(
                "{} has unsupported image format {:?}",
                path.display(),
                format
            )));
        }

        let reader = ImageReader::with_format(Cursor::new(&bytes), format);
        let dimensions = match reader.into_dimensions() {
            Ok((w, h)) => Some(format!("{}x{}", w, h)),
            Err(e) => {
                log::debug!("Could not read image dimensions of {}: {}", path.display(), e);
                None
            }
        };

        let created_at = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut vcon = Vcon::new(created_at);
        vcon.add_party(identity.sender.as_str());
        vcon.add_party(identity.receiver.as_str());

        vcon.add_attachment(Attachment {
            kind: FAX_IMAGE_ATTACHMENT.to_string(),
            body: Value::String(base64::engine::general_purpose::STANDARD.encode(&bytes)),
            encoding: "base64".to_string(),
            filename: Some(filename.clone()),
            mimetype: Some(format.to_mime_type().to_string()),
        });

        vcon.add_tag("source", SOURCE_TAG);
        vcon.add_tag("original_filename", &filename);
        vcon.add_tag("file_size", bytes.len().to_string());
        if let Some(dimensions) = dimensions {
            vcon.add_tag("image_dimensions", dimensions);
        }
        if let Some(ext) = format.extensions_str().first() {
            vcon.add_tag("image_format", ext);
        }
        vcon.add_tag("file_sha256", format!("{:x}", Sha256::digest(&bytes)));
        vcon.add_tag("sender", &identity.sender);
        vcon.add_tag("receiver", &identity.receiver);

        log::info!(
            "Created vCon {} from {} (sender: {}, receiver: {})",
            vcon.uuid,
            path.display(),
            identity.sender,
            identity.receiver
        );

        Ok(vcon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn identity() -> FaxIdentity {
        FaxIdentity {
            sender: "15085551212".to_string(),
            receiver: "15085551313".to_string(),
            format: "png".to_string(),
        }
    }

    fn write_image(dir: &Path, name: &str, w: u32, h: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(w, h).save(&path).unwrap();
        path
    }

    #[test]
    fn test_build_png() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_image(temp_dir.path(), "15085551212_15085551313.png", 4, 3);
        let bytes = fs::read(&path).unwrap();

        let vcon = RecordBuilder::new().build(&path, &identity()).unwrap();

        assert_eq!(vcon.parties.len(), 2);
        assert_eq!(vcon.parties[0].tel, "15085551212");
        assert_eq!(vcon.parties[1].tel, "15085551313");

        let image = vcon.image_attachment().expect("fax image attachment");
        assert_eq!(image.encoding, "base64");
        assert_eq!(image.mimetype.as_deref(), Some("image/png"));
        assert_eq!(image.filename.as_deref(), Some("15085551212_15085551313.png"));
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(image.body.as_str().unwrap())
            .unwrap();
        assert_eq!(decoded, bytes);

        assert_eq!(vcon.tag("source"), Some(SOURCE_TAG));
        assert_eq!(vcon.tag("image_dimensions"), Some("4x3"));
        assert_eq!(vcon.tag("image_format"), Some("png"));
        assert_eq!(vcon.tag("file_size"), Some(bytes.len().to_string().as_str()));
        assert_eq!(vcon.tag("sender"), Some("15085551212"));
        assert_eq!(vcon.tag("receiver"), Some("15085551313"));
        assert_eq!(vcon.tag("file_sha256").map(str::len), Some(64));
    }

    #[test]
    fn test_build_jpeg_mime_from_content() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_image(temp_dir.path(), "1_2.jpg", 8, 8);
        let vcon = RecordBuilder::new().build(&path, &identity()).unwrap();
        assert_eq!(
            vcon.image_attachment().unwrap().mimetype.as_deref(),
            Some("image/jpeg")
        );
    }

    #[test]
    fn test_created_at_uses_file_mtime() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_image(temp_dir.path(), "1_2.png", 1, 1);
        let mtime: DateTime<Utc> = fs::metadata(&path).unwrap().modified().unwrap().into();
        let vcon = RecordBuilder::new().build(&path, &identity()).unwrap();
        assert_eq!(vcon.created_at, mtime);
    }

    #[test]
    fn test_each_build_gets_fresh_uuid() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_image(temp_dir.path(), "1_2.png", 1, 1);
        let builder = RecordBuilder::new();
        let a = builder.build(&path, &identity()).unwrap();
        let b = builder.build(&path, &identity()).unwrap();
        assert_ne!(a.uuid, b.uuid);
    }

    #[test]
    fn test_truncated_image_omits_dimensions() {
        let temp_dir = TempDir::new().unwrap();
        let full = write_image(temp_dir.path(), "full.png", 4, 3);
        let bytes = fs::read(&full).unwrap();
        // PNG signature only: format is detectable, header is not
        let path = temp_dir.path().join("1_2.png");
        fs::write(&path, &bytes[..8]).unwrap();

        let vcon = RecordBuilder::new().build(&path, &identity()).unwrap();
        assert_eq!(vcon.tag("image_dimensions"), None);
        assert_eq!(vcon.tag("image_format"), Some("png"));
    }

    #[test]
    fn test_missing_file_is_build_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = RecordBuilder::new()
            .build(&temp_dir.path().join("1_2.png"), &identity())
            .unwrap_err();
        assert!(matches!(err, FaxError::Build(_)));
    }

    #[test]
    fn test_non_image_is_build_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1_2.jpg");
        fs::write(&path, "definitely not an image").unwrap();
        let err = RecordBuilder::new().build(&path, &identity()).unwrap_err();
        assert!(matches!(err, FaxError::Build(_)));
    }

    #[test]
    fn test_empty_file_is_build_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("1_2.jpg");
        fs::write(&path, b"").unwrap();
        assert!(RecordBuilder::new().build(&path, &identity()).is_err());
    }
}

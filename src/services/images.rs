// Uploaded image compression and storage

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};

use crate::config::MediaConfig;
use crate::models::ImageSlot;

/// JPEG qualities tried at each size, best first
const QUALITY_STEPS: [u8; 7] = [90, 80, 70, 60, 50, 40, 30];

/// Halving stops once either side would drop below this
const MIN_DIMENSION: u32 = 64;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Could not encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Failed to write image file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy)]
pub struct CompressOptions {
    /// Target upper bound for the encoded size
    pub max_bytes: usize,
    /// Longest side after downscaling
    pub max_dimension: u32,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            max_bytes: 512_000,
            max_dimension: 1920,
        }
    }
}

impl From<&MediaConfig> for CompressOptions {
    fn from(config: &MediaConfig) -> Self {
        Self {
            max_bytes: config.max_image_bytes,
            max_dimension: config.max_image_dimension,
        }
    }
}

/// Re-encode an image as JPEG, shrinking it until it fits `max_bytes`.
///
/// The image is first scaled so its longest side is at most `max_dimension`.
/// Quality then steps down from 90 to 30; if that is not enough, the image is
/// halved and the qualities are tried again. When nothing fits, the smallest
/// encoding produced is returned.
pub fn compress_image(data: &[u8], options: &CompressOptions) -> Result<Vec<u8>, ImageError> {
    let img = image::load_from_memory(data).map_err(ImageError::Decode)?;
    let mut img = fit_within(img, options.max_dimension);

    let mut smallest: Option<Vec<u8>> = None;

    loop {
        for quality in QUALITY_STEPS {
            let encoded = encode_jpeg(&img, quality)?;
            if encoded.len() <= options.max_bytes {
                tracing::debug!(
                    "Compressed image to {} bytes ({}x{}, quality {})",
                    encoded.len(),
                    img.width(),
                    img.height(),
                    quality
                );
                return Ok(encoded);
            }
            if smallest.as_ref().map_or(true, |s| encoded.len() < s.len()) {
                smallest = Some(encoded);
            }
        }

        let (width, height) = (img.width() / 2, img.height() / 2);
        if width < MIN_DIMENSION || height < MIN_DIMENSION {
            break;
        }
        img = img.resize_exact(width, height, FilterType::Lanczos3);
    }

    let smallest = smallest.unwrap_or_default();
    tracing::warn!(
        "Image could not be compressed below {} bytes, keeping {} bytes",
        options.max_bytes,
        smallest.len()
    );
    Ok(smallest)
}

/// Compress and write an upload to `<media_dir>/<slot dir>/<uuid>.jpg`.
/// Returns the path relative to the media directory.
pub async fn store_image(
    media_dir: &Path,
    slot: ImageSlot,
    data: Vec<u8>,
    options: CompressOptions,
) -> Result<String, ImageError> {
    let jpeg = tokio::task::spawn_blocking(move || compress_image(&data, &options)).await??;

    let dir = media_dir.join(slot.dir_name());
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|source| ImageError::Io {
            path: dir.clone(),
            source,
        })?;

    let file_name = format!("{}.jpg", uuid::Uuid::new_v4());
    let path = dir.join(&file_name);
    tokio::fs::write(&path, &jpeg)
        .await
        .map_err(|source| ImageError::Io {
            path: path.clone(),
            source,
        })?;

    tracing::info!("Stored {} image {} ({} bytes)", slot.dir_name(), file_name, jpeg.len());

    Ok(format!("{}/{}", slot.dir_name(), file_name))
}

fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_dimension {
        return img;
    }
    img.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    // JPEG has no alpha channel
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality)
        .encode_image(&rgb)
        .map_err(ImageError::Encode)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    /// High-entropy pattern that JPEG compresses poorly
    fn noisy(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        }))
    }

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn decoded(bytes: &[u8]) -> DynamicImage {
        let format = image::guess_format(bytes).unwrap();
        assert_eq!(format, ImageFormat::Jpeg);
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let input = encode(
            &DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([200, 30, 30]))),
            ImageFormat::Png,
        );
        let out = compress_image(&input, &CompressOptions::default()).unwrap();
        let img = decoded(&out);
        assert_eq!((img.width(), img.height()), (300, 200));
    }

    #[test]
    fn test_downscales_to_max_dimension() {
        let input = encode(
            &DynamicImage::ImageRgb8(RgbImage::from_pixel(4000, 1000, Rgb([10, 120, 10]))),
            ImageFormat::Png,
        );
        let out = compress_image(&input, &CompressOptions::default()).unwrap();
        let img = decoded(&out);
        assert_eq!((img.width(), img.height()), (1920, 480));
    }

    #[test]
    fn test_noisy_image_fits_byte_limit() {
        let input = encode(&noisy(1500, 1500), ImageFormat::Png);
        let options = CompressOptions {
            max_bytes: 20_000,
            max_dimension: 1920,
        };
        let out = compress_image(&input, &options).unwrap();
        assert!(out.len() <= 20_000, "got {} bytes", out.len());
        assert!(decoded(&out).width() < 1500);
    }

    #[test]
    fn test_unreachable_limit_returns_smallest_attempt() {
        let input = encode(&noisy(512, 512), ImageFormat::Png);
        let options = CompressOptions {
            max_bytes: 10,
            max_dimension: 1920,
        };
        let out = compress_image(&input, &options).unwrap();
        assert!(!out.is_empty());
        let img = decoded(&out);
        assert!(img.width() < 128 && img.width() >= MIN_DIMENSION);
    }

    #[test]
    fn test_alpha_channel_is_flattened() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 64, Rgba([0, 0, 255, 128])));
        let input = encode(&rgba, ImageFormat::Png);
        let out = compress_image(&input, &CompressOptions::default()).unwrap();
        assert_eq!(decoded(&out).width(), 64);
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let result = compress_image(b"definitely not an image", &CompressOptions::default());
        assert!(matches!(result, Err(ImageError::Decode(_))));
    }

    #[tokio::test]
    async fn test_store_image_writes_under_slot_dir() {
        let media = tempfile::tempdir().unwrap();
        let input = encode(
            &DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 150, Rgb([1, 2, 3]))),
            ImageFormat::Png,
        );

        let relative = store_image(
            media.path(),
            ImageSlot::Poster,
            input,
            CompressOptions::default(),
        )
        .await
        .unwrap();

        assert!(relative.starts_with("posters/"));
        assert!(relative.ends_with(".jpg"));
        let written = std::fs::read(media.path().join(&relative)).unwrap();
        assert_eq!(decoded(&written).height(), 150);
    }
}

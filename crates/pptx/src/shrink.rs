//! Image recompression and removal of video binaries.

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::DynamicImage;
use ppt_core::{Error, PipelineConfig, ProgressSink, Result};
use std::path::Path;

use crate::container::{Package, PackageWriter};
use crate::media;

/// Recompression parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShrinkOptions {
    /// Images smaller than this many bytes are left alone.
    pub threshold_bytes: u64,
    /// Neither side of a recompressed image exceeds this.
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ShrinkOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for ShrinkOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            threshold_bytes: config.image_threshold_bytes,
            max_dimension: config.max_image_dimension,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShrinkReport {
    pub recompressed: usize,
    /// Images kept as they were after a failed or unprofitable re-encode.
    pub kept_original: usize,
    pub dropped_videos: usize,
    pub bytes_saved: u64,
}

/// Copy `src` to `dest`, dropping video binaries and recompressing large
/// images. A failure on one image keeps that image's original bytes.
pub fn shrink(src: &Path, dest: &Path, options: &ShrinkOptions, sink: &dyn ProgressSink) -> Result<ShrinkReport> {
    let mut pkg = Package::open(src)?;
    let parts = pkg.part_names();
    let total = parts.len() as u64;
    let mut report = ShrinkReport::default();
    let mut writer = PackageWriter::create(dest)?;

    for (i, part) in parts.iter().enumerate() {
        sink.on_progress(i as u64 + 1, total, "Compressing images");

        if media::is_video_part(part) {
            log::debug!("Dropping video binary {}", part);
            report.dropped_videos += 1;
            continue;
        }
        if !media::is_image_part(part) || pkg.part_size(part)? < options.threshold_bytes {
            writer.copy_part(&mut pkg, part)?;
            continue;
        }

        let Some(original) = pkg.read_part(part)? else {
            continue;
        };
        match recompress(part, &original, options) {
            Ok(Some(smaller)) => {
                log::debug!("Recompressed {}: {} -> {} bytes", part, original.len(), smaller.len());
                report.recompressed += 1;
                report.bytes_saved += (original.len() - smaller.len()) as u64;
                writer.write_part(part, &smaller)?;
            }
            Ok(None) => {
                report.kept_original += 1;
                writer.copy_part(&mut pkg, part)?;
            }
            Err(e) => {
                log::warn!("Failed to recompress {}, keeping original: {}", part, e);
                report.kept_original += 1;
                writer.copy_part(&mut pkg, part)?;
            }
        }
    }
    drop(pkg);
    writer.finish()?;

    log::info!(
        "Shrink: {} images recompressed, {} kept, {} videos dropped, {} KiB saved",
        report.recompressed,
        report.kept_original,
        report.dropped_videos,
        report.bytes_saved / 1024
    );
    Ok(report)
}

/// Re-encode one image in its own format. `Ok(None)` means the format is
/// not re-encoded or the result would not be smaller.
pub fn recompress(part: &str, bytes: &[u8], options: &ShrinkOptions) -> Result<Option<Vec<u8>>> {
    let ext = media::extension(part).unwrap_or_default();
    if !matches!(ext.as_str(), "jpg" | "jpeg" | "png") {
        return Ok(None);
    }

    let img = image::load_from_memory(bytes).map_err(|e| Error::ImageError(format!("decode {}: {}", part, e)))?;
    let img = fit_within(img, options.max_dimension);

    let mut out = Vec::new();
    let encoded = if ext == "png" {
        let encoder = PngEncoder::new_with_quality(&mut out, CompressionType::Best, PngFilter::Adaptive);
        img.write_with_encoder(encoder)
    } else {
        let encoder = JpegEncoder::new_with_quality(&mut out, options.jpeg_quality);
        DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
    };
    encoded.map_err(|e| Error::ImageError(format!("encode {}: {}", part, e)))?;

    if out.len() < bytes.len() {
        Ok(Some(out))
    } else {
        log::debug!("Re-encoding {} would not save space", part);
        Ok(None)
    }
}

/// Downsample so neither side exceeds `max`, keeping the aspect ratio.
fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        img
    } else {
        img.resize(max, max, FilterType::Lanczos3)
    }
}

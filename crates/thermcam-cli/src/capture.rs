//! Reads the temperature stream, prints statistics and saves snapshots.

use anyhow::{Context, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::io::{Read, Write};
use std::path::PathBuf;
use thermcam_core::stream::FrameReader;
use thermcam_core::types::{HEIGHT, WIDTH};
use thermcam_core::{palette, ColorImage, TemperatureGrid};

pub struct CaptureOptions {
    /// Frames to capture after the warm-up.
    pub frames: u64,
    /// Warm-up frames to discard.
    pub skip: u64,
    /// Directory for PNG snapshots; none means statistics only.
    pub out: Option<PathBuf>,
    /// Integer upscaling factor for snapshots.
    pub scale: u32,
}

/// Convert a color image to an `image` buffer, upscaled with nearest
/// neighbour so each sensor pixel stays a sharp square.
pub fn to_rgb_image(color: &ColorImage, scale: u32) -> Option<RgbImage> {
    let native = RgbImage::from_raw(WIDTH as u32, HEIGHT as u32, color.data.to_vec())?;
    let scale = scale.max(1);
    if scale == 1 {
        return Some(native);
    }
    Some(imageops::resize(
        &native,
        WIDTH as u32 * scale,
        HEIGHT as u32 * scale,
        FilterType::Nearest,
    ))
}

/// Consume frames from `input`, writing one statistics line per captured
/// frame to `report`. Returns the number of frames captured.
///
/// A stream that ends early is not an error; a frame cut short is.
pub fn capture<R: Read, W: Write>(input: R, report: &mut W, opts: &CaptureOptions) -> Result<u64> {
    if let Some(dir) = &opts.out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
    }

    let mut reader = FrameReader::new(input);
    let mut grid = TemperatureGrid::new();
    let mut image = ColorImage::new();
    let mut captured = 0u64;

    while captured < opts.frames {
        if !reader.read_frame(&mut grid).context("reading frame stream")? {
            tracing::warn!(
                read = reader.frames_read(),
                captured,
                "stream ended before all frames were captured"
            );
            break;
        }
        if reader.frames_read() <= opts.skip {
            tracing::debug!(frame = reader.frames_read(), "skipping warm-up frame");
            continue;
        }

        match grid.stats() {
            Some(s) => writeln!(
                report,
                "frame {captured:>4}: min {:6.2} °C  mean {:6.2} °C  max {:6.2} °C",
                s.min, s.mean, s.max
            )?,
            None => writeln!(report, "frame {captured:>4}: no finite values")?,
        }

        if let Some(dir) = &opts.out {
            palette::render(&grid, &mut image);
            let path = dir.join(format!("frame_{captured:04}.png"));
            let snapshot = to_rgb_image(&image, opts.scale).context("image buffer size mismatch")?;
            snapshot
                .save(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::debug!(path = %path.display(), "snapshot saved");
        }

        captured += 1;
    }

    Ok(captured)
}

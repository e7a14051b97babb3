//! oep-demo - runs frames through the offscreen effect player
//!
//! Usage: `oep-demo [config.json] [input.png] [output-dir]`
//!
//! Pushes the input image (or generated color bars) through the player with
//! the reference engine, reads the result back as RGBA and NV12 and writes
//! both as PNGs. Pass `-` to skip an argument.

use anyhow::{anyhow, Context, Result};
use oep_core::{
    decode_to_rgba, from_biplanar_yuv, from_packed_no_copy, CameraOrientation, FrameBuffer,
    FullImage, ImageFormat, PixelFormat, YuvEncoding,
};
use oep_player::{OepConfig, OffscreenEffectPlayer, ReferenceEffectPlayer};
use oep_render::{OutputImageFormat, SharedRenderTarget};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let config_path = optional_arg(args.next());
    let input_path = optional_arg(args.next());
    let output_dir = optional_arg(args.next()).unwrap_or_else(|| PathBuf::from("oep-out"));

    let config = match &config_path {
        Some(path) => OepConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => OepConfig::new(640, 480),
    };
    info!(width = config.width, height = config.height, "oep-demo starting");

    let input = match &input_path {
        Some(path) => load_png(path)?,
        None => color_bars(config.width, config.height)?,
    };

    let player = OffscreenEffectPlayer::create(
        config.clone(),
        ReferenceEffectPlayer::factory,
        render_target(&config),
    )?;
    player.load_effect("effects/passthrough");

    let (tx, rx) = crossbeam_channel::bounded(2);
    player.process_image_async(
        input,
        move |buffer| {
            let Some(buffer) = buffer else {
                warn!("Frame was not rendered");
                return;
            };
            // Runs on the worker, so both reads complete before the buffer
            // is unlocked.
            for format in [OutputImageFormat::Rgba, OutputImageFormat::Nv12] {
                let tx = tx.clone();
                buffer.get_image(format, move |image| {
                    let _ = tx.send((format, image.and_then(|i| i.into_frame())));
                });
            }
        },
        None,
    );

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    for _ in 0..2 {
        let (format, frame) = rx
            .recv_timeout(Duration::from_secs(10))
            .context("timed out waiting for the rendered frame")?;
        let frame = frame.ok_or_else(|| anyhow!("no {:?} image was read back", format))?;
        let (name, rgba) = match format {
            OutputImageFormat::Nv12 => ("nv12.png", nv12_to_rgba(&frame)?),
            _ => ("rgba.png", frame),
        };
        let path = output_dir.join(name);
        save_png(&rgba, &path)?;
        info!(path = %path.display(), width = rgba.width, height = rgba.height, "Wrote frame");
    }

    drop(player);
    info!("oep-demo finished");
    Ok(())
}

fn optional_arg(arg: Option<String>) -> Option<PathBuf> {
    arg.filter(|a| a != "-").map(PathBuf::from)
}

#[cfg(feature = "gpu")]
fn render_target(config: &OepConfig) -> Option<SharedRenderTarget> {
    match oep_render::GpuRenderTarget::new_blocking(config.width, config.height) {
        Ok(target) => Some(oep_render::shared(target)),
        Err(e) => {
            warn!(error = %e, "GPU unavailable, using the software target");
            None
        }
    }
}

#[cfg(not(feature = "gpu"))]
fn render_target(_config: &OepConfig) -> Option<SharedRenderTarget> {
    None
}

fn load_png(path: &Path) -> Result<FullImage> {
    let rgba = image::open(path)
        .with_context(|| format!("opening {}", path.display()))?
        .to_rgba8();
    let (width, height) = rgba.dimensions();
    let format = ImageFormat::new(width, height, CameraOrientation::Deg0);
    let image = from_packed_no_copy(
        format,
        PixelFormat::Rgba,
        rgba.into_raw(),
        (width * 4) as i32,
        || {},
    )?;
    Ok(image)
}

fn color_bars(width: u32, height: u32) -> Result<FullImage> {
    let frame = FrameBuffer::test_pattern(width, height);
    let format = ImageFormat::new(width, height, CameraOrientation::Deg0);
    let image = from_packed_no_copy(
        format,
        PixelFormat::Rgba,
        frame.primary_plane().to_packed(),
        (width * 4) as i32,
        || {},
    )?;
    Ok(image)
}

fn nv12_to_rgba(frame: &FrameBuffer) -> Result<FrameBuffer> {
    let [luma, chroma] = [&frame.planes[0], &frame.planes[1]];
    let image = from_biplanar_yuv(
        ImageFormat::new(frame.width, frame.height, CameraOrientation::Deg0),
        YuvEncoding::BT601_VIDEO,
        &luma.data,
        luma.stride as i32,
        &chroma.data,
        chroma.stride as i32,
    )?;
    Ok(decode_to_rgba(&image)?)
}

fn save_png(frame: &FrameBuffer, path: &Path) -> Result<()> {
    let image = image::RgbaImage::from_raw(
        frame.width,
        frame.height,
        frame.primary_plane().to_packed(),
    )
    .ok_or_else(|| anyhow!("frame buffer too small for {}x{}", frame.width, frame.height))?;
    image
        .save(path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

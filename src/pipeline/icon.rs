//! Procedural application icon synthesis and ICNS packing.
//!
//! The icon is generated deterministically from no external input: a
//! radial gradient background with a ring in the brand color, rendered at
//! 1024x1024 and downscaled to the full macOS resolution ladder. This
//! keeps binary assets out of the repository while producing identical
//! output on every run.
//!
//! Failures in this stage never abort the pipeline; the bundle simply
//! ships without a custom icon.

use crate::pipeline::context::BuildContext;
use crate::pipeline::error::{Error, ErrorExt, Result};
use icns::{IconFamily, IconType, Image as IcnsImage, PixelFormat};
use image::{imageops, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tokio::task;

/// Base render size. Large enough that every ladder entry is a downscale.
const MASTER_SIZE: u32 = 1024;

/// Brand ring color (Bitcoin orange).
const RING_COLOR: [u8; 3] = [0xF7, 0x93, 0x1A];

/// Gradient center color (near-white).
const CENTER_COLOR: [u8; 3] = [0xFD, 0xF6, 0xE3];

/// Gradient edge color (deep slate).
const EDGE_COLOR: [u8; 3] = [0x1C, 0x23, 0x30];

/// Synthesizes the app icon and packs it as `<Name>.icns` in the
/// resources directory.
///
/// Cached: if the `.icns` already exists it is reused. Returns `None`
/// (after logging a warning) when generation fails, so the caller can
/// continue without an icon.
pub async fn synthesize(ctx: &BuildContext) -> Option<PathBuf> {
    let icns_path = ctx.icns_path();
    if icns_path.is_file() {
        log::info!("icon already generated, reusing {}", icns_path.display());
        return Some(icns_path);
    }

    match generate_icns(&icns_path).await {
        Ok(()) => Some(icns_path),
        Err(e) => {
            log::warn!(
                "icon generation failed ({}); continuing with the system default icon",
                e
            );
            None
        }
    }
}

/// Renders the master image, derives the resolution ladder, and writes
/// the packed ICNS file.
async fn generate_icns(output: &Path) -> Result<()> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .fs_context("creating resources directory", parent)?;
    }

    // Rendering and encoding are CPU-bound; keep them off the runtime.
    let output = output.to_path_buf();
    task::spawn_blocking(move || {
        // Per-resolution intermediates land in a scratch directory that
        // is removed once the family is packed.
        let scratch = tempfile::tempdir()
            .map_err(|e| Error::Generic(format!("creating icon scratch directory: {e}")))?;
        let master = render_master(MASTER_SIZE);
        let family = pack_family(&master, scratch.path())?;

        let file = std::fs::File::create(&output)
            .fs_context("creating ICNS output file", &output)?;
        family
            .write(file)
            .map_err(|e| Error::Generic(format!("writing ICNS data: {e}")))?;

        log::info!("created ICNS file: {}", output.display());
        Ok(())
    })
    .await
    .map_err(|e| Error::Generic(format!("icon render task failed: {e}")))?
}

/// Renders the deterministic master image: radial gradient plus ring.
pub(crate) fn render_master(size: u32) -> RgbaImage {
    let center = (size as f32 - 1.0) / 2.0;
    let max_radius = center * 2.0_f32.sqrt();

    // Ring geometry as fractions of the canvas, so any render size gives
    // the same picture.
    let ring_radius = size as f32 * 0.34;
    let ring_half_width = size as f32 * 0.045;
    let edge_softness = size as f32 / 256.0;

    RgbaImage::from_fn(size, size, |x, y| {
        let dx = x as f32 - center;
        let dy = y as f32 - center;
        let dist = (dx * dx + dy * dy).sqrt();

        // Radial gradient background.
        let t = (dist / max_radius).clamp(0.0, 1.0);
        let mut px = [
            lerp(CENTER_COLOR[0], EDGE_COLOR[0], t),
            lerp(CENTER_COLOR[1], EDGE_COLOR[1], t),
            lerp(CENTER_COLOR[2], EDGE_COLOR[2], t),
        ];

        // Ring, feathered over `edge_softness` pixels.
        let ring_dist = (dist - ring_radius).abs();
        if ring_dist < ring_half_width + edge_softness {
            let coverage =
                ((ring_half_width + edge_softness - ring_dist) / edge_softness).clamp(0.0, 1.0);
            for (channel, ring) in px.iter_mut().zip(RING_COLOR) {
                *channel = lerp(*channel, ring, coverage);
            }
        }

        Rgba([px[0], px[1], px[2], 0xFF])
    })
}

fn lerp(a: u8, b: u8, t: f32) -> u8 {
    (a as f32 + (b as f32 - a as f32) * t).round() as u8
}

/// Downscales the master through the required resolution ladder, staging
/// each entry as a PNG in `scratch`, and packs them into an icon family.
fn pack_family(master: &RgbaImage, scratch: &Path) -> Result<IconFamily> {
    let mut family = IconFamily::new();

    let icon_types = [
        (IconType::RGBA32_16x16, 16u32, "16x16"),
        (IconType::RGBA32_16x16_2x, 32, "16x16@2x"),
        (IconType::RGBA32_32x32, 32, "32x32"),
        (IconType::RGBA32_32x32_2x, 64, "32x32@2x"),
        (IconType::RGBA32_64x64, 64, "64x64"),
        (IconType::RGBA32_128x128, 128, "128x128"),
        (IconType::RGBA32_128x128_2x, 256, "128x128@2x"),
        (IconType::RGBA32_256x256, 256, "256x256"),
        (IconType::RGBA32_256x256_2x, 512, "256x256@2x"),
        (IconType::RGBA32_512x512, 512, "512x512"),
        (IconType::RGBA32_512x512_2x, 1024, "512x512@2x"),
    ];

    for (icon_type, size, name) in icon_types {
        let rgba = if size == master.width() {
            master.clone()
        } else {
            imageops::resize(master, size, size, imageops::FilterType::Lanczos3)
        };

        let staged = scratch.join(format!("icon_{name}.png"));
        rgba.save(&staged)
            .map_err(|e| Error::Generic(format!("staging {name}: {e}")))?;

        let icns_img = IcnsImage::from_data(PixelFormat::RGBA, size, size, rgba.into_raw())
            .map_err(|e| Error::Generic(format!("creating ICNS image for {name}: {e}")))?;

        family
            .add_icon_with_type(&icns_img, icon_type)
            .map_err(|e| Error::Generic(format!("adding {name} to icon family: {e}")))?;
    }

    Ok(family)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::manifest::BuildManifest;

    fn test_ctx(dir: &Path) -> BuildContext {
        let toml = r#"
            entry_point = "main.py"

            [identity]
            name = "Example App"
            bundle_identifier = "com.example.app"
            version = "1.0.0"
        "#;
        let manifest: BuildManifest = toml::from_str(toml).expect("manifest");
        BuildContext::new(dir.to_path_buf(), manifest, None, false, false, None)
    }

    #[tokio::test]
    async fn existing_icns_is_reused_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = test_ctx(dir.path());
        let icns = ctx.icns_path();
        std::fs::create_dir_all(icns.parent().expect("parent")).expect("mkdir");
        std::fs::write(&icns, b"cached icon bytes").expect("write");

        let result = synthesize(&ctx).await;

        assert_eq!(result, Some(icns.clone()));
        assert_eq!(std::fs::read(&icns).expect("read"), b"cached icon bytes");
    }

    #[test]
    fn render_is_deterministic() {
        let a = render_master(64);
        let b = render_master(64);
        assert_eq!(a.as_raw(), b.as_raw());
    }

    #[test]
    fn render_is_square_and_opaque() {
        let img = render_master(32);
        assert_eq!(img.width(), img.height());
        assert!(img.pixels().all(|p| p.0[3] == 0xFF));
    }

    #[test]
    fn ring_color_appears_in_render() {
        let img = render_master(256);
        // The pixel straight up from center at ring radius sits inside
        // the fully covered band.
        let center = 128u32;
        let ring_y = center - (256.0_f32 * 0.34) as u32;
        let px = img.get_pixel(center, ring_y);
        assert_eq!(&px.0[..3], &RING_COLOR);
    }

    #[test]
    fn family_packs_full_ladder_and_cleans_scratch() {
        let scratch = tempfile::tempdir().expect("tempdir");
        let master = render_master(MASTER_SIZE);
        let family = pack_family(&master, scratch.path()).expect("pack");
        assert_eq!(family.elements.len(), 11);

        // Intermediates were staged during packing.
        assert!(scratch.path().join("icon_16x16.png").is_file());
        let path = scratch.path().to_path_buf();
        drop(scratch);
        assert!(!path.exists());
    }
}

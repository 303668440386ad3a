use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use png::Decoder;

// Embedded at compile time so the tray never depends on the working directory
static APP_ICON: &[u8] = include_bytes!("../../assets/icon.png");

const ICON_DIR_NAME: &str = "teams-desktop";
const ICON_FILE_NAME: &str = "icon.png";

/// Decoded RGBA pixels.
#[derive(Debug, Clone)]
pub struct RgbaImage {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub fn load_tray_icon() -> Result<tray_icon::Icon> {
    let image = decode_png(APP_ICON)?;
    tray_icon::Icon::from_rgba(image.rgba, image.width, image.height)
        .map_err(|e| anyhow!("failed to create tray icon: {e}"))
}

pub fn load_window_icon() -> Result<winit::window::Icon> {
    let image = decode_png(APP_ICON)?;
    winit::window::Icon::from_rgba(image.rgba, image.width, image.height)
        .map_err(|e| anyhow!("failed to create window icon: {e}"))
}

/// Write the bundled icon to the cache directory for notification servers
/// that only accept file paths. Returns the written path.
pub fn install_notification_icon() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(ICON_DIR_NAME);
    install_icon_in(&dir)
}

fn install_icon_in(dir: &Path) -> Result<PathBuf> {
    let path = dir.join(ICON_FILE_NAME);
    let up_to_date = fs::read(&path).is_ok_and(|existing| existing == APP_ICON);
    if !up_to_date {
        fs::create_dir_all(dir).context("failed to create icon cache directory")?;
        fs::write(&path, APP_ICON).context("failed to write notification icon")?;
    }
    Ok(path)
}

pub fn decode_png(png_data: &[u8]) -> Result<RgbaImage> {
    let decoder = Decoder::new(png_data);
    let mut reader = decoder
        .read_info()
        .map_err(|e| anyhow!("failed to read PNG header: {e}"))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| anyhow!("failed to decode PNG: {e}"))?;

    let width = info.width;
    let height = info.height;
    let pixels = &buf[..info.buffer_size()];

    let rgba = match info.color_type {
        png::ColorType::Rgba => pixels.to_vec(),
        png::ColorType::Rgb => pixels
            .chunks(3)
            .flat_map(|px| [px[0], px[1], px[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => pixels
            .chunks(2)
            .flat_map(|px| [px[0], px[0], px[0], px[1]])
            .collect(),
        png::ColorType::Grayscale => pixels.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => {
            return Err(anyhow!("indexed PNG not supported for app icon"));
        }
    };

    if rgba.len() != (width * height * 4) as usize {
        return Err(anyhow!("unexpected PNG bit depth for app icon"));
    }

    Ok(RgbaImage {
        rgba,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_icon_decodes_to_rgba() {
        let image = decode_png(APP_ICON).unwrap();
        assert_eq!(image.width, 64);
        assert_eq!(image.height, 64);
        assert_eq!(image.rgba.len(), 64 * 64 * 4);
    }

    #[test]
    fn rejects_non_png() {
        assert!(decode_png(b"definitely not a png").is_err());
    }

    #[test]
    fn installs_icon_once() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cache");

        let path = install_icon_in(&target).unwrap();
        assert_eq!(fs::read(&path).unwrap(), APP_ICON);

        fs::write(&path, b"stale").unwrap();
        let again = install_icon_in(&target).unwrap();
        assert_eq!(again, path);
        assert_eq!(fs::read(&path).unwrap(), APP_ICON);
    }
}

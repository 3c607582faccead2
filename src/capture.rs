//! V4L2 capture: device open, format negotiation, exposure, frame decode
//!
//! Frames are decoded to RGB whatever the camera delivers. MJPEG is preferred
//! (lower USB bandwidth), then YUYV, then the raw RGB/BGR formats. YUYV uses
//! integer-only BT.601 conversion.

use anyhow::{Context, Result};
use image::RgbImage;
use std::io::Cursor;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

/// V4L2 control ids used for exposure handling.
mod control_ids {
    /// V4L2_CID_EXPOSURE (user class, legacy drivers)
    pub const EXPOSURE: u32 = 0x00980911;
    /// V4L2_CID_EXPOSURE_AUTO
    pub const EXPOSURE_AUTO: u32 = 0x009a0901;
    /// V4L2_CID_EXPOSURE_ABSOLUTE
    pub const EXPOSURE_ABSOLUTE: u32 = 0x009a0902;
    /// V4L2_EXPOSURE_MANUAL menu value for EXPOSURE_AUTO
    pub const EXPOSURE_MODE_MANUAL: i64 = 1;
}

/// Preferred pixel formats, tried in order.
const PREFERRED_FORMATS: &[&[u8; 4]] = &[b"MJPG", b"YUYV", b"RGB3", b"BGR3"];

/// Open a capture device by index.
pub fn open_device(id: u32) -> Result<Device> {
    let dev = Device::new(id as usize)
        .with_context(|| format!("Failed to open capture device {}", id))?;
    if let Ok(caps) = dev.query_caps() {
        info!("Camera {}: {} (driver: {})", id, caps.card, caps.driver);
    }
    Ok(dev)
}

/// Switch the device to manual exposure so pushed values take effect.
/// Not every driver exposes the control; failure is logged and ignored.
pub fn set_manual_exposure(dev: &Device) {
    let ctrl = v4l::control::Control {
        id: control_ids::EXPOSURE_AUTO,
        value: v4l::control::Value::Integer(control_ids::EXPOSURE_MODE_MANUAL),
    };
    if let Err(e) = dev.set_control(ctrl) {
        warn!("Could not switch to manual exposure: {}", e);
    }
}

/// Push an exposure value to the device. The value is unranged in the
/// calibration model; the driver clamps or rejects it.
pub fn set_exposure(dev: &Device, value: i32) {
    let absolute = v4l::control::Control {
        id: control_ids::EXPOSURE_ABSOLUTE,
        value: v4l::control::Value::Integer(value as i64),
    };
    if dev.set_control(absolute).is_ok() {
        debug!("Set exposure (absolute) to {}", value);
        return;
    }

    let legacy = v4l::control::Control {
        id: control_ids::EXPOSURE,
        value: v4l::control::Value::Integer(value as i64),
    };
    match dev.set_control(legacy) {
        Ok(()) => debug!("Set exposure (legacy) to {}", value),
        Err(e) => warn!("Device rejected exposure {}: {}", value, e),
    }
}

/// Negotiate a capture format, trying preferred formats in order and falling
/// back to whatever the device currently delivers.
pub fn configure_format(dev: &Device, width: u32, height: u32) -> Result<Format> {
    let formats = dev.enum_formats().context("Failed to enumerate formats")?;
    for fmt in &formats {
        debug!(
            "Device offers {:?}: {}",
            String::from_utf8_lossy(&fmt.fourcc.repr),
            fmt.description
        );
    }

    for preferred in PREFERRED_FORMATS {
        let fourcc = FourCC::new(preferred);
        if !formats.iter().any(|f| f.fourcc == fourcc) {
            continue;
        }
        let mut format = dev.format().context("Failed to get current format")?;
        format.width = width;
        format.height = height;
        format.fourcc = fourcc;

        match dev.set_format(&format) {
            Ok(actual) => {
                info!(
                    "Capture format: {}x{} {:?}",
                    actual.width,
                    actual.height,
                    String::from_utf8_lossy(&actual.fourcc.repr)
                );
                return Ok(actual);
            }
            Err(e) => {
                warn!(
                    "Could not set format {:?}: {}",
                    String::from_utf8_lossy(*preferred),
                    e
                );
            }
        }
    }

    let current = dev.format().context("Failed to get device format")?;
    info!(
        "Using device's current format: {}x{} {:?}",
        current.width,
        current.height,
        String::from_utf8_lossy(&current.fourcc.repr)
    );
    Ok(current)
}

/// Create the memory-mapped capture stream.
pub fn open_stream(dev: &Device) -> Result<Stream<'_>> {
    Stream::with_buffers(dev, Type::VideoCapture, 4).context("Failed to create capture stream")
}

/// Acquire and decode the next frame.
///
/// `Err` means the stream itself failed (device gone, end of stream) and the
/// run should wind down. `Ok(None)` is a frame that could not be decoded and
/// should simply be skipped.
pub fn next_frame(stream: &mut Stream<'_>, format: &Format) -> Result<Option<RgbImage>> {
    let (buf, _meta) = stream.next().context("Failed to capture frame")?;

    let width = format.width as usize;
    let height = format.height as usize;

    let rgb = match &format.fourcc.repr {
        b"MJPG" => decode_mjpeg(buf, width, height),
        b"YUYV" => Some(yuyv_to_rgb(buf, width, height)),
        b"BGR3" => Some(bgr_to_rgb(buf, width, height)),
        _ => {
            // Treat anything else as packed RGB24.
            let mut rgb = vec![0u8; width * height * 3];
            let n = buf.len().min(rgb.len());
            rgb[..n].copy_from_slice(&buf[..n]);
            RgbImage::from_raw(format.width, format.height, rgb)
        }
    };

    if rgb.is_none() {
        warn!("Skipping undecodable frame");
    }
    Ok(rgb)
}

/// Decode an MJPEG frame to RGB.
fn decode_mjpeg(data: &[u8], width: usize, height: usize) -> Option<RgbImage> {
    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(data));
    let pixels = decoder.decode().ok()?;
    let info = decoder.info()?;

    let mut rgb = vec![0u8; width * height * 3];
    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => {
            let n = pixels.len().min(rgb.len());
            rgb[..n].copy_from_slice(&pixels[..n]);
        }
        jpeg_decoder::PixelFormat::L8 => {
            for (i, &gray) in pixels.iter().enumerate().take(width * height) {
                rgb[i * 3] = gray;
                rgb[i * 3 + 1] = gray;
                rgb[i * 3 + 2] = gray;
            }
        }
        _ => return None,
    }

    RgbImage::from_raw(width as u32, height as u32, rgb)
}

/// Convert a YUYV buffer to RGB with fixed-point BT.601 math. Two pixels per
/// 4-byte group, sharing one U/V pair.
fn yuyv_to_rgb(yuyv: &[u8], width: usize, height: usize) -> RgbImage {
    let mut rgb = vec![0u8; width * height * 3];

    for (group, out) in yuyv.chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        let y0 = group[0] as i32;
        let u = group[1] as i32 - 128;
        let y1 = group[2] as i32;
        let v = group[3] as i32 - 128;

        // BT.601, scaled by 256:
        //   R = Y + 1.402 V, G = Y - 0.344 U - 0.714 V, B = Y + 1.772 U
        let v_r = (359 * v) >> 8;
        let uv_g = (88 * u + 183 * v) >> 8;
        let u_b = (454 * u) >> 8;

        out[0] = (y0 + v_r).clamp(0, 255) as u8;
        out[1] = (y0 - uv_g).clamp(0, 255) as u8;
        out[2] = (y0 + u_b).clamp(0, 255) as u8;
        out[3] = (y1 + v_r).clamp(0, 255) as u8;
        out[4] = (y1 - uv_g).clamp(0, 255) as u8;
        out[5] = (y1 + u_b).clamp(0, 255) as u8;
    }

    RgbImage::from_raw(width as u32, height as u32, rgb)
        .unwrap_or_else(|| RgbImage::new(width as u32, height as u32))
}

/// Convert a BGR24 buffer to RGB (channel swap).
fn bgr_to_rgb(bgr: &[u8], width: usize, height: usize) -> RgbImage {
    let mut rgb = vec![0u8; width * height * 3];

    for (src, dst) in bgr.chunks_exact(3).zip(rgb.chunks_exact_mut(3)) {
        dst[0] = src[2];
        dst[1] = src[1];
        dst[2] = src[0];
    }

    RgbImage::from_raw(width as u32, height as u32, rgb)
        .unwrap_or_else(|| RgbImage::new(width as u32, height as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_gray_midtone() {
        // Y=128, U=V=128 (no chroma) decodes to mid gray everywhere.
        let yuyv = vec![128u8; 4 * 4 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 4, 4);
        assert!(rgb.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn test_yuyv_pixel_pair_shares_chroma() {
        // One group: Y0=50, U=128, Y1=200, V=128.
        let yuyv = [50u8, 128, 200, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);
        assert_eq!(rgb.get_pixel(0, 0).0, [50, 50, 50]);
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_bgr_swap() {
        let bgr = [0u8, 128, 255];
        let rgb = bgr_to_rgb(&bgr, 1, 1);
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 128, 0]);
    }

    #[test]
    fn test_short_yuyv_buffer_is_tolerated() {
        // Fewer bytes than the format promises: remaining pixels stay black.
        let yuyv = [128u8; 4];
        let rgb = yuyv_to_rgb(&yuyv, 4, 1);
        assert_eq!(rgb.get_pixel(0, 0).0, [128, 128, 128]);
        assert_eq!(rgb.get_pixel(3, 0).0, [0, 0, 0]);
    }
}

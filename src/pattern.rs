//! Cpu fill helpers for the test buffers.
//!
//! Nothing here aims to be fast, the buffers are filled once per frame
//! at most and the point is that the result is recognizable on screen.

use drm::buffer::DrmFourcc;

use crate::backend::MappedBuffer;
use crate::format;

/// Fill the whole buffer with one color.
///
/// 16 bpp formats take `color16`, everything else `color32`. Matching
/// the word size matters, a 32-bit pattern written into an RGB565
/// buffer shows up as vertical line pairs.
pub fn solid_fill(map: &mut MappedBuffer<'_>, color32: u32, color16: u16) {
    if format::is_16bpp(map.format) {
        for px in map.data.chunks_exact_mut(2) {
            px.copy_from_slice(&color16.to_le_bytes());
        }
    } else {
        for px in map.data.chunks_exact_mut(4) {
            px.copy_from_slice(&color32.to_le_bytes());
        }
    }
}

/// Draw a white triangle pointing right on a black background.
///
/// Expects a 32 bpp rgb buffer, which is all cursor planes are asked
/// to scan out here.
pub fn draw_cursor(map: &mut MappedBuffer<'_>) {
    let (width, height, stride) = (map.width, map.height, map.stride);
    for y in 0..height {
        for x in 0..width {
            let white = y > x / 2 && y < width.saturating_sub(x / 2);
            let color: u32 = if white { 0xFFFF_FFFF } else { 0x0000_0000 };
            let idx = (y * stride + x * 4) as usize;
            if let Some(px) = map.data.get_mut(idx..idx + 4) {
                px.copy_from_slice(&color.to_le_bytes());
            }
        }
    }
}

// BT.601 limited range, the coefficients hardware test patterns
// traditionally use.
fn ycbcr(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let y = 16.0 + 0.2567890625 * r + 0.50412890625 * g + 0.09790625 * b;
    let cb = 128.0 - 0.14822265625 * r - 0.2909921875 * g + 0.43921484375 * b;
    let cr = 128.0 + 0.43921484375 * r - 0.3677890625 * g - 0.07142578125 * b;
    (clamp_byte(y), clamp_byte(cb), clamp_byte(cr))
}

fn clamp_byte(f: f32) -> u8 {
    if f >= 255.0 {
        255
    } else if f <= 0.0 {
        0
    } else {
        f as u8
    }
}

/// Color of the stripe pattern at a pixel.
///
/// Four horizontal bands (white, red, green, blue), each fading from
/// black on the left to full intensity on the right.
fn band_color(x: u32, y: u32, width: u32, height: u32) -> (u8, u8, u8) {
    let band_height = (height / 4).max(1);
    let band = (y / band_height).min(3);
    let i = clamp_byte(x as f32 / width as f32 * 256.0);
    match band {
        0 => (i, i, i),
        1 => (i, 0, 0),
        2 => (0, i, 0),
        _ => (0, 0, i),
    }
}

/// True for the formats [`draw_stripes`] can fill
pub fn supports_stripes(format: DrmFourcc) -> bool {
    matches!(
        format,
        DrmFourcc::Yuyv | DrmFourcc::Uyvy | DrmFourcc::Nv12 | DrmFourcc::Yvu420
    )
}

/// Fill a yuv buffer with the stripe test pattern.
///
/// Returns false if the format is not one of the supported yuv layouts.
pub fn draw_stripes(map: &mut MappedBuffer<'_>) -> bool {
    match map.format {
        DrmFourcc::Yuyv => draw_packed(map, true),
        DrmFourcc::Uyvy => draw_packed(map, false),
        DrmFourcc::Nv12 => draw_nv12(map),
        DrmFourcc::Yvu420 => draw_yvu420(map),
        _ => return false,
    }
    true
}

fn put(map: &mut MappedBuffer<'_>, idx: usize, value: u8) {
    if let Some(byte) = map.data.get_mut(idx) {
        *byte = value;
    }
}

// Y0 U Y1 V (yuyv) or U Y0 V Y1 (uyvy), two pixels per 32-bit word
fn draw_packed(map: &mut MappedBuffer<'_>, luma_first: bool) {
    let (width, height) = (map.width, map.height);
    let pitch = map.pitches[0];
    for y in 0..height {
        for pair in 0..width / 2 {
            let x = pair * 2;
            let (r, g, b) = band_color(x, y, width, height);
            let (luma, cb, cr) = ycbcr(r, g, b);
            let base = (y * pitch + pair * 4) as usize;
            let (y0, u, y1, v) = if luma_first { (0, 1, 2, 3) } else { (1, 0, 3, 2) };
            put(map, base + y0, luma);
            put(map, base + u, cb);
            put(map, base + y1, luma);
            put(map, base + v, cr);
        }
    }
}

// full-res luma plane, half-res interleaved Cb/Cr plane
fn draw_nv12(map: &mut MappedBuffer<'_>) {
    let (width, height) = (map.width, map.height);
    let (luma_pitch, chroma_pitch) = (map.pitches[0], map.pitches[1]);
    let (luma_base, chroma_base) = (map.offsets[0], map.offsets[1]);

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = band_color(x, y, width, height);
            let (luma, cb, cr) = ycbcr(r, g, b);
            put(map, (luma_base + y * luma_pitch + x) as usize, luma);
            if y % 2 == 0 && x % 2 == 0 {
                let idx = (chroma_base + (y / 2) * chroma_pitch + x) as usize;
                put(map, idx, cb);
                put(map, idx + 1, cr);
            }
        }
    }
}

// full-res luma plane, then half-res Cr and Cb planes
fn draw_yvu420(map: &mut MappedBuffer<'_>) {
    let (width, height) = (map.width, map.height);
    let luma_pitch = map.pitches[0];
    let (cr_pitch, cb_pitch) = (map.pitches[1], map.pitches[2]);
    let (luma_base, cr_base, cb_base) = (map.offsets[0], map.offsets[1], map.offsets[2]);

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = band_color(x, y, width, height);
            let (luma, cb, cr) = ycbcr(r, g, b);
            put(map, (luma_base + y * luma_pitch + x) as usize, luma);
            if y % 2 == 0 && x % 2 == 0 {
                put(map, (cr_base + (y / 2) * cr_pitch + x / 2) as usize, cr);
                put(map, (cb_base + (y / 2) * cb_pitch + x / 2) as usize, cb);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapped(data: &mut [u8], width: u32, height: u32, format: DrmFourcc) -> MappedBuffer<'_> {
        let (stride, offsets, pitches) = match format {
            DrmFourcc::Nv12 => (width, [0, width * height, 0, 0], [width, width, 0, 0]),
            DrmFourcc::Yvu420 => {
                let luma = width * height;
                (
                    width,
                    [0, luma, luma + luma / 4, 0],
                    [width, width / 2, width / 2, 0],
                )
            }
            DrmFourcc::Yuyv | DrmFourcc::Uyvy => (width * 2, [0; 4], [width * 2, 0, 0, 0]),
            DrmFourcc::Rgb565 => (width * 2, [0; 4], [width * 2, 0, 0, 0]),
            _ => (width * 4, [0; 4], [width * 4, 0, 0, 0]),
        };
        MappedBuffer {
            data,
            width,
            height,
            format,
            stride,
            offsets,
            pitches,
        }
    }

    #[test]
    fn solid_fill_uses_16bit_words_for_rgb565() {
        let mut data = vec![0u8; 4 * 4 * 2];
        let mut map = mapped(&mut data, 4, 4, DrmFourcc::Rgb565);
        solid_fill(&mut map, 0x00FF0000, 0xF800);
        assert!(data.chunks_exact(2).all(|px| px == 0xF800u16.to_le_bytes()));
    }

    #[test]
    fn solid_fill_uses_32bit_words_for_xrgb() {
        let mut data = vec![0u8; 4 * 4 * 4];
        let mut map = mapped(&mut data, 4, 4, DrmFourcc::Xrgb8888);
        solid_fill(&mut map, 0x000000FF, 0);
        assert!(data
            .chunks_exact(4)
            .all(|px| px == 0x000000FFu32.to_le_bytes()));
    }

    #[test]
    fn cursor_is_white_triangle_on_black() {
        let mut data = vec![0u8; 64 * 64 * 4];
        let mut map = mapped(&mut data, 64, 64, DrmFourcc::Argb8888);
        draw_cursor(&mut map);

        let pixel = |x: usize, y: usize| {
            let idx = (y * 64 + x) * 4;
            u32::from_le_bytes(data[idx..idx + 4].try_into().unwrap())
        };
        // tip area along the middle row is white
        assert_eq!(pixel(4, 32), 0xFFFF_FFFF);
        // corners stay black
        assert_eq!(pixel(63, 0), 0);
        assert_eq!(pixel(63, 63), 0);
    }

    #[test]
    fn nv12_stripes_fill_both_planes() {
        let (w, h) = (8u32, 8u32);
        let mut data = vec![0u8; (w * h * 3 / 2) as usize];
        let mut map = mapped(&mut data, w, h, DrmFourcc::Nv12);
        assert!(draw_stripes(&mut map));

        // white band, right edge of the first row: luma near full range
        let idx = (w - 1) as usize;
        assert!(data[idx] > 200, "luma {} too low", data[idx]);
        // left edge is black, luma at the bt.601 floor
        assert_eq!(data[0], 16);
        // chroma plane of the white band stays near neutral
        let chroma = data[(w * h) as usize];
        assert!((120..=136).contains(&chroma), "chroma {} not neutral", chroma);
    }

    #[test]
    fn unsupported_stripe_format_is_reported() {
        let mut data = vec![0u8; 16];
        let mut map = mapped(&mut data, 2, 2, DrmFourcc::Xrgb8888);
        assert!(!draw_stripes(&mut map));
        assert!(!supports_stripes(DrmFourcc::Xrgb8888));
        assert!(supports_stripes(DrmFourcc::Nv12));
    }
}

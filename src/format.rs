//! Small lookup tables for the formats this tool stages.

use drm_fourcc::DrmFourcc;

/// Macro to generate table lookup functions for formats.
macro_rules! format_tables {
    (
        $($fourcc: ident {
            bpp: $bpp: expr,
            depth: $depth: expr $(,)?
        }),* $(,)?
    ) => {
        /// Returns the bits per pixel of the specified format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_bpp(fourcc: DrmFourcc) -> Option<u32> {
            match fourcc {
                $(DrmFourcc::$fourcc => Some($bpp),)*
                _ => None,
            }
        }

        /// Returns the depth of the specified format.
        ///
        /// Unknown formats will always return [`None`].
        pub const fn get_depth(fourcc: DrmFourcc) -> Option<u32> {
            match fourcc {
                $(DrmFourcc::$fourcc => Some($depth),)*
                _ => None,
            }
        }
    };
}

format_tables! {
    Rgb565 { bpp: 16, depth: 16 },
    Bgr565 { bpp: 16, depth: 16 },
    Xrgb8888 { bpp: 32, depth: 24 },
    Xbgr8888 { bpp: 32, depth: 24 },
    Argb8888 { bpp: 32, depth: 32 },
    Abgr8888 { bpp: 32, depth: 32 },
}

/// Returns true for the single-plane rgb formats packed into 16-bit words.
pub const fn is_16bpp(fourcc: DrmFourcc) -> bool {
    matches!(fourcc, DrmFourcc::Rgb565 | DrmFourcc::Bgr565)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bpp_and_depth() {
        assert_eq!(get_bpp(DrmFourcc::Xrgb8888), Some(32));
        assert_eq!(get_depth(DrmFourcc::Xrgb8888), Some(24));
        assert_eq!(get_bpp(DrmFourcc::Rgb565), Some(16));
        assert_eq!(get_bpp(DrmFourcc::Nv12), None);
    }

    #[test]
    fn word_size() {
        assert!(is_16bpp(DrmFourcc::Rgb565));
        assert!(!is_16bpp(DrmFourcc::Xrgb8888));
    }
}

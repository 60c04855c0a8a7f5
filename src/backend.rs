//! Buffer allocation and framebuffer registration for scanout.

use std::io;

use drm::buffer::DrmFourcc;
use drm::control::{framebuffer, Device as ControlDevice, FbCmd2Flags};
use gbm::{BufferObject, BufferObjectFlags, Device as GbmDevice, DeviceDestroyedError, Modifier};
use tracing::debug;

use crate::device::{DevPath, DrmDevice, DrmDeviceFd};
use crate::error::{AccessError, Error};
use crate::format;

/// How an allocated buffer will be used by the display controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferUsage {
    /// Regular scanout through a primary or overlay plane
    Scanout,
    /// Scanout through a cursor plane
    Cursor,
}

/// Cpu-visible view of a mapped buffer.
///
/// `offsets` and `pitches` describe all color planes of the format,
/// indices beyond the plane count are zero.
#[derive(Debug)]
pub struct MappedBuffer<'a> {
    pub data: &'a mut [u8],
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    /// Row pitch of the mapping itself
    pub stride: u32,
    pub offsets: [u32; 4],
    pub pitches: [u32; 4],
}

/// Allocation side of the test suite.
///
/// Abstracted out so test sequences can run against an in-memory
/// implementation instead of a real gbm device.
pub trait ScanoutBackend {
    /// Owned buffer handle of this backend
    type Buffer: std::fmt::Debug;

    /// Allocate a buffer suitable for the given usage
    fn create_buffer(
        &mut self,
        width: u32,
        height: u32,
        format: DrmFourcc,
        usage: BufferUsage,
    ) -> io::Result<Self::Buffer>;

    /// Register a framebuffer for the buffer
    fn add_framebuffer(&mut self, buffer: &Self::Buffer) -> io::Result<framebuffer::Handle>;

    /// Drop a framebuffer registration again
    fn destroy_framebuffer(&mut self, fb: framebuffer::Handle) -> io::Result<()>;

    /// Map the buffer and hand a cpu-writable view to the closure
    fn with_mapping(
        &mut self,
        buffer: &mut Self::Buffer,
        f: &mut dyn FnMut(&mut MappedBuffer<'_>),
    ) -> io::Result<()>;
}

/// A buffer allocated from gbm
#[derive(Debug)]
pub struct GbmBuffer {
    bo: BufferObject<()>,
    width: u32,
    height: u32,
    format: DrmFourcc,
}

/// [`ScanoutBackend`] backed by a gbm device on top of the drm node.
#[derive(Debug)]
pub struct GbmScanoutBackend {
    gbm: GbmDevice<DrmDeviceFd>,
    drm: DrmDeviceFd,
}

impl GbmScanoutBackend {
    pub fn new(device: &DrmDevice) -> Result<Self, Error> {
        let drm = device.device_fd();
        let gbm = GbmDevice::new(drm.clone()).map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Failed to initialize gbm device",
                dev: drm.dev_path(),
                source,
            })
        })?;
        Ok(GbmScanoutBackend { gbm, drm })
    }
}

// The accessors fail only once the gbm device itself is gone
fn destroyed(err: DeviceDestroyedError) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

impl ScanoutBackend for GbmScanoutBackend {
    type Buffer = GbmBuffer;

    #[profiling::function]
    fn create_buffer(
        &mut self,
        width: u32,
        height: u32,
        format: DrmFourcc,
        usage: BufferUsage,
    ) -> io::Result<GbmBuffer> {
        // WRITE keeps the buffer cpu-mappable for the fill helpers
        let flags = match usage {
            BufferUsage::Scanout => BufferObjectFlags::SCANOUT | BufferObjectFlags::WRITE,
            BufferUsage::Cursor => BufferObjectFlags::CURSOR | BufferObjectFlags::WRITE,
        };
        let bo = self.gbm.create_buffer_object::<()>(width, height, format, flags)?;
        debug!(width, height, ?format, ?usage, "Allocated buffer");
        Ok(GbmBuffer {
            bo,
            width,
            height,
            format,
        })
    }

    fn add_framebuffer(&mut self, buffer: &GbmBuffer) -> io::Result<framebuffer::Handle> {
        let modifier = buffer.bo.modifier().map_err(destroyed)?;
        let flags = if modifier != Modifier::Invalid && modifier != Modifier::Linear {
            FbCmd2Flags::MODIFIERS
        } else {
            FbCmd2Flags::empty()
        };

        match self.drm.add_planar_framebuffer(&buffer.bo, flags) {
            Ok(fb) => Ok(fb),
            Err(err) => {
                if flags.contains(FbCmd2Flags::MODIFIERS) {
                    return Err(err);
                }
                // Not all drivers support the planar fb api, fall back to
                // the legacy call for formats it can express.
                debug!("Failed to add planar framebuffer, trying legacy method");
                let depth = format::get_depth(buffer.format);
                let bpp = format::get_bpp(buffer.format);
                match (depth, bpp) {
                    (Some(depth), Some(bpp)) => self.drm.add_framebuffer(&buffer.bo, depth, bpp),
                    _ => Err(err),
                }
            }
        }
    }

    fn destroy_framebuffer(&mut self, fb: framebuffer::Handle) -> io::Result<()> {
        self.drm.destroy_framebuffer(fb)
    }

    fn with_mapping(
        &mut self,
        buffer: &mut GbmBuffer,
        f: &mut dyn FnMut(&mut MappedBuffer<'_>),
    ) -> io::Result<()> {
        let (width, height, format) = (buffer.width, buffer.height, buffer.format);

        let mut offsets = [0u32; 4];
        let mut pitches = [0u32; 4];
        let planes = (buffer.bo.plane_count().map_err(destroyed)? as usize).min(4);
        for idx in 0..planes {
            offsets[idx] = buffer.bo.offset(idx as i32).map_err(destroyed)?;
            pitches[idx] = buffer.bo.stride_for_plane(idx as i32).map_err(destroyed)?;
        }

        buffer
            .bo
            .map_mut(&self.gbm, 0, 0, width, height, |mbo| {
                let stride = mbo.stride();
                let mut view = MappedBuffer {
                    data: mbo.buffer_mut(),
                    width,
                    height,
                    format,
                    stride,
                    offsets,
                    pitches,
                };
                f(&mut view);
            })
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?
    }
}

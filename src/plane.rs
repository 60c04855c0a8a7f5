//! Plane lifecycle: bring a plane up with a fresh framebuffer, move it
//! around, take it down again.

use drm::buffer::DrmFourcc;
use drm::control::crtc;
use tracing::{trace, warn};

use crate::backend::{BufferUsage, ScanoutBackend};
use crate::error::Error;
use crate::topology::{BoundFramebuffer, PlaneSlot};
use crate::transaction::Transaction;

/// 16.16 fixed point, the format of the SRC_* plane properties
pub(crate) fn to_fixed(value: u64) -> u64 {
    value << 16
}

/// Stage the full property set of the plane with its current values
pub(crate) fn stage_plane_props<B>(plane: &PlaneSlot<B>, tx: &mut Transaction) {
    let p = &plane.props;
    tx.stage(plane.handle, p.crtc_id.id, p.crtc_id.value);
    tx.stage(plane.handle, p.fb_id.id, p.fb_id.value);
    tx.stage(plane.handle, p.crtc_x.id, p.crtc_x.value);
    tx.stage(plane.handle, p.crtc_y.id, p.crtc_y.value);
    tx.stage(plane.handle, p.crtc_w.id, p.crtc_w.value);
    tx.stage(plane.handle, p.crtc_h.id, p.crtc_h.value);
    tx.stage(plane.handle, p.src_x.id, p.src_x.value);
    tx.stage(plane.handle, p.src_y.id, p.src_y.value);
    tx.stage(plane.handle, p.src_w.id, p.src_w.value);
    tx.stage(plane.handle, p.src_h.id, p.src_h.value);
    if let Some(zpos) = &p.zpos {
        tx.stage(plane.handle, zpos.id, zpos.value);
    }
}

/// Drop the framebuffer and buffer bound to the plane, if any
pub(crate) fn release_framebuffer<Bk: ScanoutBackend>(
    backend: &mut Bk,
    plane: &mut PlaneSlot<Bk::Buffer>,
) {
    if let Some(bound) = plane.fb.take() {
        if let Err(err) = backend.destroy_framebuffer(bound.fb) {
            warn!(plane = ?plane.handle, "Failed to destroy framebuffer: {}", err);
        }
        plane.props.fb_id.value = 0;
    }
}

/// Allocate a buffer for the plane and stage it at the given position.
///
/// The source rectangle always covers the full buffer. Any previously
/// bound framebuffer is released first. Does not commit.
#[allow(clippy::too_many_arguments)]
pub(crate) fn init_plane<Bk: ScanoutBackend>(
    backend: &mut Bk,
    tx: &mut Transaction,
    plane: &mut PlaneSlot<Bk::Buffer>,
    format: DrmFourcc,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    zpos: u64,
    crtc: crtc::Handle,
) -> Result<(), Error> {
    if !plane.formats.contains(&(format as u32)) {
        return Err(Error::UnsupportedFormat {
            plane: plane.handle,
            format,
        });
    }

    release_framebuffer(backend, plane);

    let usage = if plane.kind == drm::control::PlaneType::Cursor {
        BufferUsage::Cursor
    } else {
        BufferUsage::Scanout
    };
    let buffer = backend
        .create_buffer(w, h, format, usage)
        .map_err(|source| Error::BufferAllocationFailed {
            width: w,
            height: h,
            format,
            source,
        })?;
    let fb = backend
        .add_framebuffer(&buffer)
        .map_err(|source| Error::FramebufferCreationFailed {
            plane: plane.handle,
            source,
        })?;

    let props = &mut plane.props;
    props.crtc_x.value = x as u64;
    props.crtc_y.value = y as u64;
    props.crtc_w.value = w as u64;
    props.crtc_h.value = h as u64;
    props.src_x.value = 0;
    props.src_y.value = 0;
    props.src_w.value = to_fixed(props.crtc_w.value);
    props.src_h.value = to_fixed(props.crtc_h.value);
    if let Some(z) = props.zpos.as_mut() {
        z.value = zpos;
    }
    let crtc_raw: u32 = crtc.into();
    let fb_raw: u32 = fb.into();
    props.crtc_id.value = crtc_raw as u64;
    props.fb_id.value = fb_raw as u64;

    plane.fb = Some(BoundFramebuffer { buffer, fb });
    stage_plane_props(plane, tx);
    trace!(plane = ?plane.handle, ?format, x, y, w, h, "Initialized plane");
    Ok(())
}

/// Stage the plane as fully disabled and release its framebuffer.
///
/// Idempotent, disabling an already disabled plane stages zeros again.
pub(crate) fn disable_plane<Bk: ScanoutBackend>(
    backend: &mut Bk,
    tx: &mut Transaction,
    plane: &mut PlaneSlot<Bk::Buffer>,
) {
    let props = &mut plane.props;
    props.crtc_x.value = 0;
    props.crtc_y.value = 0;
    props.crtc_w.value = 0;
    props.crtc_h.value = 0;
    props.src_x.value = 0;
    props.src_y.value = 0;
    props.src_w.value = 0;
    props.src_h.value = 0;
    if let Some(z) = props.zpos.as_mut() {
        z.value = 0;
    }
    props.crtc_id.value = 0;
    props.fb_id.value = 0;

    release_framebuffer(backend, plane);
    stage_plane_props(plane, tx);
}

/// Move the plane by the given delta if it stays inside the crtc.
///
/// Returns `false` once the plane reached the boundary. The check is
/// monotonic, after the first `false` every further call reports the
/// same.
pub(crate) fn move_plane<B>(
    tx: &mut Transaction,
    crtc_width: u64,
    crtc_height: u64,
    plane: &mut PlaneSlot<B>,
    dx: u64,
    dy: u64,
) -> bool {
    let props = &mut plane.props;
    if props.crtc_x.value < crtc_width.saturating_sub(props.crtc_w.value)
        && props.crtc_y.value < crtc_height.saturating_sub(props.crtc_h.value)
    {
        props.crtc_x.value += dx;
        props.crtc_y.value += dy;
        stage_plane_props(plane, tx);
        return true;
    }
    false
}

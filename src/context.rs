//! Ties discovery, staging, allocation and submission together.

use std::io;
use std::thread;
use std::time::Duration;

use drm::buffer::DrmFourcc;
use drm::control::AtomicCommitFlags;
use tracing::debug;

use crate::backend::{MappedBuffer, ScanoutBackend};
use crate::device::AtomicCommitter;
use crate::error::Error;
use crate::pattern;
use crate::plane;
use crate::topology::{CrtcState, Topology};
use crate::transaction::{Checkpoint, Transaction};

/// Delays between committed frames.
///
/// The on-screen output is meant to be watched, animations run at
/// roughly 60 fps and static frames are held for a second.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub frame: Duration,
    pub hold: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            frame: Duration::from_micros(1_000_000 / 60),
            hold: Duration::from_secs(1),
        }
    }
}

impl Pacing {
    /// No delays at all, for driving the engine from tests
    pub fn none() -> Self {
        Pacing {
            frame: Duration::ZERO,
            hold: Duration::ZERO,
        }
    }
}

/// Cumulative atomic state for one device.
///
/// Owns the discovered topology, the staged transaction and the buffer
/// backend. The transaction deliberately survives commits, staging is
/// cumulative and later updates win.
#[derive(Debug)]
pub struct AtomicContext<Bk: ScanoutBackend, C: AtomicCommitter> {
    backend: Bk,
    committer: C,
    pub topology: Topology<Bk::Buffer>,
    tx: Transaction,
    pacing: Pacing,
}

fn stage_crtc_props<B>(crtc: &CrtcState<B>, tx: &mut Transaction) {
    tx.stage(crtc.handle, crtc.props.mode_id.id, crtc.props.mode_id.value);
    tx.stage(crtc.handle, crtc.props.active.id, crtc.props.active.value);
}

impl<Bk: ScanoutBackend, C: AtomicCommitter> AtomicContext<Bk, C> {
    pub fn new(backend: Bk, committer: C, topology: Topology<Bk::Buffer>) -> Self {
        AtomicContext {
            backend,
            committer,
            topology,
            tx: Transaction::new(),
            pacing: Pacing::default(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn transaction(&self) -> &Transaction {
        &self.tx
    }

    pub fn backend(&self) -> &Bk {
        &self.backend
    }

    pub fn committer(&self) -> &C {
        &self.committer
    }

    /// Find a mode the crtc accepts and stage a full modeset to it.
    ///
    /// Starts from an empty transaction: every other crtc is staged
    /// disabled and all connectors are bound to the target. Candidate
    /// modes are tried in discovery order with test-only commits until
    /// the kernel accepts one.
    #[profiling::function]
    pub fn select_mode(&mut self, crtc_idx: usize) -> Result<(), Error> {
        self.tx.clear();
        let Topology {
            connectors,
            crtcs,
            modes,
        } = &mut self.topology;
        let target = crtcs[crtc_idx].handle;
        let target_raw: u32 = target.into();

        for (idx, crtc) in crtcs.iter_mut().enumerate() {
            if idx == crtc_idx {
                continue;
            }
            crtc.props.mode_id.value = 0;
            crtc.props.active.value = 0;
            stage_crtc_props(crtc, &mut self.tx);
        }

        for conn in connectors.iter_mut() {
            if let Some(crtc_id) = conn.props.crtc_id.as_mut() {
                crtc_id.value = target_raw as u64;
                self.tx.stage(conn.handle, crtc_id.id, crtc_id.value);
            }
        }

        let crtc = &mut crtcs[crtc_idx];
        let checkpoint = self.tx.checkpoint();
        for mode in modes.iter() {
            self.tx.rollback(checkpoint);
            crtc.props.mode_id.value = mode.blob;
            crtc.props.active.value = 1;
            crtc.width = mode.width as u32;
            crtc.height = mode.height as u32;
            stage_crtc_props(crtc, &mut self.tx);

            let req = self.tx.build_request();
            match self.committer.commit(
                AtomicCommitFlags::TEST_ONLY | AtomicCommitFlags::ALLOW_MODESET,
                req,
            ) {
                Ok(()) => {
                    debug!(crtc = ?target, width = mode.width, height = mode.height, "Selected mode");
                    return Ok(());
                }
                Err(err) => {
                    debug!(crtc = ?target, width = mode.width, height = mode.height, "Mode rejected: {}", err);
                }
            }
        }

        Err(Error::ModeSelectionExhausted(target))
    }

    /// Commit the staged state and block until the page-flip arrived
    #[profiling::function]
    pub fn commit(&mut self) -> Result<(), Error> {
        let req = self.tx.build_request();
        self.committer.commit(
            AtomicCommitFlags::PAGE_FLIP_EVENT | AtomicCommitFlags::ALLOW_MODESET,
            req,
        )?;
        self.committer.wait_page_flip()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        self.tx.checkpoint()
    }

    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.tx.rollback(checkpoint);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn init_plane(
        &mut self,
        crtc_idx: usize,
        plane_idx: usize,
        format: DrmFourcc,
        x: u32,
        y: u32,
        w: u32,
        h: u32,
        zpos: u64,
    ) -> Result<(), Error> {
        let crtc = &mut self.topology.crtcs[crtc_idx];
        let handle = crtc.handle;
        plane::init_plane(
            &mut self.backend,
            &mut self.tx,
            &mut crtc.planes[plane_idx],
            format,
            x,
            y,
            w,
            h,
            zpos,
            handle,
        )
    }

    pub fn disable_plane(&mut self, crtc_idx: usize, plane_idx: usize) {
        let slot = &mut self.topology.crtcs[crtc_idx].planes[plane_idx];
        plane::disable_plane(&mut self.backend, &mut self.tx, slot);
    }

    /// Returns false once the plane reached the crtc boundary
    pub fn move_plane(&mut self, crtc_idx: usize, plane_idx: usize, dx: u64, dy: u64) -> bool {
        let crtc = &mut self.topology.crtcs[crtc_idx];
        let (w, h) = (crtc.width as u64, crtc.height as u64);
        plane::move_plane(&mut self.tx, w, h, &mut crtc.planes[plane_idx], dx, dy)
    }

    pub fn plane_supports(&self, crtc_idx: usize, plane_idx: usize, format: DrmFourcc) -> bool {
        self.topology.crtcs[crtc_idx].planes[plane_idx]
            .formats
            .contains(&(format as u32))
    }

    fn with_plane_mapping(
        &mut self,
        crtc_idx: usize,
        plane_idx: usize,
        f: &mut dyn FnMut(&mut MappedBuffer<'_>),
    ) -> Result<(), Error> {
        let slot = &mut self.topology.crtcs[crtc_idx].planes[plane_idx];
        let bound = slot.fb.as_mut().ok_or_else(|| {
            Error::MappingFailed(io::Error::new(
                io::ErrorKind::NotFound,
                "plane has no buffer bound",
            ))
        })?;
        self.backend
            .with_mapping(&mut bound.buffer, f)
            .map_err(Error::MappingFailed)
    }

    pub fn fill_solid(
        &mut self,
        crtc_idx: usize,
        plane_idx: usize,
        color32: u32,
        color16: u16,
    ) -> Result<(), Error> {
        self.with_plane_mapping(crtc_idx, plane_idx, &mut |map| {
            pattern::solid_fill(map, color32, color16)
        })
    }

    /// Fails if the bound buffer is not one of the yuv layouts the
    /// stripe pattern can be written into.
    pub fn fill_stripes(&mut self, crtc_idx: usize, plane_idx: usize) -> Result<(), Error> {
        let mut unsupported = None;
        self.with_plane_mapping(crtc_idx, plane_idx, &mut |map| {
            if !pattern::draw_stripes(map) {
                unsupported = Some(map.format);
            }
        })?;
        match unsupported {
            Some(format) => Err(Error::UnsupportedFormat {
                plane: self.topology.crtcs[crtc_idx].planes[plane_idx].handle,
                format,
            }),
            None => Ok(()),
        }
    }

    pub fn fill_cursor(&mut self, crtc_idx: usize, plane_idx: usize) -> Result<(), Error> {
        self.with_plane_mapping(crtc_idx, plane_idx, &mut pattern::draw_cursor)
    }

    /// Release every buffer and framebuffer still bound to a plane
    pub fn release_planes(&mut self) {
        for crtc in self.topology.crtcs.iter_mut() {
            for slot in crtc.planes.iter_mut() {
                plane::release_framebuffer(&mut self.backend, slot);
            }
        }
    }

    pub fn hold(&self) {
        if !self.pacing.hold.is_zero() {
            thread::sleep(self.pacing.hold);
        }
    }

    pub fn frame_delay(&self) {
        if !self.pacing.frame.is_zero() {
            thread::sleep(self.pacing.frame);
        }
    }
}

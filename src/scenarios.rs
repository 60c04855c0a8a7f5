//! The named test scenarios and the per-crtc runner.
//!
//! Each scenario is a sequence of engine operations over one crtc. They
//! are generic over the backend and the committer, the same bodies run
//! on real hardware and against the in-memory doubles.

use std::path::Path;

use drm::buffer::DrmFourcc;
use drm::control::PlaneType;
use tracing::{info, warn};

use crate::backend::{GbmScanoutBackend, ScanoutBackend};
use crate::context::AtomicContext;
use crate::device::{open_device, open_main_display, AtomicCommitter, DrmDevice};
use crate::error::Error;
use crate::topology::Topology;

/// Cursor planes always scan out a fixed 64x64 buffer
pub const CURSOR_SIZE: u32 = 64;

/// Yuv formats the video scenarios try, in order
pub const YUV_FORMATS: [DrmFourcc; 4] = [
    DrmFourcc::Nv12,
    DrmFourcc::Uyvy,
    DrmFourcc::Yuyv,
    DrmFourcc::Yvu420,
];

/// Rgb formats the pageflip scenarios cycle through
const PAGEFLIP_FORMATS: [DrmFourcc; 3] =
    [DrmFourcc::Xrgb8888, DrmFourcc::Xbgr8888, DrmFourcc::Rgb565];

const RED: u32 = 0x00FF0000;
const RED_565: u16 = 0xF800;
const BLUE: u32 = 0x000000FF;

/// A named test scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    DisablePrimary,
    FullscreenVideo,
    MultiplePlanes,
    OverlayPageflip,
    PrimaryPageflip,
    VideoOverlay,
}

impl Scenario {
    pub const ALL: [Scenario; 6] = [
        Scenario::DisablePrimary,
        Scenario::FullscreenVideo,
        Scenario::MultiplePlanes,
        Scenario::OverlayPageflip,
        Scenario::PrimaryPageflip,
        Scenario::VideoOverlay,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::DisablePrimary => "disable_primary",
            Scenario::FullscreenVideo => "fullscreen_video",
            Scenario::MultiplePlanes => "multiple_planes",
            Scenario::OverlayPageflip => "overlay_pageflip",
            Scenario::PrimaryPageflip => "primary_pageflip",
            Scenario::VideoOverlay => "video_overlay",
        }
    }

    pub fn from_name(name: &str) -> Option<Scenario> {
        Scenario::ALL.iter().copied().find(|s| s.name() == name)
    }

    fn run<Bk: ScanoutBackend, C: AtomicCommitter>(
        &self,
        ctx: &mut AtomicContext<Bk, C>,
        crtc_idx: usize,
    ) -> Result<(), Error> {
        match self {
            Scenario::DisablePrimary => disable_primary(ctx, crtc_idx),
            Scenario::FullscreenVideo => fullscreen_video(ctx, crtc_idx),
            Scenario::MultiplePlanes => multiple_planes(ctx, crtc_idx),
            Scenario::OverlayPageflip => overlay_pageflip(ctx, crtc_idx),
            Scenario::PrimaryPageflip => primary_pageflip(ctx, crtc_idx),
            Scenario::VideoOverlay => video_overlay(ctx, crtc_idx),
        }
    }
}

struct Buckets {
    width: u32,
    height: u32,
    primary: Vec<usize>,
    overlay: Vec<usize>,
    cursor: Vec<usize>,
}

fn buckets<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Buckets {
    let crtc = &ctx.topology.crtcs[crtc_idx];
    Buckets {
        width: crtc.width,
        height: crtc.height,
        primary: crtc.primary.clone(),
        overlay: crtc.overlay.clone(),
        cursor: crtc.cursor.clone(),
    }
}

/// Flip the plane once per format, holding each frame.
///
/// All formats must be supported up front, a plane that cannot cycle
/// through the whole list fails the scenario.
fn pageflip<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
    plane_idx: usize,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    zpos: u64,
) -> Result<(), Error> {
    for format in PAGEFLIP_FORMATS {
        if !ctx.plane_supports(crtc_idx, plane_idx, format) {
            return Err(Error::UnsupportedFormat {
                plane: ctx.topology.crtcs[crtc_idx].planes[plane_idx].handle,
                format,
            });
        }
    }

    for format in PAGEFLIP_FORMATS {
        ctx.init_plane(crtc_idx, plane_idx, format, x, y, w, h, zpos)?;
        ctx.fill_solid(crtc_idx, plane_idx, RED, RED_565)?;
        ctx.commit()?;
        ctx.hold();
    }
    Ok(())
}

/// Layer a video overlay, the remaining overlays, all cursors and a
/// primary, animate everything movable to the bottom right, then drop
/// the primary and verify the overlays keep showing.
fn multiple_planes<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Result<(), Error> {
    let b = buckets(ctx, crtc_idx);
    for (i, &primary) in b.primary.iter().enumerate() {
        let mut has_video = false;
        for (j, &overlay) in b.overlay.iter().enumerate() {
            let x = b.width >> (j + 2);
            let y = b.height >> (j + 2);
            let mut added_video = false;
            if !has_video {
                for format in YUV_FORMATS {
                    if ctx
                        .init_plane(crtc_idx, overlay, format, x, y, x, y, j as u64)
                        .is_ok()
                    {
                        has_video = true;
                        added_video = true;
                        ctx.fill_stripes(crtc_idx, overlay)?;
                        break;
                    }
                }
            }
            if !added_video {
                ctx.init_plane(crtc_idx, overlay, DrmFourcc::Xrgb8888, x, y, x, y, i as u64)?;
                ctx.fill_solid(crtc_idx, overlay, RED, 0)?;
            }
        }

        for (j, &cursor) in b.cursor.iter().enumerate() {
            let x = b.width >> (j + 2);
            let y = b.height >> (j + 2);
            ctx.init_plane(
                crtc_idx,
                cursor,
                DrmFourcc::Xrgb8888,
                x,
                y,
                CURSOR_SIZE,
                CURSOR_SIZE,
                (b.overlay.len() + j) as u64,
            )?;
            ctx.fill_cursor(crtc_idx, cursor)?;
        }

        ctx.init_plane(
            crtc_idx,
            primary,
            DrmFourcc::Xrgb8888,
            0,
            0,
            b.width,
            b.height,
            0,
        )?;
        ctx.fill_solid(crtc_idx, primary, BLUE, 0)?;

        let plane_count = ctx.topology.crtcs[crtc_idx].planes.len();
        loop {
            let mut done = true;
            for idx in 0..plane_count {
                if ctx.topology.crtcs[crtc_idx].planes[idx].kind != PlaneType::Primary
                    && ctx.move_plane(crtc_idx, idx, 20, 20)
                {
                    done = false;
                }
            }
            ctx.commit()?;
            ctx.frame_delay();
            if done {
                break;
            }
        }

        ctx.commit()?;
        ctx.hold();

        // Disable the primary plane and verify overlays show up.
        ctx.disable_plane(crtc_idx, primary);
        ctx.commit()?;
        ctx.hold();
    }
    Ok(())
}

/// Walk a yuv overlay across the screen for every supported format
fn video_overlay<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Result<(), Error> {
    let b = buckets(ctx, crtc_idx);
    for &overlay in &b.overlay {
        for format in YUV_FORMATS {
            if ctx
                .init_plane(crtc_idx, overlay, format, 0, 0, 800, 800, 0)
                .is_err()
            {
                continue;
            }
            ctx.fill_stripes(crtc_idx, overlay)?;
            while ctx.move_plane(crtc_idx, overlay, 20, 20) {
                ctx.commit()?;
                ctx.frame_delay();
            }
        }
    }
    Ok(())
}

/// Scan out every supported yuv format fullscreen on the primary plane
fn fullscreen_video<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Result<(), Error> {
    let b = buckets(ctx, crtc_idx);
    for &primary in &b.primary {
        for format in YUV_FORMATS {
            if ctx
                .init_plane(crtc_idx, primary, format, 0, 0, b.width, b.height, 0)
                .is_err()
            {
                continue;
            }
            ctx.fill_stripes(crtc_idx, primary)?;
            ctx.commit()?;
            ctx.hold();
        }
    }
    Ok(())
}

/// Show overlays on top of a primary, then disable the primary and
/// verify the overlays survive on their own
fn disable_primary<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Result<(), Error> {
    let b = buckets(ctx, crtc_idx);
    for (i, &primary) in b.primary.iter().enumerate() {
        for (j, &overlay) in b.overlay.iter().enumerate() {
            let x = b.width >> (j + 2);
            let y = b.height >> (j + 2);
            ctx.init_plane(crtc_idx, overlay, DrmFourcc::Xrgb8888, x, y, x, y, i as u64)?;
            ctx.fill_solid(crtc_idx, overlay, RED, 0)?;
        }

        let checkpoint = ctx.checkpoint();
        ctx.init_plane(
            crtc_idx,
            primary,
            DrmFourcc::Xrgb8888,
            0,
            0,
            b.width,
            b.height,
            0,
        )?;
        ctx.fill_solid(crtc_idx, primary, BLUE, 0)?;
        ctx.commit()?;
        ctx.hold();

        ctx.disable_plane(crtc_idx, primary);
        ctx.commit()?;
        ctx.hold();
        ctx.rollback(checkpoint);
    }
    Ok(())
}

/// Format-cycle every overlay plane at a quarter-ish size
fn overlay_pageflip<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Result<(), Error> {
    let b = buckets(ctx, crtc_idx);
    for (i, &overlay) in b.overlay.iter().enumerate() {
        let x = b.width >> (i + 1);
        let y = b.height >> (i + 1);
        pageflip(ctx, crtc_idx, overlay, x, y, x, y, i as u64)?;
    }
    Ok(())
}

/// Format-cycle every primary plane fullscreen
fn primary_pageflip<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    crtc_idx: usize,
) -> Result<(), Error> {
    let b = buckets(ctx, crtc_idx);
    for &primary in &b.primary {
        let checkpoint = ctx.checkpoint();
        pageflip(ctx, crtc_idx, primary, 0, 0, b.width, b.height, 0)?;
        ctx.rollback(checkpoint);
    }
    Ok(())
}

/// Run the scenario once per crtc of the context.
///
/// A crtc without a usable mode is logged and skipped, the run only
/// fails if a scenario itself fails.
pub fn run_scenario<Bk: ScanoutBackend, C: AtomicCommitter>(
    ctx: &mut AtomicContext<Bk, C>,
    scenario: Scenario,
) -> Result<(), Error> {
    let result = (|| {
        for crtc_idx in 0..ctx.topology.crtcs.len() {
            match ctx.select_mode(crtc_idx) {
                Ok(()) => scenario.run(ctx, crtc_idx)?,
                Err(Error::ModeSelectionExhausted(crtc)) => {
                    warn!(?crtc, "No usable mode, skipping crtc");
                    continue;
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    })();
    ctx.release_planes();
    result
}

/// Open the display, discover its topology and run the scenario on it
pub fn run_on_device(scenario: Scenario, card: Option<&Path>) -> Result<(), Error> {
    let device = match card {
        Some(path) => DrmDevice::new(open_device(path)?)?,
        None => open_main_display()?,
    };
    let backend = GbmScanoutBackend::new(&device)?;
    let topology = Topology::discover(&device)?;
    info!(scenario = scenario.name(), "Starting test");
    let mut ctx = AtomicContext::new(backend, device, topology);
    run_scenario(&mut ctx, scenario)
}

//! In-memory doubles for the buffer backend and the commit path.

use std::collections::VecDeque;
use std::io;
use std::num::NonZeroU32;

use drm::buffer::DrmFourcc;
use drm::control::atomic::AtomicModeReq;
use drm::control::{connector, crtc, framebuffer, plane, property, AtomicCommitFlags, PlaneType};

use crate::backend::{BufferUsage, MappedBuffer, ScanoutBackend};
use crate::device::AtomicCommitter;
use crate::error::{AccessError, Error};
use crate::properties::{ConnectorProps, CrtcProps, PlaneProps, Prop};
use crate::topology::{ConnectorState, CrtcState, ModeBlob, PlaneSlot, Topology};

pub fn crtc_handle(id: u32) -> crtc::Handle {
    crtc::Handle::from(NonZeroU32::new(id).unwrap())
}

pub fn plane_handle(id: u32) -> plane::Handle {
    plane::Handle::from(NonZeroU32::new(id).unwrap())
}

pub fn connector_handle(id: u32) -> connector::Handle {
    connector::Handle::from(NonZeroU32::new(id).unwrap())
}

pub fn prop(id: u32) -> Prop {
    Prop {
        id: property::Handle::from(NonZeroU32::new(id).unwrap()),
        value: 0,
    }
}

fn plane_props(base: u32) -> PlaneProps {
    PlaneProps {
        crtc_id: prop(base),
        fb_id: prop(base + 1),
        crtc_x: prop(base + 2),
        crtc_y: prop(base + 3),
        crtc_w: prop(base + 4),
        crtc_h: prop(base + 5),
        src_x: prop(base + 6),
        src_y: prop(base + 7),
        src_w: prop(base + 8),
        src_h: prop(base + 9),
        type_: prop(base + 10),
        zpos: None,
    }
}

pub fn mock_plane_slot(id: u32, kind: PlaneType, formats: &[DrmFourcc]) -> PlaneSlot<MockBuffer> {
    PlaneSlot {
        handle: plane_handle(id),
        kind,
        formats: formats.iter().map(|f| *f as u32).collect(),
        props: plane_props(id * 100 + 1),
        fb: None,
    }
}

/// Formats the mock planes advertise, covering every format the test
/// scenarios stage.
pub const MOCK_FORMATS: [DrmFourcc; 7] = [
    DrmFourcc::Xrgb8888,
    DrmFourcc::Xbgr8888,
    DrmFourcc::Rgb565,
    DrmFourcc::Nv12,
    DrmFourcc::Uyvy,
    DrmFourcc::Yuyv,
    DrmFourcc::Yvu420,
];

/// A topology with one connector and `num_crtcs` crtcs, each carrying a
/// primary, an overlay and a cursor plane that advertise [`MOCK_FORMATS`].
pub fn mock_topology(num_crtcs: usize, modes: &[(u16, u16)]) -> Topology<MockBuffer> {
    let mut crtcs = Vec::new();
    for i in 0..num_crtcs as u32 {
        let mut crtc = CrtcState::new(
            crtc_handle(100 + i),
            CrtcProps {
                mode_id: prop(8000 + i * 2),
                active: prop(8001 + i * 2),
            },
        );
        crtc.add_plane(mock_plane_slot(i * 10 + 1, PlaneType::Primary, &MOCK_FORMATS));
        crtc.add_plane(mock_plane_slot(i * 10 + 2, PlaneType::Overlay, &MOCK_FORMATS));
        crtc.add_plane(mock_plane_slot(i * 10 + 3, PlaneType::Cursor, &MOCK_FORMATS));
        crtcs.push(crtc);
    }

    let connectors = vec![ConnectorState {
        handle: connector_handle(900),
        props: ConnectorProps {
            edid: prop(9000),
            dpms: prop(9001),
            crtc_id: Some(prop(9002)),
        },
    }];

    let modes = modes
        .iter()
        .enumerate()
        .map(|(idx, &(width, height))| ModeBlob {
            width,
            height,
            blob: 1000 + idx as u64,
        })
        .collect();

    Topology {
        connectors,
        crtcs,
        modes,
    }
}

#[derive(Debug)]
pub struct MockBuffer {
    pub width: u32,
    pub height: u32,
    pub format: DrmFourcc,
    pub data: Vec<u8>,
}

fn buffer_layout(width: u32, height: u32, format: DrmFourcc) -> (u32, [u32; 4], [u32; 4], usize) {
    match format {
        DrmFourcc::Nv12 => (
            width,
            [0, width * height, 0, 0],
            [width, width, 0, 0],
            (width * height * 3 / 2) as usize,
        ),
        DrmFourcc::Yvu420 => {
            let luma = width * height;
            (
                width,
                [0, luma, luma + luma / 4, 0],
                [width, width / 2, width / 2, 0],
                (luma * 3 / 2) as usize,
            )
        }
        DrmFourcc::Yuyv | DrmFourcc::Uyvy | DrmFourcc::Rgb565 | DrmFourcc::Bgr565 => (
            width * 2,
            [0; 4],
            [width * 2, 0, 0, 0],
            (width * height * 2) as usize,
        ),
        _ => (
            width * 4,
            [0; 4],
            [width * 4, 0, 0, 0],
            (width * height * 4) as usize,
        ),
    }
}

/// Recording [`ScanoutBackend`] double
#[derive(Debug, Default)]
pub struct MockBackend {
    pub allocations: Vec<(u32, u32, DrmFourcc, BufferUsage)>,
    pub live_framebuffers: Vec<u32>,
    pub destroyed_framebuffers: u32,
    next_fb: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScanoutBackend for MockBackend {
    type Buffer = MockBuffer;

    fn create_buffer(
        &mut self,
        width: u32,
        height: u32,
        format: DrmFourcc,
        usage: BufferUsage,
    ) -> io::Result<MockBuffer> {
        self.allocations.push((width, height, format, usage));
        let (_, _, _, size) = buffer_layout(width, height, format);
        Ok(MockBuffer {
            width,
            height,
            format,
            data: vec![0; size],
        })
    }

    fn add_framebuffer(&mut self, _buffer: &MockBuffer) -> io::Result<framebuffer::Handle> {
        self.next_fb += 1;
        self.live_framebuffers.push(self.next_fb);
        Ok(framebuffer::Handle::from(
            NonZeroU32::new(self.next_fb).unwrap(),
        ))
    }

    fn destroy_framebuffer(&mut self, fb: framebuffer::Handle) -> io::Result<()> {
        let raw: u32 = fb.into();
        self.live_framebuffers.retain(|&id| id != raw);
        self.destroyed_framebuffers += 1;
        Ok(())
    }

    fn with_mapping(
        &mut self,
        buffer: &mut MockBuffer,
        f: &mut dyn FnMut(&mut MappedBuffer<'_>),
    ) -> io::Result<()> {
        let (stride, offsets, pitches, _) =
            buffer_layout(buffer.width, buffer.height, buffer.format);
        let mut view = MappedBuffer {
            data: &mut buffer.data,
            width: buffer.width,
            height: buffer.height,
            format: buffer.format,
            stride,
            offsets,
            pitches,
        };
        f(&mut view);
        Ok(())
    }
}

/// Recording [`AtomicCommitter`] double.
///
/// Test-only commits pop their result off `test_script`, front first.
/// A drained script accepts everything.
#[derive(Debug, Default)]
pub struct MockCommitter {
    pub commits: Vec<AtomicCommitFlags>,
    pub flips: u32,
    pub test_script: VecDeque<bool>,
}

impl MockCommitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: &[bool]) -> Self {
        MockCommitter {
            test_script: script.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl AtomicCommitter for MockCommitter {
    fn commit(&mut self, flags: AtomicCommitFlags, _req: AtomicModeReq) -> Result<(), Error> {
        self.commits.push(flags);
        if flags.contains(AtomicCommitFlags::TEST_ONLY) {
            if let Some(accepted) = self.test_script.pop_front() {
                if !accepted {
                    return Err(Error::Access(AccessError {
                        errmsg: "Atomic commit rejected",
                        dev: None,
                        source: io::Error::from_raw_os_error(22),
                    }));
                }
            }
        }
        Ok(())
    }

    fn wait_page_flip(&mut self) -> Result<(), Error> {
        self.flips += 1;
        Ok(())
    }
}

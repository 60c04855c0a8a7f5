//! Discovery of the display resources a device exposes.
//!
//! Atomic commits only ever reference properties, so everything needed
//! later (connectors, crtcs, the planes legal on each crtc and a blob
//! for every advertised mode) is resolved up front, exactly once.

use drm::control::{connector, crtc, framebuffer, plane, Device as ControlDevice, PlaneType};
use tracing::{debug, trace};

use crate::device::{DevPath, DrmDevice};
use crate::error::{AccessError, Error};
use crate::properties::{ConnectorProps, CrtcProps, PlaneProps, PropSnapshot};

/// A display mode registered with the kernel as a property blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeBlob {
    pub width: u16,
    pub height: u16,
    /// Kernel blob id, staged as the value of `MODE_ID`
    pub blob: u64,
}

/// A connector and its resolved properties
#[derive(Debug)]
pub struct ConnectorState {
    pub handle: connector::Handle,
    pub props: ConnectorProps,
}

/// A buffer together with its framebuffer registration.
///
/// The two always travel together, a slot either has both or neither.
#[derive(Debug)]
pub struct BoundFramebuffer<B> {
    pub buffer: B,
    pub fb: framebuffer::Handle,
}

/// One plane as usable on one specific crtc.
///
/// Planes legal on several crtcs show up as a slot in each of them.
#[derive(Debug)]
pub struct PlaneSlot<B> {
    pub handle: plane::Handle,
    pub kind: PlaneType,
    pub formats: Vec<u32>,
    pub props: PlaneProps,
    pub fb: Option<BoundFramebuffer<B>>,
}

/// A crtc, its resolved properties and its plane buckets.
///
/// `primary`, `overlay` and `cursor` index into `planes`, every slot is
/// in exactly one of them. `width`/`height` are zero until a mode was
/// selected for this crtc.
#[derive(Debug)]
pub struct CrtcState<B> {
    pub handle: crtc::Handle,
    pub props: CrtcProps,
    pub width: u32,
    pub height: u32,
    pub planes: Vec<PlaneSlot<B>>,
    pub primary: Vec<usize>,
    pub overlay: Vec<usize>,
    pub cursor: Vec<usize>,
}

impl<B> CrtcState<B> {
    pub(crate) fn new(handle: crtc::Handle, props: CrtcProps) -> Self {
        CrtcState {
            handle,
            props,
            width: 0,
            height: 0,
            planes: Vec::new(),
            primary: Vec::new(),
            overlay: Vec::new(),
            cursor: Vec::new(),
        }
    }

    /// Append a plane slot and file it in the bucket matching its kind
    pub(crate) fn add_plane(&mut self, slot: PlaneSlot<B>) {
        let idx = self.planes.len();
        match slot.kind {
            PlaneType::Primary => self.primary.push(idx),
            PlaneType::Overlay => self.overlay.push(idx),
            PlaneType::Cursor => self.cursor.push(idx),
        }
        self.planes.push(slot);
    }
}

/// Everything discovered on a device
#[derive(Debug)]
pub struct Topology<B> {
    pub connectors: Vec<ConnectorState>,
    pub crtcs: Vec<CrtcState<B>>,
    /// Modes of all connectors, in discovery order
    pub modes: Vec<ModeBlob>,
}

fn plane_kind(value: u64) -> Result<PlaneType, Error> {
    match value {
        0 => Ok(PlaneType::Overlay),
        1 => Ok(PlaneType::Primary),
        2 => Ok(PlaneType::Cursor),
        other => Err(Error::InvalidPlaneType(other)),
    }
}

impl<B> Topology<B> {
    #[profiling::function]
    pub fn discover(device: &DrmDevice) -> Result<Self, Error> {
        let _guard = device.span().enter();

        let resources = device.resource_handles().map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error loading drm resources",
                dev: device.dev_path(),
                source,
            })
        })?;

        let mut modes = Vec::new();
        let mut connectors = Vec::new();
        for &conn in resources.connectors() {
            let snap = PropSnapshot::read(device, conn)?;
            let props = ConnectorProps::from_snapshot(&snap)?;

            let info = device.get_connector(conn, false).map_err(|source| {
                Error::Access(AccessError {
                    errmsg: "Error loading connector info",
                    dev: device.dev_path(),
                    source,
                })
            })?;
            for mode in info.modes() {
                let blob: u64 = device.create_property_blob(mode).map_err(|source| {
                    Error::Access(AccessError {
                        errmsg: "Error creating mode property blob",
                        dev: device.dev_path(),
                        source,
                    })
                })?
                .into();
                let (width, height) = mode.size();
                modes.push(ModeBlob { width, height, blob });
            }

            connectors.push(ConnectorState { handle: conn, props });
        }
        debug!(
            connectors = connectors.len(),
            modes = modes.len(),
            "Enumerated connectors"
        );

        let mut crtcs = Vec::new();
        for &crtc in resources.crtcs() {
            let snap = PropSnapshot::read(device, crtc)?;
            let props = CrtcProps::from_snapshot(&snap)?;
            crtcs.push(CrtcState::new(crtc, props));
        }

        let plane_handles = device.plane_handles().map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error loading planes",
                dev: device.dev_path(),
                source,
            })
        })?;

        for plane in plane_handles {
            let info = device.get_plane(plane).map_err(|source| {
                Error::Access(AccessError {
                    errmsg: "Error loading plane info",
                    dev: device.dev_path(),
                    source,
                })
            })?;
            let snap = PropSnapshot::read(device, plane)?;
            let props = PlaneProps::from_snapshot(&snap)?;
            let kind = plane_kind(props.type_.value)?;

            let legal_crtcs = resources.filter_crtcs(info.possible_crtcs());
            trace!(?plane, ?kind, crtcs = legal_crtcs.len(), "Mapped plane");
            for crtc_state in crtcs.iter_mut() {
                if !legal_crtcs.contains(&crtc_state.handle) {
                    continue;
                }
                crtc_state.add_plane(PlaneSlot {
                    handle: plane,
                    kind,
                    formats: info.formats().to_vec(),
                    props: props.clone(),
                    fb: None,
                });
            }
        }

        // Old kernels (around v4.4) do not expose CRTC_ID on the
        // connector object, borrow the property handle of the first
        // plane instead. The kernel accepts it for connectors too.
        let borrowed = crtcs
            .first()
            .and_then(|crtc| crtc.planes.first())
            .map(|plane| plane.props.crtc_id);
        if let Some(crtc_id) = borrowed {
            for connector in connectors.iter_mut() {
                connector.props.crtc_id = Some(crtc_id);
            }
        }

        Ok(Topology {
            connectors,
            crtcs,
            modes,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use drm::control::property;

    use super::*;
    use crate::properties::Prop;

    fn prop(id: u32) -> Prop {
        Prop {
            id: property::Handle::from(NonZeroU32::new(id).unwrap()),
            value: 0,
        }
    }

    fn plane_props() -> PlaneProps {
        PlaneProps {
            crtc_id: prop(1),
            fb_id: prop(2),
            crtc_x: prop(3),
            crtc_y: prop(4),
            crtc_w: prop(5),
            crtc_h: prop(6),
            src_x: prop(7),
            src_y: prop(8),
            src_w: prop(9),
            src_h: prop(10),
            type_: prop(11),
            zpos: None,
        }
    }

    fn slot(id: u32, kind: PlaneType) -> PlaneSlot<()> {
        PlaneSlot {
            handle: plane::Handle::from(NonZeroU32::new(id).unwrap()),
            kind,
            formats: Vec::new(),
            props: plane_props(),
            fb: None,
        }
    }

    fn crtc_state() -> CrtcState<()> {
        CrtcState::new(
            crtc::Handle::from(NonZeroU32::new(100).unwrap()),
            CrtcProps {
                mode_id: prop(20),
                active: prop(21),
            },
        )
    }

    #[test]
    fn plane_kinds_map_to_buckets() {
        let mut crtc = crtc_state();
        crtc.add_plane(slot(1, PlaneType::Primary));
        crtc.add_plane(slot(2, PlaneType::Overlay));
        crtc.add_plane(slot(3, PlaneType::Cursor));
        crtc.add_plane(slot(4, PlaneType::Overlay));

        assert_eq!(crtc.primary, vec![0]);
        assert_eq!(crtc.overlay, vec![1, 3]);
        assert_eq!(crtc.cursor, vec![2]);

        // every slot lands in exactly one bucket
        let mut all: Vec<usize> = crtc
            .primary
            .iter()
            .chain(&crtc.overlay)
            .chain(&crtc.cursor)
            .copied()
            .collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn invalid_plane_type_is_rejected() {
        assert!(matches!(plane_kind(0), Ok(PlaneType::Overlay)));
        assert!(matches!(plane_kind(1), Ok(PlaneType::Primary)));
        assert!(matches!(plane_kind(2), Ok(PlaneType::Cursor)));
        assert!(matches!(plane_kind(3), Err(Error::InvalidPlaneType(3))));
    }
}

//! Property discovery for atomic commits.
//!
//! Everything in the atomic api is set via properties, and the
//! name-to-handle mapping is not consistent across devices. Each object
//! is probed exactly once and the handles (together with the value seen
//! at discovery time) are cached, no string lookup happens afterwards.

use std::collections::HashMap;

use drm::control::{property, Device as ControlDevice, RawResourceHandle, ResourceHandle};

use crate::device::DevPath;
use crate::error::{AccessError, Error};

/// A resolved property of one kernel object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prop {
    /// Property handle
    pub id: property::Handle,
    /// Value of the property when the object was probed
    pub value: property::RawValue,
}

/// All properties of a single object, keyed by name.
#[derive(Debug)]
pub(crate) struct PropSnapshot {
    object: RawResourceHandle,
    map: HashMap<String, Prop>,
}

impl PropSnapshot {
    pub fn read<D, T>(dev: &D, handle: T) -> Result<Self, Error>
    where
        D: ControlDevice + DevPath,
        T: ResourceHandle,
    {
        let props = dev.get_properties(handle).map_err(|source| {
            Error::Access(AccessError {
                errmsg: "Error reading properties",
                dev: dev.dev_path(),
                source,
            })
        })?;

        let (prop_handles, values) = props.as_props_and_values();
        let mut map = HashMap::with_capacity(prop_handles.len());
        for (&prop, &value) in prop_handles.iter().zip(values.iter()) {
            if let Ok(info) = dev.get_property(prop) {
                let name = info.name().to_string_lossy().into_owned();
                map.insert(name, Prop { id: prop, value });
            }
        }

        Ok(PropSnapshot {
            object: handle.into(),
            map,
        })
    }

    pub fn require(&self, name: &'static str) -> Result<Prop, Error> {
        self.map.get(name).copied().ok_or(Error::UnknownProperty {
            object: self.object,
            name,
        })
    }

    pub fn get(&self, name: &str) -> Option<Prop> {
        self.map.get(name).copied()
    }
}

/// Connector properties used by the test suite.
///
/// `EDID` and `DPMS` are required to exist but are never staged in a
/// commit, the kernel rejects atomic requests that set them.
#[derive(Debug, Clone)]
pub struct ConnectorProps {
    pub edid: Prop,
    pub dpms: Prop,
    /// Binding of the connector to a crtc.
    ///
    /// The property *handle* is borrowed from the first plane's `CRTC_ID`
    /// after plane discovery, kernels around v4.4 do not expose it on the
    /// connector itself. `None` only on devices without any plane.
    pub crtc_id: Option<Prop>,
}

impl ConnectorProps {
    pub(crate) fn from_snapshot(snap: &PropSnapshot) -> Result<Self, Error> {
        Ok(ConnectorProps {
            edid: snap.require("EDID")?,
            dpms: snap.require("DPMS")?,
            crtc_id: None,
        })
    }
}

/// Crtc properties used by the test suite.
#[derive(Debug, Clone)]
pub struct CrtcProps {
    pub mode_id: Prop,
    pub active: Prop,
}

impl CrtcProps {
    pub(crate) fn from_snapshot(snap: &PropSnapshot) -> Result<Self, Error> {
        Ok(CrtcProps {
            mode_id: snap.require("MODE_ID")?,
            active: snap.require("ACTIVE")?,
        })
    }
}

/// Plane properties used by the test suite.
#[derive(Debug, Clone)]
pub struct PlaneProps {
    pub crtc_id: Prop,
    pub fb_id: Prop,
    pub crtc_x: Prop,
    pub crtc_y: Prop,
    pub crtc_w: Prop,
    pub crtc_h: Prop,
    pub src_x: Prop,
    pub src_y: Prop,
    pub src_w: Prop,
    pub src_h: Prop,
    pub type_: Prop,
    /// Not all drivers expose a z-order property, staged only if present
    pub zpos: Option<Prop>,
}

impl PlaneProps {
    pub(crate) fn from_snapshot(snap: &PropSnapshot) -> Result<Self, Error> {
        Ok(PlaneProps {
            crtc_id: snap.require("CRTC_ID")?,
            fb_id: snap.require("FB_ID")?,
            crtc_x: snap.require("CRTC_X")?,
            crtc_y: snap.require("CRTC_Y")?,
            crtc_w: snap.require("CRTC_W")?,
            crtc_h: snap.require("CRTC_H")?,
            src_x: snap.require("SRC_X")?,
            src_y: snap.require("SRC_Y")?,
            src_w: snap.require("SRC_W")?,
            src_h: snap.require("SRC_H")?,
            type_: snap.require("type")?,
            zpos: snap.get("zpos"),
        })
    }
}

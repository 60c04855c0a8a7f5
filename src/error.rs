use std::io;
use std::path::PathBuf;

use drm::control::{crtc, plane, RawResourceHandle};
use drm_fourcc::DrmFourcc;

/// Errors thrown by the [`DrmDevice`](crate::device::DrmDevice) and the
/// atomic test machinery built on top of it.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The device encountered an access error
    #[error("DRM access error: {0}")]
    Access(#[from] AccessError),
    /// No usable DRM card node with a connected display was found
    #[error("No DRM device with a connected connector found")]
    NoDevice,
    /// A kernel object is missing a property required for atomic commits
    #[error("Device is missing a required property '{name}' for handle ({object:?})")]
    UnknownProperty {
        /// Raw handle of the object that was probed
        object: RawResourceHandle,
        /// Property name
        name: &'static str,
    },
    /// The kernel reported a plane type outside of overlay/primary/cursor
    #[error("Plane reported an invalid type value ({0})")]
    InvalidPlaneType(u64),
    /// The plane does not advertise the requested format
    #[error("Plane `{plane:?}` does not support format {format}")]
    UnsupportedFormat {
        /// Plane that was probed
        plane: plane::Handle,
        /// Requested format
        format: DrmFourcc,
    },
    /// Creating a framebuffer for a freshly allocated buffer failed
    #[error("Failed to create a framebuffer for plane `{plane:?}`")]
    FramebufferCreationFailed {
        /// Plane the buffer was allocated for
        plane: plane::Handle,
        /// Underlying device error
        #[source]
        source: io::Error,
    },
    /// Allocating a buffer through the scanout backend failed
    #[error("Failed to allocate a {width}x{height} buffer ({format})")]
    BufferAllocationFailed {
        /// Requested width
        width: u32,
        /// Requested height
        height: u32,
        /// Requested format
        format: DrmFourcc,
        /// Underlying allocator error
        #[source]
        source: io::Error,
    },
    /// No candidate mode of the crtc passed a test-only commit
    #[error("No mode of crtc `{0:?}` passed a test-only atomic commit")]
    ModeSelectionExhausted(crtc::Handle),
    /// Mapping a buffer for cpu access failed
    #[error("Failed to map buffer for writing")]
    MappingFailed(#[source] io::Error),
}

/// Errors when accessing the underlying device
#[derive(Debug, thiserror::Error)]
#[error("{errmsg} on device `{dev:?}`")]
pub struct AccessError {
    /// Error message associated to the access error
    pub errmsg: &'static str,
    /// Device on which the error was generated
    pub dev: Option<PathBuf>,
    /// Underlying device error
    #[source]
    pub source: io::Error,
}

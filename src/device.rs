//! Open DRM device nodes and drive atomic commits on them.

use std::fs::{self, File};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use drm::control::atomic::AtomicModeReq;
use drm::control::{connector, AtomicCommitFlags, Device as ControlDevice, Event};
use drm::{ClientCapability, Device as BasicDevice};
use rustix::event::{poll, PollFd, PollFlags};
use tracing::{debug, info, trace, warn};

use crate::error::{AccessError, Error};

#[derive(Debug)]
struct InternalDrmDeviceFd {
    fd: OwnedFd,
    privileged: bool,
}

impl Drop for InternalDrmDeviceFd {
    fn drop(&mut self) {
        info!("Dropping device: {:?}", self.dev_path());
        if self.privileged {
            if let Err(err) = self.release_master_lock() {
                tracing::error!("Failed to drop drm master state: {}", err);
            }
        }
    }
}

impl AsFd for InternalDrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
impl BasicDevice for InternalDrmDeviceFd {}
impl ControlDevice for InternalDrmDeviceFd {}

/// Trait representing open devices that *may* return a `Path`
pub trait DevPath {
    /// Returns the path of the open device if possible
    fn dev_path(&self) -> Option<PathBuf>;
}

impl<A: AsFd> DevPath for A {
    fn dev_path(&self) -> Option<PathBuf> {
        fs::read_link(format!("/proc/self/fd/{:?}", self.as_fd().as_raw_fd())).ok()
    }
}

/// Ref-counted file descriptor of an open drm device
#[derive(Debug, Clone)]
pub struct DrmDeviceFd(Arc<InternalDrmDeviceFd>);

impl AsFd for DrmDeviceFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.fd.as_fd()
    }
}

impl AsRawFd for DrmDeviceFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0.fd.as_raw_fd()
    }
}

impl BasicDevice for DrmDeviceFd {}
impl ControlDevice for DrmDeviceFd {}

impl DrmDeviceFd {
    /// Create a new `DrmDeviceFd`.
    ///
    /// Tries to acquire the drm master lock and releases it again on drop.
    /// Never create multiple `DrmDeviceFd` out of the same device node,
    /// clone the `DrmDeviceFd` instead.
    pub fn new(fd: OwnedFd) -> DrmDeviceFd {
        let mut dev = InternalDrmDeviceFd {
            fd,
            privileged: false,
        };

        // We want to modeset, so we better be the master, if we run via a tty session.
        // This is only needed on older kernels. Newer kernels grant this permission,
        // if no other process is already the *master*. So we skip over this error.
        if dev.acquire_master_lock().is_err() {
            warn!("Unable to become drm master, assuming unprivileged mode");
        } else {
            dev.privileged = true;
        }

        DrmDeviceFd(Arc::new(dev))
    }
}

/// An open drm device prepared for atomic modesetting.
#[derive(Debug)]
pub struct DrmDevice {
    fd: DrmDeviceFd,
    span: tracing::Span,
}

impl DrmDevice {
    /// Wrap an open device node and enable the client capabilities atomic
    /// commits require.
    pub fn new(fd: DrmDeviceFd) -> Result<Self, Error> {
        let span = tracing::info_span!("drm_device", device = ?fd.dev_path());

        for cap in [ClientCapability::UniversalPlanes, ClientCapability::Atomic] {
            fd.set_client_capability(cap, true)
                .map_err(|source| AccessError {
                    errmsg: "Error enabling client capability",
                    dev: fd.dev_path(),
                    source,
                })?;
        }

        Ok(DrmDevice { fd, span })
    }

    /// Returns a clonable handle to the underlying device fd
    pub fn device_fd(&self) -> DrmDeviceFd {
        self.fd.clone()
    }

    pub(crate) fn span(&self) -> &tracing::Span {
        &self.span
    }
}

impl AsFd for DrmDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}
impl BasicDevice for DrmDevice {}
impl ControlDevice for DrmDevice {}

/// Submission side of atomic modesetting.
///
/// Abstracted out so test sequences can run against a scripted
/// implementation instead of real hardware.
pub trait AtomicCommitter {
    /// Submit an atomic request with the given flags
    fn commit(&mut self, flags: AtomicCommitFlags, req: AtomicModeReq) -> Result<(), Error>;

    /// Block until the page-flip event of the last committed frame arrives
    fn wait_page_flip(&mut self) -> Result<(), Error>;
}

impl AtomicCommitter for DrmDevice {
    #[profiling::function]
    fn commit(&mut self, flags: AtomicCommitFlags, req: AtomicModeReq) -> Result<(), Error> {
        let _guard = self.span.enter();
        trace!(?flags, "Submitting atomic commit");
        self.fd
            .atomic_commit(flags, req)
            .map_err(|source| Error::Access(AccessError {
                errmsg: "Error submitting atomic commit",
                dev: self.dev_path(),
                source,
            }))
    }

    fn wait_page_flip(&mut self) -> Result<(), Error> {
        let _guard = self.span.enter();
        loop {
            let mut fds = [PollFd::new(&self.fd, PollFlags::IN)];
            match poll(&mut fds, -1) {
                Ok(_) => {}
                // A signal may land while we are parked on the device fd
                Err(rustix::io::Errno::INTR) => continue,
                Err(err) => {
                    return Err(Error::Access(AccessError {
                        errmsg: "Error waiting on the device fd",
                        dev: self.dev_path(),
                        source: err.into(),
                    }))
                }
            }

            let events = self.fd.receive_events().map_err(|source| {
                Error::Access(AccessError {
                    errmsg: "Error reading drm events",
                    dev: self.dev_path(),
                    source,
                })
            })?;
            for event in events {
                if let Event::PageFlip(flip) = event {
                    trace!(crtc = ?flip.crtc, frame = flip.frame, "Page-flip completed");
                    return Ok(());
                }
            }
        }
    }
}

/// Open a drm device node read-write.
pub fn open_device(path: &Path) -> Result<DrmDeviceFd, Error> {
    let file = File::options()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| AccessError {
            errmsg: "Error opening device node",
            dev: Some(path.to_owned()),
            source,
        })?;
    Ok(DrmDeviceFd::new(file.into()))
}

/// Scanout priority of a connector type, lower is better.
///
/// Internal panels win over external connectors, so on a laptop with
/// an external monitor attached the tests run on the built-in display.
fn connector_rank(interface: connector::Interface) -> u32 {
    match interface {
        connector::Interface::LVDS
        | connector::Interface::EmbeddedDisplayPort
        | connector::Interface::DSI => 0,
        _ => 1,
    }
}

/// Open the main display of the system.
///
/// Scans the card nodes under `/dev/dri` and picks the device with the
/// best-ranked connected connector, preferring internal panels. Card
/// order breaks ties.
pub fn open_main_display() -> Result<DrmDevice, Error> {
    let mut cards = match fs::read_dir("/dev/dri") {
        Ok(dir) => dir
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| name.starts_with("card"))
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>(),
        Err(err) => {
            warn!("Unable to enumerate /dev/dri: {}", err);
            Vec::new()
        }
    };
    cards.sort();

    let mut best: Option<(u32, DrmDevice)> = None;
    for path in cards {
        let fd = match open_device(&path) {
            Ok(fd) => fd,
            Err(err) => {
                debug!("Skipping {:?}: {}", path, err);
                continue;
            }
        };
        let device = match DrmDevice::new(fd) {
            Ok(device) => device,
            Err(err) => {
                debug!("Skipping {:?}: {}", path, err);
                continue;
            }
        };
        let Some(rank) = best_connected_rank(&device) else {
            debug!("Skipping {:?}: no connected connector", path);
            continue;
        };
        if best.as_ref().map_or(true, |(r, _)| rank < *r) {
            info!(rank, "Candidate device {:?}", path);
            best = Some((rank, device));
        }
        if matches!(best, Some((0, _))) {
            break;
        }
    }

    best.map(|(_, device)| device).ok_or(Error::NoDevice)
}

/// Best [`connector_rank`] among the connected connectors, if any
fn best_connected_rank(device: &DrmDevice) -> Option<u32> {
    let resources = device.resource_handles().ok()?;
    resources
        .connectors()
        .iter()
        .filter_map(|conn| device.get_connector(*conn, false).ok())
        .filter(|info| info.state() == connector::State::Connected)
        .map(|info| connector_rank(info.interface()))
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_panels_rank_before_external_connectors() {
        for internal in [
            connector::Interface::LVDS,
            connector::Interface::EmbeddedDisplayPort,
            connector::Interface::DSI,
        ] {
            for external in [
                connector::Interface::HDMIA,
                connector::Interface::DisplayPort,
                connector::Interface::VGA,
                connector::Interface::Unknown,
            ] {
                assert!(connector_rank(internal) < connector_rank(external));
            }
        }
    }
}

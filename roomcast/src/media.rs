//! Local media capture seam.
//!
//! Acquiring camera and microphone tracks is delegated to the host
//! application through the [`MediaSource`] trait; the session only needs
//! an opaque handle to attach to the peer transport. A failed acquire is
//! reported to the caller and never tears down the signaling connection.

use std::future::Future;

/// Opaque handle to a set of captured local tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTracks {
    labels: Vec<String>,
}

impl MediaTracks {
    /// Wraps a set of track labels.
    #[must_use]
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// Number of captured tracks.
    #[must_use]
    pub fn track_count(&self) -> usize {
        self.labels.len()
    }

    /// Track labels, for diagnostics.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Errors from local device or permission failures.
#[derive(Debug, thiserror::Error)]
pub enum MediaAccessError {
    /// The requested capture device does not exist or is busy.
    #[error("media device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The user or platform denied capture permission.
    #[error("media permission denied")]
    PermissionDenied,
}

/// Source of local audio/video tracks.
pub trait MediaSource: Send + Sync {
    /// Acquires local tracks, or fails with [`MediaAccessError`].
    fn acquire(&self) -> impl Future<Output = Result<MediaTracks, MediaAccessError>> + Send;
}

/// Media source producing fixed track labels.
///
/// Stands in for real capture in tests and headless deployments.
pub struct StaticMedia {
    labels: Vec<String>,
}

impl StaticMedia {
    /// One audio and one video track.
    #[must_use]
    pub fn audio_video() -> Self {
        Self {
            labels: vec!["audio0".to_string(), "video0".to_string()],
        }
    }

    /// Custom track labels.
    #[must_use]
    pub fn with_labels(labels: Vec<String>) -> Self {
        Self { labels }
    }
}

impl MediaSource for StaticMedia {
    async fn acquire(&self) -> Result<MediaTracks, MediaAccessError> {
        Ok(MediaTracks::new(self.labels.clone()))
    }
}

/// Media source that always fails with a permission error.
pub struct DeniedMedia;

impl MediaSource for DeniedMedia {
    async fn acquire(&self) -> Result<MediaTracks, MediaAccessError> {
        Err(MediaAccessError::PermissionDenied)
    }
}

/// Media source reporting an absent or busy capture device.
pub struct MissingDeviceMedia {
    device: String,
}

impl MissingDeviceMedia {
    /// Names the device the error will report.
    #[must_use]
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl MediaSource for MissingDeviceMedia {
    async fn acquire(&self) -> Result<MediaTracks, MediaAccessError> {
        Err(MediaAccessError::DeviceUnavailable(self.device.clone()))
    }
}

//! Structured build events and the handler seam

use anyhow::Result;
use std::fmt;

/// Stage an image layer is currently in, ordered by pipeline position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerOperation {
    Downloading,
    DownloadComplete,
    Extracting,
    PullComplete,
}

impl fmt::Display for LayerOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LayerOperation::Downloading => "downloading",
            LayerOperation::DownloadComplete => "download complete",
            LayerOperation::Extracting => "extracting",
            LayerOperation::PullComplete => "pull complete",
        };
        write!(f, "{label}")
    }
}

/// One currently-running build step, as reported in a progress event.
///
/// `step_index` is zero-based; the transcript's `#<n>` prefix for the same
/// step is `step_index + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveImageBuildStep {
    /// The step has no layer activity (metadata resolution, running a
    /// command, exporting).
    NotDownloading { step_index: u64, name: String },
    /// The step is pulling layers; byte counts aggregate every layer the
    /// step has reported so far.
    Downloading {
        step_index: u64,
        name: String,
        operation: LayerOperation,
        completed_bytes: u64,
        total_bytes: u64,
    },
}

impl ActiveImageBuildStep {
    pub fn step_index(&self) -> u64 {
        match self {
            ActiveImageBuildStep::NotDownloading { step_index, .. } => *step_index,
            ActiveImageBuildStep::Downloading { step_index, .. } => *step_index,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ActiveImageBuildStep::NotDownloading { name, .. } => name,
            ActiveImageBuildStep::Downloading { name, .. } => name,
        }
    }
}

/// Structured outcome of decoding one piece of the build response stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageBuildEvent {
    /// The daemon reported a build failure. Decoding continues; the caller
    /// decides whether to abort.
    Error { message: String },
    /// The build finished and produced an image.
    Complete { image_id: String },
    /// The set of active steps changed.
    Progress { steps: Vec<ActiveImageBuildStep> },
}

/// Receives build events as the decoder produces them.
///
/// Handlers are invoked synchronously on the decoding thread, so they are
/// expected to be fast; a handler that blocks stalls decoding. Returning an
/// error aborts decoding with [`DecodeError::Callback`].
///
/// [`DecodeError::Callback`]: crate::error::DecodeError::Callback
pub trait ImageBuildEventHandler {
    fn on_event(&mut self, event: ImageBuildEvent) -> Result<()>;
}

impl<F> ImageBuildEventHandler for F
where
    F: FnMut(ImageBuildEvent) -> Result<()>,
{
    fn on_event(&mut self, event: ImageBuildEvent) -> Result<()> {
        self(event)
    }
}

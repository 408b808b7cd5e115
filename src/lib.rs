//! BuildKit Build Progress Decoder
//!
//! A streaming decoder for the response a BuildKit-enabled Docker daemon
//! produces while building an image. The daemon interleaves everything into
//! one newline-delimited JSON stream: trace envelopes carrying binary
//! status payloads, the final image id, and build errors. This crate turns
//! that stream into two synchronized outputs:
//!
//! - a human-readable transcript in the Docker CLI's visual idiom
//!   (`#<step>`-prefixed lines with step transitions, log timestamps, and
//!   per-layer download/extract progress), written to a byte sink
//! - structured [`ImageBuildEvent`]s: build errors, the final image id, and
//!   progress snapshots of the currently active steps
//!
//! BuildKit reports build steps concurrently and out of order: vertices
//! complete and later re-start, and layer statuses arrive before or after
//! their terminal `done`. The decoder tracks enough per-vertex state to
//! render a coherent single-threaded transcript anyway, deferring
//! completion markers until the build graph proves them final.
//!
//! # Examples
//!
//! ## Decode a build response stream
//!
//! ```no_run
//! use buildkit_progress::{ImageBuildEvent, ImageBuildResponseDecoder};
//! use tokio::fs::File;
//! use tokio::io::BufReader;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let response = BufReader::new(File::open("build-response.jsonl").await?);
//!
//!     let mut decoder = ImageBuildResponseDecoder::new(std::io::stdout());
//!     let mut on_event = |event: ImageBuildEvent| -> anyhow::Result<()> {
//!         if let ImageBuildEvent::Complete { image_id } = &event {
//!             eprintln!("built image {image_id}");
//!         }
//!         Ok(())
//!     };
//!
//!     decoder.decode(response, &mut on_event).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Drive the decoder line by line
//!
//! ```
//! use buildkit_progress::{ImageBuildEvent, ImageBuildResponseDecoder};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut transcript = Vec::new();
//! let mut events = Vec::new();
//!
//! let mut decoder = ImageBuildResponseDecoder::new(&mut transcript);
//! let mut on_event = |event: ImageBuildEvent| -> anyhow::Result<()> {
//!     events.push(event);
//!     Ok(())
//! };
//!
//! decoder.process_line(r#"{"id":"moby.image.id","aux":{"ID":"sha256:07708c"}}"#, &mut on_event)?;
//! decoder.finish()?;
//!
//! assert_eq!(
//!     events,
//!     vec![ImageBuildEvent::Complete { image_id: "sha256:07708c".to_string() }]
//! );
//! # Ok(())
//! # }
//! ```

pub mod decoder;
pub mod error;
pub mod progress;
pub mod proto;

// Re-export main types
pub use decoder::{humanise_bytes, ImageBuildResponseDecoder};
pub use error::DecodeError;
pub use progress::{ActiveImageBuildStep, ImageBuildEvent, ImageBuildEventHandler, LayerOperation};

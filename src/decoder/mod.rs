//! Streaming decoder for BuildKit image build responses
//!
//! The daemon reports a BuildKit build as newline-delimited JSON envelopes.
//! Trace envelopes embed a base64-encoded `StatusResponse` protobuf carrying
//! vertex lifecycle, logs, and per-layer progress. The decoder renders a
//! CLI-style transcript to its output sink and surfaces structured events
//! through an [`ImageBuildEventHandler`].

mod format;
mod vertex;

pub use format::{format_elapsed, humanise_bytes};
pub use vertex::{layer_digest, LayerInfo, VertexInfo};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use prost::Message;
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use crate::error::{DecodeError, Result};
use crate::progress::{ActiveImageBuildStep, ImageBuildEvent, ImageBuildEventHandler, LayerOperation};
use crate::proto::moby::buildkit::v1::{StatusResponse, Vertex, VertexLog, VertexStatus};

const IMAGE_ID_ENVELOPE: &str = "moby.image.id";
const TRACE_ENVELOPE: &str = "moby.buildkit.trace";

/// The exporter does not declare its true inputs, but in practice depends on
/// every prior vertex, so its start is a safe point to flush deferred
/// completions.
const BULKHEAD_VERTEX_NAME: &str = "exporting to image";

/// Vertices the daemon never re-opens, whose completion can be printed the
/// moment it is observed.
fn has_trustworthy_completion(name: &str) -> bool {
    name == "exporting to image"
        || name == "copy /context /"
        || name.starts_with("[internal] load metadata for ")
}

/// One JSON line from the daemon's build response stream. Field types are
/// checked by hand so that envelopes from other operations, whatever their
/// shape, fall through to "ignored" rather than failing the build.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StreamEnvelope {
    error: Option<serde_json::Value>,
    id: Option<serde_json::Value>,
    aux: Option<serde_json::Value>,
}

/// Decodes the response stream of one BuildKit image build.
///
/// The decoder is a single-threaded state machine: feed it response lines
/// with [`process_line`], or hand the whole stream to [`decode`]. It writes
/// the human-readable transcript to its output sink and reports structured
/// events through the handler passed alongside each line.
///
/// One decoder instance corresponds to one build; state is not reusable
/// across builds.
///
/// [`process_line`]: ImageBuildResponseDecoder::process_line
/// [`decode`]: ImageBuildResponseDecoder::decode
pub struct ImageBuildResponseDecoder<W> {
    output: W,
    started_vertices: HashMap<String, VertexInfo>,
    active_vertices: Vec<String>,
    pending_completed_vertices: HashMap<String, Vertex>,
    last_written_vertex: Option<String>,
    last_progress_update: Option<Vec<ActiveImageBuildStep>>,
}

impl<W: Write> ImageBuildResponseDecoder<W> {
    /// Create a decoder writing its transcript to `output`.
    pub fn new(output: W) -> Self {
        Self {
            output,
            started_vertices: HashMap::new(),
            active_vertices: Vec::new(),
            pending_completed_vertices: HashMap::new(),
            last_written_vertex: None,
            last_progress_update: None,
        }
    }

    /// Consume the whole response stream, then perform end-of-stream
    /// handling as in [`finish`].
    ///
    /// [`finish`]: ImageBuildResponseDecoder::finish
    pub async fn decode<R>(
        &mut self,
        reader: R,
        events: &mut dyn ImageBuildEventHandler,
    ) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = LinesStream::new(reader.lines());

        while let Some(line) = lines.next().await {
            let line = line?;
            self.process_line(&line, events)?;
        }

        self.finish()
    }

    /// Decode a single line of the response stream.
    pub fn process_line(
        &mut self,
        line: &str,
        events: &mut dyn ImageBuildEventHandler,
    ) -> Result<()> {
        let envelope: StreamEnvelope =
            serde_json::from_str(line).map_err(|source| DecodeError::MalformedResponse {
                line: serde_json::to_string(line).unwrap_or_else(|_| format!("{line:?}")),
                source,
            })?;

        if let Some(message) = envelope.error.as_ref().and_then(|v| v.as_str()) {
            self.emit(
                events,
                ImageBuildEvent::Error {
                    message: message.to_string(),
                },
            )?;
        }

        match envelope.id.as_ref().and_then(|v| v.as_str()) {
            Some(IMAGE_ID_ENVELOPE) => self.decode_image_id(envelope.aux, events)?,
            Some(TRACE_ENVELOPE) => self.decode_trace(envelope.aux, events)?,
            Some(other) => tracing::debug!(id = other, "ignoring unrecognised envelope"),
            None => {}
        }

        Ok(())
    }

    /// End-of-stream handling: flush deferred completions, then the sink.
    ///
    /// [`decode`] calls this automatically; callers driving the read loop
    /// themselves call it once the stream is exhausted.
    ///
    /// [`decode`]: ImageBuildResponseDecoder::decode
    pub fn finish(&mut self) -> Result<()> {
        self.flush_pending_completed_vertices()?;
        self.output.flush()?;
        Ok(())
    }

    /// Recover the output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    fn decode_image_id(
        &mut self,
        aux: Option<serde_json::Value>,
        events: &mut dyn ImageBuildEventHandler,
    ) -> Result<()> {
        let image_id = aux
            .as_ref()
            .and_then(|v| v.get("ID"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| DecodeError::Protocol("image ID envelope has no aux.ID".to_string()))?
            .to_string();

        self.emit(events, ImageBuildEvent::Complete { image_id })
    }

    fn decode_trace(
        &mut self,
        aux: Option<serde_json::Value>,
        events: &mut dyn ImageBuildEventHandler,
    ) -> Result<()> {
        let encoded = aux
            .as_ref()
            .and_then(|v| v.as_str())
            .ok_or_else(|| DecodeError::Protocol("trace envelope has no aux data".to_string()))?;

        let raw = BASE64.decode(encoded).map_err(|e| {
            DecodeError::Protocol(format!("trace envelope carries invalid base64 data: {e}"))
        })?;

        let response = StatusResponse::decode(Bytes::from(raw)).map_err(|e| {
            DecodeError::Protocol(format!("trace payload is not a valid status response: {e}"))
        })?;

        tracing::debug!(
            vertexes = response.vertexes.len(),
            statuses = response.statuses.len(),
            logs = response.logs.len(),
            "decoded status response"
        );

        self.write_transcript(&response)?;
        self.update_progress(&response, events)
    }

    fn write_transcript(&mut self, response: &StatusResponse) -> Result<()> {
        let mut remaining_logs: Vec<&VertexLog> = response.logs.iter().collect();
        let mut remaining_statuses: Vec<&VertexStatus> = response.statuses.iter().collect();

        for vertex in &response.vertexes {
            let logs = drain_matching(&mut remaining_logs, |l| l.vertex == vertex.digest);
            let completed_statuses = drain_matching(&mut remaining_statuses, |s| {
                s.vertex == vertex.digest && s.completed.is_some()
            });

            self.write_vertex_updates(vertex, &logs, &completed_statuses)?;
        }

        // Logs and statuses whose vertex is not part of this response render
        // against whatever state their owner is recorded in.
        for log in remaining_logs {
            self.write_log(log)?;
        }
        for status in remaining_statuses {
            self.write_layer_status(status)?;
        }

        Ok(())
    }

    fn write_vertex_updates(
        &mut self,
        vertex: &Vertex,
        logs: &[&VertexLog],
        completed_statuses: &[&VertexStatus],
    ) -> Result<()> {
        if vertex.started.is_some() {
            self.handle_started_vertex(vertex)?;
        }

        for log in logs {
            self.write_log(log)?;
        }
        for status in completed_statuses {
            self.write_layer_status(status)?;
        }

        if vertex.completed.is_some() {
            self.handle_completed_vertex(vertex)?;
        }

        Ok(())
    }

    fn handle_started_vertex(&mut self, vertex: &Vertex) -> Result<()> {
        if self.pending_completed_vertices.remove(&vertex.digest).is_some() {
            if vertex.completed.is_some() {
                // Completion re-observed before anything consumed the
                // pending entry; the completed handler re-defers it.
                return Ok(());
            }

            // Re-opened: the earlier completion was provisional. The step
            // number survives; the start time does not.
            if let (Some(info), Some(started)) = (
                self.started_vertices.get_mut(&vertex.digest),
                vertex.started.as_ref(),
            ) {
                info.started = started.clone();
            }

            return self.write_transition_to(&vertex.digest);
        }

        if self.started_vertices.contains_key(&vertex.digest) {
            // Already running; repeated observation of the same start.
            return Ok(());
        }

        // A dependent starting is the signal that its inputs really are done.
        for input in &vertex.inputs {
            if let Some(pending) = self.pending_completed_vertices.remove(input) {
                self.write_completion(&pending)?;
            }
        }

        if vertex.name == BULKHEAD_VERTEX_NAME {
            self.flush_pending_completed_vertices()?;
        }

        let Some(started) = vertex.started.clone() else {
            return Ok(());
        };

        let step_number = self.started_vertices.len() as u64 + 1;
        self.started_vertices.insert(
            vertex.digest.clone(),
            VertexInfo::new(started, step_number, vertex.name.clone()),
        );

        self.write_transition_to(&vertex.digest)
    }

    fn handle_completed_vertex(&mut self, vertex: &Vertex) -> Result<()> {
        let Some(info) = self.started_vertices.get(&vertex.digest) else {
            tracing::warn!(vertex = %vertex.digest, "completion for a vertex that never started");
            return Ok(());
        };
        let step_number = info.step_number;

        if !vertex.error.is_empty() {
            self.write_transition_to(&vertex.digest)?;
            write!(self.output, "#{} ERROR: {}\n\n", step_number, vertex.error)?;
            self.last_written_vertex = None;
            return Ok(());
        }

        if has_trustworthy_completion(&vertex.name) {
            return self.write_completion(vertex);
        }

        // The daemon frequently re-opens completed vertices; printing DONE
        // now would announce false terminations. Defer until a dependent
        // starts, a bulkhead starts, or the stream ends.
        self.pending_completed_vertices
            .insert(vertex.digest.clone(), vertex.clone());

        Ok(())
    }

    fn write_completion(&mut self, vertex: &Vertex) -> Result<()> {
        let Some(info) = self.started_vertices.get(&vertex.digest) else {
            return Ok(());
        };
        let step_number = info.step_number;

        self.write_transition_to(&vertex.digest)?;

        let terminator = if vertex.cached { "CACHED" } else { "DONE" };
        write!(self.output, "#{step_number} {terminator}\n\n")?;
        self.last_written_vertex = None;

        Ok(())
    }

    fn flush_pending_completed_vertices(&mut self) -> Result<()> {
        let mut pending: Vec<Vertex> = self
            .pending_completed_vertices
            .drain()
            .map(|(_, vertex)| vertex)
            .collect();

        // Step order keeps the output deterministic.
        pending.sort_by_key(|vertex| {
            self.started_vertices
                .get(&vertex.digest)
                .map(|info| info.step_number)
                .unwrap_or(u64::MAX)
        });

        for vertex in pending {
            self.write_completion(&vertex)?;
        }

        Ok(())
    }

    fn write_log(&mut self, log: &VertexLog) -> Result<()> {
        let info = self.started_vertices.get(&log.vertex).ok_or_else(|| {
            DecodeError::Protocol(format!("log for vertex {} that has not started", log.vertex))
        })?;

        let timestamp = log.timestamp.as_ref().ok_or_else(|| {
            DecodeError::Protocol(format!("log for vertex {} has no timestamp", log.vertex))
        })?;

        let elapsed = format::format_elapsed(&info.started, timestamp);
        let step_number = info.step_number;

        self.write_transition_to(&log.vertex)?;

        let text = String::from_utf8_lossy(&log.msg);
        for segment in text.trim_end().split('\n') {
            writeln!(
                self.output,
                "#{} {} {}",
                step_number,
                elapsed,
                segment.trim_end_matches('\r')
            )?;
        }

        Ok(())
    }

    fn write_layer_status(&mut self, status: &VertexStatus) -> Result<()> {
        let info = self.started_vertices.get(&status.vertex).ok_or_else(|| {
            DecodeError::Protocol(format!(
                "status for vertex {} that has not started",
                status.vertex
            ))
        })?;

        let step_number = info.step_number;
        let digest = vertex::layer_digest(&status.id);
        let current_operation = info.current_operation(digest);

        if status.completed.is_some() {
            let late_bare_done = status.name == "done"
                && current_operation.is_some_and(|op| op >= LayerOperation::Extracting);

            if late_bare_done {
                tracing::debug!(layer = digest, "suppressing out-of-order layer completion");
                return Ok(());
            }

            self.write_transition_to(&status.vertex)?;
            writeln!(self.output, "#{step_number} {digest}: done")?;
            return Ok(());
        }

        match status.name.as_str() {
            "downloading" if current_operation != Some(LayerOperation::Downloading) => {
                self.write_transition_to(&status.vertex)?;
                writeln!(
                    self.output,
                    "#{step_number} {digest}: downloading {}",
                    format::humanise_bytes(status.total.max(0) as u64)
                )?;
            }
            "extract"
                if matches!(
                    current_operation,
                    Some(LayerOperation::Downloading | LayerOperation::DownloadComplete)
                ) =>
            {
                self.write_transition_to(&status.vertex)?;
                writeln!(self.output, "#{step_number} {digest}: extracting")?;
            }
            _ => {}
        }

        Ok(())
    }

    /// Make `digest` the current written vertex, closing off the previous
    /// step with a `...` marker and printing the new step's header.
    fn write_transition_to(&mut self, digest: &str) -> Result<()> {
        if self.last_written_vertex.as_deref() == Some(digest) {
            return Ok(());
        }

        if let Some(previous) = self.last_written_vertex.take() {
            if let Some(info) = self.started_vertices.get(&previous) {
                write!(self.output, "#{} ...\n\n", info.step_number)?;
            }
        }

        let Some(info) = self.started_vertices.get(digest) else {
            return Ok(());
        };

        writeln!(self.output, "#{} {}", info.step_number, info.name)?;
        self.last_written_vertex = Some(digest.to_string());

        Ok(())
    }

    fn update_progress(
        &mut self,
        response: &StatusResponse,
        events: &mut dyn ImageBuildEventHandler,
    ) -> Result<()> {
        for vertex in &response.vertexes {
            if vertex.started.is_some() && !self.active_vertices.contains(&vertex.digest) {
                self.active_vertices.push(vertex.digest.clone());
            }
            if vertex.completed.is_some() {
                self.active_vertices.retain(|digest| digest != &vertex.digest);
            }
        }

        for status in &response.statuses {
            let info = self.started_vertices.get_mut(&status.vertex).ok_or_else(|| {
                DecodeError::Protocol(format!("status update for unknown vertex {}", status.vertex))
            })?;

            info.apply_status(status);
        }

        let mut active: Vec<&VertexInfo> = self
            .active_vertices
            .iter()
            .filter_map(|digest| self.started_vertices.get(digest))
            .collect();
        active.sort_by_key(|info| info.step_number);

        let steps: Vec<ActiveImageBuildStep> =
            active.iter().map(|info| info.to_active_step()).collect();

        if steps.is_empty() || self.last_progress_update.as_ref() == Some(&steps) {
            return Ok(());
        }

        self.emit(events, ImageBuildEvent::Progress { steps: steps.clone() })?;
        self.last_progress_update = Some(steps);

        Ok(())
    }

    fn emit(
        &mut self,
        events: &mut dyn ImageBuildEventHandler,
        event: ImageBuildEvent,
    ) -> Result<()> {
        events.on_event(event).map_err(DecodeError::Callback)
    }
}

/// Remove and return the items matching `predicate`, preserving order.
fn drain_matching<'a, T>(
    items: &mut Vec<&'a T>,
    predicate: impl Fn(&T) -> bool,
) -> Vec<&'a T> {
    let mut matched = Vec::new();

    items.retain(|item| {
        if predicate(item) {
            matched.push(*item);
            false
        } else {
            true
        }
    });

    matched
}

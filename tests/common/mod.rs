//! Common test fixtures for decoder tests

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use prost_types::Timestamp;

use buildkit_progress::proto::moby::buildkit::v1::{
    StatusResponse, Vertex, VertexLog, VertexStatus,
};
use buildkit_progress::{DecodeError, ImageBuildEvent, ImageBuildEventHandler, ImageBuildResponseDecoder};

/// Wall-clock instant used as the build start in fixtures.
pub const BUILD_START: i64 = 1_700_000_000;

pub fn ts(seconds_offset: i64) -> Timestamp {
    Timestamp {
        seconds: BUILD_START + seconds_offset,
        nanos: 0,
    }
}

pub fn ts_millis(seconds_offset: i64, millis: i32) -> Timestamp {
    Timestamp {
        seconds: BUILD_START + seconds_offset,
        nanos: millis * 1_000_000,
    }
}

pub fn vertex(digest: &str, name: &str) -> Vertex {
    Vertex {
        digest: digest.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn started_vertex(digest: &str, name: &str, started_at: i64) -> Vertex {
    let mut v = vertex(digest, name);
    v.started = Some(ts(started_at));
    v
}

pub fn completed_vertex(digest: &str, name: &str, started_at: i64, completed_at: i64) -> Vertex {
    let mut v = started_vertex(digest, name, started_at);
    v.completed = Some(ts(completed_at));
    v
}

pub fn with_inputs(mut v: Vertex, inputs: &[&str]) -> Vertex {
    v.inputs = inputs.iter().map(|i| i.to_string()).collect();
    v
}

pub fn with_cached(mut v: Vertex) -> Vertex {
    v.cached = true;
    v
}

pub fn with_error(mut v: Vertex, error: &str) -> Vertex {
    v.error = error.to_string();
    v
}

pub fn log(vertex: &str, at: Timestamp, msg: &str) -> VertexLog {
    VertexLog {
        vertex: vertex.to_string(),
        timestamp: Some(at),
        stream: 1,
        msg: msg.as_bytes().to_vec(),
    }
}

pub fn status(vertex: &str, id: &str, name: &str, current: i64, total: i64) -> VertexStatus {
    VertexStatus {
        id: id.to_string(),
        vertex: vertex.to_string(),
        name: name.to_string(),
        current,
        total,
        timestamp: Some(ts(0)),
        ..Default::default()
    }
}

pub fn completed_status(
    vertex: &str,
    id: &str,
    name: &str,
    current: i64,
    total: i64,
    completed_at: i64,
) -> VertexStatus {
    let mut s = status(vertex, id, name, current, total);
    s.completed = Some(ts(completed_at));
    s
}

/// Encode a `StatusResponse` as the daemon would put it on the wire.
pub fn trace_line(response: &StatusResponse) -> String {
    let encoded = BASE64.encode(response.encode_to_vec());
    serde_json::json!({ "id": "moby.buildkit.trace", "aux": encoded }).to_string()
}

pub fn trace(
    vertexes: Vec<Vertex>,
    statuses: Vec<VertexStatus>,
    logs: Vec<VertexLog>,
) -> String {
    trace_line(&StatusResponse {
        vertexes,
        statuses,
        logs,
        warnings: vec![],
    })
}

pub fn vertex_trace(vertexes: Vec<Vertex>) -> String {
    trace(vertexes, vec![], vec![])
}

pub fn status_trace(statuses: Vec<VertexStatus>) -> String {
    trace(vec![], statuses, vec![])
}

pub fn error_line(message: &str) -> String {
    serde_json::json!({ "error": message }).to_string()
}

pub fn image_id_line(image_id: &str) -> String {
    serde_json::json!({ "id": "moby.image.id", "aux": { "ID": image_id } }).to_string()
}

/// Event handler that records every event it receives.
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Vec<ImageBuildEvent>,
}

impl ImageBuildEventHandler for RecordingHandler {
    fn on_event(&mut self, event: ImageBuildEvent) -> Result<()> {
        self.events.push(event);
        Ok(())
    }
}

/// Run a fresh decoder over the given response lines.
pub fn try_decode_lines(
    lines: &[String],
) -> Result<(String, Vec<ImageBuildEvent>), DecodeError> {
    let mut transcript = Vec::new();
    let mut handler = RecordingHandler::default();

    {
        let mut decoder = ImageBuildResponseDecoder::new(&mut transcript);
        for line in lines {
            decoder.process_line(line, &mut handler)?;
        }
        decoder.finish()?;
    }

    let transcript = String::from_utf8(transcript).expect("transcript is not valid UTF-8");
    Ok((transcript, handler.events))
}

pub fn decode_lines(lines: &[String]) -> (String, Vec<ImageBuildEvent>) {
    try_decode_lines(lines).expect("decoding failed")
}

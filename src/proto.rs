//! BuildKit control API message types
//!
//! Decode-only subset of `moby.buildkit.v1` from BuildKit's
//! `api/services/control/control.proto`. Field numbers match the upstream
//! schema; fields the decoder never reads are omitted and skipped on the
//! wire, as are any fields added by newer daemons.

pub mod moby {
    pub mod buildkit {
        pub mod v1 {
            /// Progress for one build solve, streamed by the daemon.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct StatusResponse {
                #[prost(message, repeated, tag = "1")]
                pub vertexes: Vec<Vertex>,
                #[prost(message, repeated, tag = "2")]
                pub statuses: Vec<VertexStatus>,
                #[prost(message, repeated, tag = "3")]
                pub logs: Vec<VertexLog>,
                #[prost(message, repeated, tag = "4")]
                pub warnings: Vec<VertexWarning>,
            }

            /// One node of the build graph.
            ///
            /// Presence of `started` / `completed` is the lifecycle marker;
            /// the same vertex may appear in many responses as its state
            /// changes, and a completed vertex can start again.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct Vertex {
                #[prost(string, tag = "1")]
                pub digest: String,
                #[prost(string, repeated, tag = "2")]
                pub inputs: Vec<String>,
                #[prost(string, tag = "3")]
                pub name: String,
                #[prost(bool, tag = "4")]
                pub cached: bool,
                #[prost(message, optional, tag = "5")]
                pub started: Option<::prost_types::Timestamp>,
                #[prost(message, optional, tag = "6")]
                pub completed: Option<::prost_types::Timestamp>,
                #[prost(string, tag = "7")]
                pub error: String,
            }

            /// Layer-level progress for a vertex, such as the download or
            /// extraction of one image layer.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct VertexStatus {
                #[prost(string, tag = "1")]
                pub id: String,
                #[prost(string, tag = "2")]
                pub vertex: String,
                #[prost(string, tag = "3")]
                pub name: String,
                #[prost(int64, tag = "4")]
                pub current: i64,
                #[prost(int64, tag = "5")]
                pub total: i64,
                #[prost(message, optional, tag = "6")]
                pub timestamp: Option<::prost_types::Timestamp>,
                #[prost(message, optional, tag = "7")]
                pub started: Option<::prost_types::Timestamp>,
                #[prost(message, optional, tag = "8")]
                pub completed: Option<::prost_types::Timestamp>,
            }

            /// Raw output captured from a running vertex.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct VertexLog {
                #[prost(string, tag = "1")]
                pub vertex: String,
                #[prost(message, optional, tag = "2")]
                pub timestamp: Option<::prost_types::Timestamp>,
                #[prost(int64, tag = "3")]
                pub stream: i64,
                #[prost(bytes = "vec", tag = "4")]
                pub msg: Vec<u8>,
            }

            /// Warning attached to a vertex by the frontend.
            #[derive(Clone, PartialEq, ::prost::Message)]
            pub struct VertexWarning {
                #[prost(string, tag = "1")]
                pub vertex: String,
                #[prost(int64, tag = "2")]
                pub level: i64,
                #[prost(bytes = "vec", tag = "3")]
                pub short: Vec<u8>,
                #[prost(bytes = "vec", repeated, tag = "4")]
                pub detail: Vec<Vec<u8>>,
                #[prost(string, tag = "5")]
                pub url: String,
            }
        }
    }
}

// Re-export commonly used types
pub use moby::buildkit::v1::*;

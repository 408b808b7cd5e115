//! Per-vertex decoder state

use prost_types::Timestamp;
use std::collections::HashMap;

use crate::progress::{ActiveImageBuildStep, LayerOperation};
use crate::proto::moby::buildkit::v1::VertexStatus;

/// Layer id with any `extracting ` prefix stripped.
///
/// The daemon reports extraction under the id `extracting <digest>` while
/// download progress for the same layer uses the bare digest.
pub fn layer_digest(id: &str) -> &str {
    id.strip_prefix("extracting ").unwrap_or(id)
}

/// Download and extraction state for a single image layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerInfo {
    pub current_operation: LayerOperation,
    pub completed_bytes: u64,
    pub total_bytes: u64,
}

/// Decoder state for a vertex that has started at least once.
///
/// `step_number` is assigned the first time the vertex is observed starting
/// and never changes, even if the daemon re-opens the vertex later.
#[derive(Debug, Clone)]
pub struct VertexInfo {
    pub started: Timestamp,
    pub step_number: u64,
    pub name: String,
    layers: HashMap<String, LayerInfo>,
}

impl VertexInfo {
    pub fn new(started: Timestamp, step_number: u64, name: impl Into<String>) -> Self {
        Self {
            started,
            step_number,
            name: name.into(),
            layers: HashMap::new(),
        }
    }

    /// Current operation of the layer with the given (stripped) digest.
    pub fn current_operation(&self, layer_digest: &str) -> Option<LayerOperation> {
        self.layers.get(layer_digest).map(|l| l.current_operation)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Advance layer state for one status update.
    ///
    /// Statuses arrive out of order: a bare `done` can trail the extraction
    /// it belongs to. Updates that would move a layer backwards are dropped
    /// so `current_operation` stays monotonic.
    pub fn apply_status(&mut self, status: &VertexStatus) {
        if status.total == 0 && status.name != "extract" {
            return;
        }

        let digest = layer_digest(&status.id);
        let current = status.current.max(0) as u64;
        let total = status.total.max(0) as u64;

        match status.name.as_str() {
            "downloading" => {
                self.layers.insert(
                    digest.to_string(),
                    LayerInfo {
                        current_operation: LayerOperation::Downloading,
                        completed_bytes: current,
                        total_bytes: total,
                    },
                );
            }
            "extract" => {
                let previous_total = self
                    .layers
                    .get(digest)
                    .map(|l| l.total_bytes)
                    .unwrap_or_default();

                let info = if status.completed.is_some() {
                    LayerInfo {
                        current_operation: LayerOperation::PullComplete,
                        completed_bytes: previous_total,
                        total_bytes: previous_total,
                    }
                } else {
                    LayerInfo {
                        current_operation: LayerOperation::Extracting,
                        completed_bytes: 0,
                        total_bytes: previous_total,
                    }
                };

                self.layers.insert(digest.to_string(), info);
            }
            "done" => {
                let current_operation = self.layers.get(digest).map(|l| l.current_operation);

                match current_operation {
                    Some(op) if op > LayerOperation::DownloadComplete => {
                        // Late completion for a layer that has moved on.
                    }
                    Some(_) => {
                        self.layers.insert(
                            digest.to_string(),
                            LayerInfo {
                                current_operation: LayerOperation::DownloadComplete,
                                completed_bytes: current,
                                total_bytes: total,
                            },
                        );
                    }
                    None => {
                        // Cached layer: no download was ever reported.
                        self.layers.insert(
                            digest.to_string(),
                            LayerInfo {
                                current_operation: LayerOperation::PullComplete,
                                completed_bytes: current,
                                total_bytes: total,
                            },
                        );
                    }
                }
            }
            _ => {}
        }
    }

    /// Project this vertex into its progress-event representation.
    ///
    /// The reported operation is the least advanced one with activity, so a
    /// step stays "downloading" until every layer has finished downloading
    /// and "extracting" until extraction of the last layer ends.
    pub fn to_active_step(&self) -> ActiveImageBuildStep {
        let step_index = self.step_number - 1;

        if self.layers.is_empty() {
            return ActiveImageBuildStep::NotDownloading {
                step_index,
                name: self.name.clone(),
            };
        }

        let any = |op: LayerOperation| self.layers.values().any(|l| l.current_operation == op);
        let all = |op: LayerOperation| self.layers.values().all(|l| l.current_operation == op);

        let operation = if any(LayerOperation::Downloading) {
            LayerOperation::Downloading
        } else if any(LayerOperation::Extracting) {
            LayerOperation::Extracting
        } else if all(LayerOperation::PullComplete) {
            LayerOperation::PullComplete
        } else if all(LayerOperation::DownloadComplete) {
            LayerOperation::DownloadComplete
        } else {
            LayerOperation::PullComplete
        };

        let completed_bytes = self
            .layers
            .values()
            .map(|l| {
                if l.current_operation == operation {
                    l.completed_bytes
                } else if l.current_operation > operation {
                    l.total_bytes
                } else {
                    0
                }
            })
            .sum();

        let total_bytes = self.layers.values().map(|l| l.total_bytes).sum();

        ActiveImageBuildStep::Downloading {
            step_index,
            name: self.name.clone(),
            operation,
            completed_bytes,
            total_bytes,
        }
    }
}

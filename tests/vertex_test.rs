//! Unit tests for per-vertex layer state tracking

use buildkit_progress::decoder::VertexInfo;
use buildkit_progress::proto::moby::buildkit::v1::VertexStatus;
use buildkit_progress::{ActiveImageBuildStep, LayerOperation};
use prost_types::Timestamp;

fn info() -> VertexInfo {
    VertexInfo::new(Timestamp::default(), 1, "FROM docker.io/library/alpine:3.12")
}

fn status(id: &str, name: &str, current: i64, total: i64) -> VertexStatus {
    VertexStatus {
        id: id.to_string(),
        vertex: "sha256:vvv".to_string(),
        name: name.to_string(),
        current,
        total,
        ..Default::default()
    }
}

fn completed_status(id: &str, name: &str, current: i64, total: i64) -> VertexStatus {
    let mut s = status(id, name, current, total);
    s.completed = Some(Timestamp::default());
    s
}

#[test]
fn test_downloading_status_starts_layer() {
    let mut info = info();
    info.apply_status(&status("sha256:l1", "downloading", 10, 100));

    assert_eq!(
        info.current_operation("sha256:l1"),
        Some(LayerOperation::Downloading)
    );
    assert_eq!(
        info.to_active_step(),
        ActiveImageBuildStep::Downloading {
            step_index: 0,
            name: "FROM docker.io/library/alpine:3.12".to_string(),
            operation: LayerOperation::Downloading,
            completed_bytes: 10,
            total_bytes: 100,
        }
    );
}

#[test]
fn test_zero_total_status_ignored() {
    let mut info = info();
    info.apply_status(&status("sha256:l1", "downloading", 0, 0));

    assert_eq!(info.layer_count(), 0);
}

#[test]
fn test_extract_allowed_with_zero_total() {
    let mut info = info();
    info.apply_status(&status("extracting sha256:l1", "extract", 0, 0));

    assert_eq!(
        info.current_operation("sha256:l1"),
        Some(LayerOperation::Extracting)
    );
}

#[test]
fn test_done_for_unseen_layer_means_cached() {
    let mut info = info();
    info.apply_status(&completed_status("sha256:l1", "done", 100, 100));

    assert_eq!(
        info.current_operation("sha256:l1"),
        Some(LayerOperation::PullComplete)
    );
}

#[test]
fn test_done_after_downloading_completes_download() {
    let mut info = info();
    info.apply_status(&status("sha256:l1", "downloading", 10, 100));
    info.apply_status(&completed_status("sha256:l1", "done", 100, 100));

    assert_eq!(
        info.current_operation("sha256:l1"),
        Some(LayerOperation::DownloadComplete)
    );
}

#[test]
fn test_late_done_does_not_move_layer_backwards() {
    let mut info = info();
    info.apply_status(&status("sha256:l1", "downloading", 10, 100));
    info.apply_status(&status("extracting sha256:l1", "extract", 0, 0));
    info.apply_status(&completed_status("sha256:l1", "done", 100, 100));

    assert_eq!(
        info.current_operation("sha256:l1"),
        Some(LayerOperation::Extracting)
    );
}

#[test]
fn test_completed_extract_keeps_download_total() {
    let mut info = info();
    info.apply_status(&status("sha256:l1", "downloading", 0, 100));
    info.apply_status(&status("extracting sha256:l1", "extract", 0, 0));
    info.apply_status(&completed_status("extracting sha256:l1", "extract", 0, 0));

    assert_eq!(
        info.current_operation("sha256:l1"),
        Some(LayerOperation::PullComplete)
    );
    assert_eq!(
        info.to_active_step(),
        ActiveImageBuildStep::Downloading {
            step_index: 0,
            name: "FROM docker.io/library/alpine:3.12".to_string(),
            operation: LayerOperation::PullComplete,
            completed_bytes: 100,
            total_bytes: 100,
        }
    );
}

#[test]
fn test_unknown_status_name_ignored() {
    let mut info = info();
    info.apply_status(&status("sha256:l1", "waiting", 0, 100));

    assert_eq!(info.layer_count(), 0);
}

#[test]
fn test_layerless_vertex_is_not_downloading() {
    assert_eq!(
        info().to_active_step(),
        ActiveImageBuildStep::NotDownloading {
            step_index: 0,
            name: "FROM docker.io/library/alpine:3.12".to_string(),
        }
    );
}

#[test]
fn test_operation_ordering() {
    assert!(LayerOperation::Downloading < LayerOperation::DownloadComplete);
    assert!(LayerOperation::DownloadComplete < LayerOperation::Extracting);
    assert!(LayerOperation::Extracting < LayerOperation::PullComplete);
}

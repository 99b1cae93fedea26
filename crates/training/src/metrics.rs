//! JSONL training metrics.

use crate::loss::LossBreakdown;
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Checkpoint,
    Epoch,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Checkpoint => "checkpoint",
            MetricKind::Epoch => "epoch",
        }
    }
}

/// Appends one JSON object per line. A failed write disables the sink for the rest of the run.
pub struct MetricsSink {
    path: Option<PathBuf>,
    file: Option<File>,
    started: Instant,
}

impl MetricsSink {
    pub fn disabled() -> Self {
        Self {
            path: None,
            file: None,
            started: Instant::now(),
        }
    }

    pub fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::disabled();
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = fs::create_dir_all(parent) {
                    tracing::warn!(
                        "metrics disabled; failed to create {}: {e}",
                        parent.display()
                    );
                    return Self {
                        path: Some(path.to_path_buf()),
                        file: None,
                        started: Instant::now(),
                    };
                }
            }
        }
        let file = match OpenOptions::new().create(true).append(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!("metrics disabled; failed to open {}: {e}", path.display());
                None
            }
        };
        Self {
            path: Some(path.to_path_buf()),
            file,
            started: Instant::now(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.file.is_some()
    }

    pub fn record(&mut self, kind: MetricKind, epoch: usize, step: u64, loss: f32, parts: &LossBreakdown) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let line = json!({
            "kind": kind.as_str(),
            "epoch": epoch,
            "step": step,
            "loss": loss,
            "content": parts.content,
            "style": parts.style,
            "total_variation": parts.total_variation,
            "elapsed_ms": self.started.elapsed().as_millis() as u64,
        });
        if let Err(e) = writeln!(file, "{line}") {
            let path = self
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            tracing::warn!("metrics disabled; write to {path} failed: {e}");
            self.file = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_one_line_per_record() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs/metrics.jsonl");
        let mut sink = MetricsSink::open(Some(path.as_path()));
        assert!(sink.is_enabled());
        let parts = LossBreakdown {
            content: 1.0,
            style: 2.0,
            total_variation: 0.5,
            total: 3.5,
        };
        sink.record(MetricKind::Checkpoint, 1, 10, 3.5, &parts);
        sink.record(MetricKind::Epoch, 1, 20, 3.0, &parts);
        drop(sink);

        let raw = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["kind"], "checkpoint");
        assert_eq!(lines[1]["kind"], "epoch");
        assert_eq!(lines[1]["step"], 20);
    }

    #[test]
    fn unwritable_parent_disables_sink() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("logs");
        fs::write(&blocker, b"a file where the directory should be").unwrap();
        let mut sink = MetricsSink::open(Some(blocker.join("metrics.jsonl").as_path()));
        assert!(!sink.is_enabled());
        sink.record(MetricKind::Epoch, 1, 1, 1.0, &LossBreakdown::default());
        assert!(blocker.is_file());
    }

    #[test]
    fn disabled_sink_ignores_records() {
        let mut sink = MetricsSink::open(None);
        assert!(!sink.is_enabled());
        sink.record(MetricKind::Epoch, 0, 0, 0.0, &LossBreakdown::default());
    }
}

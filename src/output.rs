use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DatasetResult, ProgressEvent, ProgressSink};
use crate::domain::{ArtifactKind, SubjectId};
use crate::layout::DatasetLayout;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Serialize)]
pub struct SubjectPaths {
    pub subject_id: SubjectId,
    pub artifacts: Vec<ArtifactPath>,
}

#[derive(Debug, Serialize)]
pub struct ArtifactPath {
    pub kind: ArtifactKind,
    pub path: String,
}

impl SubjectPaths {
    pub fn derive(layout: &DatasetLayout, subject: SubjectId) -> Self {
        let artifacts = layout
            .artifact_paths(&subject)
            .into_iter()
            .map(|(kind, path)| ArtifactPath {
                kind,
                path: path.into_string(),
            })
            .collect();
        Self {
            subject_id: subject,
            artifacts,
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_dataset(result: &DatasetResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_paths(paths: &SubjectPaths) -> io::Result<()> {
        Self::print_json(paths)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "{}",
                event.message
            ),
            None => tracing::info!("{}", event.message),
        }
    }
}

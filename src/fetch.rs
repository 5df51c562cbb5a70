use std::time::Instant;

use camino::Utf8PathBuf;

use crate::app::{ProgressEvent, ProgressSink};
use crate::domain::{ArtifactDescriptor, ArtifactKind, ParticipantRecord, SubjectId, UrlTemplate};
use crate::error::HbnError;
use crate::layout::DatasetLayout;
use crate::lookup::KeyResolver;
use crate::retrieval::{FileRetriever, RetrievalRequest};

#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub layout: &'a DatasetLayout,
    pub url_template: &'a UrlTemplate,
    pub resume: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectArtifacts {
    pub subject_id: SubjectId,
    pub artifacts: Vec<ArtifactDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionalFetch {
    pub derivatives_dir: Utf8PathBuf,
    pub subjects: Vec<SubjectArtifacts>,
}

/// Drives the four per-subject downloads, strictly one at a time.
pub struct SubjectFetcher<'a, R: FileRetriever + ?Sized, K: KeyResolver + ?Sized> {
    retriever: &'a R,
    resolver: &'a K,
}

impl<'a, R: FileRetriever + ?Sized, K: KeyResolver + ?Sized> SubjectFetcher<'a, R, K> {
    pub fn new(retriever: &'a R, resolver: &'a K) -> Self {
        Self {
            retriever,
            resolver,
        }
    }

    /// Resolves every key for `subject` before anything is downloaded.
    pub fn plan(
        &self,
        subject: &SubjectId,
        layout: &DatasetLayout,
    ) -> Result<Vec<ArtifactDescriptor>, HbnError> {
        ArtifactKind::ALL
            .into_iter()
            .map(|kind| {
                Ok(ArtifactDescriptor {
                    kind,
                    subject_id: subject.clone(),
                    remote_key: self.resolver.resolve(subject, kind)?,
                    local_path: layout.artifact_path(subject, kind),
                })
            })
            .collect()
    }

    /// Stops at the first lookup or retrieval failure; later subjects are not attempted.
    pub fn fetch(
        &self,
        participants: &[ParticipantRecord],
        request: &FetchRequest<'_>,
        sink: &dyn ProgressSink,
    ) -> Result<FunctionalFetch, HbnError> {
        let total = participants.len();
        let mut subjects = Vec::with_capacity(total);

        for (idx, participant) in participants.iter().enumerate() {
            let subject = &participant.subject_id;
            sink.event(ProgressEvent {
                message: format!("phase=Resolve; subject {subject} ({}/{total})", idx + 1),
                elapsed: None,
            });
            let start = Instant::now();
            let planned = self.plan(subject, request.layout)?;

            let mut artifacts = Vec::with_capacity(planned.len());
            for artifact in planned {
                let retrieval = RetrievalRequest {
                    url: request.url_template.expand(&artifact.remote_key),
                    target: artifact.local_path.clone(),
                    resume: request.resume,
                };
                let local_path = self.retriever.retrieve(&retrieval)?;
                artifacts.push(ArtifactDescriptor {
                    local_path,
                    ..artifact
                });
            }

            sink.event(ProgressEvent {
                message: format!("phase=Store; subject {subject} complete"),
                elapsed: Some(start.elapsed()),
            });
            subjects.push(SubjectArtifacts {
                subject_id: subject.clone(),
                artifacts,
            });
        }

        Ok(FunctionalFetch {
            derivatives_dir: request.layout.derivatives_dir(),
            subjects,
        })
    }
}

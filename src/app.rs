use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::config::{DEFAULT_MASK_URL, ResolvedConfig};
use crate::domain::{SubjectId, UrlTemplate};
use crate::error::HbnError;
use crate::fetch::{FetchRequest, SubjectFetcher};
use crate::layout::DatasetLayout;
use crate::lookup::{LookupResolver, LookupSource};
use crate::registry::ParticipantRegistry;
use crate::retrieval::{FileRetriever, RetrievalRequest};

#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub resume: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { resume: true }
    }
}

/// Remote locations used by one [`App`].
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub participants_url: Option<String>,
    pub mask_url: String,
    pub artifact_url_template: UrlTemplate,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            participants_url: None,
            mask_url: DEFAULT_MASK_URL.to_string(),
            artifact_url_template: UrlTemplate::default(),
        }
    }
}

impl From<&ResolvedConfig> for Endpoints {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            participants_url: config.participants_url.clone(),
            mask_url: config.mask_url.clone(),
            artifact_url_template: config.artifact_url_template.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetResult {
    pub subject_ids: Vec<SubjectId>,
    pub mask_path: Utf8PathBuf,
    pub derivatives_dir: Utf8PathBuf,
    pub decoding_out_dir: Utf8PathBuf,
    pub mask_cache_dir: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<P: ParticipantRegistry, R: FileRetriever> {
    registry: P,
    retriever: R,
    lookup: LookupSource,
    endpoints: Endpoints,
}

impl<P: ParticipantRegistry, R: FileRetriever> App<P, R> {
    pub fn new(registry: P, retriever: R, lookup: LookupSource, endpoints: Endpoints) -> Self {
        Self {
            registry,
            retriever,
            lookup,
            endpoints,
        }
    }

    /// Registry, then every subject's artifacts, then the mask, then the
    /// output directories. Any failure aborts with no result.
    pub fn fetch_dataset(
        &self,
        data_dir: &Utf8Path,
        options: FetchOptions,
        sink: &dyn ProgressSink,
    ) -> Result<DatasetResult, HbnError> {
        let start = Instant::now();
        let layout = DatasetLayout::new(data_dir.to_path_buf());
        layout.ensure_root()?;

        sink.event(ProgressEvent {
            message: "phase=Registry; loading participants".to_string(),
            elapsed: None,
        });
        let participants = self
            .registry
            .load(&layout, self.endpoints.participants_url.as_deref())?;
        sink.event(ProgressEvent {
            message: format!("phase=Registry; {} participants", participants.len()),
            elapsed: None,
        });

        // Scoped to this call so the table is loaded at most once per run.
        let resolver = LookupResolver::new(self.lookup.clone());
        let fetcher = SubjectFetcher::new(&self.retriever, &resolver);
        let functional = fetcher.fetch(
            &participants,
            &FetchRequest {
                layout: &layout,
                url_template: &self.endpoints.artifact_url_template,
                resume: options.resume,
            },
            sink,
        )?;

        sink.event(ProgressEvent {
            message: "phase=Mask; fetching brain mask".to_string(),
            elapsed: None,
        });
        let mask_path = self.retriever.retrieve(&RetrievalRequest {
            url: self.endpoints.mask_url.clone(),
            target: layout.mask_path(),
            resume: options.resume,
        })?;

        sink.event(ProgressEvent {
            message: "phase=Layout; creating output directories".to_string(),
            elapsed: None,
        });
        let dirs = layout.ensure_output_dirs()?;

        sink.event(ProgressEvent {
            message: "phase=Done; dataset ready".to_string(),
            elapsed: Some(start.elapsed()),
        });

        Ok(DatasetResult {
            subject_ids: functional
                .subjects
                .into_iter()
                .map(|subject| subject.subject_id)
                .collect(),
            mask_path,
            derivatives_dir: functional.derivatives_dir,
            decoding_out_dir: dirs.decoding_out_dir,
            mask_cache_dir: dirs.mask_cache_dir,
        })
    }
}

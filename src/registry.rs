use std::collections::HashSet;
use std::fs;

use crate::domain::{ParticipantRecord, SubjectId};
use crate::error::HbnError;
use crate::layout::{DatasetLayout, PARTICIPANTS_FILE};
use crate::retrieval::{FileRetriever, RetrievalRequest};
use crate::tabular::parse_delimited;

pub const DEFAULT_PARTICIPANTS_URL: &str = "https://osf.io/wtvh3/download";

const PARTICIPANT_COLUMNS: usize = 4;

/// Source of truth for which subjects belong to the dataset.
pub trait ParticipantRegistry {
    fn load(
        &self,
        layout: &DatasetLayout,
        override_url: Option<&str>,
    ) -> Result<Vec<ParticipantRecord>, HbnError>;
}

/// Downloads `participants.csv` into the dataset root and parses it.
pub struct RemoteRegistry<F: FileRetriever> {
    retriever: F,
}

impl<F: FileRetriever> RemoteRegistry<F> {
    pub fn new(retriever: F) -> Self {
        Self { retriever }
    }
}

impl<F: FileRetriever> ParticipantRegistry for RemoteRegistry<F> {
    fn load(
        &self,
        layout: &DatasetLayout,
        override_url: Option<&str>,
    ) -> Result<Vec<ParticipantRecord>, HbnError> {
        let request = RetrievalRequest {
            url: override_url.unwrap_or(DEFAULT_PARTICIPANTS_URL).to_string(),
            target: layout.participants_path(),
            resume: false,
        };
        let path = self.retriever.retrieve(&request)?;
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HbnError::Filesystem(format!("read {path}: {err}")))?;
        parse_participants(&content)
    }
}

/// Positional schema: subject id, age, gender, handedness. Header is skipped.
pub fn parse_participants(text: &str) -> Result<Vec<ParticipantRecord>, HbnError> {
    let table = parse_delimited(PARTICIPANTS_FILE, text, PARTICIPANT_COLUMNS)?;
    let mut seen = HashSet::with_capacity(table.rows.len());
    let mut records = Vec::with_capacity(table.rows.len());

    for row in table.rows {
        let line = row.line;
        let [sid, age, gender, handedness]: [String; PARTICIPANT_COLUMNS] =
            row.fields.try_into().map_err(|_| {
                HbnError::parse(PARTICIPANTS_FILE, format!("line {line}: malformed row"))
            })?;
        let subject_id: SubjectId = sid.parse().map_err(|_| {
            HbnError::parse(
                PARTICIPANTS_FILE,
                format!("line {line}: invalid subject id {sid:?}"),
            )
        })?;
        let age: f64 = age.parse().map_err(|_| {
            HbnError::parse(
                PARTICIPANTS_FILE,
                format!("line {line}: age {age:?} is not a number"),
            )
        })?;
        if !seen.insert(subject_id.clone()) {
            return Err(HbnError::parse(
                PARTICIPANTS_FILE,
                format!("line {line}: duplicate subject id {subject_id}"),
            ));
        }
        records.push(ParticipantRecord {
            subject_id,
            age,
            gender,
            handedness,
        });
    }

    Ok(records)
}

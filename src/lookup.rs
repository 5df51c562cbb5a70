use std::collections::HashMap;
use std::fs;
use std::sync::OnceLock;

use camino::Utf8PathBuf;

use crate::domain::{ArtifactKind, LookupRow, SubjectId};
use crate::error::HbnError;
use crate::tabular::parse_delimited;

/// OSF download keys per subject, shipped with the crate.
pub const BUNDLED_LOOKUP: &str = include_str!("../assets/hbnssi.csv");

const LOOKUP_COLUMNS: usize = 5;

/// Where the lookup table is read from. Never fetched over the network.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LookupSource {
    #[default]
    Bundled,
    File(Utf8PathBuf),
    Inline(String),
}

impl LookupSource {
    pub fn load(&self) -> Result<LookupTable, HbnError> {
        match self {
            LookupSource::Bundled => LookupTable::parse("bundled lookup table", BUNDLED_LOOKUP),
            LookupSource::File(path) => {
                let content = fs::read_to_string(path.as_std_path()).map_err(|err| {
                    HbnError::Filesystem(format!("read lookup table {path}: {err}"))
                })?;
                LookupTable::parse(path.as_str(), &content)
            }
            LookupSource::Inline(content) => LookupTable::parse("inline lookup table", content),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    rows: HashMap<SubjectId, LookupRow>,
}

impl LookupTable {
    pub fn parse(source_name: &str, text: &str) -> Result<Self, HbnError> {
        let table = parse_delimited(source_name, text, LOOKUP_COLUMNS)?;
        let mut rows = HashMap::with_capacity(table.rows.len());
        for row in table.rows {
            let subject_id: SubjectId = row.fields[0].parse().map_err(|_| {
                HbnError::parse(
                    source_name,
                    format!("line {}: invalid subject id {:?}", row.line, row.fields[0]),
                )
            })?;
            if rows.contains_key(&subject_id) {
                return Err(HbnError::parse(
                    source_name,
                    format!("line {}: duplicate subject id {subject_id}", row.line),
                ));
            }
            let [_, raiders_key, flanker_key, condition_key, run_key]: [String; LOOKUP_COLUMNS] =
                row.fields.try_into().map_err(|_| {
                    HbnError::parse(source_name, format!("line {}: malformed row", row.line))
                })?;
            rows.insert(
                subject_id.clone(),
                LookupRow {
                    subject_id,
                    raiders_key,
                    flanker_key,
                    condition_key,
                    run_key,
                },
            );
        }
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn resolve(&self, subject: &SubjectId, kind: ArtifactKind) -> Result<&str, HbnError> {
        let missing = || HbnError::LookupMissing {
            subject: subject.to_string(),
            kind,
        };
        let key = self.rows.get(subject).ok_or_else(missing)?.key(kind);
        if key.is_empty() {
            return Err(missing());
        }
        Ok(key)
    }
}

pub trait KeyResolver {
    fn resolve(&self, subject: &SubjectId, kind: ArtifactKind) -> Result<String, HbnError>;
}

/// Loads its table on first use and keeps it for the rest of one fetch run.
#[derive(Debug)]
pub struct LookupResolver {
    source: LookupSource,
    table: OnceLock<LookupTable>,
}

impl LookupResolver {
    pub fn new(source: LookupSource) -> Self {
        Self {
            source,
            table: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn table(&self) -> Result<&LookupTable, HbnError> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }
        let loaded = self.source.load()?;
        if loaded.is_empty() {
            tracing::warn!("lookup table has no rows; every subject will be missing");
        } else {
            tracing::debug!(rows = loaded.len(), "lookup table loaded");
        }
        Ok(self.table.get_or_init(|| loaded))
    }
}

impl KeyResolver for LookupResolver {
    fn resolve(&self, subject: &SubjectId, kind: ArtifactKind) -> Result<String, HbnError> {
        self.table()?.resolve(subject, kind).map(str::to_string)
    }
}

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::HbnError;

pub const DEFAULT_ARTIFACT_URL_TEMPLATE: &str = "https://osf.io/download/{}/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Raiders,
    Flanker,
    Condition,
    Run,
}

impl ArtifactKind {
    /// Fetch order within one subject.
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Raiders,
        ArtifactKind::Flanker,
        ArtifactKind::Condition,
        ArtifactKind::Run,
    ];

    pub fn file_name(self, subject: &SubjectId) -> String {
        match self {
            ArtifactKind::Raiders => format!(
                "sub-{subject}_task-RAIDERS_space-MNI152NLin2009cAsym_desc-postproc_bold.nii.gz"
            ),
            ArtifactKind::Flanker => format!(
                "sub-{subject}_task-FLANKERTASK_space-MNI152NLin2009cAsym_desc-postproc_bold.nii.gz"
            ),
            ArtifactKind::Condition => format!("sub-{subject}_labels.csv"),
            ArtifactKind::Run => format!("sub-{subject}_runs.csv"),
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKind::Raiders => write!(f, "raiders"),
            ArtifactKind::Flanker => write!(f, "flanker"),
            ArtifactKind::Condition => write!(f, "condition"),
            ArtifactKind::Run => write!(f, "run"),
        }
    }
}

/// Participant identifier as listed in the registry, without the `sub-` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SubjectId {
    type Err = HbnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        // Ids end up inside file names, so nothing that could escape derivatives/.
        let is_valid =
            !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_alphanumeric());
        if !is_valid {
            return Err(HbnError::InvalidSubjectId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParticipantRecord {
    pub subject_id: SubjectId,
    pub age: f64,
    pub gender: String,
    pub handedness: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRow {
    pub subject_id: SubjectId,
    pub raiders_key: String,
    pub flanker_key: String,
    pub condition_key: String,
    pub run_key: String,
}

impl LookupRow {
    pub fn key(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Raiders => &self.raiders_key,
            ArtifactKind::Flanker => &self.flanker_key,
            ArtifactKind::Condition => &self.condition_key,
            ArtifactKind::Run => &self.run_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDescriptor {
    pub kind: ArtifactKind,
    pub subject_id: SubjectId,
    pub remote_key: String,
    pub local_path: Utf8PathBuf,
}

/// Remote location pattern with a single `{}` slot for an opaque OSF key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn expand(&self, key: &str) -> String {
        self.0.replacen("{}", key, 1)
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self(DEFAULT_ARTIFACT_URL_TEMPLATE.to_string())
    }
}

impl FromStr for UrlTemplate {
    type Err = HbnError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.matches("{}").count() != 1 {
            return Err(HbnError::InvalidUrlTemplate(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_subject_id_trims() {
        let id: SubjectId = " A001 ".parse().unwrap();
        assert_eq!(id.as_str(), "A001");
    }

    #[test]
    fn parse_subject_id_rejects_separators() {
        for raw in ["", "../A001", "A0/01", "sub-A001"] {
            let err = raw.parse::<SubjectId>().unwrap_err();
            assert_matches!(err, HbnError::InvalidSubjectId(_));
        }
    }

    #[test]
    fn artifact_file_names() {
        let id: SubjectId = "A001".parse().unwrap();
        assert_eq!(
            ArtifactKind::Raiders.file_name(&id),
            "sub-A001_task-RAIDERS_space-MNI152NLin2009cAsym_desc-postproc_bold.nii.gz"
        );
        assert_eq!(
            ArtifactKind::Flanker.file_name(&id),
            "sub-A001_task-FLANKERTASK_space-MNI152NLin2009cAsym_desc-postproc_bold.nii.gz"
        );
        assert_eq!(ArtifactKind::Condition.file_name(&id), "sub-A001_labels.csv");
        assert_eq!(ArtifactKind::Run.file_name(&id), "sub-A001_runs.csv");
    }

    #[test]
    fn url_template_requires_single_slot() {
        let template: UrlTemplate = "http://mirror.local/{}/file".parse().unwrap();
        assert_eq!(template.expand("abc12"), "http://mirror.local/abc12/file");

        assert_matches!(
            "http://mirror.local/file".parse::<UrlTemplate>(),
            Err(HbnError::InvalidUrlTemplate(_))
        );
        assert_matches!(
            "http://{}/{}".parse::<UrlTemplate>(),
            Err(HbnError::InvalidUrlTemplate(_))
        );
    }
}

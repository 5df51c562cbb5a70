use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;

use crate::domain::{ArtifactKind, SubjectId};
use crate::error::HbnError;

pub const DATASET_NAME: &str = "hbnssi";
pub const PARTICIPANTS_FILE: &str = "participants.csv";
pub const MASK_FILE: &str = "tpl-MNI152NLin2009cAsym_res-3mm_label-GM_desc-thr02_probseg.nii.gz";

/// Fixed on-disk layout of one dataset root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputDirs {
    pub decoding_out_dir: Utf8PathBuf,
    pub mask_cache_dir: Utf8PathBuf,
}

impl DatasetLayout {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// `<home>/nilearn_data/hbnssi`, the location other nilearn fetchers share.
    pub fn default_root() -> Result<Utf8PathBuf, HbnError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join("nilearn_data").join(DATASET_NAME))
                    .ok()
            })
            .ok_or_else(|| HbnError::Filesystem("unable to resolve dataset directory".to_string()))
    }

    pub fn derivatives_dir(&self) -> Utf8PathBuf {
        self.root.join("derivatives")
    }

    pub fn decoding_dir(&self) -> Utf8PathBuf {
        self.root.join("decoding")
    }

    pub fn mask_cache_dir(&self) -> Utf8PathBuf {
        self.root.join("mask_cache")
    }

    pub fn participants_path(&self) -> Utf8PathBuf {
        self.root.join(PARTICIPANTS_FILE)
    }

    pub fn mask_path(&self) -> Utf8PathBuf {
        self.root.join(MASK_FILE)
    }

    pub fn artifact_path(&self, subject: &SubjectId, kind: ArtifactKind) -> Utf8PathBuf {
        self.derivatives_dir().join(kind.file_name(subject))
    }

    pub fn artifact_paths(&self, subject: &SubjectId) -> Vec<(ArtifactKind, Utf8PathBuf)> {
        ArtifactKind::ALL
            .into_iter()
            .map(|kind| (kind, self.artifact_path(subject, kind)))
            .collect()
    }

    pub fn ensure_root(&self) -> Result<(), HbnError> {
        create_dir(&self.root)
    }

    pub fn ensure_output_dirs(&self) -> Result<OutputDirs, HbnError> {
        let decoding_out_dir = self.decoding_dir();
        let mask_cache_dir = self.mask_cache_dir();
        create_dir(&decoding_out_dir)?;
        create_dir(&mask_cache_dir)?;
        Ok(OutputDirs {
            decoding_out_dir,
            mask_cache_dir,
        })
    }
}

fn create_dir(path: &Utf8Path) -> Result<(), HbnError> {
    fs::create_dir_all(path.as_std_path())
        .map_err(|err| HbnError::Filesystem(format!("create {path}: {err}")))
}

//! Output layout, item naming and the end-of-run manifests.
//!
//! ```text
//! <root>/quant/<base>.npy
//! <root>/mel/<base>.npy
//! <root>/wav_gl/
//! <root>/dataset_ids.pkl
//! <root>/metadata.txt
//! ```

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::error::{ExportError, ItemError};

pub const QUANT_DIR: &str = "quant";
pub const MEL_DIR: &str = "mel";
pub const GRIFFIN_LIM_DIR: &str = "wav_gl";
pub const IDS_FILE: &str = "dataset_ids.pkl";
pub const METADATA_FILE: &str = "metadata.txt";

/// Canonical item name: the source file name without directory or extension.
pub fn base_name(source: &Path) -> Result<String, ItemError> {
    source
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or(ItemError::NoBaseName)
}

/// Fixed directory layout under an output root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn quant_dir(&self) -> PathBuf {
        self.root.join(QUANT_DIR)
    }

    pub fn mel_dir(&self) -> PathBuf {
        self.root.join(MEL_DIR)
    }

    pub fn griffin_lim_dir(&self) -> PathBuf {
        self.root.join(GRIFFIN_LIM_DIR)
    }

    pub fn mel_path(&self, base: &str) -> PathBuf {
        self.mel_dir().join(format!("{base}.npy"))
    }

    pub fn quant_path(&self, base: &str) -> PathBuf {
        self.quant_dir().join(format!("{base}.npy"))
    }

    pub fn ids_path(&self) -> PathBuf {
        self.root.join(IDS_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// Create the artifact directories. Safe to call on an existing root.
    pub fn create_dirs(&self) -> Result<(), ExportError> {
        for dir in [self.quant_dir(), self.mel_dir(), self.griffin_lim_dir()] {
            fs::create_dir_all(&dir).map_err(|e| ExportError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Drop manifests left by an earlier run so their presence keeps meaning
    /// "the last run finished".
    pub fn remove_stale_manifests(&self) -> Result<(), ExportError> {
        for path in [self.ids_path(), self.metadata_path()] {
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed stale manifest {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ExportError::io(&path, e)),
            }
        }
        Ok(())
    }
}

/// One manifest row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRecord {
    pub id: String,
    pub source: PathBuf,
    pub mel_path: PathBuf,
}

/// Where the manifests of a finished run were written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
    pub ids: PathBuf,
    pub metadata: PathBuf,
}

/// Records in traversal order, with one base name per source.
#[derive(Debug, Default)]
pub struct Manifest {
    records: Vec<ExportRecord>,
    claimed: HashMap<String, PathBuf>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if `base` already belongs to an exported record from another
    /// source. Checked before any artifact is written.
    pub fn check_unclaimed(&self, base: &str, source: &Path) -> Result<(), ItemError> {
        match self.claimed.get(base) {
            Some(first) if first != source => Err(ItemError::DuplicateBaseName {
                name: base.to_string(),
                first: first.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Append an exported record. Its base name is claimed from here on.
    pub fn push(&mut self, record: ExportRecord) {
        self.claimed
            .entry(record.id.clone())
            .or_insert_with(|| record.source.clone());
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ExportRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<ExportRecord> {
        self.records
    }

    pub fn ids(&self) -> Vec<String> {
        self.records.iter().map(|r| r.id.clone()).collect()
    }

    /// `source|mel_path` lines, in traversal order.
    pub fn metadata_lines(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&format!(
                "{}|{}\n",
                record.source.display(),
                record.mel_path.display()
            ));
        }
        out
    }

    /// Write both manifests. Each goes to a temporary sibling first and is
    /// renamed into place.
    pub fn write(&self, layout: &OutputLayout) -> Result<ManifestPaths, ExportError> {
        let ids = serde_pickle::to_vec(&self.ids(), serde_pickle::SerOptions::new())?;
        let ids_path = layout.ids_path();
        write_replace(&ids_path, &ids)?;

        let metadata_path = layout.metadata_path();
        write_replace(&metadata_path, self.metadata_lines().as_bytes())?;

        Ok(ManifestPaths {
            ids: ids_path,
            metadata: metadata_path,
        })
    }
}

fn write_replace(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    {
        let mut file = fs::File::create(&tmp).map_err(|e| ExportError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| ExportError::io(&tmp, e))?;
        file.sync_all().map_err(|e| ExportError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| ExportError::io(path, e))
}

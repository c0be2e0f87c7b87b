use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use uuid::Uuid;

use crate::geometry::Rotation;
use crate::viewport::DocumentViewport;

pub type DocumentId = Uuid;

static DOCUMENT_NAMESPACE: Lazy<Uuid> = Lazy::new(|| {
    Uuid::parse_str("3d1f6a0e-5c2b-5e4f-9a7d-1b8c0e2f4a61").expect("valid namespace UUID")
});

/// Stable id for a file: uuid v5 over its canonical path.
pub fn document_id_for_path(path: &Path) -> DocumentId {
    let resolved = path
        .canonicalize()
        .or_else(|_| {
            if path.is_absolute() {
                Ok(path.to_path_buf())
            } else {
                std::env::current_dir().map(|cwd| cwd.join(path))
            }
        })
        .unwrap_or_else(|_| path.to_path_buf());
    let rendered = resolved.to_string_lossy();
    Uuid::new_v5(&DOCUMENT_NAMESPACE, rendered.as_bytes())
}

/// What survives between two openings of the same file.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentState {
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub viewport: Option<DocumentViewport>,
    pub bookmarks: Vec<usize>,
    pub rotation: Rotation,
}

pub trait StateStore: Send + Sync {
    fn load(&self, id: DocumentId) -> Result<Option<DocumentState>>;
    fn save(&self, id: DocumentId, state: &DocumentState) -> Result<()>;
}

pub struct FileStateStore {
    root: PathBuf,
}

impl FileStateStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create state directory at {:?}", root))?;
        Ok(Self { root })
    }

    fn state_path(&self, id: DocumentId) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

impl StateStore for FileStateStore {
    fn load(&self, id: DocumentId) -> Result<Option<DocumentState>> {
        let path = self.state_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&path).with_context(|| format!("failed to open state file {:?}", path))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)?;
        let state = serde_json::from_str(&buf)
            .with_context(|| format!("failed to decode state file {:?}", path))?;
        Ok(Some(state))
    }

    fn save(&self, id: DocumentId, state: &DocumentState) -> Result<()> {
        let path = self.state_path(id);
        let tmp = path.with_extension("json.tmp");
        let payload = serde_json::to_string_pretty(state)?;
        let mut file = File::create(&tmp)
            .with_context(|| format!("failed to open temp state file {:?}", tmp))?;
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStateStore {
    inner: Mutex<HashMap<DocumentId, DocumentState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, id: DocumentId) -> Result<Option<DocumentState>> {
        Ok(self.inner.lock().get(&id).cloned())
    }

    fn save(&self, id: DocumentId, state: &DocumentState) -> Result<()> {
        self.inner.lock().insert(id, state.clone());
        Ok(())
    }
}

// src/blob.rs
//! Remote file storage collaborator (a shared drive folder, a bucket, ...).
//!
//! Stores may hold several files with the same name in one folder, so
//! everything past `list` addresses files by id.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::rollup::window::{parse_dated_name, DatedFile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub id: String,
    pub name: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list(&self, folder: &str) -> Result<Vec<BlobEntry>>;
    async fn delete(&self, id: &str) -> Result<()>;
    /// Returns the new file's id.
    async fn create(&self, folder: &str, name: &str, bytes: Vec<u8>) -> Result<String>;
    async fn fetch(&self, id: &str) -> Result<Vec<u8>>;
}

/// Upload `local` into `folder`, deleting every same-named file first.
pub async fn upload_replacing<S: BlobStore + ?Sized>(
    store: &S,
    folder: &str,
    local: &Path,
) -> Result<String> {
    let name = local
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("no file name in {}", local.display()))?
        .to_string();
    let bytes = tokio::fs::read(local)
        .await
        .with_context(|| format!("reading {}", local.display()))?;

    for existing in store.list(folder).await?.into_iter().filter(|e| e.name == name) {
        debug!(target: "blob", folder, id = %existing.id, name = %name, "deleting previous copy");
        store.delete(&existing.id).await?;
    }
    let id = store.create(folder, &name, bytes).await?;
    info!(target: "blob", folder, name = %name, id = %id, "uploaded");
    Ok(id)
}

/// Download `<stem>_<YYYY-MM-DD>.csv` files dated within `[start, end]` into
/// `dest`, in (date, name) order. Returns the local paths written.
pub async fn download_window<S: BlobStore + ?Sized>(
    store: &S,
    folder: &str,
    stem: &str,
    start: NaiveDate,
    end: NaiveDate,
    dest: &Path,
) -> Result<Vec<PathBuf>> {
    let mut picks: Vec<(DatedFile, String)> = store
        .list(folder)
        .await?
        .into_iter()
        .filter_map(|e| {
            let date = parse_dated_name(&e.name, stem, "csv")?;
            (start <= date && date <= end).then(|| {
                (
                    DatedFile {
                        date,
                        path: PathBuf::from(&e.name),
                    },
                    e.id,
                )
            })
        })
        .collect();

    picks.sort_by(|(a, _), (b, _)| a.date.cmp(&b.date).then_with(|| a.path.cmp(&b.path)));

    tokio::fs::create_dir_all(dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;

    let mut written = Vec::with_capacity(picks.len());
    for (file, id) in picks {
        let bytes = store.fetch(&id).await?;
        let local = dest.join(&file.path);
        tokio::fs::write(&local, bytes)
            .await
            .with_context(|| format!("writing {}", local.display()))?;
        written.push(local);
    }
    info!(target: "blob", folder, stem, %start, %end, files = written.len(), "downloaded window");
    Ok(written)
}

/// Store backed by a local directory; folders are subdirectories and the
/// id of a file is `<folder>/<name>`.
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, id: &str) -> Result<PathBuf> {
        if Path::new(id)
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return Err(anyhow!("invalid blob id: {id}"));
        }
        Ok(self.root.join(id))
    }
}

#[async_trait]
impl BlobStore for LocalDirStore {
    async fn list(&self, folder: &str) -> Result<Vec<BlobEntry>> {
        let dir = self.resolve(folder)?;
        let mut rd = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("listing {}", dir.display())),
        };
        let mut out = Vec::new();
        while let Some(entry) = rd.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                out.push(BlobEntry {
                    id: format!("{folder}/{name}"),
                    name: name.to_string(),
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.resolve(id)?;
        tokio::fs::remove_file(&path)
            .await
            .with_context(|| format!("deleting {}", path.display()))
    }

    async fn create(&self, folder: &str, name: &str, bytes: Vec<u8>) -> Result<String> {
        let id = format!("{folder}/{name}");
        let path = self.resolve(&id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(id)
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(id)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }
}

// --- Test helper ---
/// In-memory store that, like a shared drive, allows duplicate names.
#[derive(Default)]
pub struct MemoryStore {
    files: Mutex<Vec<(String, BlobEntry, Vec<u8>)>>,
    next_id: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names currently in `folder`, in insertion order.
    pub fn names(&self, folder: &str) -> Vec<String> {
        self.files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|(f, _, _)| f == folder)
            .map(|(_, e, _)| e.name.clone())
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn list(&self, folder: &str) -> Result<Vec<BlobEntry>> {
        let files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        Ok(files
            .iter()
            .filter(|(f, _, _)| f == folder)
            .map(|(_, e, _)| e.clone())
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        let before = files.len();
        files.retain(|(_, e, _)| e.id != id);
        if files.len() == before {
            return Err(anyhow!("no such blob: {id}"));
        }
        Ok(())
    }

    async fn create(&self, folder: &str, name: &str, bytes: Vec<u8>) -> Result<String> {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
            *next += 1;
            format!("mem-{}", *next)
        };
        self.files.lock().unwrap_or_else(|p| p.into_inner()).push((
            folder.to_string(),
            BlobEntry {
                id: id.clone(),
                name: name.to_string(),
            },
            bytes,
        ));
        Ok(id)
    }

    async fn fetch(&self, id: &str) -> Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|(_, e, _)| e.id == id)
            .map(|(_, _, b)| b.clone())
            .ok_or_else(|| anyhow!("no such blob: {id}"))
    }
}

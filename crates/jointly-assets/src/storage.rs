use anyhow::{Result, bail};
use jointly_types::models::AssetKind;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Suffix of in-flight writes. Never referenced by the repository.
pub const PART_SUFFIX: &str = ".part";

pub(crate) const MAX_NAME_CHARS: usize = 100;

/// Where a stored file lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// `events/{event_id}/{media|voice}/`
    Asset { event_id: i64, kind: AssetKind },
    /// `headers/`, shared by all events.
    Header,
}

impl Target {
    fn relative_dir(&self) -> String {
        match self {
            Target::Asset { event_id, kind } => format!("events/{}/{}", event_id, kind.dir_name()),
            Target::Header => "headers".to_string(),
        }
    }

    /// Root-relative reference persisted in the repository.
    pub fn reference(&self, file_name: &str) -> String {
        format!("{}/{}", self.relative_dir(), file_name)
    }
}

/// Manages the on-disk upload tree.
///
/// Layout under the root:
/// `events/{event_id}/media/`, `events/{event_id}/voice/`, `headers/`.
/// Every file name is generated here; client names only survive as a
/// sanitized suffix.
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Upload storage root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{root}/events/{event_id}`
    pub fn event_dir(&self, event_id: i64) -> PathBuf {
        self.root.join("events").join(event_id.to_string())
    }

    /// Physical directory of a target, without touching the disk.
    pub fn dir_path(&self, target: Target) -> PathBuf {
        match target {
            Target::Asset { event_id, kind } => self.event_dir(event_id).join(kind.dir_name()),
            Target::Header => self.root.join("headers"),
        }
    }

    /// Directory for one event's assets of one kind, created on demand.
    /// `create_dir_all` tolerates a concurrent creator.
    pub async fn directory_for(&self, event_id: i64, kind: AssetKind) -> Result<PathBuf> {
        self.ensure_dir(Target::Asset { event_id, kind }).await
    }

    async fn ensure_dir(&self, target: Target) -> Result<PathBuf> {
        let dir = self.dir_path(target);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Physical location of a generated file name.
    pub fn resolve_asset(&self, event_id: i64, kind: AssetKind, file_name: &str) -> Result<PathBuf> {
        if !is_plain_component(file_name) {
            bail!("invalid stored file name: {:?}", file_name);
        }
        Ok(self.dir_path(Target::Asset { event_id, kind }).join(file_name))
    }

    /// Map a persisted reference back to its physical location. References
    /// that are absolute or climb out of the root are rejected.
    pub fn resolve(&self, reference: &str) -> Result<PathBuf> {
        if reference.is_empty() || reference.contains('\\') {
            bail!("invalid storage reference: {:?}", reference);
        }
        let mut path = self.root.clone();
        for part in reference.split('/') {
            if !is_plain_component(part) {
                bail!("invalid storage reference: {:?}", reference);
            }
            path.push(part);
        }
        Ok(path)
    }

    /// Map a physical path under the root to its reference.
    pub fn reference_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Option<Vec<&str>> = rel
            .components()
            .map(|c| match c {
                Component::Normal(s) => s.to_str(),
                _ => None,
            })
            .collect();
        let parts = parts?;
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Write `data` under a freshly generated name and return a guard for it.
    ///
    /// Bytes go to `{name}.part`, are synced, then renamed into place, so the
    /// final name only ever holds a complete file. The guard removes the file
    /// on drop unless `persist` is called once the owning row is committed.
    pub async fn write_staged(
        &self,
        target: Target,
        original_name: &str,
        data: &[u8],
    ) -> Result<StagedFile> {
        let dir = self.ensure_dir(target).await?;
        let file_name = generate_file_name(original_name);
        let final_path = dir.join(&file_name);
        let part_path = dir.join(format!("{}{}", file_name, PART_SUFFIX));

        if let Err(e) = write_synced(&part_path, data).await {
            fs::remove_file(&part_path).await.ok();
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&part_path, &final_path).await {
            fs::remove_file(&part_path).await.ok();
            return Err(e.into());
        }

        debug!("Stored {} bytes at {}", data.len(), final_path.display());
        Ok(StagedFile {
            reference: target.reference(&file_name),
            path: final_path,
            persisted: false,
        })
    }

    /// Delete one stored file. Absence is not an error.
    pub async fn delete(&self, reference: &str) -> Result<()> {
        let path = self.resolve(reference)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted stored file {}", reference);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Stored file {} already gone", reference);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an event's whole storage subtree. Absence is not an error.
    pub async fn delete_tree(&self, event_id: i64) -> Result<()> {
        let dir = self.event_dir(event_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!("Deleted storage tree for event {}", event_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Every regular file under the root with its modification time.
    /// Blocking; run it off the async runtime.
    pub fn list_files(&self) -> Result<Vec<StoredFile>> {
        let mut out = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let entry = entry?;
                let meta = entry.metadata()?;
                let path = entry.path();
                if meta.is_dir() {
                    pending.push(path);
                } else if meta.is_file() {
                    if let Some(reference) = self.reference_of(&path) {
                        out.push(StoredFile {
                            reference,
                            path,
                            modified: meta.modified()?,
                        });
                    }
                }
            }
        }
        Ok(out)
    }
}

/// A file found on disk by [`Storage::list_files`].
#[derive(Debug, Clone)]
pub struct StoredFile {
    pub reference: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// A complete file whose repository row is not committed yet.
#[derive(Debug)]
pub struct StagedFile {
    reference: String,
    path: PathBuf,
    persisted: bool,
}

impl StagedFile {
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the file. Call only after the row pointing at it is committed.
    pub fn persist(mut self) -> String {
        self.persisted = true;
        std::mem::take(&mut self.reference)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.persisted {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Discarded uncommitted file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to discard uncommitted file {}: {}", self.path.display(), e),
        }
    }
}

async fn write_synced(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Public URL a stored reference is served under.
pub fn public_url(reference: &str) -> String {
    format!("/uploads/{}", reference)
}

/// `{uuid}_{sanitized client name}`
pub fn generate_file_name(original_name: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitize_file_name(original_name))
}

/// Reduce an untrusted name to a single safe path component: last path
/// segment only, anything but alphanumerics and `._-` becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "file".to_string()
    } else {
        cleaned
    }
}

fn is_plain_component(part: &str) -> bool {
    !part.is_empty()
        && part != "."
        && part != ".."
        && !part.contains(['/', '\\', '\0'])
        && !part.contains(':')
}

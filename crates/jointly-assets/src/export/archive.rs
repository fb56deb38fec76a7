use std::fs::File;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use jointly_db::models::{MediaRow, VoiceNoteRow};
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::{MAX_NAME_CHARS, Storage, sanitize_file_name};

const ANONYMOUS: &str = "Anonymous";

/// One candidate archive entry: the label that follows the index prefix and
/// the file on disk.
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    pub label: String,
    pub path: PathBuf,
}

/// Media entries, in repository order, labelled with the original file name.
pub fn media_sources(storage: &Storage, media: &[MediaRow]) -> Vec<ArchiveSource> {
    media
        .iter()
        .filter_map(|m| {
            let path = resolve_logged(storage, &m.storage_ref)?;
            Some(ArchiveSource {
                label: sanitize_file_name(&m.original_name),
                path,
            })
        })
        .collect()
}

/// Voice note entries, oldest first, labelled with the contributor name and
/// the stored file's extension.
pub fn voice_sources(storage: &Storage, notes: &[VoiceNoteRow]) -> Vec<ArchiveSource> {
    let mut ordered: Vec<&VoiceNoteRow> = notes.iter().collect();
    ordered.sort_by_key(|n| (n.created_at, n.id));

    ordered
        .into_iter()
        .filter_map(|n| {
            let path = resolve_logged(storage, &n.storage_ref)?;
            let name = n
                .sender_name
                .as_deref()
                .map(|s| s.replace(' ', "_"))
                .unwrap_or_else(|| ANONYMOUS.to_string());
            Some(ArchiveSource {
                label: voice_label(&name, &extension_with_dot(&path)),
                path,
            })
        })
        .collect()
}

/// Deflate every source that can be opened into one ZIP. Unreadable sources
/// are skipped and do not consume an index.
pub fn build_zip(sources: &[ArchiveSource]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut index = 0usize;
    for source in sources {
        let mut file = match File::open(&source.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Skipping missing file {}", source.path.display());
                continue;
            }
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", source.path.display(), e);
                continue;
            }
        };

        index += 1;
        let entry = format!("{:03}_{}", index, source.label);
        zip.start_file(entry.as_str(), options)
            .with_context(|| format!("failed to start archive entry {}", entry))?;
        io::copy(&mut file, &mut zip)
            .with_context(|| format!("failed to archive {}", source.path.display()))?;
    }

    let cursor = zip.finish().context("failed to finish archive")?;
    Ok(cursor.into_inner())
}

fn resolve_logged(storage: &Storage, reference: &str) -> Option<PathBuf> {
    match storage.resolve(reference) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Skipping asset with bad storage reference: {}", e);
            None
        }
    }
}

/// The name is cut to leave room for the extension, so the extension always
/// survives.
fn voice_label(name: &str, ext: &str) -> String {
    let room = MAX_NAME_CHARS.saturating_sub(ext.chars().count());
    let stem: String = sanitize_file_name(name).chars().take(room).collect();
    format!("{}{}", stem, ext)
}

fn extension_with_dot(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

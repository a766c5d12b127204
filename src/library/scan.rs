use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::events::types::AppEvent;
use crate::library::{FileEntry, is_audio_file};

const CHUNK_SIZE: usize = 100;

/// Scan one directory (non-recursive) for audio files, emitting entries in
/// chunks so a large directory shows up incrementally.
pub fn spawn(
    dir: PathBuf,
    extensions: Vec<String>,
    event_tx: mpsc::Sender<AppEvent>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                let _ = event_tx.send(AppEvent::ScanError(format!("{}: {e}", dir.display())));
                return;
            }
        };

        let mut chunk = Vec::new();
        let mut total = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || !is_audio_file(&path, &extensions) {
                continue;
            }
            // Files that vanish or are unreadable mid-scan are skipped.
            let Ok(metadata) = entry.metadata() else {
                continue;
            };

            chunk.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path,
                size: metadata.len(),
            });
            total += 1;

            if chunk.len() >= CHUNK_SIZE
                && event_tx
                    .send(AppEvent::ScanChunk(std::mem::take(&mut chunk)))
                    .is_err()
            {
                return;
            }
        }

        if !chunk.is_empty() {
            let _ = event_tx.send(AppEvent::ScanChunk(chunk));
        }
        debug!("scanned {} audio files in {}", total, dir.display());
        let _ = event_tx.send(AppEvent::ScanFinished(total));
    })
}

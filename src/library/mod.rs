use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use crate::player::Player;

pub mod scan;

/// One audio file found by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

pub fn is_audio_file(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
}

/// The caller-side view of a scanned directory: entries plus a mark set.
/// Lives on the caller thread; nothing here is shared with the workers.
#[derive(Default)]
pub struct Library {
    entries: Vec<FileEntry>,
    marked: HashSet<PathBuf>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, chunk: Vec<FileEntry>) {
        self.entries.extend(chunk);
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn is_marked(&self, path: &Path) -> bool {
        self.marked.contains(path)
    }

    /// Flip the mark on a path, returning the new state.
    pub fn toggle_mark(&mut self, path: &Path) -> bool {
        if self.marked.remove(path) {
            false
        } else {
            self.marked.insert(path.to_path_buf());
            true
        }
    }

    pub fn clear_marks(&mut self) {
        self.marked.clear();
    }

    pub fn marked(&self) -> Vec<PathBuf> {
        self.marked.iter().cloned().collect()
    }

    /// Delete a file from disk and from the library. Playback of that file
    /// is interrupted and pending queue entries for it are dropped first.
    pub fn delete(&mut self, path: &Path, player: &Player) -> io::Result<()> {
        if player.current_file().as_deref() == Some(path) {
            player.interrupt();
        }
        player.remove(path);

        std::fs::remove_file(path)?;

        self.marked.remove(path);
        self.entries.retain(|e| e.path != path);
        Ok(())
    }

    /// Delete every marked file, returning the paths that failed.
    pub fn delete_marked(&mut self, player: &Player) -> Vec<(PathBuf, io::Error)> {
        let mut failures = Vec::new();
        for path in self.marked() {
            if let Err(e) = self.delete(&path, player) {
                failures.push((path, e));
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_matching_is_case_insensitive() {
        let exts = vec!["mp3".to_string(), "flac".to_string()];
        assert!(is_audio_file(Path::new("song.MP3"), &exts));
        assert!(is_audio_file(Path::new("song.flac"), &exts));
        assert!(!is_audio_file(Path::new("notes.txt"), &exts));
        assert!(!is_audio_file(Path::new("no_extension"), &exts));
    }

    #[test]
    fn toggle_mark_flips_state() {
        let mut library = Library::new();
        let path = Path::new("a.mp3");

        assert!(library.toggle_mark(path));
        assert!(library.is_marked(path));
        assert!(!library.toggle_mark(path));
        assert!(!library.is_marked(path));
    }

    #[test]
    fn clear_marks_empties_set() {
        let mut library = Library::new();
        library.toggle_mark(Path::new("a.mp3"));
        library.toggle_mark(Path::new("b.mp3"));

        library.clear_marks();

        assert!(library.marked().is_empty());
    }
}

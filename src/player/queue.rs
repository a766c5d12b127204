use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// FIFO of file paths awaiting playback. Multiple producers, one consumer
/// (the engine thread), which waits on the condvar while the queue is empty.
#[derive(Default)]
pub struct PlayQueue {
    inner: Mutex<VecDeque<PathBuf>>,
    available: Condvar,
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, path: PathBuf) {
        self.inner.lock().unwrap().push_back(path);
        self.available.notify_one();
    }

    /// Pop the next entry, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PathBuf> {
        let mut inner = self.inner.lock().unwrap();
        if inner.is_empty() {
            let (guard, _) = self.available.wait_timeout(inner, timeout).unwrap();
            inner = guard;
        }
        inner.pop_front()
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap().clear();
    }

    pub fn remove(&self, path: &Path) {
        self.inner.lock().unwrap().retain(|p| p != path);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_fifo_order() {
        let queue = PlayQueue::new();
        queue.push(PathBuf::from("a.mp3"));
        queue.push(PathBuf::from("b.mp3"));

        assert_eq!(
            queue.pop_timeout(Duration::ZERO),
            Some(PathBuf::from("a.mp3"))
        );
        assert_eq!(
            queue.pop_timeout(Duration::ZERO),
            Some(PathBuf::from("b.mp3"))
        );
    }

    #[test]
    fn pop_times_out_when_empty() {
        let queue = PlayQueue::new();
        assert_eq!(queue.pop_timeout(Duration::from_millis(10)), None);
    }

    #[test]
    fn remove_drops_matching_entries_only() {
        let queue = PlayQueue::new();
        queue.push(PathBuf::from("a.mp3"));
        queue.push(PathBuf::from("b.mp3"));
        queue.push(PathBuf::from("a.mp3"));

        queue.remove(Path::new("a.mp3"));

        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.pop_timeout(Duration::ZERO),
            Some(PathBuf::from("b.mp3"))
        );
    }

    #[test]
    fn clear_empties_queue() {
        let queue = PlayQueue::new();
        queue.push(PathBuf::from("a.mp3"));
        queue.push(PathBuf::from("b.mp3"));

        queue.clear();

        assert!(queue.is_empty());
    }
}

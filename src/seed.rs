//! Seeding the in-memory queue for local runs
//!
//! A seed file carries one queue message body per line (JSON, the same
//! shape the source queue delivers). Blank lines and `#` comments are
//! skipped.

use std::path::Path;

use ahash::AHashMap;
use anyhow::Context;
use volley_queue::MemoryQueue;

/// Load a seed file into the queue, returning the number of messages
/// enqueued.
pub fn load_seed_file(queue: &MemoryQueue, path: &Path) -> anyhow::Result<usize> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading seed file {}", path.display()))?;

    let mut count = 0;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        queue.push(line, AHashMap::new());
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_seed_file_skips_blanks_and_comments() {
        let path = std::env::temp_dir().join(format!("volley-seed-{}.jsonl", std::process::id()));
        std::fs::write(
            &path,
            "# a comment\n\
             {\"to\":\"a@x.com\",\"subject\":\"s\",\"content\":\"one\"}\n\
             \n\
             {\"to\":\"b@y.com\",\"subject\":\"s\",\"content\":\"two\"}\n",
        )
        .unwrap();

        let queue = MemoryQueue::new(Duration::from_secs(300));
        let count = load_seed_file(&queue, &path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(count, 2);
        assert_eq!(queue.visible_len(), 2);
    }

    #[test]
    fn test_missing_seed_file_is_an_error() {
        let queue = MemoryQueue::new(Duration::from_secs(300));
        assert!(load_seed_file(&queue, Path::new("/nonexistent/seed")).is_err());
    }
}

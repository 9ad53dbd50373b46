//! On-disk workspace cleanup. Out of the core's scope (§1); the launcher
//! owns clearing the share tree before a run starts and after it ends so a
//! stale host's materialized files never leak into a fresh process.

use std::path::Path;

pub fn clear(root: &Path) -> std::io::Result<()> {
    if root.exists() {
        std::fs::remove_dir_all(root)?;
    }
    std::fs::create_dir_all(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_recreates_an_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("shared");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("leftover.txt"), b"stale").unwrap();

        clear(&root).unwrap();

        assert!(root.is_dir());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn clear_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("brand-new");
        clear(&root).unwrap();
        assert!(root.is_dir());
    }
}

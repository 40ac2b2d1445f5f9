//! Asset fetching for the presentation layer
//!
//! The engine never looks inside assets. It only passes descriptors (the
//! `asset` strings on tiles and entities) to a fetcher.

use log::debug;
use shared::AssetUnavailable;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

pub trait AssetFetcher: Send {
    /// Loads the asset named by `descriptor`, failing with the descriptor
    /// and a reason
    fn fetch(&mut self, descriptor: &str) -> Result<Arc<Vec<u8>>, AssetUnavailable>;
}

/// Reads assets from files below a root directory, caching each one
pub struct FileFetcher {
    root: PathBuf,
    cache: HashMap<String, Arc<Vec<u8>>>,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: HashMap::new(),
        }
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&mut self, descriptor: &str) -> Result<Arc<Vec<u8>>, AssetUnavailable> {
        if let Some(asset) = self.cache.get(descriptor) {
            return Ok(Arc::clone(asset));
        }

        if !is_relative_below(descriptor) {
            return Err(AssetUnavailable {
                descriptor: descriptor.to_string(),
                reason: "descriptor escapes the asset directory".to_string(),
            });
        }

        let path = self.root.join(descriptor);
        let data = std::fs::read(&path).map_err(|e| AssetUnavailable {
            descriptor: descriptor.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        debug!("Loaded asset {} ({} bytes)", descriptor, data.len());

        let asset = Arc::new(data);
        self.cache.insert(descriptor.to_string(), Arc::clone(&asset));
        Ok(asset)
    }
}

/// True for a non-empty relative path that never leaves the directory it is joined to
fn is_relative_below(descriptor: &str) -> bool {
    let mut components = Path::new(descriptor).components().peekable();
    components.peek().is_some()
        && components.all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("roomsync-assets-{}-{}", name, std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        root
    }

    #[test]
    fn test_fetch_reads_and_caches() {
        let root = temp_root("cache");
        std::fs::write(root.join("gem.png"), b"gem-bytes").unwrap();

        let mut fetcher = FileFetcher::new(&root);
        let first = assert_ok!(fetcher.fetch("gem.png"));
        assert_eq!(first.as_slice(), b"gem-bytes");

        std::fs::remove_file(root.join("gem.png")).unwrap();
        let second = assert_ok!(fetcher.fetch("gem.png"));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.cached(), 1);
    }

    #[test]
    fn test_missing_asset_names_descriptor() {
        let mut fetcher = FileFetcher::new(temp_root("missing"));
        let error = fetcher.fetch("nothing.png").unwrap_err();
        assert_eq!(error.descriptor, "nothing.png");
    }

    #[test]
    fn test_parent_directory_is_refused() {
        let mut fetcher = FileFetcher::new(temp_root("escape"));
        assert_err!(fetcher.fetch("../secret.png"));
        assert_err!(fetcher.fetch("tiles/../../secret.png"));
        assert_err!(fetcher.fetch(""));
    }

    #[test]
    fn test_absolute_descriptor_is_refused() {
        let outside = temp_root("outside").join("secret.png");
        std::fs::write(&outside, b"secret").unwrap();
        let descriptor = outside.to_string_lossy().into_owned();

        let mut fetcher = FileFetcher::new(temp_root("absolute"));
        let error = assert_err!(fetcher.fetch(&descriptor));
        assert_eq!(error.descriptor, descriptor);
        assert_err!(fetcher.fetch("/etc/passwd"));
        assert_eq!(fetcher.cached(), 0);
    }

    #[test]
    fn test_nested_descriptor_is_read() {
        let root = temp_root("nested");
        std::fs::create_dir_all(root.join("tiles")).unwrap();
        std::fs::write(root.join("tiles").join("floor.png"), b"floor").unwrap();

        let mut fetcher = FileFetcher::new(&root);
        let asset = assert_ok!(fetcher.fetch("tiles/floor.png"));
        assert_eq!(asset.as_slice(), b"floor");
        assert_ok!(fetcher.fetch("./tiles/floor.png"));
    }
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use walkdir::WalkDir;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Ordered collection of raw input files. `load` runs on a blocking worker.
pub trait FileSource: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn name(&self, index: usize) -> String;

    fn load(&self, index: usize) -> Result<Vec<u8>>;
}

/// Files already held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Vec<(String, Vec<u8>)>,
}

impl MemorySource {
    pub fn new(files: Vec<(String, Vec<u8>)>) -> Self {
        Self { files }
    }
}

impl FileSource for MemorySource {
    fn len(&self) -> usize {
        self.files.len()
    }

    fn name(&self, index: usize) -> String {
        self.files
            .get(index)
            .map(|(name, _)| name.clone())
            .unwrap_or_default()
    }

    fn load(&self, index: usize) -> Result<Vec<u8>> {
        match self.files.get(index) {
            Some((_, bytes)) => Ok(bytes.clone()),
            None => bail!("no file at index {index}"),
        }
    }
}

/// Image files under a directory, in path order. Contents are read lazily so
/// only the batch in flight is resident.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    paths: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn scan(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            bail!("{} is not a directory", root.display());
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && is_image(entry.path()) => {
                    paths.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => log::warn!("Skipping unreadable entry: {err}"),
            }
        }
        paths.sort();

        log::info!("Found {} images under {}", paths.len(), root.display());
        Ok(Self {
            root: root.to_path_buf(),
            paths,
        })
    }
}

impl FileSource for DirectorySource {
    fn len(&self) -> usize {
        self.paths.len()
    }

    fn name(&self, index: usize) -> String {
        let Some(path) = self.paths.get(index) else {
            return String::new();
        };
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned()
    }

    fn load(&self, index: usize) -> Result<Vec<u8>> {
        let path = self
            .paths
            .get(index)
            .with_context(|| format!("no file at index {index}"))?;
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_scan_keeps_sorted_images_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("b.JPG"), b"b").unwrap();
        fs::write(dir.path().join("a.png"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"skip").unwrap();
        fs::write(dir.path().join("nested").join("c.webp"), b"c").unwrap();

        let source = DirectorySource::scan(dir.path()).unwrap();
        assert_eq!(source.len(), 3);
        assert_eq!(source.name(0), "a.png");
        assert_eq!(source.name(1), "b.JPG");
        assert_eq!(
            PathBuf::from(source.name(2)),
            Path::new("nested").join("c.webp")
        );
        assert_eq!(source.load(2).unwrap(), b"c");
        assert!(source.load(3).is_err());
    }

    #[test]
    fn scanning_a_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.png");
        fs::write(&file, b"a").unwrap();
        assert!(DirectorySource::scan(&file).is_err());
    }

    #[test]
    fn memory_source_reports_missing_indices() {
        assert!(MemorySource::default().is_empty());
        let source = MemorySource::new(vec![("one.jpg".into(), vec![1])]);
        assert_eq!(source.name(0), "one.jpg");
        assert_eq!(source.load(0).unwrap(), vec![1]);
        assert!(source.load(1).is_err());
    }
}

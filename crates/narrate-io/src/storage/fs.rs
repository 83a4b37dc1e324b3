use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::Storage;

/// Local filesystem storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl Storage for FsStorage {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let p = self.resolve(path);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Storage(format!("mkparent: {e}")))?;
        }
        // Write to a sibling temp file, then rename, so readers never see half a manifest.
        let tmp = p.with_extension("partial");
        let mut f = File::create(&tmp).map_err(|e| Error::Storage(format!("create: {e}")))?;
        f.write_all(bytes)
            .map_err(|e| Error::Storage(format!("write: {e}")))?;
        f.flush()
            .map_err(|e| Error::Storage(format!("flush: {e}")))?;
        fs::rename(&tmp, &p).map_err(|e| Error::Storage(format!("rename: {e}")))?;
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        fs::read(self.resolve(path)).map_err(|e| Error::Storage(format!("read {path}: {e}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let p = self.resolve(path);
        if p.exists() {
            fs::remove_file(p).map_err(|e| Error::Storage(format!("delete: {e}")))?;
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        // Walk the deepest directory the prefix names, then filter by string prefix.
        let dir = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };
        let start = self.resolve(dir);
        let mut results = Vec::new();
        if !start.is_dir() {
            return Ok(results);
        }

        fn visit_dirs(dir: &Path, rel: &str, results: &mut Vec<String>) -> std::io::Result<()> {
            for entry in fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();
                let child = if rel.is_empty() {
                    name
                } else {
                    format!("{rel}/{name}")
                };
                if path.is_dir() {
                    visit_dirs(&path, &child, results)?;
                } else {
                    results.push(child);
                }
            }
            Ok(())
        }

        visit_dirs(&start, dir, &mut results)
            .map_err(|e| Error::Storage(format!("list: {e}")))?;

        results.retain(|p| p.starts_with(prefix) && !p.ends_with(".partial"));
        results.sort();
        Ok(results)
    }

    fn size(&self, path: &str) -> Result<u64> {
        let meta = fs::metadata(self.resolve(path))
            .map_err(|e| Error::Storage(format!("size: {e}")))?;
        Ok(meta.len())
    }
}

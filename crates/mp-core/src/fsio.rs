//! Filesystem port.
//!
//! The engine never touches `std::fs` directly; everything goes through
//! the `Fs` trait so the lifecycle state machine can run against the
//! in-memory fake in tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::Result;

pub trait Fs: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Write the whole file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &str) -> Result<()>;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
    /// Whether any executable permission bit is set. Errors if the path
    /// cannot be inspected at all.
    fn is_executable(&self, path: &Path) -> Result<bool>;
    fn symlink(&self, target: &Path, link: &Path) -> Result<()>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    /// Full paths of the entries directly under `path`.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

// ---------------------------------------------------------------------------
// OsFs
// ---------------------------------------------------------------------------

/// Real filesystem adapter. Writes are atomic (tempfile + rename) so a
/// crash mid-write cannot corrupt metadata files.
pub struct OsFs;

impl Fs for OsFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(path)?)
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        atomic_write(path, contents.as_bytes())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(std::fs::create_dir_all(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_executable(&self, path: &Path) -> Result<bool> {
        let meta = std::fs::metadata(path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            Ok(meta.permissions().mode() & 0o111 != 0)
        }
        #[cfg(not(unix))]
        {
            Ok(meta.is_file())
        }
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        #[cfg(unix)]
        {
            Ok(std::os::unix::fs::symlink(target, link)?)
        }
        #[cfg(not(unix))]
        {
            Ok(std::os::windows::fs::symlink_dir(target, link)?)
        }
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(std::fs::remove_file(path)?)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(path)? {
            entries.push(entry?.path());
        }
        entries.sort();
        Ok(entries)
    }
}

/// Atomically write `data` to `path` using a tempfile in the same directory.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = path.parent().unwrap_or(Path::new("."));
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// MemFs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct MemFile {
    contents: String,
    executable: bool,
}

#[derive(Default)]
struct MemState {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
    links: BTreeMap<PathBuf, PathBuf>,
}

/// In-memory fake. Paths are taken verbatim; tests use absolute paths
/// throughout so no normalization is attempted.
#[derive(Default)]
pub struct MemFs {
    inner: Mutex<MemState>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl Into<PathBuf>, contents: &str) {
        self.insert(path.into(), contents, false);
    }

    pub fn add_executable(&self, path: impl Into<PathBuf>, contents: &str) {
        self.insert(path.into(), contents, true);
    }

    pub fn link_target(&self, link: &Path) -> Option<PathBuf> {
        self.inner.lock().unwrap().links.get(link).cloned()
    }

    fn insert(&self, path: PathBuf, contents: &str, executable: bool) {
        let mut s = self.inner.lock().unwrap();
        add_ancestors(&mut s.dirs, &path);
        s.files.insert(
            path,
            MemFile {
                contents: contents.to_string(),
                executable,
            },
        );
    }
}

fn add_ancestors(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
    let mut cur = path.parent();
    while let Some(p) = cur {
        if p.as_os_str().is_empty() {
            break;
        }
        dirs.insert(p.to_path_buf());
        cur = p.parent();
    }
}

fn not_found(path: &Path) -> crate::error::MpError {
    std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
    .into()
}

impl Fs for MemFs {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let s = self.inner.lock().unwrap();
        s.files
            .get(path)
            .map(|f| f.contents.clone())
            .ok_or_else(|| not_found(path))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let mut s = self.inner.lock().unwrap();
        add_ancestors(&mut s.dirs, path);
        let executable = s.files.get(path).map(|f| f.executable).unwrap_or(false);
        s.files.insert(
            path.to_path_buf(),
            MemFile {
                contents: contents.to_string(),
                executable,
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        let mut s = self.inner.lock().unwrap();
        add_ancestors(&mut s.dirs, path);
        s.dirs.insert(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let s = self.inner.lock().unwrap();
        s.files.contains_key(path) || s.dirs.contains(path) || s.links.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.inner.lock().unwrap().dirs.contains(path)
    }

    fn is_executable(&self, path: &Path) -> Result<bool> {
        let s = self.inner.lock().unwrap();
        s.files
            .get(path)
            .map(|f| f.executable)
            .ok_or_else(|| not_found(path))
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut s = self.inner.lock().unwrap();
        add_ancestors(&mut s.dirs, link);
        s.links.insert(link.to_path_buf(), target.to_path_buf());
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut s = self.inner.lock().unwrap();
        if s.files.remove(path).is_none() && s.links.remove(path).is_none() {
            return Err(not_found(path));
        }
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let s = self.inner.lock().unwrap();
        if !s.dirs.contains(path) {
            return Err(not_found(path));
        }
        let mut entries: Vec<PathBuf> = s
            .files
            .keys()
            .chain(s.dirs.iter())
            .chain(s.links.keys())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

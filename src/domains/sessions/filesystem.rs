//! Private filesystem backing one session.
//!
//! Virtual "/" maps onto a scratch directory owned by the session and removed
//! with it. Callers hand in normalized virtual paths (see
//! [`crate::shared::vpath`]); the mapping never produces a host path outside
//! the scratch directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::errors::SandboxError;
use crate::shared::vpath;

const SCRATCH_PREFIX: &str = "gitgym-session-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
}

fn missing(path: &str) -> SandboxError {
    SandboxError::invalid_input("", format!("{path}: No such file or directory"))
}

#[derive(Debug)]
pub struct SessionFs {
    root: TempDir,
}

impl SessionFs {
    pub fn new(scratch_root: Option<&Path>) -> Result<Self, SandboxError> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix(SCRATCH_PREFIX);
            builder
        };
        let root = match scratch_root {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .map_err(|e| SandboxError::io("create scratch root", dir.display(), e))?;
                builder.tempdir_in(dir)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| SandboxError::io("create session filesystem", "scratch", e))?;
        Ok(Self { root })
    }

    pub fn host_root(&self) -> &Path {
        self.root.path()
    }

    pub fn host_path(&self, path: &str) -> PathBuf {
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            self.root.path().to_path_buf()
        } else {
            self.root.path().join(relative)
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.host_path(path).exists()
    }

    pub fn is_dir(&self, path: &str) -> bool {
        self.host_path(path).is_dir()
    }

    pub fn is_file(&self, path: &str) -> bool {
        self.host_path(path).is_file()
    }

    pub fn read(&self, path: &str) -> Result<String, SandboxError> {
        let host = self.host_path(path);
        if host.is_dir() {
            return Err(SandboxError::invalid_input("", format!("{path}: Is a directory")));
        }
        let bytes = fs::read(&host).map_err(|_| missing(path))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn require_parent(&self, path: &str) -> Result<(), SandboxError> {
        match vpath::parent(path) {
            Some(parent) if !self.is_dir(parent) => Err(missing(path)),
            _ => Ok(()),
        }
    }

    pub fn write(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
        self.require_parent(path)?;
        let host = self.host_path(path);
        if host.is_dir() {
            return Err(SandboxError::invalid_input("", format!("{path}: Is a directory")));
        }
        fs::write(&host, content).map_err(|e| SandboxError::io("write file", path, e))
    }

    pub fn append(&self, path: &str, content: &[u8]) -> Result<(), SandboxError> {
        self.require_parent(path)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.host_path(path))
            .map_err(|e| SandboxError::io("append file", path, e))?;
        file.write_all(content)
            .map_err(|e| SandboxError::io("append file", path, e))
    }

    /// Creates an empty file, or leaves an existing one untouched.
    pub fn touch(&self, path: &str) -> Result<(), SandboxError> {
        if self.exists(path) {
            return Ok(());
        }
        self.write(path, b"")
    }

    pub fn create_dir(&self, path: &str, parents: bool) -> Result<(), SandboxError> {
        let host = self.host_path(path);
        if parents {
            if host.is_file() {
                return Err(SandboxError::invalid_input("", format!("{path}: File exists")));
            }
            return fs::create_dir_all(&host)
                .map_err(|e| SandboxError::io("create directory", path, e));
        }
        if host.exists() {
            return Err(SandboxError::invalid_input("", format!("{path}: File exists")));
        }
        self.require_parent(path)?;
        fs::create_dir(&host).map_err(|e| SandboxError::io("create directory", path, e))
    }

    pub fn remove(&self, path: &str, recursive: bool) -> Result<(), SandboxError> {
        if path == vpath::ROOT {
            return Err(SandboxError::invalid_input(
                "",
                "refusing to remove '/'",
            ));
        }
        let host = self.host_path(path);
        if host.is_dir() {
            if !recursive {
                return Err(SandboxError::invalid_input("", format!("{path}: Is a directory")));
            }
            return fs::remove_dir_all(&host)
                .map_err(|e| SandboxError::io("remove directory", path, e));
        }
        if !host.exists() {
            return Err(missing(path));
        }
        fs::remove_file(&host).map_err(|e| SandboxError::io("remove file", path, e))
    }

    /// Directory listing sorted by name. Hidden entries are skipped unless
    /// `all` is set.
    pub fn list(&self, path: &str, all: bool) -> Result<Vec<DirEntryInfo>, SandboxError> {
        let host = self.host_path(path);
        if host.is_file() {
            return Ok(vec![DirEntryInfo {
                name: vpath::file_name(path).unwrap_or(path).to_string(),
                is_dir: false,
            }]);
        }
        let entries = fs::read_dir(&host).map_err(|_| missing(path))?;

        let mut listing: Vec<DirEntryInfo> = entries
            .flatten()
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                if !all && name.starts_with('.') {
                    return None;
                }
                let is_dir = entry.file_type().ok()?.is_dir();
                Some(DirEntryInfo { name, is_dir })
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_append_round_trip() {
        let fs = SessionFs::new(None).unwrap();
        fs.write("/notes.txt", b"one\n").unwrap();
        fs.append("/notes.txt", b"two\n").unwrap();
        assert_eq!(fs.read("/notes.txt").unwrap(), "one\ntwo\n");
        assert!(fs.host_path("/notes.txt").starts_with(fs.host_root()));
    }

    #[test]
    fn write_requires_existing_parent() {
        let fs = SessionFs::new(None).unwrap();
        let err = fs.write("/missing/file", b"x").unwrap_err();
        assert_eq!(err.to_string(), "/missing/file: No such file or directory");
        fs.create_dir("/missing", false).unwrap();
        fs.write("/missing/file", b"x").unwrap();
    }

    #[test]
    fn create_dir_and_remove() {
        let fs = SessionFs::new(None).unwrap();
        fs.create_dir("/a/b/c", true).unwrap();
        assert!(fs.is_dir("/a/b/c"));
        assert!(fs.create_dir("/a", false).is_err());

        assert!(fs.remove("/a", false).is_err());
        fs.remove("/a", true).unwrap();
        assert!(!fs.exists("/a"));
        assert!(fs.remove("/", true).is_err());
    }

    #[test]
    fn listing_hides_dotfiles_by_default() {
        let fs = SessionFs::new(None).unwrap();
        fs.touch("/.hidden").unwrap();
        fs.touch("/b.txt").unwrap();
        fs.create_dir("/a", false).unwrap();

        let names: Vec<String> = fs.list("/", false).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b.txt"]);
        let all = fs.list("/", true).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|e| e.name == "a" && e.is_dir));
    }

    #[test]
    fn scratch_directory_is_removed_on_drop() {
        let fs = SessionFs::new(None).unwrap();
        let host = fs.host_root().to_path_buf();
        assert!(host.exists());
        drop(fs);
        assert!(!host.exists());
    }
}

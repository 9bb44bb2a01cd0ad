//! Local file store: the hosted directory this node serves files from and
//! saves verified downloads into.

use std::io;
use std::path::{Path, PathBuf};

/// Handle on the hosted-files directory for one node.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) the hosted-files root.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names of regular files currently hosted, sorted for stable display.
    pub fn list(&self) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Ok(name) = entry.file_name().into_string() {
                    out.push(name);
                }
            }
        }
        out.sort();
        Ok(out)
    }

    /// Read a hosted file's content.
    pub fn read(&self, name: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.checked_path(name)?)
    }

    /// Write a verified download next to the hosted files.
    pub fn save(&self, name: &str, bytes: &[u8]) -> io::Result<()> {
        std::fs::write(self.checked_path(name)?, bytes)
    }

    /// Reject names that would escape the hosted root.
    fn checked_path(&self, name: &str) -> io::Result<PathBuf> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("unsafe file name: {name:?}"),
            ));
        }
        Ok(self.root.join(name))
    }
}

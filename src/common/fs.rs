//! File system helpers
//!
//! Credential and certificate material is read through the [`FileReader`]
//! collaborator so the proxy core never touches the file system directly.

use std::path::{Path, PathBuf};

use futures::future::BoxFuture;

use super::error::{ProxyError, Result};

/// Reads whole files for the proxy core
pub trait FileReader: Send + Sync {
    /// Read the file at `path` into memory
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Default reader backed by `tokio::fs`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileReader;

impl FileReader for TokioFileReader {
    fn read<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(read_file(path))
    }
}

/// Check that a path exists and is a regular file
pub fn check_file_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(ProxyError::Config(format!("File not found: {}", path.display())));
    }

    if !path.is_file() {
        return Err(ProxyError::Config(format!("Path is not a file: {}", path.display())));
    }

    Ok(())
}

/// Read file contents
pub async fn read_file(path: &Path) -> Result<Vec<u8>> {
    check_file_exists(path)?;

    tokio::fs::read(path).await.map_err(ProxyError::Io)
}

/// Resolve a path against the current working directory
pub fn to_absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_check_file_exists() {
        let path = PathBuf::from("Cargo.toml");
        assert!(check_file_exists(&path).is_ok(), "Should accept an existing file");

        let path = PathBuf::from("non_existent_file.txt");
        assert!(check_file_exists(&path).is_err(), "Should reject a missing file");

        let path = PathBuf::from("src");
        assert!(check_file_exists(&path).is_err(), "Should reject a directory");
    }

    #[tokio::test]
    async fn test_read_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();

        let content = TokioFileReader.read(file.path()).await.unwrap();
        assert_eq!(content, b"hello");

        let missing = TokioFileReader.read(Path::new("non_existent_file.txt")).await;
        assert!(missing.is_err());
    }

    #[test]
    fn test_to_absolute() {
        let abs = to_absolute(Path::new("auth.json")).unwrap();
        assert!(abs.is_absolute());
        assert!(abs.ends_with("auth.json"));

        let root = to_absolute(Path::new("/etc/auth.json")).unwrap();
        assert_eq!(root, PathBuf::from("/etc/auth.json"));
    }
}

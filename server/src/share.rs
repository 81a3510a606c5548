// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ShareError {
    /// A relative path contained a parent-directory segment.
    #[error("Invalid path")]
    Traversal,

    /// The share mount is missing or not a directory.
    #[error("share unavailable: {0}")]
    Unavailable(String),

    #[error("share I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Strips characters that are illegal in share folder/file names
/// (the Windows-invalid set plus control characters), collapses runs of
/// whitespace and caps the length.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .filter(|c| {
            !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') && !c.is_control()
        })
        .collect();

    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(80)
        .collect()
}

/// Default folder name for a case: `"<case_number> - <client_name>"`,
/// both parts sanitized.
pub fn default_case_folder(case_number: &str, client_name: &str) -> String {
    format!(
        "{} - {}",
        sanitize_name(case_number),
        sanitize_name(client_name)
    )
}

/// Joins relative share path parts with forward slashes, dropping empty
/// parts and redundant separators.
pub fn join_share_path(parts: &[&str]) -> String {
    let joined = parts
        .iter()
        .filter(|p| !p.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("/");

    let mut out = String::with_capacity(joined.len());
    let mut prev_sep = true; // also trims leading separators
    for c in joined.chars() {
        let sep = c == '/' || c == '\\';
        if sep {
            if !prev_sep {
                out.push('/');
            }
        } else {
            out.push(c);
        }
        prev_sep = sep;
    }
    out
}

/// A validated relative path inside the share.
///
/// Construction is the traversal guard: any `..` segment is rejected
/// here, before the path can reach a share session. Backslashes from
/// legacy stored paths are normalized to forward slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharePath(String);

impl SharePath {
    pub fn new(raw: &str) -> Result<Self, ShareError> {
        let cleaned = raw.replace('\\', "/");
        if cleaned.split('/').any(|segment| segment == "..") {
            return Err(ShareError::Traversal);
        }
        Ok(Self(join_share_path(&[&cleaned])))
    }

    /// Appends one already-sanitized component.
    pub fn join(&self, name: &str) -> Result<Self, ShareError> {
        Self::new(&join_share_path(&[&self.0, name]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The file-storage collaborator.
///
/// One session per request: handlers connect at the top, use the session,
/// and the session is released when it goes out of scope on every exit
/// path (RAII replaces the acquire/finally-close of a remote-share
/// client).
#[async_trait]
pub trait FileShare: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ShareSession>, ShareError>;
}

#[async_trait]
pub trait ShareSession: Send {
    /// Recursively creates the folder; an existing folder is fine.
    async fn ensure_dir(&mut self, path: &SharePath) -> Result<(), ShareError>;

    /// Entry names directly under the folder.
    async fn list(&mut self, path: &SharePath) -> Result<Vec<String>, ShareError>;

    async fn put(&mut self, path: &SharePath, data: Vec<u8>) -> Result<(), ShareError>;

    async fn get(&mut self, path: &SharePath) -> Result<Vec<u8>, ShareError>;
}

/// Production share backed by the mounted network-share directory.
pub struct MountedShare {
    root: PathBuf,
}

impl MountedShare {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl FileShare for MountedShare {
    async fn connect(&self) -> Result<Box<dyn ShareSession>, ShareError> {
        let meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| ShareError::Unavailable(format!("{}: {}", self.root.display(), e)))?;
        if !meta.is_dir() {
            return Err(ShareError::Unavailable(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        debug!("Share session opened at {}", self.root.display());
        Ok(Box::new(MountedSession {
            root: self.root.clone(),
        }))
    }
}

struct MountedSession {
    root: PathBuf,
}

impl MountedSession {
    fn resolve(&self, path: &SharePath) -> PathBuf {
        let mut full = self.root.clone();
        for segment in path.as_str().split('/').filter(|s| !s.is_empty()) {
            full.push(segment);
        }
        full
    }
}

impl Drop for MountedSession {
    fn drop(&mut self) {
        debug!("Share session released");
    }
}

#[async_trait]
impl ShareSession for MountedSession {
    async fn ensure_dir(&mut self, path: &SharePath) -> Result<(), ShareError> {
        tokio::fs::create_dir_all(self.resolve(path)).await?;
        Ok(())
    }

    async fn list(&mut self, path: &SharePath) -> Result<Vec<String>, ShareError> {
        let mut entries = tokio::fs::read_dir(self.resolve(path)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    async fn put(&mut self, path: &SharePath, data: Vec<u8>) -> Result<(), ShareError> {
        tokio::fs::write(self.resolve(path), data).await?;
        Ok(())
    }

    async fn get(&mut self, path: &SharePath) -> Result<Vec<u8>, ShareError> {
        Ok(tokio::fs::read(self.resolve(path)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_invalid_chars() {
        assert_eq!(sanitize_name("a<b>c:d\"e/f\\g|h?i*j"), "abcdefghij");
        assert_eq!(sanitize_name("report\x01\x1f.pdf"), "report.pdf");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_and_trims() {
        assert_eq!(sanitize_name("  Acme   Ltd  "), "Acme Ltd");
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(200);
        assert_eq!(sanitize_name(&long).chars().count(), 80);
    }

    #[test]
    fn test_default_case_folder() {
        assert_eq!(
            default_case_folder("C-100", "Acme Ltd"),
            "C-100 - Acme Ltd"
        );
        assert_eq!(
            default_case_folder("C/101", "A|B Co"),
            "C101 - AB Co"
        );
    }

    #[test]
    fn test_join_share_path() {
        assert_eq!(join_share_path(&["cases", "C-1 - Acme"]), "cases/C-1 - Acme");
        assert_eq!(join_share_path(&["", "cases"]), "cases");
        assert_eq!(join_share_path(&["/cases//a", "b"]), "cases/a/b");
    }

    #[test]
    fn test_share_path_rejects_traversal() {
        assert!(matches!(
            SharePath::new("cases/../secrets"),
            Err(ShareError::Traversal)
        ));
        assert!(matches!(
            SharePath::new("..\\secrets"),
            Err(ShareError::Traversal)
        ));
        assert!(SharePath::new("cases/C-1 - Acme").is_ok());
        // ".." must be a whole segment to be a traversal
        assert!(SharePath::new("cases/draft..v2").is_ok());
    }

    #[test]
    fn test_share_path_join() {
        let base = SharePath::new("cases/C-1 - Acme").unwrap();
        let file = base.join("scan.pdf").unwrap();
        assert_eq!(file.as_str(), "cases/C-1 - Acme/scan.pdf");
    }

    #[tokio::test]
    async fn test_mounted_share_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let share = MountedShare::new(dir.path().to_path_buf());

        let folder = SharePath::new("cases/C-9 - Client").unwrap();
        let file = folder.join("note.txt").unwrap();

        let mut session = share.connect().await.unwrap();
        session.ensure_dir(&folder).await.unwrap();
        session.put(&file, b"hello".to_vec()).await.unwrap();

        let names = session.list(&folder).await.unwrap();
        assert_eq!(names, vec!["note.txt".to_string()]);

        let data = session.get(&file).await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn test_mounted_share_missing_root_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let share = MountedShare::new(missing);
        let err = share.connect().await.err().unwrap();
        assert!(matches!(err, ShareError::Unavailable(_)));
    }
}

//! Static front-end files.
//!
//! Resolves request paths beneath a fixed public root:
//!
//! | Request | Served file |
//! |---------|-------------|
//! | `/` or empty | `index.html` |
//! | a directory | `<dir>/index.html` |
//! | `/about` (no extension, no such file) | `about.html` if it is a file |
//! | anything resolving outside the root | `403` |
//! | anything else missing | `404` |
//!
//! The containment check runs twice: once on the lexically normalized path
//! (so `..` segments cannot climb out even for files that do not exist) and
//! again on the canonical path of whatever is found on disk (so symlinks
//! cannot point out of the root either).

use std::path::{Component, Path, PathBuf};

use crate::error::{ServiceError, ServiceResult};

/// A file read from the public root.
#[derive(Debug)]
pub struct Asset {
    pub path: PathBuf,
    pub body: Vec<u8>,
    pub content_type: String,
}

pub struct AssetServer {
    root: PathBuf,
}

impl AssetServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Maps a URL path to a file on disk.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::Forbidden`] when the path escapes the public root.
    /// - [`ServiceError::NotFound`] when the root or the file is missing.
    pub async fn resolve(&self, url_path: &str) -> ServiceResult<PathBuf> {
        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|_| ServiceError::NotFound("Static directory missing".to_string()))?;

        let raw = url_path.split('?').next().unwrap_or_default();
        let decoded = String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned();
        let requested = if decoded.is_empty() || decoded == "/" {
            "/index.html".to_string()
        } else {
            decoded
        };

        let mut target = normalize(&root.join(requested.trim_start_matches('/')));
        ensure_within(&target, &root)?;

        if exists(&target).await {
            target = canonical_within(&target, &root).await?;
        }

        if is_dir(&target).await {
            target = target.join("index.html");
        }

        if !exists(&target).await {
            if target.extension().is_some() {
                return Err(not_found());
            }
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(not_found)?;
            let candidate = target.with_file_name(format!("{name}.html"));
            if !is_file(&candidate).await {
                return Err(not_found());
            }
            target = canonical_within(&candidate, &root).await?;
        }

        if !is_file(&target).await {
            return Err(not_found());
        }
        Ok(target)
    }

    /// Resolves `url_path` and reads the file with a guessed content type.
    pub async fn serve(&self, url_path: &str) -> ServiceResult<Asset> {
        let path = self.resolve(url_path).await?;
        let body = tokio::fs::read(&path).await.map_err(|_| not_found())?;
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();
        Ok(Asset {
            path,
            body,
            content_type,
        })
    }
}

fn not_found() -> ServiceError {
    ServiceError::NotFound("File not found".to_string())
}

/// Collapses `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn ensure_within(path: &Path, root: &Path) -> ServiceResult<()> {
    if path.starts_with(root) {
        Ok(())
    } else {
        tracing::warn!(path = %path.display(), "rejected asset path outside public root");
        Err(ServiceError::Forbidden("Access denied".to_string()))
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_dir())
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

async fn canonical_within(path: &Path, root: &Path) -> ServiceResult<PathBuf> {
    let canonical = tokio::fs::canonicalize(path).await.map_err(|_| not_found())?;
    ensure_within(&canonical, root)?;
    Ok(canonical)
}

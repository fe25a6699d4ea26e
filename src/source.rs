//! Where a document's bytes come from.
//!
//! A locator may be a plain path, a percent-encoded path, a `file://` URL or
//! an `http(s)://` URL. Everything is resolved to bytes before parsing.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::ViewerError;

/// Input accepted by a [`crate::loader::DocumentParser`].
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentSource {
    Bytes(Vec<u8>),
    Path(PathBuf),
    Remote(url::Url),
}

impl DocumentSource {
    /// Interpret a user-supplied locator string.
    pub fn from_locator(locator: &str) -> Result<Self, ViewerError> {
        let trimmed = locator.trim();
        if trimmed.is_empty() {
            return Err(ViewerError::InvalidLocator("empty locator".to_string()));
        }

        if let Ok(url) = url::Url::parse(trimmed) {
            match url.scheme() {
                "http" | "https" => return Ok(Self::Remote(url)),
                "file" => {
                    return url_to_file_path(&url)
                        .map(Self::Path)
                        .ok_or_else(|| ViewerError::InvalidLocator(trimmed.to_string()));
                }
                // Windows drive letters parse as a one-letter scheme.
                scheme if scheme.len() > 1 => {
                    return Err(ViewerError::InvalidLocator(format!(
                        "unsupported scheme '{}'",
                        scheme
                    )));
                }
                _ => {}
            }
        }

        // Handle URL-encoded paths (e.g., spaces as %20)
        if !Path::new(trimmed).exists() {
            if let Ok(decoded) = urlencoding::decode(trimmed) {
                let decoded = decoded.into_owned();
                if decoded != trimmed && Path::new(&decoded).exists() {
                    debug!("Locator resolved after percent-decoding: {}", decoded);
                    return Ok(Self::Path(PathBuf::from(decoded)));
                }
            }
        }

        Ok(Self::Path(PathBuf::from(trimmed)))
    }

    /// Resolve the source to raw document bytes.
    pub async fn into_bytes(self) -> Result<Vec<u8>, ViewerError> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Path(path) => {
                debug!("Reading document from {}", path.display());
                std::fs::read(&path)
                    .map_err(|e| ViewerError::ParseFailure(format!("{}: {}", path.display(), e)))
            }
            Self::Remote(url) => fetch_remote(&url).await,
        }
    }

    /// Reject local paths that are not existing `.pdf` files. In-memory and
    /// remote sources pass; their content is checked by the parser.
    pub fn check_pdf_path(&self) -> Result<(), ViewerError> {
        match self {
            Self::Path(path) if !is_pdf_file(path) => {
                let reason = if looks_like_pdf(path) {
                    "no such file"
                } else {
                    "not a PDF file"
                };
                Err(ViewerError::InvalidLocator(format!(
                    "{}: {}",
                    path.display(),
                    reason
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
            Self::Path(path) => path.display().to_string(),
            Self::Remote(url) => url.to_string(),
        }
    }
}

async fn fetch_remote(url: &url::Url) -> Result<Vec<u8>, ViewerError> {
    info!("Fetching document from {}", url);
    let response = reqwest::get(url.clone())
        .await
        .map_err(|e| ViewerError::ParseFailure(format!("{}: {}", url, e)))?
        .error_for_status()
        .map_err(|e| ViewerError::ParseFailure(format!("{}: {}", url, e)))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ViewerError::ParseFailure(format!("{}: {}", url, e)))?;
    Ok(bytes.to_vec())
}

/// Convert a `file://` URL to a path, handling percent-encoding.
fn url_to_file_path(url: &url::Url) -> Option<PathBuf> {
    url.to_file_path().ok()
}

/// Check if a path is an existing PDF file.
fn is_pdf_file(path: &Path) -> bool {
    path.is_file() && looks_like_pdf(path)
}

fn looks_like_pdf(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

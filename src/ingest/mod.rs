//! Document ingestion — upload staging, URL classification, MIME
//! validation, and the partitioning seam.

pub mod partition;

pub use partition::{Block, BlockCategory, DocumentPartitioner, TextPartitioner};

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::{UpstreamError, ValidationError};

/// MIME types accepted by the embed endpoint.
pub const ALLOWED_DOC_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "text/plain",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/csv",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/markdown",
    "text/html",
    "application/xml",
    "text/xml",
];

/// Reject uploads whose declared content type is not on the allow-list.
pub fn validate_content_type(content_type: &str) -> Result<(), ValidationError> {
    if ALLOWED_DOC_TYPES.contains(&content_type) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedFileType {
            allowed: ALLOWED_DOC_TYPES.join(", "),
            got: content_type.to_string(),
        })
    }
}

/// Detect MIME type from a file path's extension.
pub fn detect_content_type(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .map(|m| m.essence_str().to_string())
}

static STORAGE_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://(.+\.)?(s3\.amazonaws\.com|storage\.googleapis\.com|blob\.core\.windows\.net|dropbox\.com|onedrive\.live\.com|box\.com|github\.com|digitaloceanspaces\.com|wasabisys\.com|backblazeb2\.com)",
    )
    .expect("storage domain regex should compile")
});

static FILE_EXTENSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r".+\.(pdf|doc|docx|txt|xls|xlsx|csv|ppt|pptx|md|html|xml)$")
        .expect("file extension regex should compile")
});

/// Split submitted URLs into downloadable file URLs (known storage domains
/// with a document extension) and plain web URLs.
pub fn classify_urls(urls: &[String]) -> (Vec<String>, Vec<String>) {
    let mut file_urls = Vec::new();
    let mut web_urls = Vec::new();

    for url in urls {
        if STORAGE_DOMAIN_RE.is_match(url) {
            if FILE_EXTENSION_RE.is_match(url) {
                file_urls.push(url.clone());
            }
        } else if url.starts_with("http://") || url.starts_with("https://") {
            web_urls.push(url.clone());
        }
    }

    (file_urls, web_urls)
}

/// Stage uploaded bytes under the worker directory with a unique name.
pub async fn save_upload(
    dir: &str,
    original_name: &str,
    bytes: &[u8],
) -> Result<PathBuf, UpstreamError> {
    tokio::fs::create_dir_all(dir).await?;
    let basename = Path::new(original_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let path = Path::new(dir).join(format!("{}_{basename}", Uuid::new_v4().simple()));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Download a file URL into the worker directory.
pub async fn save_url_file(
    http: &reqwest::Client,
    dir: &str,
    url: &str,
) -> Result<PathBuf, UpstreamError> {
    let resp = http.get(url).send().await?;
    if !resp.status().is_success() {
        return Err(UpstreamError::Download(format!(
            "{url} returned {}",
            resp.status()
        )));
    }
    let name = url
        .rsplit('/')
        .next()
        .filter(|n| !n.is_empty())
        .unwrap_or("download");
    let name = name.split(['?', '#']).next().unwrap_or("download");
    let bytes = resp.bytes().await?;
    save_upload(dir, name, &bytes).await
}

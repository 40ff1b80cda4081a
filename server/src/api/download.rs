//! Turning downloaded files into responses: either the file body itself or,
//! with `returnFile=false`, a copy under the downloads directory.

use axum::{
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine as _;
use instagate_sdk::DownloadedFile;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, AppResult};

/// File inlined in a JSON body, used when one request yields several files.
#[derive(Debug, Serialize)]
pub struct EncodedFile {
    pub filename: String,
    pub content_type: String,
    pub size: usize,
    /// Standard base64.
    pub data: String,
}

impl From<DownloadedFile> for EncodedFile {
    fn from(file: DownloadedFile) -> Self {
        Self {
            size: file.data.len(),
            data: base64::engine::general_purpose::STANDARD.encode(&file.data),
            filename: file.filename,
            content_type: file.content_type,
        }
    }
}

/// Keep only the last path component and characters safe in a header.
fn safe_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("download");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "download".to_string()
    } else {
        cleaned
    }
}

/// Resolve `folder` below `root`. Only plain relative paths are accepted.
pub fn target_dir(root: &Path, folder: &str) -> AppResult<PathBuf> {
    let folder = folder.trim();
    let mut dir = root.to_path_buf();
    for component in Path::new(folder).components() {
        match component {
            Component::Normal(part) => dir.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::invalid_argument(format!(
                    "folder must be a relative path without '..': {folder}"
                )));
            }
        }
    }
    Ok(dir)
}

async fn save(root: &Path, folder: &str, file: &DownloadedFile) -> AppResult<String> {
    let dir = target_dir(root, folder)?;
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(safe_filename(&file.filename));
    tokio::fs::write(&path, &file.data).await?;
    tracing::debug!(path = %path.display(), bytes = file.data.len(), "Saved download");
    Ok(path.display().to_string())
}

pub fn file_response(file: DownloadedFile) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", safe_filename(&file.filename));
    (
        [
            (header::CONTENT_TYPE, file.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        file.data,
    )
        .into_response()
}

/// Respond with one file, or the path it was saved to.
pub async fn single(
    root: &Path,
    file: DownloadedFile,
    folder: &str,
    return_file: bool,
) -> AppResult<Response> {
    if return_file {
        return Ok(file_response(file));
    }
    let path = save(root, folder, &file).await?;
    Ok(Json(path).into_response())
}

/// Respond with several files: inlined as base64 JSON, or the saved paths.
pub async fn many(
    root: &Path,
    files: Vec<DownloadedFile>,
    folder: &str,
    return_file: bool,
) -> AppResult<Response> {
    if return_file {
        let encoded: Vec<EncodedFile> = files.into_iter().map(EncodedFile::from).collect();
        return Ok(Json(encoded).into_response());
    }
    let mut paths = Vec::with_capacity(files.len());
    for file in &files {
        paths.push(save(root, folder, file).await?);
    }
    Ok(Json(paths).into_response())
}

/// Replace the stem of an engine-chosen file name, keeping its extension.
pub fn rename(mut file: DownloadedFile, stem: Option<&str>) -> DownloadedFile {
    if let Some(stem) = stem.map(str::trim).filter(|s| !s.is_empty()) {
        file.filename = match Path::new(&file.filename).extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem.to_string(),
        };
    }
    file
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn jpeg(name: &str) -> DownloadedFile {
        DownloadedFile {
            filename: name.to_string(),
            content_type: "image/jpeg".to_string(),
            data: Bytes::from_static(b"\xFF\xD8jpeg"),
        }
    }

    #[test]
    fn folder_must_stay_below_root() {
        let root = Path::new("/srv/downloads");
        assert_eq!(target_dir(root, "").unwrap(), PathBuf::from("/srv/downloads"));
        assert_eq!(
            target_dir(root, "alice/2024").unwrap(),
            PathBuf::from("/srv/downloads/alice/2024")
        );
        assert!(target_dir(root, "../etc").is_err());
        assert!(target_dir(root, "a/../../b").is_err());
        assert!(target_dir(root, "/etc").is_err());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(safe_filename("alice_1.jpg"), "alice_1.jpg");
        assert_eq!(safe_filename("../../etc/passwd"), "passwd");
        assert_eq!(safe_filename("sp ace\"q.mp4"), "sp_ace_q.mp4");
        assert_eq!(safe_filename(".."), "download");
    }

    #[test]
    fn rename_keeps_extension() {
        assert_eq!(rename(jpeg("alice_1.jpg"), Some("cover")).filename, "cover.jpg");
        assert_eq!(rename(jpeg("alice_1.jpg"), Some(" ")).filename, "alice_1.jpg");
        assert_eq!(rename(jpeg("noext"), Some("x")).filename, "x");
    }

    #[tokio::test]
    async fn saved_files_land_in_folder() {
        let tmp = tempfile::tempdir().unwrap();
        let response = many(tmp.path(), vec![jpeg("a.jpg"), jpeg("b.jpg")], "album", false)
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(tmp.path().join("album/a.jpg").exists());
        assert!(tmp.path().join("album/b.jpg").exists());
    }

    #[test]
    fn attachment_headers() {
        let response = file_response(jpeg("alice_1.jpg"));
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"alice_1.jpg\""
        );
    }
}

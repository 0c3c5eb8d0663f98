//! Test scripts and result artifacts on disk.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use super::error::ApiError;
use crate::execution::invocation::validate_name;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultFile {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Names of the `*.js` scripts in `dir`, sorted. A missing directory has no
/// tests.
pub async fn list_test_scripts(dir: &Path) -> Result<Vec<String>, ApiError> {
    let mut names: Vec<String> = read_dir_files(dir)
        .await?
        .into_iter()
        .filter_map(|(name, _)| name.strip_suffix(".js").map(str::to_string))
        .collect();
    names.sort();
    Ok(names)
}

/// JSON artifacts in `dir`, newest first.
pub async fn list_result_files(dir: &Path) -> Result<Vec<ResultFile>, ApiError> {
    let mut files: Vec<ResultFile> = read_dir_files(dir)
        .await?
        .into_iter()
        .filter(|(name, _)| name.ends_with(".json"))
        .map(|(name, metadata)| ResultFile {
            name,
            size: metadata.len(),
            modified: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default(),
        })
        .collect();
    files.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| b.name.cmp(&a.name)));
    Ok(files)
}

/// Parsed contents of one artifact. `name` must be a bare `.json` file name.
pub async fn read_result_file(dir: &Path, name: &str) -> Result<Value, ApiError> {
    validate_name("file", name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if !name.ends_with(".json") {
        return Err(ApiError::BadRequest(format!("'{name}' is not a JSON result")));
    }

    let path = dir.join(name);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ApiError::NotFound(format!("Result not found: {name}")));
        }
        Err(e) => {
            return Err(ApiError::Internal(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };
    serde_json::from_str(&content)
        .map_err(|e| ApiError::Internal(format!("Result {name} is not valid JSON: {e}")))
}

async fn read_dir_files(dir: &Path) -> Result<Vec<(String, std::fs::Metadata)>, ApiError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(ApiError::Internal(format!(
                "Failed to list {}: {e}",
                dir.display()
            )))
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
    {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push((name.to_string(), metadata));
        }
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_only_js_scripts() {
        let temp = TempDir::new().unwrap();
        for name in ["login.js", "account.js", "README.md"] {
            std::fs::write(temp.path().join(name), "").unwrap();
        }
        std::fs::create_dir(temp.path().join("lib.js")).unwrap();

        let names = list_test_scripts(temp.path()).await.unwrap();
        assert_eq!(names, vec!["account", "login"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("results");
        assert!(list_result_files(&missing).await.unwrap().is_empty());
        assert!(list_test_scripts(&missing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_results_newest_first() {
        let temp = TempDir::new().unwrap();
        let older = temp.path().join("2024-01-01_00-00-00_account.json");
        std::fs::write(&older, "{}").unwrap();
        let past = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&older)
            .unwrap()
            .set_modified(past)
            .unwrap();
        std::fs::write(temp.path().join("2024-01-02_00-00-00_account.json"), "{\"a\":1}").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "").unwrap();

        let files = list_result_files(temp.path()).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "2024-01-02_00-00-00_account.json",
                "2024-01-01_00-00-00_account.json"
            ]
        );
        assert_eq!(files[0].size, 7);
    }

    #[tokio::test]
    async fn test_read_result_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("run.json"), r#"{"metrics":{"http_reqs":{"count":3}}}"#)
            .unwrap();

        let value = read_result_file(temp.path(), "run.json").await.unwrap();
        assert_eq!(value["metrics"]["http_reqs"]["count"], 3);
    }

    #[tokio::test]
    async fn test_read_result_rejects_traversal_and_missing() {
        let temp = TempDir::new().unwrap();

        for name in ["../secret.json", "..", "a/b.json", "run.txt"] {
            let err = read_result_file(temp.path(), name).await.unwrap_err();
            assert!(matches!(err, ApiError::BadRequest(_)), "{name}");
        }
        let err = read_result_file(temp.path(), "missing.json").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}

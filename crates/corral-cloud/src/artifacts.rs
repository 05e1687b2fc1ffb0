//! OS/firmware artifact tree on the local filesystem.
//!
//! Artifacts live under `{root}/{version}/{platform}/`; each directory
//! carries a `files.txt` manifest with one `hash:size:name` line per file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use corral_core::{ApiError, ApiResult};

pub struct OsArtifacts {
    root: PathBuf,
}

impl OsArtifacts {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// File sizes of an OS release, keyed by name.
    ///
    /// A manifest without `version.py` is an unfinished upload and is
    /// treated as absent.
    pub async fn list(&self, version: &str, platform: &str) -> ApiResult<BTreeMap<String, u64>> {
        let dir = self.release_dir(version, platform)?;
        let manifest = tokio::fs::read_to_string(dir.join("files.txt"))
            .await
            .map_err(|_| ApiError::NotFound(format!("OS version \"{version}\"")))?;

        let mut files = BTreeMap::new();
        for line in manifest.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(3, ':');
            let (Some(_hash), Some(size), Some(name)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(ApiError::Internal(format!(
                    "Malformed manifest line in {version}/{platform}: {line}"
                )));
            };
            let size: u64 = size.parse().map_err(|_| {
                ApiError::Internal(format!(
                    "Malformed manifest size in {version}/{platform}: {line}"
                ))
            })?;
            files.insert(name.to_string(), size);
        }

        if !files.contains_key("version.py") {
            return Err(ApiError::NotFound(format!("OS version \"{version}\"")));
        }
        Ok(files)
    }

    /// Content of one artifact file.
    pub async fn file(&self, version: &str, platform: &str, name: &str) -> ApiResult<String> {
        let dir = self.release_dir(version, platform)?;
        check_segment(name)?;
        tokio::fs::read_to_string(dir.join(name))
            .await
            .map_err(|_| ApiError::NotFound(format!("OS file \"{name}\"")))
    }

    fn release_dir(&self, version: &str, platform: &str) -> ApiResult<PathBuf> {
        check_segment(version)?;
        check_segment(platform)?;
        Ok(self.root.join(version).join(platform))
    }
}

/// Reject request values that could escape the artifact tree.
fn check_segment(segment: &str) -> ApiResult<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(ApiError::Validation(format!(
            "Invalid path segment \"{segment}\""
        )));
    }
    Ok(())
}

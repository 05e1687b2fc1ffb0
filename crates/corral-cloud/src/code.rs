//! Application code assembly for device download.

use corral_core::{ApiError, ApiResult};

use crate::storage::{App, CloudDatabase, Commit, SourceFile};

/// Injected ahead of every served source so device code can log without
/// importing anything itself.
const LOGGER_PREAMBLE: &str = "import logger\n";

/// Worker files may use an optional sensors module that not every platform
/// ships; the import must not fail the device-side load.
const SENSORS_PREAMBLE: &str = "try:\n    import sensors\nexcept ImportError:\n    pass\n";

/// What a code request resolves to.
pub enum CodePayload {
    /// Ordered file names of the commit.
    FileList(Vec<String>),
    /// Assembled source, served raw.
    Source(String),
}

/// Serve a commit: its file list, one named file, or the legacy
/// all-files-in-one blob.
pub async fn get_commit(
    db: &CloudDatabase,
    app: &App,
    version: &str,
    list: bool,
    file_name: Option<&str>,
) -> ApiResult<CodePayload> {
    let commit = db
        .find_commit(&app.id, version)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Commit \"{version}\"")))?;

    if list {
        let files = db.commit_files(commit.id).await?;
        return Ok(CodePayload::FileList(
            files.into_iter().map(|f| f.name).collect(),
        ));
    }

    if let Some(name) = file_name {
        let file = db
            .commit_file(commit.id, name)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("File \"{name}\"")))?;
        return Ok(CodePayload::Source(assemble(
            std::slice::from_ref(&file),
            &commit,
        )));
    }

    let files = db.commit_files(commit.id).await?;
    Ok(CodePayload::Source(assemble(&files, &commit)))
}

/// Concatenate files in their stored order with the preambles and the
/// version footer.
fn assemble(files: &[SourceFile], commit: &Commit) -> String {
    let mut source = String::from(LOGGER_PREAMBLE);
    for file in files {
        if file.name.contains("worker") {
            source.push_str(SENSORS_PREAMBLE);
        }
        source.push_str(&file.content);
    }
    source.push_str(&format!("\nversion='{}'", commit.cid));
    source
}

//! Open the mapping file in the user's editor

use crate::error::{QiheError, Result, ResultExt};
use std::path::Path;
use tracing::info;

/// Open `path` with the system's default handler for text files
pub fn open_in_editor(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(QiheError::MappingFileMissing {
            path: path.display().to_string(),
        }
        .into());
    }

    open::that(path).with_path_context("open", path)?;
    info!("Opened {} for editing", path.display());
    Ok(())
}

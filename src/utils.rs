use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{FeedError, Result};
use crate::FileConfig;

/// Token in `file.image_dir` replaced by `file.root_folder`
pub const ROOT_FOLDER_PLACEHOLDER: &str = "ROOT_FOLDER_PLACEHOLDER";

/// Resolve the image directory: an explicit path wins, otherwise the
/// configured one with the root-folder placeholder expanded. The result must
/// be an existing directory.
pub fn resolve_image_dir(explicit: Option<&Path>, config: &FileConfig) -> Result<PathBuf> {
    let dir = match explicit {
        Some(dir) => dir.to_path_buf(),
        None => {
            let configured = config.image_dir.as_ref().ok_or_else(|| {
                FeedError::InvalidConfig(
                    "no image directory: pass --image-dir or set file.image_dir".into(),
                )
            })?;
            expand_root_folder(configured, config.root_folder.as_deref())?
        }
    };

    if !dir.is_dir() {
        return Err(FeedError::MissingDirectory(dir));
    }

    info!("Using image directory: {}", dir.display());
    Ok(dir)
}

fn expand_root_folder(dir: &Path, root: Option<&Path>) -> Result<PathBuf> {
    let text = dir.to_string_lossy();
    if !text.contains(ROOT_FOLDER_PLACEHOLDER) {
        return Ok(dir.to_path_buf());
    }

    let root = root.ok_or_else(|| {
        FeedError::InvalidConfig(format!(
            "file.image_dir uses {} but file.root_folder is not set",
            ROOT_FOLDER_PLACEHOLDER
        ))
    })?;

    Ok(PathBuf::from(
        text.replace(ROOT_FOLDER_PLACEHOLDER, &root.to_string_lossy()),
    ))
}

use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

const TIMELINE_JSON: &str = "timeline.json";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub entries_path: PathBuf,
}

/// Prepares a workspace for the engine: a `state/` directory with an empty
/// timeline file when none exists yet. Existing files are left untouched.
pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let state_dir = workspace_root.join("state");
    fs::create_dir_all(&state_dir)?;

    let entries_path = state_dir.join(TIMELINE_JSON);
    if !entries_path.exists() {
        fs::write(&entries_path, "[]\n")?;
    }

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        entries_path,
    })
}

//! Source snapshot selection: `--source`, `ROSTER_SYNC_SOURCE`, or an
//! interactive prompt.

use crate::config::SOURCE_ENV;
use crate::error::{Result, SyncError};
use dialoguer::Input;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceChoice {
    Selected(PathBuf),
    /// The operator left the prompt empty
    Cancelled,
}

impl SourceChoice {
    /// The chosen snapshot. A cancelled selection is fatal to the run.
    pub fn into_path(self) -> Result<PathBuf> {
        match self {
            SourceChoice::Selected(path) => Ok(path),
            SourceChoice::Cancelled => Err(SyncError::Selection(
                "No Source snapshot selected, run cancelled by operator".to_string(),
            )),
        }
    }
}

pub fn is_interactive_terminal() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Where the prompt starts browsing: the directory holding Master.
pub fn default_browse_dir(master: &Path) -> PathBuf {
    master
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Picks the Source snapshot. An explicit path wins, then the environment,
/// then the operator is asked.
pub fn choose_source(explicit: Option<PathBuf>, master: &Path) -> Result<SourceChoice> {
    if let Some(path) = explicit {
        return Ok(SourceChoice::Selected(path));
    }
    if let Some(path) = std::env::var_os(SOURCE_ENV).filter(|p| !p.is_empty()) {
        info!("Using Source snapshot from {}", SOURCE_ENV);
        return Ok(SourceChoice::Selected(PathBuf::from(path)));
    }

    if !is_interactive_terminal() {
        return Err(SyncError::Selection(format!(
            "No Source snapshot given and no terminal to ask.\n\
             Pass --source <dir> or set {}.",
            SOURCE_ENV
        )));
    }

    prompt_source(master)
}

fn prompt_source(master: &Path) -> Result<SourceChoice> {
    let initial = default_browse_dir(master);
    let input: String = Input::new()
        .with_prompt("Source snapshot directory (empty to cancel)")
        .with_initial_text(initial.display().to_string())
        .allow_empty(true)
        .validate_with(|input: &String| -> std::result::Result<(), String> {
            let trimmed = input.trim();
            if trimmed.is_empty() || Path::new(trimmed).is_dir() {
                Ok(())
            } else {
                Err(format!("{} is not a directory", trimmed))
            }
        })
        .interact_text()
        .map_err(|e| SyncError::Selection(e.to_string()))?;

    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(SourceChoice::Cancelled)
    } else {
        Ok(SourceChoice::Selected(PathBuf::from(trimmed)))
    }
}

//! Work-list resolution and loading
//!
//! Work lists are plain text files with one identifier per line. They are
//! selected either by an explicit path or by a year and month, in which case
//! they live under `<data-dir>/tournament_ids/<YYYY>_<MM>`.

use crate::config::Config;
use crate::state::WorkItem;
use crate::{ConfigError, HarvestError};
use std::path::{Path, PathBuf};

/// Resolves the work-list path from the input configuration
///
/// An explicit path always wins over the year/month selector.
pub fn resolve_input_path(config: &Config) -> Result<PathBuf, ConfigError> {
    if let Some(path) = &config.input.path {
        return Ok(path.clone());
    }

    match (config.input.year, config.input.month) {
        (Some(year), Some(month)) => Ok(config
            .input
            .data_dir
            .join("tournament_ids")
            .join(period_name(year, month))),
        _ => Err(ConfigError::MissingInput),
    }
}

/// Resolves the final output path
///
/// Returns `None` when results should go to stdout: no explicit output path
/// and no year/month selector to derive one from.
pub fn resolve_output_path(config: &Config) -> Option<PathBuf> {
    if let Some(path) = &config.output.path {
        return Some(path.clone());
    }

    match (config.input.year, config.input.month) {
        (Some(year), Some(month)) => Some(
            config
                .input
                .data_dir
                .join("tournament_details")
                .join(format!("{}.json", period_name(year, month))),
        ),
        _ => None,
    }
}

fn period_name(year: i32, month: u32) -> String {
    format!("{}_{:02}", year, month)
}

/// Reads work items from a newline-delimited file
///
/// Lines are trimmed and blank lines skipped. Order and duplicates are
/// preserved; a duplicated id is simply processed twice.
///
/// # Returns
///
/// * `Ok(Vec<WorkItem>)` - At least one work item
/// * `Err(HarvestError::Input)` - The file could not be read
/// * `Err(HarvestError::EmptyInput)` - The file holds no identifiers
pub fn read_work_items(path: &Path) -> Result<Vec<WorkItem>, HarvestError> {
    let content = std::fs::read_to_string(path).map_err(|source| HarvestError::Input {
        path: path.to_path_buf(),
        source,
    })?;

    let items: Vec<WorkItem> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(WorkItem::from)
        .collect();

    if items.is_empty() {
        return Err(HarvestError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    Ok(items)
}

/// Truncates the work list to its first `limit` items (0 = no limit)
pub fn apply_limit(mut items: Vec<WorkItem>, limit: usize) -> Vec<WorkItem> {
    if limit > 0 && items.len() > limit {
        items.truncate(limit);
    }
    items
}

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use story_core::StoryError;
use walkdir::WalkDir;

use crate::error_map::{map_cli_source_path, map_cli_source_read, map_cli_source_scan};

const STORY_SUFFIX: &str = ".story.xml";

pub(crate) fn resolve_stories_dir(stories_dir: &str) -> Result<PathBuf, StoryError> {
    let path = PathBuf::from(stories_dir);
    let absolute = if path.is_absolute() {
        path
    } else {
        std::env::current_dir()
            .map_err(map_cli_source_path)?
            .join(path)
    };

    if !absolute.exists() {
        return Err(StoryError::new(
            "CLI_SOURCE_NOT_FOUND",
            format!("stories-dir does not exist: {}", absolute.display()),
        ));
    }

    if !absolute.is_dir() {
        return Err(StoryError::new(
            "CLI_SOURCE_NOT_DIR",
            format!("stories-dir is not a directory: {}", absolute.display()),
        ));
    }

    Ok(absolute)
}

/// Every `*.story.xml` below the directory, keyed by `/`-separated relative path.
pub(crate) fn read_stories_xml_from_dir(
    stories_dir: &Path,
) -> Result<BTreeMap<String, String>, StoryError> {
    let mut stories = BTreeMap::new();

    for entry in WalkDir::new(stories_dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if !path.to_string_lossy().ends_with(STORY_SUFFIX) {
            continue;
        }

        let relative = path
            .strip_prefix(stories_dir)
            .map_err(map_cli_source_scan)?
            .to_string_lossy()
            .replace('\\', "/");

        let content = fs::read_to_string(path).map_err(map_cli_source_read)?;
        stories.insert(relative, content);
    }

    if stories.is_empty() {
        return Err(StoryError::new(
            "CLI_SOURCE_EMPTY",
            format!("No {} files under {}", STORY_SUFFIX, stories_dir.display()),
        ));
    }

    Ok(stories)
}

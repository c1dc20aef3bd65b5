//! Session file discovery.
//!
//! Only directory entries and file metadata are read here; content is left
//! to the parsers. Missing roots yield nothing and unreadable directories
//! are skipped, so one bad path never aborts a scan.

use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use crate::provider::{DirLayout, ProviderSource};
use crate::stats::SessionKey;

const SESSION_EXTENSION: &str = "jsonl";

/// One session file found on disk. Recomputed on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionFileRef {
    pub path: PathBuf,
    pub session_key: SessionKey,
    pub mtime_millis: i64,
}

/// All session files currently present for `source`, sorted by key.
pub fn discover(source: &ProviderSource) -> Vec<SessionFileRef> {
    if !source.root.is_dir() {
        debug!(
            "{}: session root {} not found",
            source.id(),
            source.root.display()
        );
        return Vec::new();
    }

    let mut files = match source.spec.layout {
        DirLayout::ProjectSessions => discover_project_sessions(&source.root),
        DirLayout::DateTree => discover_date_tree(&source.root),
    };
    files.sort_by(|a, b| a.session_key.cmp(&b.session_key));
    debug!("{}: discovered {} session files", source.id(), files.len());
    files
}

/// `<root>/<project>/<session>.jsonl`
fn discover_project_sessions(root: &Path) -> Vec<SessionFileRef> {
    let mut files = Vec::new();
    for (project_name, project_dir) in list_dirs(root, |_| true) {
        files.extend(
            list_session_files(&project_dir)
                .into_iter()
                .map(|(stem, path, mtime)| SessionFileRef {
                    path,
                    session_key: format!("{}/{}", project_name, stem),
                    mtime_millis: mtime,
                }),
        );
    }
    files
}

/// `<root>/<yyyy>/<mm>/<dd>/<session>.jsonl`
fn discover_date_tree(root: &Path) -> Vec<SessionFileRef> {
    let mut files = Vec::new();
    for (year, year_dir) in list_dirs(root, is_year) {
        for (month, month_dir) in list_dirs(&year_dir, is_month) {
            for (day, day_dir) in list_dirs(&month_dir, is_day) {
                files.extend(list_session_files(&day_dir).into_iter().map(
                    |(stem, path, mtime)| SessionFileRef {
                        path,
                        session_key: format!("{}/{}/{}/{}", year, month, day, stem),
                        mtime_millis: mtime,
                    },
                ));
            }
        }
    }
    files
}

/// Subdirectories of `dir` whose names pass `accept`.
fn list_dirs(dir: &Path, accept: fn(&str) -> bool) -> Vec<(String, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!("Skipping unreadable directory {}", dir.display());
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let name = entry.file_name().into_string().ok()?;
            if name.starts_with('.') || !accept(&name) {
                return None;
            }
            let path = entry.path();
            path.is_dir().then_some((name, path))
        })
        .collect()
}

/// `(stem, path, mtime_millis)` for every session file directly in `dir`.
fn list_session_files(dir: &Path) -> Vec<(String, PathBuf, i64)> {
    let Ok(entries) = fs::read_dir(dir) else {
        debug!("Skipping unreadable directory {}", dir.display());
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != SESSION_EXTENSION) {
                return None;
            }
            let stem = path.file_stem()?.to_str()?.to_string();
            if stem.is_empty() || stem.starts_with('.') {
                return None;
            }
            let meta = fs::metadata(&path).ok()?;
            if !meta.is_file() {
                return None;
            }
            let mtime = meta
                .modified()
                .ok()?
                .duration_since(UNIX_EPOCH)
                .ok()?
                .as_millis() as i64;
            Some((stem, path, mtime))
        })
        .collect()
}

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_year(name: &str) -> bool {
    all_digits(name, 4)
}

fn is_month(name: &str) -> bool {
    all_digits(name, 2) && name.parse::<u32>().is_ok_and(|m| (1..=12).contains(&m))
}

fn is_day(name: &str) -> bool {
    all_digits(name, 2) && name.parse::<u32>().is_ok_and(|d| (1..=31).contains(&d))
}

//! Model publishing - versioned files plus the canonical "latest" pointer
//!
//! The strategy is picked once per deployment by probing the model directory.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use serde::Serialize;

use crate::booster::write_atomic;
use crate::error::ModelResult;

pub const DEFAULT_EXTENSION: &str = "json";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// How the canonical path is repointed at a new version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStrategy {
    /// Relative symlink, swapped in with an atomic rename
    Symlink,
    /// Full copy of the artifact, swapped in with an atomic rename
    Copy,
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishStrategy::Symlink => write!(f, "symlink"),
            PublishStrategy::Copy => write!(f, "copy"),
        }
    }
}

impl PublishStrategy {
    /// Probe whether `dir` supports symlinks; creates `dir` if needed
    pub fn detect(dir: &Path) -> ModelResult<Self> {
        fs::create_dir_all(dir)?;

        let strategy = if probe_symlink(dir) {
            PublishStrategy::Symlink
        } else {
            PublishStrategy::Copy
        };
        tracing::info!("Model publish strategy for {}: {}", dir.display(), strategy);
        Ok(strategy)
    }

    /// Point `canonical` at `versioned`. `bytes` is the artifact already written
    /// to `versioned`, used by the copy strategy.
    pub fn publish(&self, versioned: &Path, canonical: &Path, bytes: &[u8]) -> ModelResult<()> {
        match self {
            PublishStrategy::Symlink => {
                let target = versioned
                    .file_name()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| versioned.to_path_buf());
                let tmp_link = sibling(canonical, ".link");
                if fs::symlink_metadata(&tmp_link).is_ok() {
                    fs::remove_file(&tmp_link)?;
                }
                make_symlink(&target, &tmp_link)?;
                if let Err(e) = fs::rename(&tmp_link, canonical) {
                    let _ = fs::remove_file(&tmp_link);
                    return Err(e.into());
                }
            }
            PublishStrategy::Copy => write_atomic(canonical, bytes)?,
        }
        tracing::debug!("Published {} -> {}", canonical.display(), versioned.display());
        Ok(())
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn make_symlink(_target: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

fn probe_symlink(dir: &Path) -> bool {
    let probe = dir.join(format!(".publish-probe-{}", std::process::id()));
    let link = sibling(&probe, ".link");
    let _ = fs::remove_file(&link);

    let supported = fs::write(&probe, b"probe").is_ok()
        && make_symlink(Path::new(probe.file_name().unwrap_or_default()), &link).is_ok()
        && fs::read(&link).map(|b| b == b"probe").unwrap_or(false);

    let _ = fs::remove_file(&link);
    let _ = fs::remove_file(&probe);
    supported
}

// `models/model.json` + `.link` -> `models/.model.json.link`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = std::ffi::OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(suffix);
    path.with_file_name(name)
}

/// Directory holding the canonical path and its versions
pub fn model_dir(canonical: &Path) -> PathBuf {
    match canonical.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn model_extension(canonical: &Path) -> String {
    canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or(DEFAULT_EXTENSION)
        .to_string()
}

/// `model_<YYYYMMDD_HHMMSS>.<ext>`
pub fn versioned_file_name(stamp: &NaiveDateTime, ext: &str) -> String {
    format!("model_{}.{}", stamp.format(TIMESTAMP_FORMAT), ext)
}

/// Pick the path for a new version. The stamp is `now` truncated to seconds,
/// advanced one second at a time until it is later than `last` and unused on disk.
pub fn next_versioned_path(
    dir: &Path,
    ext: &str,
    now: DateTime<Local>,
    last: Option<NaiveDateTime>,
) -> (PathBuf, NaiveDateTime) {
    let mut stamp = Local
        .timestamp_opt(now.timestamp(), 0)
        .single()
        .unwrap_or(now)
        .naive_local();

    if let Some(last) = last {
        if stamp <= last {
            stamp = last + Duration::seconds(1);
        }
    }

    loop {
        let path = dir.join(versioned_file_name(&stamp, ext));
        if fs::symlink_metadata(&path).is_err() {
            return (path, stamp);
        }
        stamp += Duration::seconds(1);
    }
}

/// True for names shaped like `model_YYYYMMDD_HHMMSS.<ext>`
pub fn is_versioned_name(name: &str) -> bool {
    let Some(rest) = name.strip_prefix("model_") else {
        return false;
    };
    let Some((stamp, ext)) = rest.split_once('.') else {
        return false;
    };
    !ext.is_empty() && NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok()
}

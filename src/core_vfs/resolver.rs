use std::path::{Path, PathBuf};

/// Resolves a client-supplied path against the current virtual directory.
///
/// Runs entirely in virtual space: `.` and empty segments are dropped, `..`
/// pops one segment and is ignored once the root is reached. The result is
/// always root-anchored with no trailing slash, so it can never name
/// anything above `/`.
pub fn resolve(current_dir: &str, arg: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    let base = if arg.starts_with('/') { "" } else { current_dir };
    for segment in base.split('/').chain(arg.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        String::from("/")
    } else {
        format!("/{}", segments.join("/"))
    }
}

/// Maps a normalized virtual path onto the server root.
///
/// Only called with output of [`resolve`]; parent and root components are
/// skipped anyway so a stray `..` can't walk out of `root`.
pub fn to_real(root: &Path, virtual_path: &str) -> PathBuf {
    let mut real = root.to_path_buf();
    for segment in virtual_path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            continue;
        }
        real.push(segment);
    }
    real
}

/// True when `path` exists and, once symlinks are followed, still lies
/// under `root`. `root` must already be canonical.
pub async fn stays_inside(root: &Path, path: &Path) -> bool {
    match tokio::fs::canonicalize(path).await {
        Ok(real) => real.starts_with(root),
        Err(_) => false,
    }
}

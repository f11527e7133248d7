use crate::core_network::data_channel::transmit_data;
use crate::core_vfs::stays_inside;
use crate::session::SessionContext;
use chrono::{DateTime, Duration, Local};
use std::fs::Metadata;
use std::io::{self, Cursor};
use std::path::Path;

/// Handles the LIST FTP command.
///
/// Lists the current directory when no path is given. Leading `-` tokens
/// (`LIST -la`) are client habits meant for `ls` and are skipped.
pub async fn handle_list_command(
    ctx: SessionContext,
    args: Vec<String>,
) -> Result<(), io::Error> {
    let path_arg = args
        .iter()
        .skip_while(|a| a.starts_with('-'))
        .cloned()
        .collect::<Vec<String>>()
        .join(" ");

    let (target, dir_path, root) = {
        let session = ctx.session.lock().await;
        let target = session.resolve(&path_arg);
        let dir_path = session.real_path(&target);
        (target, dir_path, session.base_path.clone())
    };
    ctx.log.debug(&format!("LIST {} -> {:?}", target, dir_path));

    if !stays_inside(&root, &dir_path).await {
        ctx.log.warn(&format!("Refusing to list {} outside the server root", target));
        return ctx.reply(500, "Problem occured").await;
    }

    let listing = match build_listing(&dir_path).await {
        Ok(listing) => listing,
        Err(e) => {
            ctx.log.warn(&format!("Failed to list {}: {}", target, e));
            return ctx.reply(500, "Problem occured").await;
        }
    };

    transmit_data(&ctx, Cursor::new(listing.into_bytes())).await
}

/// Renders `path` as `ls -l` style lines, sorted by name.
///
/// A regular file yields the single line describing it.
pub async fn build_listing(path: &Path) -> Result<String, io::Error> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_dir() {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(format_entry(&name, &metadata, Local::now()));
    }

    let mut entries = Vec::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        match tokio::fs::symlink_metadata(entry.path()).await {
            Ok(metadata) => entries.push((name, metadata)),
            // Entry vanished between readdir and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let now = Local::now();
    Ok(entries
        .iter()
        .map(|(name, metadata)| format_entry(name, metadata, now))
        .collect())
}

fn format_entry(name: &str, metadata: &Metadata, now: DateTime<Local>) -> String {
    let kind = if metadata.is_dir() {
        'd'
    } else if metadata.file_type().is_symlink() {
        'l'
    } else {
        '-'
    };
    let (nlink, owner, group) = ownership(metadata);

    format!(
        "{}{} {:>3} {:<8} {:<8} {:>12} {} {}\r\n",
        kind,
        permissions(metadata),
        nlink,
        owner,
        group,
        metadata.len(),
        format_mtime(metadata, now),
        name
    )
}

fn format_mtime(metadata: &Metadata, now: DateTime<Local>) -> String {
    let modified: DateTime<Local> = match metadata.modified() {
        Ok(time) => time.into(),
        Err(_) => return "Jan  1  1970".to_string(),
    };
    // Same cut-off as ls: older than ~6 months shows the year.
    if now - modified > Duration::days(180) || modified > now + Duration::hours(1) {
        modified.format("%b %e  %Y").to_string()
    } else {
        modified.format("%b %e %H:%M").to_string()
    }
}

#[cfg(unix)]
fn permissions(metadata: &Metadata) -> String {
    use std::os::unix::fs::PermissionsExt;
    let mode = metadata.permissions().mode();
    let flags = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    flags
        .iter()
        .map(|(bit, c)| if mode & bit != 0 { *c } else { '-' })
        .collect()
}

#[cfg(not(unix))]
fn permissions(metadata: &Metadata) -> String {
    if metadata.permissions().readonly() {
        "r--r--r--".to_string()
    } else {
        "rw-rw-rw-".to_string()
    }
}

#[cfg(unix)]
fn ownership(metadata: &Metadata) -> (u64, String, String) {
    use std::os::unix::fs::MetadataExt;
    (
        metadata.nlink(),
        metadata.uid().to_string(),
        metadata.gid().to_string(),
    )
}

#[cfg(not(unix))]
fn ownership(_metadata: &Metadata) -> (u64, String, String) {
    (1, "ftp".to_string(), "ftp".to_string())
}

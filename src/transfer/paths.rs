use std::fs;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};

use crate::error::TransferError;
use crate::transfer::backend::{EntryKind, TreeEntry};

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Expands `~` and `~/...` against the remote home directory. A trailing
/// slash survives so the destination rule still sees a directory target.
pub(crate) fn expand_remote_home(path: &str, home: &str) -> String {
    if path == "~" {
        return home.to_string();
    }
    match path.strip_prefix("~/") {
        Some("") => format!("{}/", home.trim_end_matches('/')),
        Some(rest) => join_remote(home, rest),
        None => path.to_string(),
    }
}

pub(crate) fn needs_remote_home(path: &str) -> bool {
    path == "~" || path.starts_with("~/")
}

pub(crate) fn join_remote(base: &str, relative: &str) -> String {
    if base.ends_with('/') {
        format!("{base}{relative}")
    } else {
        format!("{base}/{relative}")
    }
}

/// `scp` destination rule: a target that names a directory receives the
/// source under its own name, anything else is the new name of the source.
pub(crate) fn remote_destination(target: &str, name: &str, target_is_dir: bool) -> String {
    if target.ends_with('/') || target_is_dir {
        join_remote(target, name)
    } else {
        target.to_string()
    }
}

pub(crate) fn local_destination(raw: &str, name: &str) -> PathBuf {
    let target = expand_tilde(raw);
    if raw.ends_with('/') || raw.ends_with(MAIN_SEPARATOR) || target.is_dir() {
        target.join(name)
    } else {
        target
    }
}

pub(crate) fn join_relative(base: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(base.to_path_buf(), |acc, part| acc.join(part))
}

pub(crate) fn remote_base_name(path: &str) -> Option<String> {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && *name != "~")
        .map(str::to_string)
}

pub(crate) fn local_base_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Pre-order listing of everything below `root`, relative to it with `/`
/// separators. Directories precede their contents; siblings are sorted.
pub(crate) fn walk_local(root: &Path) -> Result<Vec<TreeEntry>, TransferError> {
    fn walk(root: &Path, dir: &Path, out: &mut Vec<TreeEntry>) -> Result<(), TransferError> {
        let mut children = Vec::new();
        for entry in fs::read_dir(dir)
            .map_err(|err| TransferError::io(format!("read local dir {}", dir.display()), err))?
        {
            let entry = entry.map_err(|err| {
                TransferError::io(format!("read local dir entry in {}", dir.display()), err)
            })?;
            children.push(entry.path());
        }
        children.sort();
        for path in children {
            let meta = fs::symlink_metadata(&path)
                .map_err(|err| TransferError::io(format!("stat {}", path.display()), err))?;
            let relative = path
                .strip_prefix(root)
                .map(|rel| {
                    rel.components()
                        .map(|part| part.as_os_str().to_string_lossy().into_owned())
                        .collect::<Vec<_>>()
                        .join("/")
                })
                .unwrap_or_default();
            let kind = if meta.is_dir() {
                EntryKind::Directory
            } else if meta.is_file() {
                EntryKind::File
            } else {
                EntryKind::Other
            };
            out.push(TreeEntry {
                relative,
                kind,
                size: if kind == EntryKind::File { meta.len() } else { 0 },
            });
            if kind == EntryKind::Directory {
                walk(root, &path, out)?;
            }
        }
        Ok(())
    }

    let mut entries = Vec::new();
    walk(root, root, &mut entries)?;
    Ok(entries)
}

#[cfg(unix)]
pub(crate) fn file_mode(meta: &fs::Metadata) -> i32 {
    use std::os::unix::fs::PermissionsExt;
    (meta.permissions().mode() & 0o777) as i32
}

#[cfg(not(unix))]
pub(crate) fn file_mode(_meta: &fs::Metadata) -> i32 {
    0o644
}

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{FileSystemError, FileSystemResult};

pub trait FileSystemProvider {
    /// Removes the specified file or directory safely.
    ///
    /// If the path does not exist, this function returns `Ok(())` without error. If the path
    /// points to a directory, it and all of its contents are removed recursively. Symbolic links
    /// are removed themselves, never followed.
    ///
    /// # Errors
    ///
    /// Returns a [`FileSystemError::File`] if the removal fails for any reason other than
    /// the path not existing (e.g., permission denied, path is in use, etc.).
    fn safe_remove<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;

    /// Creates a directory structure if it doesn't exist.
    ///
    /// # Errors
    ///
    /// * [`FileSystemError::Directory`] if the directory could not be created.
    /// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()>;

    /// Moves a file or directory tree to `to`, replacing whatever is there.
    ///
    /// A plain rename is tried first. When that fails (typically because source and
    /// destination live on different filesystems) the tree is copied and the source removed.
    ///
    /// # Errors
    ///
    /// Returns [`FileSystemError::Move`] when neither strategy succeeds.
    fn move_path<P: AsRef<Path>, Q: AsRef<Path>>(&self, from: P, to: Q) -> FileSystemResult<()>;
}

#[derive(Default, Clone)]
pub struct StandardFileSystemProvider;

impl FileSystemProvider for StandardFileSystemProvider {
    fn safe_remove<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();

        let Ok(meta) = fs::symlink_metadata(path) else {
            return Ok(());
        };

        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };

        result.map_err(|err| {
            FileSystemError::File {
                path: path.to_path_buf(),
                action: "remove",
                source: err,
            }
        })
    }

    fn ensure_dir_exists<P: AsRef<Path>>(&self, path: P) -> FileSystemResult<()> {
        let path = path.as_ref();
        if !path.exists() {
            fs::create_dir_all(path).map_err(|err| {
                FileSystemError::Directory {
                    path: path.to_path_buf(),
                    action: "create",
                    source: err,
                }
            })?;
        } else if !path.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }

    fn move_path<P: AsRef<Path>, Q: AsRef<Path>>(&self, from: P, to: Q) -> FileSystemResult<()> {
        let from = from.as_ref();
        let to = to.as_ref();
        let move_err = |source| {
            FileSystemError::Move {
                from: from.to_path_buf(),
                to: to.to_path_buf(),
                source,
            }
        };

        self.safe_remove(to)?;
        if let Some(parent) = to.parent() {
            self.ensure_dir_exists(parent)?;
        }

        if fs::rename(from, to).is_ok() {
            return Ok(());
        }

        copy_recursive(from, to).map_err(move_err)?;
        self.safe_remove(from)
    }
}

fn copy_recursive(from: &Path, to: &Path) -> std::io::Result<()> {
    if fs::symlink_metadata(from)?.is_dir() {
        fs::create_dir_all(to)?;
        for entry in fs::read_dir(from)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &to.join(entry.file_name()))?;
        }
    } else {
        fs::copy(from, to)?;
    }
    Ok(())
}

/// Creates a directory structure if it doesn't exist.
///
/// See [`FileSystemProvider::ensure_dir_exists`] for detailed documentation.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.ensure_dir_exists(path)
}

/// Removes the specified file or directory safely.
///
/// See [`FileSystemProvider::safe_remove`] for detailed documentation.
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    StandardFileSystemProvider.safe_remove(path)
}

/// Moves a file or directory, replacing the destination.
///
/// See [`FileSystemProvider::move_path`] for detailed documentation.
pub fn move_path<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> FileSystemResult<()> {
    StandardFileSystemProvider.move_path(from, to)
}

/// Lists the immediate children of a directory, sorted by name.
pub fn list_dir<P: AsRef<Path>>(path: P) -> FileSystemResult<Vec<PathBuf>> {
    let path = path.as_ref();
    let dir_err = |source| {
        FileSystemError::Directory {
            path: path.to_path_buf(),
            action: "read",
            source,
        }
    };

    let mut children = fs::read_dir(path)
        .map_err(dir_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(dir_err)?;
    children.sort();

    Ok(children)
}

/// Marks a file as executable for its owner, group and others.
///
/// This is a no-op on non-unix targets where executability is not a permission bit.
pub fn set_executable<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;

        let path = path.as_ref();
        let file_err = |source| {
            FileSystemError::File {
                path: path.to_path_buf(),
                action: "set permissions on",
                source,
            }
        };

        let mut perms = fs::metadata(path).map_err(file_err)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms).map_err(file_err)?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

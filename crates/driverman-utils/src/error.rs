use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum PathError {
    #[error("Failed to get current directory: {source}")]
    #[diagnostic(code(driverman_utils::path::current_dir))]
    CurrentDir {
        #[source]
        source: std::io::Error,
    },

    #[error("Path is empty")]
    #[diagnostic(code(driverman_utils::path::empty))]
    Empty,

    #[error("Environment variable `{var}` not set in `{input}`")]
    #[diagnostic(
        code(driverman_utils::path::missing_env),
        help("Export `{var}` or use an absolute path")
    )]
    MissingEnvVar { var: String, input: String },

    #[error("Unclosed variable expression starting at `{input}`")]
    #[diagnostic(code(driverman_utils::path::unclosed_variable))]
    UnclosedVariable { input: String },
}

#[derive(Error, Diagnostic, Debug)]
pub enum FileSystemError {
    #[error("Failed to {action} file `{}`: {source}", .path.display())]
    #[diagnostic(
        code(driverman_utils::fs::file),
        help("Check file permissions and that the file is not in use")
    )]
    File {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to {action} directory `{}`: {source}", .path.display())]
    #[diagnostic(
        code(driverman_utils::fs::directory),
        help("Check directory permissions and available disk space")
    )]
    Directory {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move `{}` to `{}`: {source}", .from.display(), .to.display())]
    #[diagnostic(
        code(driverman_utils::fs::move_path),
        help("The destination may be locked by a running process")
    )]
    Move {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{}` is not a directory", .path.display())]
    #[diagnostic(code(driverman_utils::fs::not_a_directory))]
    NotADirectory { path: PathBuf },
}

pub type PathResult<T> = std::result::Result<T, PathError>;
pub type FileSystemResult<T> = std::result::Result<T, FileSystemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_error_display() {
        let err = FileSystemError::File {
            path: PathBuf::from("/tmp/chromedriver"),
            action: "remove",
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to remove file"));
        assert!(msg.contains("/tmp/chromedriver"));
    }

    #[test]
    fn test_move_error_display() {
        let err = FileSystemError::Move {
            from: PathBuf::from("/a"),
            to: PathBuf::from("/b"),
            source: std::io::Error::other("busy"),
        };
        assert_eq!(err.to_string(), "Failed to move `/a` to `/b`: busy");
    }

    #[test]
    fn test_missing_env_var_display() {
        let err = PathError::MissingEnvVar {
            var: "NOPE".into(),
            input: "$NOPE/bin".into(),
        };
        assert_eq!(
            err.to_string(),
            "Environment variable `NOPE` not set in `$NOPE/bin`"
        );
    }
}

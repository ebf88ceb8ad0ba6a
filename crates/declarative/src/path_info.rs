//! Live snapshot of a path on the target

use crate::context::Target;
use crate::item::normalize_mode;
use anyhow::{Context, Result};

/// Kind of object found at a path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
    Symlink,
    Other(String),
}

impl PathKind {
    fn from_stat(description: &str) -> Self {
        match description {
            "regular file" | "regular empty file" => Self::File,
            "directory" => Self::Directory,
            "symbolic link" => Self::Symlink,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn describe(&self) -> &str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other(d) => d,
        }
    }
}

/// Actual state of a path, queried fresh on every probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    pub path: String,
    /// `None` if nothing exists at the path
    pub kind: Option<PathKind>,
    /// Four-digit octal permission string
    pub mode: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    /// SHA-1 of the content, only for regular files
    pub sha1: Option<String>,
    /// Link target, only for symlinks
    pub symlink_target: Option<String>,
}

impl PathInfo {
    /// Query the target for the state of `path`
    ///
    /// Read-only: runs `stat`, and `sha1sum`/`readlink` where they apply.
    pub fn probe(target: &dyn Target, path: &str) -> Result<Self> {
        let quoted = quote(path);
        let stat = target.run(&format!("stat --printf '%F\\n%U\\n%G\\n%a\\n' -- {quoted}"))?;

        if !stat.success() {
            log::debug!("{}: nothing at {}", target.name(), path);
            return Ok(Self::absent(path));
        }

        let stdout = stat.stdout_str();
        let fields: Vec<&str> = stdout.lines().collect();
        let [kind, owner, group, mode] = fields[..] else {
            anyhow::bail!("unexpected stat output for {path}: {stdout:?}");
        };

        let kind = PathKind::from_stat(kind);
        let sha1 = if kind == PathKind::File {
            let output = target.run_checked(&format!("sha1sum -- {quoted}"))?;
            let digest = output
                .stdout_str()
                .split_whitespace()
                .next()
                .map(str::to_string)
                .with_context(|| format!("empty sha1sum output for {path}"))?;
            Some(digest)
        } else {
            None
        };
        let symlink_target = if kind == PathKind::Symlink {
            let output = target.run_checked(&format!("readlink -- {quoted}"))?;
            Some(output.stdout_str().trim_end_matches('\n').to_string())
        } else {
            None
        };

        Ok(Self {
            path: path.to_string(),
            kind: Some(kind),
            mode: Some(normalize_mode(mode)),
            owner: Some(owner.to_string()),
            group: Some(group.to_string()),
            sha1,
            symlink_target,
        })
    }

    pub fn absent(path: &str) -> Self {
        Self {
            path: path.to_string(),
            kind: None,
            mode: None,
            owner: None,
            group: None,
            sha1: None,
            symlink_target: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.kind.is_some()
    }

    pub fn is_file(&self) -> bool {
        self.kind == Some(PathKind::File)
    }

    pub fn is_directory(&self) -> bool {
        self.kind == Some(PathKind::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == Some(PathKind::Symlink)
    }

    /// Human-readable description of what is at the path
    pub fn describe(&self) -> String {
        match &self.kind {
            None => "nothing".to_string(),
            Some(kind) => kind.describe().to_string(),
        }
    }
}

/// Quote a path for use in a remote shell command
pub fn quote(path: &str) -> String {
    shell_words::quote(path).into_owned()
}

/// Parent directory of a remote path (`/` for top-level paths)
pub fn parent_dir(path: &str) -> String {
    match std::path::Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_string_lossy().into_owned(),
        _ => "/".to_string(),
    }
}

//! Git integration: current branch and work-tree root.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

/// Source-control queries needed by the trigger.
pub trait SourceControl: Send + Sync {
    /// Name of the checked-out branch, or `None` if it cannot be determined.
    fn current_branch(&self) -> Option<String>;
}

/// `git` CLI bound to a repository directory.
#[derive(Debug, Clone)]
pub struct GitCli {
    git: String,
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(git: impl Into<String>, repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            git: git.into(),
            repo_dir: repo_dir.into(),
        }
    }
}

impl SourceControl for GitCli {
    fn current_branch(&self) -> Option<String> {
        let branch = run_git(&self.git, &self.repo_dir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
        // Detached HEAD reports the literal "HEAD", which is not dispatchable.
        if branch == "HEAD" {
            debug!("detached HEAD, no current branch");
            return None;
        }
        Some(branch)
    }
}

/// Top-level directory of the git work tree containing `dir`.
pub fn repo_root(git: &str, dir: &Path) -> Option<PathBuf> {
    run_git(git, dir, &["rev-parse", "--show-toplevel"]).map(PathBuf::from)
}

fn run_git(git: &str, dir: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(git).args(args).current_dir(dir).output().ok()?;
    if !output.status.success() {
        debug!(
            args = ?args,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "git query failed"
        );
        return None;
    }
    let out = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), &["init"]);
        run(dir.path(), &["config", "user.name", "test-user"]);
        run(dir.path(), &["config", "user.email", "test@example.com"]);
        run(dir.path(), &["checkout", "-b", "feature/ci"]);
        run(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn current_branch_reports_checked_out_branch() {
        let repo = make_git_repo();
        let git = GitCli::new("git", repo.path());
        assert_eq!(git.current_branch().as_deref(), Some("feature/ci"));
    }

    #[test]
    fn current_branch_is_none_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let git = GitCli::new("git", dir.path());
        assert_eq!(git.current_branch(), None);
    }

    #[test]
    fn current_branch_is_none_when_detached() {
        let repo = make_git_repo();
        run(repo.path(), &["checkout", "--detach"]);
        let git = GitCli::new("git", repo.path());
        assert_eq!(git.current_branch(), None);
    }

    #[test]
    fn repo_root_finds_toplevel_from_subdir() {
        let repo = make_git_repo();
        let sub = repo.path().join("a").join("b");
        std::fs::create_dir_all(&sub).unwrap();
        let root = repo_root("git", &sub).expect("inside work tree");
        assert_eq!(
            root.canonicalize().unwrap(),
            repo.path().canonicalize().unwrap()
        );
    }
}

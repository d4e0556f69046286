//! Change evidence: what a subagent actually touched.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::agent::SubagentResult;
use crate::id::digest_bytes;

/// Dirty paths of the working tree, each with a digest of its content.
///
/// Taken before a subagent runs so that changes left by earlier iterations
/// are not mistaken for this iteration's work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    entries: BTreeMap<String, DirtyPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct DirtyPath {
    line: String,
    content: Option<String>,
}

impl TreeSnapshot {
    /// Empty when git is unavailable or the directory is not a repository.
    pub async fn capture(project_dir: &Path, ignore: &[PathBuf]) -> Self {
        let mut entries = BTreeMap::new();
        for line in git_status(project_dir).await {
            if is_ignored(&line, ignore) {
                continue;
            }
            let path = porcelain_path(&line).to_string();
            let content = tokio::fs::read(project_dir.join(&path))
                .await
                .ok()
                .map(|bytes| digest_bytes(&bytes));
            entries.insert(path, DirtyPath { line, content });
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Porcelain lines of paths whose status or content differs from
    /// `before`. Paths dirty before and clean now were restored and count too.
    pub fn changed_since(&self, before: &TreeSnapshot) -> Vec<String> {
        let mut changed: Vec<String> = self
            .entries
            .iter()
            .filter(|(path, now)| before.entries.get(*path) != Some(*now))
            .map(|(_, now)| now.line.clone())
            .collect();
        changed.extend(
            before
                .entries
                .keys()
                .filter(|path| !self.entries.contains_key(*path))
                .map(|path| format!("    {} (restored)", path)),
        );
        changed
    }
}

/// Artifacts reported by the subagent plus working-tree changes from git.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeEvidence {
    pub artifacts: Vec<PathBuf>,
    /// `git status --porcelain` lines changed during the invocation, minus
    /// the loop's own files
    pub working_tree: Vec<String>,
    /// The subagent's final report
    pub report: String,
}

impl ChangeEvidence {
    pub fn new(artifacts: Vec<PathBuf>, working_tree: Vec<String>, report: impl Into<String>) -> Self {
        Self {
            artifacts,
            working_tree,
            report: report.into(),
        }
    }

    /// Collect evidence for a finished invocation: working-tree changes
    /// since `baseline` was captured. `ignore` lists paths (relative to
    /// `project_dir`) owned by the loop itself.
    pub async fn gather(project_dir: &Path, baseline: &TreeSnapshot, result: &SubagentResult, ignore: &[PathBuf]) -> Self {
        let working_tree = TreeSnapshot::capture(project_dir, ignore).await.changed_since(baseline);
        Self {
            artifacts: result.artifacts.clone(),
            working_tree,
            report: result.output.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.working_tree.is_empty()
    }

    /// Markdown rendering for the reviewer prompt.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if !self.artifacts.is_empty() {
            out.push_str("Files written by the implementer:\n");
            for path in &self.artifacts {
                out.push_str(&format!("- {}\n", path.display()));
            }
        }
        if !self.working_tree.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Working tree changes (git status --porcelain):\n```\n");
            for line in &self.working_tree {
                out.push_str(line);
                out.push('\n');
            }
            out.push_str("```\n");
        }
        if !self.report.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Implementer's report (a claim, not evidence):\n\n");
            out.push_str(self.report.trim());
            out.push('\n');
        }
        out
    }
}

fn porcelain_path(line: &str) -> &str {
    let path = line.get(3..).unwrap_or("").trim();
    // Renames are "old -> new"
    path.rsplit(" -> ").next().unwrap_or(path).trim_matches('"')
}

fn is_ignored(line: &str, ignore: &[PathBuf]) -> bool {
    let path = Path::new(porcelain_path(line));
    ignore.iter().any(|p| path.starts_with(p))
}

/// Porcelain status lines, or nothing when git is unavailable or the
/// directory is not a repository.
async fn git_status(dir: &Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["status", "--porcelain", "--untracked-files=all"])
        .current_dir(dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.to_string())
            .collect(),
        Ok(_) => {
            log::debug!("{} is not a git repository; no working-tree evidence", dir.display());
            Vec::new()
        }
        Err(e) => {
            log::debug!("git unavailable ({}); no working-tree evidence", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::SubagentIdentity;

    #[test]
    fn test_empty_evidence() {
        let e = ChangeEvidence::new(Vec::new(), Vec::new(), "I did everything");
        assert!(e.is_empty());
        assert!(e.describe().contains("a claim, not evidence"));
    }

    #[test]
    fn test_describe_lists_everything() {
        let e = ChangeEvidence::new(vec![PathBuf::from("src/a.rs")], vec![" M src/b.rs".into()], "");
        let text = e.describe();
        assert!(text.contains("- src/a.rs"));
        assert!(text.contains(" M src/b.rs"));
        assert!(!e.is_empty());
    }

    #[test]
    fn test_ignore_loop_files() {
        let ignore = vec![PathBuf::from("progress.txt"), PathBuf::from(".telos"), PathBuf::from("prds")];
        assert!(is_ignored(" M progress.txt", &ignore));
        assert!(is_ignored("?? .telos/status.json", &ignore));
        assert!(is_ignored("R  prds/old.md -> prds/01-new.md", &ignore));
        assert!(!is_ignored("?? src/main.rs", &ignore));
    }

    #[tokio::test]
    async fn test_non_repo_has_no_working_tree() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(git_status(dir.path()).await.is_empty());
        assert!(TreeSnapshot::capture(dir.path(), &[]).await.is_empty());
    }

    fn snapshot(entries: &[(&str, &str, Option<&str>)]) -> TreeSnapshot {
        TreeSnapshot {
            entries: entries
                .iter()
                .map(|(path, line, content)| {
                    let dirty = DirtyPath {
                        line: line.to_string(),
                        content: content.map(str::to_string),
                    };
                    (path.to_string(), dirty)
                })
                .collect(),
        }
    }

    #[test]
    fn test_changed_since_ignores_earlier_changes() {
        let before = snapshot(&[("a.txt", "?? a.txt", Some("h1")), ("b.rs", " M b.rs", Some("h2"))]);
        assert!(before.changed_since(&before).is_empty());

        let after = snapshot(&[
            ("a.txt", "?? a.txt", Some("h1")),
            ("b.rs", " M b.rs", Some("h3")),
            ("c.rs", "?? c.rs", Some("h4")),
        ]);
        assert_eq!(after.changed_since(&before), vec![" M b.rs", "?? c.rs"]);

        let restored = snapshot(&[("b.rs", " M b.rs", Some("h2"))]);
        assert_eq!(restored.changed_since(&before), vec!["    a.txt (restored)"]);
    }

    fn git_init(dir: &Path) {
        let status = std::process::Command::new("git")
            .args(["init", "-q"])
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_gather_reports_only_changes_after_baseline() {
        let dir = tempfile::TempDir::new().unwrap();
        git_init(dir.path());
        std::fs::write(dir.path().join("a1.txt"), "first\n").unwrap();
        std::fs::write(dir.path().join("progress.txt"), "log\n").unwrap();
        let ignore = vec![PathBuf::from("progress.txt")];

        let baseline = TreeSnapshot::capture(dir.path(), &ignore).await;
        let idle = SubagentResult {
            identity: SubagentIdentity::Coder,
            success: true,
            output: "did nothing".to_string(),
            artifacts: Vec::new(),
            tool_calls: Vec::new(),
            error: None,
        };
        let evidence = ChangeEvidence::gather(dir.path(), &baseline, &idle, &ignore).await;
        assert!(evidence.is_empty());

        std::fs::write(dir.path().join("a1.txt"), "rewritten\n").unwrap();
        std::fs::write(dir.path().join("a2.txt"), "second\n").unwrap();
        let evidence = ChangeEvidence::gather(dir.path(), &baseline, &idle, &ignore).await;
        assert_eq!(evidence.working_tree, vec!["?? a1.txt", "?? a2.txt"]);
    }
}

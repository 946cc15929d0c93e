use anyhow::{Context, Result};
use git2::{Delta, DiffFormat, DiffOptions, Repository};

use crate::diff::{FileStatus, NameStatusEntry, NumStatEntry};

/// merge in progress, if any; `source` comes from MERGE_MSG, `target` is the
/// current branch
#[derive(Debug, Clone, Default)]
pub struct MergeHeads {
    pub source: Option<String>,
    pub target: Option<String>,
}

fn open_repo(repo_path: &str) -> Result<Repository> {
    Repository::discover(repo_path).context("failed to open git repository")
}

fn staged_diff_options() -> DiffOptions {
    let mut opts = DiffOptions::new();
    opts.show_binary(false);
    opts.include_untracked(false);
    opts
}

/// produce the staged diff (index vs HEAD), with renames detected
fn staged_diff<'a>(repo: &'a Repository, paths: Option<&[String]>) -> Result<git2::Diff<'a>> {
    let mut opts = staged_diff_options();
    if let Some(paths) = paths {
        for path in paths {
            opts.pathspec(path);
        }
    }
    let tree = match repo.head() {
        Ok(head) => Some(head.peel_to_tree().context("failed to resolve HEAD tree")?),
        // unborn branch: everything in the index is staged
        Err(_) => None,
    };
    let mut diff = repo
        .diff_tree_to_index(tree.as_ref(), None, Some(&mut opts))
        .context("failed to diff index against HEAD")?;
    let mut find_opts = git2::DiffFindOptions::new();
    find_opts.renames(true).copies(true);
    diff.find_similar(Some(&mut find_opts)).ok();
    Ok(diff)
}

/// check whether the index differs from HEAD
pub fn has_staged_changes(repo_path: &str) -> Result<bool> {
    let repo = open_repo(repo_path)?;
    let diff = staged_diff(&repo, None)?;
    Ok(diff.deltas().count() > 0)
}

/// decode diff line bytes, falling back to lossy conversion for non-utf8
fn decode_line_content(content: &[u8]) -> String {
    let (cow, _, had_errors) = encoding_rs::UTF_8.decode(content);
    if had_errors {
        String::from_utf8_lossy(content).to_string()
    } else {
        cow.to_string()
    }
}

fn render_patch(diff: &git2::Diff) -> Result<String> {
    let mut out = String::new();
    diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
        match line.origin() {
            '+' | '-' | ' ' => out.push(line.origin()),
            _ => {}
        }
        out.push_str(&decode_line_content(line.content()));
        true
    })
    .context("failed to render staged patch")?;
    Ok(out)
}

/// full staged patch text
pub fn get_staged_diff(repo_path: &str) -> Result<String> {
    let repo = open_repo(repo_path)?;
    let diff = staged_diff(&repo, None)?;
    render_patch(&diff)
}

/// staged patch restricted to the given paths
pub fn get_staged_patch_for_paths(repo_path: &str, paths: &[String]) -> Result<String> {
    let repo = open_repo(repo_path)?;
    let diff = staged_diff(&repo, Some(paths))?;
    render_patch(&diff)
}

fn delta_status(delta: Delta) -> Option<FileStatus> {
    match delta {
        Delta::Added => Some(FileStatus::Added),
        Delta::Modified | Delta::Typechange => Some(FileStatus::Modified),
        Delta::Deleted => Some(FileStatus::Deleted),
        Delta::Renamed => Some(FileStatus::Renamed),
        Delta::Copied => Some(FileStatus::Copied),
        _ => None,
    }
}

/// one entry per touched file, in tool-reported order
pub fn get_staged_name_status(repo_path: &str) -> Result<Vec<NameStatusEntry>> {
    let repo = open_repo(repo_path)?;
    let diff = staged_diff(&repo, None)?;
    let mut entries = Vec::new();
    for delta in diff.deltas() {
        let Some(status) = delta_status(delta.status()) else {
            continue;
        };
        let path = match status {
            FileStatus::Deleted => delta.old_file().path(),
            _ => delta.new_file().path(),
        };
        let Some(path) = path else { continue };
        let old_path = match status {
            FileStatus::Renamed | FileStatus::Copied => delta
                .old_file()
                .path()
                .map(|p| p.to_string_lossy().to_string()),
            _ => None,
        };
        entries.push(NameStatusEntry {
            status,
            path: path.to_string_lossy().to_string(),
            old_path,
        });
    }
    Ok(entries)
}

/// per-file insertion/deletion counts; binary files report 0/0
pub fn get_staged_num_stat(repo_path: &str) -> Result<Vec<NumStatEntry>> {
    let repo = open_repo(repo_path)?;
    let diff = staged_diff(&repo, None)?;

    // seed one zero-count entry per delta so binary files still appear
    let mut entries: Vec<NumStatEntry> = Vec::new();
    for delta in diff.deltas() {
        let path = match delta.status() {
            Delta::Deleted => delta.old_file().path(),
            _ => delta.new_file().path(),
        };
        let Some(path) = path else { continue };
        let old_path = matches!(delta.status(), Delta::Renamed | Delta::Copied)
            .then(|| delta.old_file().path())
            .flatten()
            .map(|p| p.to_string_lossy().to_string());
        entries.push(NumStatEntry {
            insertions: 0,
            deletions: 0,
            path: path.to_string_lossy().to_string(),
            old_path,
        });
    }

    diff.foreach(
        &mut |_, _| true,
        None,
        None,
        Some(&mut |delta, _, line| {
            let path = match delta.status() {
                Delta::Deleted => delta.old_file().path(),
                _ => delta.new_file().path(),
            };
            let Some(path) = path else { return true };
            let path = path.to_string_lossy();
            if let Some(entry) = entries.iter_mut().find(|e| e.path == path) {
                match line.origin() {
                    '+' => entry.insertions += 1,
                    '-' => entry.deletions += 1,
                    _ => {}
                }
            }
            true
        }),
    )
    .context("failed to collect staged numstat")?;

    Ok(entries)
}

/// current branch shorthand; None on a detached or unborn HEAD
pub fn get_branch_name(repo_path: &str) -> Result<Option<String>> {
    let repo = open_repo(repo_path)?;
    let name = match repo.head() {
        Ok(head) if head.is_branch() => head.shorthand().map(|s| s.to_string()),
        _ => None,
    };
    Ok(name)
}

/// most recent commit subjects, newest first
pub fn get_recent_commit_subjects(repo_path: &str, count: usize) -> Result<Vec<String>> {
    let repo = open_repo(repo_path)?;
    let mut subjects = Vec::new();
    let Ok(mut revwalk) = repo.revwalk() else {
        return Ok(subjects);
    };
    if revwalk.push_head().is_err() {
        return Ok(subjects);
    }
    for oid in revwalk.take(count) {
        let Ok(oid) = oid else { continue };
        if let Ok(commit) = repo.find_commit(oid) {
            if let Some(subject) = commit.summary() {
                subjects.push(subject.to_string());
            }
        }
    }
    Ok(subjects)
}

/// detect an in-progress merge and name its heads
pub fn get_merge_heads(repo_path: &str) -> Result<MergeHeads> {
    let repo = open_repo(repo_path)?;
    let mut heads = MergeHeads::default();
    if repo.find_reference("MERGE_HEAD").is_err() {
        return Ok(heads);
    }
    heads.target = get_branch_name(repo_path)?;
    let merge_msg = repo.path().join("MERGE_MSG");
    if let Ok(msg) = std::fs::read_to_string(merge_msg) {
        // first line looks like: Merge branch 'feature-x' into main
        if let Some(first) = msg.lines().next() {
            if let Some(start) = first.find('\'') {
                if let Some(len) = first[start + 1..].find('\'') {
                    heads.source = Some(first[start + 1..start + 1 + len].to_string());
                }
            }
        }
    }
    Ok(heads)
}

fn run_git(repo_path: &str, args: &[&str]) -> Result<()> {
    let output = std::process::Command::new("git")
        .current_dir(repo_path)
        .args(args)
        .output()
        .with_context(|| format!("failed to execute git {}", args.join(" ")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}

/// commit the staged changes with the given message
pub fn commit(repo_path: &str, message: &str) -> Result<()> {
    run_git(repo_path, &["commit", "-m", message])
}

/// stage every pending change
pub fn stage_all(repo_path: &str) -> Result<()> {
    run_git(repo_path, &["add", "-A"])
}

/// create and switch to a new branch
pub fn create_branch(repo_path: &str, name: &str) -> Result<()> {
    run_git(repo_path, &["checkout", "-b", name])
}

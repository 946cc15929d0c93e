// diff signal extraction - compresses an unbounded diff into model-safe signals

use lazy_static::lazy_static;
use regex::Regex;

use crate::noise::{is_binary_or_media, is_noisy_path};

/// how a file was touched, as reported by the version-control reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
}

/// one name-status line; renames and copies carry both paths
#[derive(Debug, Clone)]
pub struct NameStatusEntry {
    pub status: FileStatus,
    pub path: String,
    pub old_path: Option<String>,
}

/// one numstat line; binary files report 0/0
#[derive(Debug, Clone)]
pub struct NumStatEntry {
    pub insertions: usize,
    pub deletions: usize,
    pub path: String,
    pub old_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DiffStats {
    pub original_length: usize,
    pub processed_length: usize,
    pub files_changed: usize,
    pub additions: usize,
    pub deletions: usize,
    pub was_summarized: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DiffSignals {
    pub name_status: Vec<NameStatusEntry>,
    pub num_stat: Vec<NumStatEntry>,
    pub top_files: Vec<String>,
    pub patch_snippets: Vec<String>,
}

/// the canonical unit passed between all core components; constructed once per
/// generation attempt from a fresh diff read, immutable afterwards
#[derive(Debug, Clone)]
pub struct ProcessedDiff {
    pub summary: String,
    pub stats: DiffStats,
    pub signals: DiffSignals,
    pub is_merge: bool,
}

pub const TOP_FILES_LIMIT: usize = 5;
pub const NAME_STATUS_FALLBACK_LIMIT: usize = 3;
pub const MAX_HUNKS_PER_FILE: usize = 2;
pub const MAX_LINES_PER_HUNK: usize = 30;
pub const MAX_SNIPPET_CHARS: usize = 12_000;

// tier thresholds for the full-size context window; halved for mini models
const TIER_OPTIMAL_MAX: usize = 20_000;
const TIER_EXTENDED_MAX: usize = 60_000;
const TIER_LARGE_MAX: usize = 120_000;

const EXTENDED_EXTRACT_BUDGET: usize = 16_000;
const LARGE_EXTRACT_BUDGET: usize = 8_000;

/// summarization tier chosen from the filtered diff length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryTier {
    Optimal,
    Extended,
    Large,
    VeryLarge,
}

pub fn tier_for_length(filtered_len: usize, mini_model: bool) -> SummaryTier {
    let scale = if mini_model { 2 } else { 1 };
    if filtered_len <= TIER_OPTIMAL_MAX / scale {
        SummaryTier::Optimal
    } else if filtered_len <= TIER_EXTENDED_MAX / scale {
        SummaryTier::Extended
    } else if filtered_len <= TIER_LARGE_MAX / scale {
        SummaryTier::Large
    } else {
        SummaryTier::VeryLarge
    }
}

struct FileSection<'a> {
    path: String,
    lines: Vec<&'a str>,
}

/// pull the new-side path out of a `diff --git a/... b/...` header line
fn header_path(line: &str) -> Option<String> {
    let rest = line.strip_prefix("diff --git ")?;
    let b_side = rest.split_whitespace().last()?;
    Some(b_side.strip_prefix("b/").unwrap_or(b_side).to_string())
}

fn split_file_sections(raw: &str) -> Vec<FileSection<'_>> {
    let mut sections: Vec<FileSection> = Vec::new();
    for line in raw.lines() {
        if line.starts_with("diff --git ") {
            let path = header_path(line).unwrap_or_default();
            sections.push(FileSection {
                path,
                lines: vec![line],
            });
        } else if let Some(section) = sections.last_mut() {
            section.lines.push(line);
        }
        // lines before the first header carry no per-file signal; dropped
    }
    sections
}

/// drop per-file sections whose path is noisy; the remainder keeps tool order
pub fn filter_noisy_sections(raw: &str) -> String {
    let mut kept = String::new();
    for section in split_file_sections(raw) {
        if is_noisy_path(&section.path) {
            continue;
        }
        for line in &section.lines {
            kept.push_str(line);
            kept.push('\n');
        }
    }
    kept
}

/// rank paths by churn, skipping noise and binaries; numstat empty falls back
/// to name-status order capped at 3
pub fn top_files(
    num_stat: &[NumStatEntry],
    name_status: &[NameStatusEntry],
    limit: usize,
) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    if num_stat.is_empty() {
        for entry in name_status {
            if is_noisy_path(&entry.path) || is_binary_or_media(&entry.path) {
                continue;
            }
            if seen.insert(entry.path.clone()) {
                out.push(entry.path.clone());
            }
            if out.len() >= NAME_STATUS_FALLBACK_LIMIT.min(limit) {
                break;
            }
        }
        return out;
    }

    let mut ranked: Vec<&NumStatEntry> = num_stat
        .iter()
        .filter(|e| !is_noisy_path(&e.path) && !is_binary_or_media(&e.path))
        .collect();
    // stable sort keeps tool-reported order for equal churn
    ranked.sort_by(|a, b| (b.insertions + b.deletions).cmp(&(a.insertions + a.deletions)));

    for entry in ranked {
        if seen.insert(entry.path.clone()) {
            out.push(entry.path.clone());
        }
        if out.len() >= limit {
            break;
        }
    }
    out
}

struct ScoredHunk<'a> {
    index: usize,
    score: usize,
    lines: Vec<&'a str>,
}

/// per selected file, keep the densest hunks with a `File:` header and a few
/// lines of file-level header context; accumulation stops between snippets
/// once the global character budget is spent
pub fn extract_patch_snippets(
    patch: &str,
    selected: &[String],
    max_hunks_per_file: usize,
    max_lines_per_hunk: usize,
    max_chars_total: usize,
) -> Vec<String> {
    let sections = split_file_sections(patch);
    let mut snippets = Vec::new();
    let mut total = 0usize;

    for path in selected {
        if total >= max_chars_total {
            break;
        }
        let Some(section) = sections.iter().find(|s| &s.path == path) else {
            continue;
        };

        let first_hunk = section
            .lines
            .iter()
            .position(|l| l.starts_with("@@"))
            .unwrap_or(section.lines.len());
        let header_ctx: Vec<&str> = section.lines[..first_hunk].iter().take(4).copied().collect();

        let mut hunks: Vec<ScoredHunk> = Vec::new();
        for line in &section.lines[first_hunk..] {
            if line.starts_with("@@") {
                hunks.push(ScoredHunk {
                    index: hunks.len(),
                    score: 0,
                    lines: vec![line],
                });
            } else if let Some(hunk) = hunks.last_mut() {
                if (line.starts_with('+') || line.starts_with('-'))
                    && !line.starts_with("+++")
                    && !line.starts_with("---")
                {
                    hunk.score += 1;
                }
                hunk.lines.push(line);
            }
        }
        if hunks.is_empty() {
            continue;
        }

        hunks.sort_by(|a, b| b.score.cmp(&a.score));
        hunks.truncate(max_hunks_per_file);
        hunks.sort_by_key(|h| h.index);

        let mut snippet = format!("File: {path}\n");
        for line in &header_ctx {
            snippet.push_str(line);
            snippet.push('\n');
        }
        for hunk in &hunks {
            for line in hunk.lines.iter().take(max_lines_per_hunk) {
                snippet.push_str(line);
                snippet.push('\n');
            }
        }

        total += snippet.len();
        snippets.push(snippet);
    }

    snippets
}

lazy_static! {
    // declarations, imports, jsx-ish returns and config assignments carry the
    // most signal per line when the raw diff no longer fits
    static ref PRIORITY_LINE: Regex = Regex::new(
        r#"(?x) ^[+-] \s* (
          pub\s | fn\s | struct\s | enum\s | trait\s | impl\s | mod\s
        | class\s | interface\s | type\s | def\s | function\s
        | const\s | static\s | let\s+\w+\s*=\s*(async\s*)?\(?
        | use\s | import\s | from\s+\S+\s+import | require\(
        | export\s | return\s*\(?\s*<
        | "?[\w.-]+"?\s*[:=][^=]
        )"#
    )
    .unwrap();
}

/// hybrid extraction for the extended and large tiers: hunk headers plus
/// priority lines with surrounding context, under a character budget
fn extract_priority_lines(filtered: &str, context: usize, budget: usize) -> String {
    let lines: Vec<&str> = filtered.lines().collect();
    let mut keep = vec![false; lines.len()];

    for (i, line) in lines.iter().enumerate() {
        let important = line.starts_with("diff --git")
            || line.starts_with("@@")
            || PRIORITY_LINE.is_match(line);
        if important {
            let lo = i.saturating_sub(context);
            let hi = (i + context + 1).min(lines.len());
            for flag in keep.iter_mut().take(hi).skip(lo) {
                *flag = true;
            }
        }
    }

    let mut out = String::new();
    let mut last_kept = usize::MAX;
    for (i, line) in lines.iter().enumerate() {
        if !keep[i] {
            continue;
        }
        if out.len() + line.len() + 1 > budget {
            break;
        }
        if last_kept != usize::MAX && last_kept + 1 != i {
            out.push_str("...\n");
        }
        out.push_str(line);
        out.push('\n');
        last_kept = i;
    }
    out
}

fn status_letter(status: FileStatus) -> char {
    match status {
        FileStatus::Added => 'A',
        FileStatus::Modified => 'M',
        FileStatus::Deleted => 'D',
        FileStatus::Renamed => 'R',
        FileStatus::Copied => 'C',
    }
}

fn build_structured_summary(
    name_status: &[NameStatusEntry],
    num_stat: &[NumStatEntry],
    stats: &DiffStats,
) -> String {
    let mut summary = format!(
        "{} file{} changed, {} insertion{}, {} deletion{}\n",
        stats.files_changed,
        if stats.files_changed == 1 { "" } else { "s" },
        stats.additions,
        if stats.additions == 1 { "" } else { "s" },
        stats.deletions,
        if stats.deletions == 1 { "" } else { "s" },
    );
    summary.push_str("changed files:\n");
    for entry in name_status {
        if is_noisy_path(&entry.path) {
            continue;
        }
        let counts = num_stat
            .iter()
            .find(|n| n.path == entry.path)
            .map(|n| format!(" (+{} -{})", n.insertions, n.deletions))
            .unwrap_or_default();
        match &entry.old_path {
            Some(old) => summary.push_str(&format!(
                "{} {} -> {}{}\n",
                status_letter(entry.status),
                old,
                entry.path,
                counts
            )),
            None => summary.push_str(&format!(
                "{} {}{}\n",
                status_letter(entry.status),
                entry.path,
                counts
            )),
        }
    }
    summary
}

/// build the canonical `ProcessedDiff` from one fresh diff read
pub fn process_diff(
    raw_diff: &str,
    name_status: Vec<NameStatusEntry>,
    num_stat: Vec<NumStatEntry>,
    is_merge: bool,
    mini_model: bool,
) -> ProcessedDiff {
    process_diff_with_snippet_source(raw_diff, None, name_status, num_stat, is_merge, mini_model)
}

/// same, but with a dedicated patch to cut snippets from (typically the
/// focused per-path patch, much cheaper to scan than a huge full diff)
pub fn process_diff_with_snippet_source(
    raw_diff: &str,
    snippet_patch: Option<&str>,
    name_status: Vec<NameStatusEntry>,
    num_stat: Vec<NumStatEntry>,
    is_merge: bool,
    mini_model: bool,
) -> ProcessedDiff {
    let filtered = filter_noisy_sections(raw_diff);

    let files_changed = name_status
        .iter()
        .filter(|e| !is_noisy_path(&e.path) && !is_binary_or_media(&e.path))
        .count();
    let (additions, deletions) = num_stat
        .iter()
        .filter(|e| !is_noisy_path(&e.path) && !is_binary_or_media(&e.path))
        .fold((0, 0), |(a, d), e| (a + e.insertions, d + e.deletions));

    let selected = top_files(&num_stat, &name_status, TOP_FILES_LIMIT);
    let focused_filtered = snippet_patch.map(filter_noisy_sections);
    let patch_snippets = extract_patch_snippets(
        focused_filtered.as_deref().unwrap_or(&filtered),
        &selected,
        MAX_HUNKS_PER_FILE,
        MAX_LINES_PER_HUNK,
        MAX_SNIPPET_CHARS,
    );

    let mut stats = DiffStats {
        original_length: raw_diff.len(),
        processed_length: 0,
        files_changed,
        additions,
        deletions,
        was_summarized: false,
    };

    let tier = tier_for_length(filtered.len(), mini_model);
    let structured = build_structured_summary(&name_status, &num_stat, &stats);
    let summary = match tier {
        SummaryTier::Optimal => filtered.clone(),
        SummaryTier::Extended => format!(
            "{structured}\nhigh-signal changes:\n{}",
            extract_priority_lines(&filtered, 2, EXTENDED_EXTRACT_BUDGET)
        ),
        SummaryTier::Large => format!(
            "{structured}\nhigh-signal changes:\n{}",
            extract_priority_lines(&filtered, 1, LARGE_EXTRACT_BUDGET)
        ),
        SummaryTier::VeryLarge => structured,
    };

    stats.processed_length = summary.len();
    stats.was_summarized = tier != SummaryTier::Optimal;

    ProcessedDiff {
        summary,
        stats,
        signals: DiffSignals {
            name_status,
            num_stat,
            top_files: selected,
            patch_snippets,
        },
        is_merge,
    }
}

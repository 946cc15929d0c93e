// prompt construction - assembles ordered text blocks for the model; cheap
// structured facts precede expensive raw text. no validation happens here.

use crate::classify::Classification;
use crate::diff::ProcessedDiff;
use crate::git::MergeHeads;
use crate::utils::truncate_with_ellipsis;

use super::validation::{subject_matches_grammar, PrTemplate, QA_NOT_TESTED_SENTINEL};

// free-text author context is advisory; past this point it stops informing
// the subject and starts crowding out the diff signals
const MAX_USER_CONTEXT_CHARS: usize = 600;

/// everything the commit prompt is assembled from
pub struct CommitPromptContext<'a> {
    pub diff: &'a ProcessedDiff,
    pub classification: &'a Classification,
    pub scope_hint: Option<&'a str>,
    pub branch: Option<&'a str>,
    pub recent_subjects: &'a [String],
    pub merge: &'a MergeHeads,
    pub user_context: Option<&'a str>,
    pub body_allowed: bool,
    pub max_title_length: usize,
}

pub fn commit_system_prompt(body_allowed: bool) -> &'static str {
    if body_allowed {
        "you are a senior developer writing conventional commit messages. generate a lowercase \
         type(scope): description subject and, only when the change genuinely needs it, a body \
         of at most two '- ' bullets stating what changed."
    } else {
        "you are a senior developer writing conventional commit messages. generate exactly one \
         lowercase type(scope): description line and nothing else."
    }
}

fn push_name_status(prompt: &mut String, diff: &ProcessedDiff) {
    prompt.push_str("CHANGED FILES (status, path):\n");
    for entry in &diff.signals.name_status {
        let letter = match entry.status {
            crate::diff::FileStatus::Added => "A",
            crate::diff::FileStatus::Modified => "M",
            crate::diff::FileStatus::Deleted => "D",
            crate::diff::FileStatus::Renamed => "R",
            crate::diff::FileStatus::Copied => "C",
        };
        match &entry.old_path {
            Some(old) => prompt.push_str(&format!("{letter} {old} -> {}\n", entry.path)),
            None => prompt.push_str(&format!("{letter} {}\n", entry.path)),
        }
    }
    prompt.push('\n');
}

fn push_stats(prompt: &mut String, diff: &ProcessedDiff) {
    let stats = &diff.stats;
    prompt.push_str(&format!(
        "STATS: {} files changed, +{} -{} lines{}\n\n",
        stats.files_changed,
        stats.additions,
        stats.deletions,
        if stats.was_summarized {
            " (diff was summarized)"
        } else {
            ""
        }
    ));
}

fn push_top_files(prompt: &mut String, diff: &ProcessedDiff) {
    if diff.signals.top_files.is_empty() {
        return;
    }
    prompt.push_str("HIGHEST-CHURN FILES:\n");
    for path in &diff.signals.top_files {
        let counts = diff
            .signals
            .num_stat
            .iter()
            .find(|n| &n.path == path)
            .map(|n| format!(" (+{} -{})", n.insertions, n.deletions))
            .unwrap_or_default();
        prompt.push_str(&format!("- {path}{counts}\n"));
    }
    prompt.push('\n');
}

/// assemble the commit prompt; ordering matters for model attention
pub fn build_commit_prompt(ctx: &CommitPromptContext) -> String {
    let mut prompt = String::new();

    prompt.push_str(
        "generate a conventional commit message for the staged changes described below.\n\n",
    );

    if let Some(branch) = ctx.branch {
        prompt.push_str(&format!(
            "BRANCH: {branch} (a good scope often matches the branch topic)\n\n"
        ));
    }

    if ctx.diff.is_merge {
        match (&ctx.merge.source, &ctx.merge.target) {
            (Some(source), Some(target)) => prompt.push_str(&format!(
                "MERGE IN PROGRESS: merging '{source}' into '{target}'; describe the merged \
                 work, not the mechanics of merging.\n\n"
            )),
            _ => prompt.push_str(
                "MERGE IN PROGRESS: describe the merged work, not the mechanics of merging.\n\n",
            ),
        }
    }

    if let Some(user_context) = ctx.user_context {
        prompt.push_str(&format!(
            "AUTHOR CONTEXT: {}\n\n",
            truncate_with_ellipsis(user_context, MAX_USER_CONTEXT_CHARS)
        ));
    }

    if ctx.body_allowed {
        prompt.push_str(
            "BODY: allowed; add at most two '- ' bullets, each naming a concrete change.\n",
        );
    } else {
        prompt.push_str("BODY: do not write a body; the subject line only.\n");
    }
    prompt.push_str(&format!(
        "LENGTH: the subject must be at most {} characters.\n\n",
        ctx.max_title_length
    ));

    let examples: Vec<&String> = ctx
        .recent_subjects
        .iter()
        .filter(|s| subject_matches_grammar(s))
        .take(5)
        .collect();
    if !examples.is_empty() {
        prompt.push_str("RECENT SUBJECTS IN THIS REPOSITORY (match their register):\n");
        for example in examples {
            prompt.push_str(&format!("- {example}\n"));
        }
        prompt.push('\n');
    }

    if let Some(scope) = ctx.scope_hint {
        prompt.push_str(&format!("SCOPE HINT: '{scope}' fits the touched paths.\n"));
    }
    if ctx.classification.is_docs_only {
        prompt.push_str("TYPE HINT: this is a docs-only change; the type must be 'docs'.\n");
    } else if ctx.classification.is_internal_change {
        prompt.push_str(
            "TYPE HINT: internal tooling change; use 'refactor' or 'chore', never 'feat'.\n",
        );
    }
    prompt.push('\n');

    push_name_status(&mut prompt, ctx.diff);
    push_stats(&mut prompt, ctx.diff);
    push_top_files(&mut prompt, ctx.diff);

    if !ctx.diff.signals.patch_snippets.is_empty() {
        prompt.push_str("KEY PATCH EXCERPTS:\n");
        for snippet in &ctx.diff.signals.patch_snippets {
            prompt.push_str(snippet);
            prompt.push('\n');
        }
    } else {
        prompt.push_str("DIFF SUMMARY:\n");
        prompt.push_str(&ctx.diff.summary);
        prompt.push('\n');
    }

    prompt.push_str("\nrespond with the commit message only, no commentary.\n");
    prompt
}

/// retry prompt embedding the rejected output and its violations
pub fn build_repair_prompt(base_prompt: &str, previous: &str, errors: &[String]) -> String {
    let mut prompt = String::new();
    prompt.push_str("your previous commit message was rejected by the message policy.\n\n");
    prompt.push_str("PREVIOUS OUTPUT:\n");
    prompt.push_str(previous);
    prompt.push_str("\n\nVIOLATIONS:\n");
    for error in errors {
        prompt.push_str(&format!("- {error}\n"));
    }
    prompt.push_str("\nwrite a corrected message that fixes every violation. ");
    prompt.push_str("keep the grammar exactly: lowercase type(scope): description.\n\n");
    prompt.push_str(base_prompt);
    prompt
}

pub fn pr_system_prompt(template: PrTemplate) -> &'static str {
    match template {
        PrTemplate::Default => {
            "you are a senior developer writing pull-request descriptions. produce a \
             type(scope): outcome title, then '### Summary', '### Changes' (2-10 bullets, no \
             file paths) and '### QA Focus' sections."
        }
        PrTemplate::Grouped => {
            "you are a senior developer writing pull-request descriptions. produce a \
             type(scope): outcome title, then '### Summary', two or more behaviour-named group \
             sections of 1-6 bullets each, and '### QA Focus'. never name a group after files \
             or directories."
        }
        PrTemplate::SubtleBug => {
            "you are a senior developer writing pull-request descriptions for subtle bug \
             fixes. produce a type(scope): outcome title, then '### Summary', '### Root \
             Cause' and '### Fix' (up to 3 bullets each) and '### QA Focus'."
        }
    }
}

/// everything the PR prompt is assembled from
pub struct PrPromptContext<'a> {
    pub diff: &'a ProcessedDiff,
    pub template: PrTemplate,
    pub branch: Option<&'a str>,
    pub user_context: Option<&'a str>,
}

pub fn build_pr_prompt(ctx: &PrPromptContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "write a pull-request title and description for the change-set described below.\n\n",
    );
    if let Some(branch) = ctx.branch {
        prompt.push_str(&format!("BRANCH: {branch}\n\n"));
    }
    if let Some(user_context) = ctx.user_context {
        prompt.push_str(&format!(
            "AUTHOR CONTEXT: {}\n\n",
            truncate_with_ellipsis(user_context, MAX_USER_CONTEXT_CHARS)
        ));
    }

    prompt.push_str("REQUIRED SHAPE:\n");
    prompt.push_str("- title: type(scope): outcome, types fix/feat/refactor/chore/perf/docs\n");
    match ctx.template {
        PrTemplate::Default => prompt.push_str(
            "- sections: '### Summary', '### Changes' with 2-10 bullets, '### QA Focus'; no \
             other sections\n",
        ),
        PrTemplate::Grouped => prompt.push_str(
            "- sections: '### Summary', at least two behaviour-named groups with 1-6 bullets \
             each, '### QA Focus'\n",
        ),
        PrTemplate::SubtleBug => prompt.push_str(
            "- sections: '### Summary', '### Root Cause' and '### Fix' with up to 3 bullets \
             each, '### QA Focus'\n",
        ),
    }
    prompt.push_str(&format!(
        "- qa focus: 2-10 bullets about observable behaviour, at least one starting with a \
         short surface label like 'Settings page: ...'; never file paths; or exactly the \
         line '{QA_NOT_TESTED_SENTINEL}' if nothing was run\n\n"
    ));

    push_name_status(&mut prompt, ctx.diff);
    push_stats(&mut prompt, ctx.diff);
    push_top_files(&mut prompt, ctx.diff);

    if !ctx.diff.signals.patch_snippets.is_empty() {
        prompt.push_str("KEY PATCH EXCERPTS:\n");
        for snippet in &ctx.diff.signals.patch_snippets {
            prompt.push_str(snippet);
            prompt.push('\n');
        }
    } else {
        prompt.push_str("DIFF SUMMARY:\n");
        prompt.push_str(&ctx.diff.summary);
        prompt.push('\n');
    }

    prompt.push_str("\nrespond with the title on the first line, a blank line, then the body.\n");
    prompt
}

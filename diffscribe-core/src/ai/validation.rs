// message validation - pure grammar checks; failures are data, never errors.
// each error string carries a fixed marker substring that classifies it as
// structural (needs model-level correction) or style (locally repairable),
// and that split decides the orchestrator's retry strategy.

use lazy_static::lazy_static;
use regex::Regex;

use crate::classify::Classification;

/// a commit message candidate; replaced wholesale across repair attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMessage {
    pub title: String,
    pub body: Option<String>,
}

impl CommitMessage {
    pub fn subject_only(title: impl Into<String>) -> Self {
        CommitMessage {
            title: title.into(),
            body: None,
        }
    }

    pub fn full_text(&self) -> String {
        match &self.body {
            Some(body) => format!("{}\n\n{}", self.title, body),
            None => self.title.clone(),
        }
    }
}

/// a pull-request message candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrMessage {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrTemplate {
    Default,
    Grouped,
    SubtleBug,
}

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<String>) -> Self {
        ValidationResult {
            valid: errors.is_empty(),
            errors,
        }
    }

    pub fn has_structural_errors(&self) -> bool {
        self.errors.iter().any(|e| is_structural_error(e))
    }
}

/// validation context for one commit candidate
pub struct CommitPolicy<'a> {
    pub max_title_length: usize,
    pub body_allowed: bool,
    pub classification: &'a Classification,
}

pub const COMMIT_TYPES: &[&str] = &[
    "feat", "fix", "docs", "style", "refactor", "test", "chore", "build", "ci", "perf", "revert",
];

pub const PR_TITLE_TYPES: &[&str] = &["fix", "feat", "refactor", "chore", "perf", "docs"];

// subject-level filler; these words say that something changed, not what
pub const BANNED_SUBJECT_WORDS: &[&str] = &[
    "update", "updates", "updated", "updating", "enhance", "enhances", "enhanced", "enhancing",
    "enhancement", "enhancements", "improve", "improves", "improved", "improving", "improvement",
    "improvements", "misc", "miscellaneous", "change", "changes",
];

// whole descriptions that say nothing at all
pub const VAGUE_SUBJECT_TEMPLATES: &[&str] = &[
    "changes",
    "change",
    "updates",
    "update code",
    "improve code",
    "misc changes",
    "various changes",
    "minor changes",
    "code changes",
    "cleanup",
    "fix things",
    "fix stuff",
];

// bodies must state what changed, not that something changed
pub const BODY_NARRATION_VERBS: &[&str] = &[
    "update", "updates", "updated", "updating", "modify", "modifies", "modified", "modifying",
    "change", "changes", "changed", "changing", "refactor", "refactors", "refactored",
    "refactoring", "adjust", "adjusts", "adjusted", "adjusting", "cleanup", "cleanups", "cleaned",
];

// group headings that merely name file buckets instead of behaviour
pub const FILEISH_HEADINGS: &[&str] = &[
    "services", "service", "readme", "tests", "test", "docs", "src", "files", "components",
    "utils", "config", "scripts", "assets", "styles", "types",
];

// qa bullets may not hide behind a verification verb with no specifics
pub const GENERIC_QA_PREFIXES: &[&str] = &["verified", "ensured", "checked", "tested", "confirmed"];

pub const QA_NOT_TESTED_SENTINEL: &str = "Not tested (not run)";

const SURFACE_LABEL_MAX: usize = 25;

lazy_static! {
    static ref SUBJECT_RE: Regex = Regex::new(
        r"^(feat|fix|docs|style|refactor|test|chore|build|ci|perf|revert)(\([a-z0-9]+(?:-[a-z0-9]+)*\))?: \S.*$"
    )
    .unwrap();
    static ref LOOSE_SUBJECT_RE: Regex =
        Regex::new(r"^([A-Za-z]+)(?:\(([^)]*)\))?:\s*(.*)$").unwrap();
    static ref KEBAB_SCOPE_RE: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
    static ref PR_TITLE_RE: Regex = Regex::new(
        r"^(fix|feat|refactor|chore|perf|docs)\([a-z0-9]+(?:-[a-z0-9]+)*\): \S.*$"
    )
    .unwrap();
    // dir/sub and dir\sub shapes
    static ref PATH_SHAPE_RE: Regex = Regex::new(r"[\w~.-]+[/\\][\w~./\\-]+").unwrap();
    // name.ext shapes
    static ref EXT_SHAPE_RE: Regex = Regex::new(
        r"(?ix)\b[\w-]+\.(rs|ts|tsx|js|jsx|mjs|cjs|py|rb|go|java|kt|cs|cpp|cc|hpp|php|swift|md|txt|json|yaml|yml|toml|ini|cfg|conf|css|scss|less|html|htm|vue|svelte|sql|sh|bash|ps1|bat|lock|csv|xml)\b"
    )
    .unwrap();
    static ref SURFACE_BULLET_RE: Regex = Regex::new(r"^[^:]{1,25}:\s+\S").unwrap();
}

// markers that flag an error as structural; everything else is style
const STRUCTURAL_MARKERS: &[&str] = &[
    "invalid subject format",
    "unknown commit type",
    "scope must be lowercase",
    "not allowed for internal tooling",
    "docs-only change requires type",
    "pr title must match",
    "missing required section",
];

/// structural errors mean the model misunderstood the grammar and only a
/// model-level retry can help; style errors are locally repairable
pub fn is_structural_error(error: &str) -> bool {
    STRUCTURAL_MARKERS.iter().any(|m| error.contains(m))
}

pub fn subject_matches_grammar(subject: &str) -> bool {
    SUBJECT_RE.is_match(subject)
}

fn word_in(text: &str, words: &[&str]) -> Option<String> {
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        let lower = token.to_lowercase();
        if words.contains(&lower.as_str()) {
            return Some(lower);
        }
    }
    None
}

fn contains_path_token(text: &str) -> bool {
    PATH_SHAPE_RE.is_match(text) || EXT_SHAPE_RE.is_match(text)
}

/// validate one commit candidate against the subject grammar and the body
/// policy; returns every violation found, not just the first
pub fn validate_commit_message(msg: &CommitMessage, policy: &CommitPolicy) -> ValidationResult {
    let mut errors = Vec::new();
    let title = msg.title.trim();

    let Some(caps) = LOOSE_SUBJECT_RE.captures(title) else {
        errors.push(
            "invalid subject format: expected type(scope): description".to_string(),
        );
        return ValidationResult::from_errors(errors);
    };

    let ctype = caps.get(1).map_or("", |m| m.as_str());
    let scope = caps.get(2).map(|m| m.as_str());
    let description = caps.get(3).map_or("", |m| m.as_str());

    if !COMMIT_TYPES.contains(&ctype) {
        errors.push(format!("unknown commit type '{ctype}'"));
    }
    if let Some(scope) = scope {
        if !KEBAB_SCOPE_RE.is_match(scope) {
            errors.push(format!("scope must be lowercase kebab-case, got '{scope}'"));
        }
    }
    if description.is_empty() {
        errors.push("invalid subject format: description is empty".to_string());
    }

    if title.chars().count() > policy.max_title_length {
        errors.push(format!(
            "subject exceeds {} characters",
            policy.max_title_length
        ));
    }
    if PATH_SHAPE_RE.is_match(description) {
        errors.push("subject contains a file path".to_string());
    }
    if EXT_SHAPE_RE.is_match(description) {
        errors.push("subject contains a file name".to_string());
    }
    if let Some(word) = word_in(description, BANNED_SUBJECT_WORDS) {
        errors.push(format!("subject contains banned word '{word}'"));
    }
    if VAGUE_SUBJECT_TEMPLATES.contains(&description.trim().to_lowercase().as_str()) {
        errors.push("subject is too vague".to_string());
    }

    if policy.classification.is_internal_change && ctype == "feat" {
        errors.push(
            "type 'feat' is not allowed for internal tooling changes; use refactor or chore"
                .to_string(),
        );
    }
    if policy.classification.is_docs_only && ctype != "docs" {
        errors.push("docs-only change requires type 'docs'".to_string());
    }

    if let Some(body) = &msg.body {
        validate_commit_body(body, policy.body_allowed, &mut errors);
    }

    ValidationResult::from_errors(errors)
}

fn validate_commit_body(body: &str, body_allowed: bool, errors: &mut Vec<String>) {
    if !body_allowed {
        errors.push("body is not allowed for this commit".to_string());
    }
    let lines: Vec<&str> = body.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() > 2 {
        errors.push("body must be at most 2 lines".to_string());
    }
    for line in &lines {
        if !line.starts_with("- ") {
            errors.push("body lines must start with '- '".to_string());
            break;
        }
    }
    for line in &lines {
        if let Some(word) = word_in(line, BODY_NARRATION_VERBS) {
            errors.push(format!(
                "body must state what changed, not narrate it (found '{word}')"
            ));
            break;
        }
    }
}

struct PrSection {
    name: String,
    bullets: Vec<String>,
    text: String,
}

fn normalize_section_key(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_pr_sections(body: &str) -> Vec<PrSection> {
    let mut sections: Vec<PrSection> = Vec::new();
    for line in body.lines() {
        if let Some(heading) = line.trim().strip_prefix("###") {
            sections.push(PrSection {
                name: heading.trim().to_string(),
                bullets: Vec::new(),
                text: String::new(),
            });
        } else if let Some(section) = sections.last_mut() {
            let trimmed = line.trim();
            if let Some(bullet) = trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
            {
                section.bullets.push(bullet.trim().to_string());
            }
            if !trimmed.is_empty() {
                if !section.text.is_empty() {
                    section.text.push('\n');
                }
                section.text.push_str(trimmed);
            }
        }
    }
    sections
}

const RESERVED_SECTIONS: &[&str] = &["summary", "changes", "qa focus", "root cause", "fix"];

/// validate a PR title and `###`-sectioned body against the chosen template
pub fn validate_pr_message(msg: &PrMessage, template: PrTemplate) -> ValidationResult {
    let mut errors = Vec::new();

    if !PR_TITLE_RE.is_match(msg.title.trim()) {
        errors.push("pr title must match type(scope): outcome".to_string());
    }

    let sections = parse_pr_sections(&msg.body);
    let find = |key: &str| {
        sections
            .iter()
            .find(|s| normalize_section_key(&s.name) == key)
    };

    match find("summary") {
        Some(summary) if !summary.text.is_empty() => {}
        _ => errors.push("missing required section 'Summary'".to_string()),
    }

    let group_sections: Vec<&PrSection> = sections
        .iter()
        .filter(|s| !RESERVED_SECTIONS.contains(&normalize_section_key(&s.name).as_str()))
        .collect();

    match template {
        PrTemplate::Default => {
            for extra in &group_sections {
                errors.push(format!(
                    "default template forbids extra section '{}'",
                    extra.name
                ));
            }
            match find("changes") {
                Some(changes) if (2..=10).contains(&changes.bullets.len()) => {
                    if changes.bullets.iter().any(|b| contains_path_token(b)) {
                        errors.push("changes bullets must not contain file paths".to_string());
                    }
                }
                Some(_) => {
                    errors.push("changes section must have 2-10 bullets".to_string());
                }
                None => errors.push("missing required section 'Changes'".to_string()),
            }
        }
        PrTemplate::Grouped => {
            if group_sections.len() < 2 {
                errors.push("grouped template requires at least 2 group sections".to_string());
            }
            for group in &group_sections {
                let key = normalize_section_key(&group.name);
                if FILEISH_HEADINGS.contains(&key.as_str()) || contains_path_token(&group.name) {
                    errors.push(format!(
                        "grouped template heading '{}' names files, not behaviour",
                        group.name
                    ));
                }
                if !(1..=6).contains(&group.bullets.len()) {
                    errors.push(format!(
                        "grouped template section '{}' must have 1-6 bullets",
                        group.name
                    ));
                }
                if group.bullets.iter().any(|b| contains_path_token(b)) {
                    errors.push(format!(
                        "grouped template section '{}' bullets must not contain file paths",
                        group.name
                    ));
                }
            }
        }
        PrTemplate::SubtleBug => {
            for key in ["root cause", "fix"] {
                match find(key) {
                    Some(section) => {
                        if section.bullets.len() > 3 {
                            errors.push(format!("section '{key}' must have at most 3 bullets"));
                        }
                        if section.bullets.iter().any(|b| contains_path_token(b)) {
                            errors.push(format!(
                                "section '{key}' bullets must not contain file paths"
                            ));
                        }
                    }
                    None => errors.push(format!("missing required section '{key}'")),
                }
            }
        }
    }

    match find("qa focus") {
        Some(qa) => validate_qa_focus(qa, &mut errors),
        None => errors.push("missing required section 'QA Focus'".to_string()),
    }

    ValidationResult::from_errors(errors)
}

fn validate_qa_focus(qa: &PrSection, errors: &mut Vec<String>) {
    // the sentinel is an honest "not run" and short-circuits every other rule
    if qa.text.trim() == QA_NOT_TESTED_SENTINEL
        || (qa.bullets.len() == 1 && qa.bullets[0] == QA_NOT_TESTED_SENTINEL)
    {
        return;
    }

    if !(2..=10).contains(&qa.bullets.len()) {
        errors.push("qa focus must have 2-10 bullets".to_string());
    }
    for bullet in &qa.bullets {
        if contains_path_token(bullet) {
            errors.push("qa focus bullets must not contain file paths".to_string());
            break;
        }
    }
    for bullet in &qa.bullets {
        let first = bullet
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_lowercase();
        if GENERIC_QA_PREFIXES.contains(&first.trim_end_matches(':').trim_end_matches(',')) {
            errors.push(format!(
                "qa focus bullet may not open with a bare verification verb: '{bullet}'"
            ));
            break;
        }
    }
    let has_surface = qa.bullets.iter().any(|b| {
        SURFACE_BULLET_RE
            .find(b)
            .map(|m| m.as_str().find(':').unwrap_or(usize::MAX) <= SURFACE_LABEL_MAX)
            .unwrap_or(false)
    });
    if !has_surface {
        errors.push(
            "qa focus needs at least one surface-labelled bullet (e.g. 'Settings page: ...')"
                .to_string(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_classification() -> Classification {
        Classification::default()
    }

    fn policy(cls: &Classification) -> CommitPolicy<'_> {
        CommitPolicy {
            max_title_length: 72,
            body_allowed: true,
            classification: cls,
        }
    }

    #[test]
    fn test_valid_subject_passes() {
        let cls = plain_classification();
        let msg = CommitMessage::subject_only("feat(api): add retry backoff to the client");
        assert!(validate_commit_message(&msg, &policy(&cls)).valid);
    }

    #[test]
    fn test_missing_type_prefix_is_structural() {
        let cls = plain_classification();
        let msg = CommitMessage::subject_only("added some retry logic");
        let result = validate_commit_message(&msg, &policy(&cls));
        assert!(!result.valid);
        assert!(result.has_structural_errors());
    }

    #[test]
    fn test_unknown_type_is_structural() {
        let cls = plain_classification();
        let msg = CommitMessage::subject_only("feature(api): add retry");
        let result = validate_commit_message(&msg, &policy(&cls));
        assert!(result.has_structural_errors());
    }

    #[test]
    fn test_length_and_banned_words_are_style() {
        let cls = plain_classification();
        let long = format!("feat(api): {}", "x".repeat(90));
        let result = validate_commit_message(&CommitMessage::subject_only(long), &policy(&cls));
        assert!(!result.valid);
        assert!(!result.has_structural_errors());

        let msg = CommitMessage::subject_only("fix(api): improve the parser");
        let result = validate_commit_message(&msg, &policy(&cls));
        assert!(!result.valid);
        assert!(!result.has_structural_errors());
        assert!(result.errors[0].contains("banned word"));
    }

    #[test]
    fn test_paths_and_extensions_rejected() {
        let cls = plain_classification();
        let msg = CommitMessage::subject_only("fix(core): guard src/diff parsing");
        assert!(!validate_commit_message(&msg, &policy(&cls)).valid);

        let msg = CommitMessage::subject_only("fix(core): guard parser in diff.rs");
        assert!(!validate_commit_message(&msg, &policy(&cls)).valid);
    }

    #[test]
    fn test_vague_whole_subject_template() {
        let cls = plain_classification();
        let msg = CommitMessage::subject_only("chore: cleanup");
        let result = validate_commit_message(&msg, &policy(&cls));
        assert!(result.errors.iter().any(|e| e.contains("too vague")));
    }

    #[test]
    fn test_internal_change_rejects_feat() {
        let cls = Classification {
            is_internal_change: true,
            ..Classification::default()
        };
        let msg = CommitMessage::subject_only("feat(services): add retry logic");
        let result = validate_commit_message(&msg, &policy(&cls));
        assert!(result.has_structural_errors());

        let msg = CommitMessage::subject_only("refactor(services): add retry logic");
        assert!(validate_commit_message(&msg, &policy(&cls)).valid);
    }

    #[test]
    fn test_docs_only_requires_docs_type() {
        let cls = Classification {
            is_docs_only: true,
            is_docs_touched: true,
            ..Classification::default()
        };
        let msg = CommitMessage::subject_only("chore(readme): describe the install steps");
        let result = validate_commit_message(&msg, &policy(&cls));
        assert!(result.has_structural_errors());
    }

    #[test]
    fn test_body_shape_rules() {
        let cls = plain_classification();
        let ok = CommitMessage {
            title: "feat(api): add retry backoff".to_string(),
            body: Some("- add exponential backoff on 429\n- cap retries at three".to_string()),
        };
        assert!(validate_commit_message(&ok, &policy(&cls)).valid);

        let narrated = CommitMessage {
            title: "feat(api): add retry backoff".to_string(),
            body: Some("- refactored the client internals".to_string()),
        };
        let result = validate_commit_message(&narrated, &policy(&cls));
        assert!(!result.valid);
        assert!(!result.has_structural_errors());

        let too_long = CommitMessage {
            title: "feat(api): add retry backoff".to_string(),
            body: Some("- one\n- two\n- three".to_string()),
        };
        assert!(!validate_commit_message(&too_long, &policy(&cls)).valid);

        let no_dash = CommitMessage {
            title: "feat(api): add retry backoff".to_string(),
            body: Some("plain prose body".to_string()),
        };
        assert!(!validate_commit_message(&no_dash, &policy(&cls)).valid);
    }

    #[test]
    fn test_body_rejected_when_policy_forbids() {
        let cls = plain_classification();
        let policy = CommitPolicy {
            max_title_length: 72,
            body_allowed: false,
            classification: &cls,
        };
        let msg = CommitMessage {
            title: "feat(api): add retry backoff".to_string(),
            body: Some("- add exponential backoff on 429".to_string()),
        };
        let result = validate_commit_message(&msg, &policy);
        assert!(!result.valid);
        assert!(!result.has_structural_errors());
    }

    fn pr_body_default() -> String {
        [
            "### Summary",
            "Retries now back off exponentially instead of hammering the endpoint.",
            "",
            "### Changes",
            "- back off exponentially on throttled responses",
            "- cap the retry budget at three attempts",
            "",
            "### QA Focus",
            "- Throttled request path: third failure surfaces the original error",
            "- watch the retry counter reset after a success",
        ]
        .join("\n")
    }

    #[test]
    fn test_pr_default_template_valid() {
        let msg = PrMessage {
            title: "fix(api): stop hammering throttled endpoints".to_string(),
            body: pr_body_default(),
        };
        let result = validate_pr_message(&msg, PrTemplate::Default);
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_pr_title_grammar_is_structural() {
        let msg = PrMessage {
            title: "Fixed the retry bug".to_string(),
            body: pr_body_default(),
        };
        let result = validate_pr_message(&msg, PrTemplate::Default);
        assert!(result.has_structural_errors());
    }

    #[test]
    fn test_pr_default_forbids_extra_groups() {
        let body = format!("{}\n\n### Retry internals\n- something\n", pr_body_default());
        let msg = PrMessage {
            title: "fix(api): stop hammering throttled endpoints".to_string(),
            body,
        };
        let result = validate_pr_message(&msg, PrTemplate::Default);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("forbids extra section")));
    }

    #[test]
    fn test_pr_grouped_rejects_fileish_heading() {
        let body = [
            "### Summary",
            "Split retry policy from transport concerns.",
            "",
            "### Services",
            "- retry policy now owns the backoff schedule",
            "",
            "### Transport behaviour",
            "- transport no longer retries on its own",
            "",
            "### QA Focus",
            "- Throttled request path: retries stop after three attempts",
            "- confirm logs carry one line per retry",
        ]
        .join("\n");
        let msg = PrMessage {
            title: "refactor(api): split retry policy from transport".to_string(),
            body,
        };
        let result = validate_pr_message(&msg, PrTemplate::Grouped);
        assert!(result.errors.iter().any(|e| e.contains("grouped template heading 'Services'")));
    }

    #[test]
    fn test_pr_subtle_bug_requires_root_cause_and_fix() {
        let body = [
            "### Summary",
            "Retry counter leaked across requests.",
            "",
            "### Root Cause",
            "- counter lived on the shared client instead of the request",
            "",
            "### Fix",
            "- move the counter into per-request state",
            "",
            "### QA Focus",
            "- Burst of parallel requests: each one retries independently",
            "- second request after a throttled one starts with a zero counter",
        ]
        .join("\n");
        let msg = PrMessage {
            title: "fix(api): reset retry counter per request".to_string(),
            body: body.clone(),
        };
        let result = validate_pr_message(&msg, PrTemplate::SubtleBug);
        assert!(result.valid, "errors: {:?}", result.errors);

        let without_fix = body.replace("### Fix", "### Remedy");
        let msg = PrMessage {
            title: "fix(api): reset retry counter per request".to_string(),
            body: without_fix,
        };
        let result = validate_pr_message(&msg, PrTemplate::SubtleBug);
        assert!(result.errors.iter().any(|e| e.contains("missing required section 'fix'")));
    }

    #[test]
    fn test_qa_sentinel_short_circuits() {
        let body = [
            "### Summary",
            "Docs only.",
            "",
            "### Changes",
            "- describe the new config keys",
            "- mention the fallback rule set",
            "",
            "### QA Focus",
            "Not tested (not run)",
        ]
        .join("\n");
        let msg = PrMessage {
            title: "docs(config): describe the new keys".to_string(),
            body,
        };
        let result = validate_pr_message(&msg, PrTemplate::Default);
        assert!(result.valid, "errors: {:?}", result.errors);
    }

    #[test]
    fn test_qa_rules() {
        let mut qa = PrSection {
            name: "QA Focus".to_string(),
            bullets: vec![
                "Verified the retry path".to_string(),
                "Settings page: toggling retries persists".to_string(),
            ],
            text: "x".to_string(),
        };
        let mut errors = Vec::new();
        validate_qa_focus(&qa, &mut errors);
        assert!(errors.iter().any(|e| e.contains("verification verb")));

        qa.bullets = vec![
            "Settings page: toggling retries persists".to_string(),
            "watch src/api/client.rs for panics".to_string(),
        ];
        errors.clear();
        validate_qa_focus(&qa, &mut errors);
        assert!(errors.iter().any(|e| e.contains("file paths")));

        qa.bullets = vec![
            "retry path behaves under throttling".to_string(),
            "the counter resets after success".to_string(),
        ];
        errors.clear();
        validate_qa_focus(&qa, &mut errors);
        assert!(errors.iter().any(|e| e.contains("surface-labelled")));
    }
}

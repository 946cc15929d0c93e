// deterministic subject repair - model-free text surgery that turns a
// near-miss subject into a valid one, plus the fallback builder that can
// never fail validation

use lazy_static::lazy_static;
use regex::Regex;

use crate::classify::{is_vague_description, Classification};
use crate::diff::ProcessedDiff;

use super::validation::{
    validate_commit_message, CommitMessage, CommitPolicy, BANNED_SUBJECT_WORDS, COMMIT_TYPES,
    VAGUE_SUBJECT_TEMPLATES,
};

/// the terminal fallback subject; must satisfy the grammar by construction
pub const FALLBACK_SUBJECT: &str = "chore: align commit flow";
const FALLBACK_DESCRIPTION: &str = "align commit flow";

// truncation must not leave one of these dangling at the end
const TRAILING_STOP_WORDS: &[&str] = &[
    "and", "or", "with", "for", "to", "in", "on", "at", "from", "into", "by", "the", "a", "an",
];

// verbs that gesture at work instead of naming it, with their replacements;
// applied only to internal or quality-tuning changes
const VERB_REWRITES: &[(&str, &str)] = &[
    ("implement", "support"),
    ("implements", "supports"),
    ("adjust", "refine"),
    ("adjusts", "refines"),
    ("handle", "harden"),
    ("handles", "hardens"),
    ("process", "standardize"),
    ("processes", "standardizes"),
    ("manage", "standardize"),
    ("manages", "standardizes"),
];

// filler nouns that add length without meaning
const FILLER_NOUNS: &[&str] = &["parameters", "process", "behavior", "behaviour"];

lazy_static! {
    static ref PATH_TOKEN_RE: Regex = Regex::new(r"[\w~.-]+[/\\][\w~./\\-]+").unwrap();
    static ref EXT_TOKEN_RE: Regex = Regex::new(
        r"(?ix)\b[\w-]+\.(rs|ts|tsx|js|jsx|mjs|cjs|py|rb|go|java|kt|cs|cpp|cc|hpp|php|swift|md|txt|json|yaml|yml|toml|ini|cfg|conf|css|scss|less|html|htm|vue|svelte|sql|sh|bash|ps1|bat|lock|csv|xml)\b"
    )
    .unwrap();
    static ref REPLACE_WITH_RE: Regex =
        Regex::new(r"(?i)\breplace\s+(.+?)\s+with\s+(.+)$").unwrap();
    static ref RENAME_TO_RE: Regex = Regex::new(r"(?i)\brename\s+(.+?)\s+to\s+(.+)$").unwrap();
    static ref ARROW_RE: Regex = Regex::new(r"^(.+?)\s*->\s*(.+)$").unwrap();
    static ref SUBJECT_PARTS_RE: Regex =
        Regex::new(r"^([A-Za-z]+)(?:\(([^)]*)\))?:\s*(.*)$").unwrap();
}

/// a subject split into its grammar parts
#[derive(Debug, Clone)]
pub struct ParsedSubject {
    pub ctype: String,
    pub scope: Option<String>,
    pub description: String,
}

/// parse a subject that still looks like `type(scope): description`; repair
/// only operates on candidates that clear this bar
pub fn parse_subject(title: &str) -> Option<ParsedSubject> {
    let caps = SUBJECT_PARTS_RE.captures(title.trim())?;
    let ctype = caps.get(1)?.as_str().to_lowercase();
    if !COMMIT_TYPES.contains(&ctype.as_str()) {
        return None;
    }
    Some(ParsedSubject {
        ctype,
        scope: caps.get(2).map(|m| m.as_str().to_string()),
        description: caps.get(3).map_or("", |m| m.as_str()).trim().to_string(),
    })
}

fn format_subject(ctype: &str, scope: Option<&str>, description: &str) -> String {
    match scope {
        Some(scope) if !scope.is_empty() => format!("{ctype}({scope}): {description}"),
        _ => format!("{ctype}: {description}"),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// drop path-shaped and extension-shaped substrings from a description
pub fn strip_path_tokens(description: &str) -> String {
    let without_paths = PATH_TOKEN_RE.replace_all(description, "");
    let without_exts = EXT_TOKEN_RE.replace_all(&without_paths, "");
    collapse_whitespace(&without_exts)
}

/// drop banned filler words
pub fn remove_banned_words(description: &str) -> String {
    let kept: Vec<&str> = description
        .split_whitespace()
        .filter(|word| {
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            !BANNED_SUBJECT_WORDS.contains(&bare.as_str())
        })
        .collect();
    kept.join(" ")
}

fn strip_common_affixes(a: &str, b: &str) -> (String, String) {
    let prefix = a
        .chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .count();
    let a_rest: String = a.chars().skip(prefix).collect();
    let b_rest: String = b.chars().skip(prefix).collect();
    if a_rest.is_empty() || b_rest.is_empty() {
        (a.to_string(), b.to_string())
    } else {
        (a_rest, b_rest)
    }
}

/// collapse `replace A with B`, `A -> B` and `rename A to B` into one rename
/// phrasing, shortening with an arrow glyph and affix stripping when the
/// budget demands it
pub fn normalize_rename_phrasing(description: &str, description_budget: usize) -> String {
    let pair = if let Some(caps) = REPLACE_WITH_RE.captures(description) {
        Some((caps[1].to_string(), caps[2].to_string()))
    } else if let Some(caps) = RENAME_TO_RE.captures(description) {
        Some((caps[1].to_string(), caps[2].to_string()))
    } else {
        ARROW_RE
            .captures(description)
            .map(|caps| (caps[1].trim().to_string(), caps[2].trim().to_string()))
    };
    let Some((from, to)) = pair else {
        return description.to_string();
    };

    let canonical = format!("rename {from} to {to}");
    if canonical.chars().count() <= description_budget {
        return canonical;
    }
    let arrowed = format!("rename {from} \u{2192} {to}");
    if arrowed.chars().count() <= description_budget {
        return arrowed;
    }
    let (short_from, short_to) = strip_common_affixes(&from, &to);
    format!("rename {short_from} \u{2192} {short_to}")
}

/// rewrite discouraged verbs and drop filler nouns
pub fn refine_wording(description: &str) -> String {
    let kept: Vec<String> = description
        .split_whitespace()
        .filter_map(|word| {
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if FILLER_NOUNS.contains(&bare.as_str()) {
                return None;
            }
            for (from, to) in VERB_REWRITES {
                if bare == *from {
                    return Some(to.to_string());
                }
            }
            Some(word.to_string())
        })
        .collect();
    kept.join(" ")
}

/// shorten a subject to the budget at a word boundary, never leaving a
/// dangling stop-word; the result still matches the subject grammar
pub fn truncate_subject_to_max(subject: &str, max_length: usize) -> String {
    if subject.chars().count() <= max_length {
        return subject.to_string();
    }
    let Some(parsed) = parse_subject(subject) else {
        // not grammar-shaped; plain character cut is the best we can do
        return subject.chars().take(max_length).collect();
    };
    let prefix = format_subject(&parsed.ctype, parsed.scope.as_deref(), "");
    let budget = max_length.saturating_sub(prefix.chars().count());

    let words: Vec<&str> = parsed.description.split_whitespace().collect();
    let mut kept: Vec<&str> = Vec::new();
    let mut used = 0usize;
    for word in &words {
        let cost = word.chars().count() + usize::from(!kept.is_empty());
        if used + cost > budget {
            break;
        }
        used += cost;
        kept.push(word);
    }
    if kept.is_empty() {
        // even the first word overflows; cut it rather than emit no description
        let head: String = words
            .first()
            .map(|w| w.chars().take(budget.max(1)).collect())
            .unwrap_or_else(|| "x".to_string());
        return format!("{prefix}{head}");
    }
    while kept.len() > 1 {
        let last = kept[kept.len() - 1]
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if TRAILING_STOP_WORDS.contains(&last.as_str()) {
            kept.pop();
        } else {
            break;
        }
    }
    format!("{prefix}{}", kept.join(" "))
}

/// canned subjects for a few well-known change shapes; only consulted when
/// behaviour templates are enabled
fn behavior_template_subject(diff: &ProcessedDiff) -> Option<String> {
    let paths: Vec<&str> = diff
        .signals
        .name_status
        .iter()
        .map(|e| e.path.as_str())
        .collect();
    if !paths.is_empty()
        && paths.iter().all(|p| {
            p.contains("locale") || p.contains("i18n") || p.contains("translation")
        })
    {
        return Some("chore(i18n): sync translation catalogues".to_string());
    }

    let snippets = diff.signals.patch_snippets.join("\n");
    let drops_console = snippets
        .lines()
        .any(|l| l.starts_with('-') && l.contains("console."));
    let adds_logger = snippets
        .lines()
        .any(|l| l.starts_with('+') && l.to_lowercase().contains("logger"));
    if drops_console && adds_logger {
        return Some("refactor(logging): route console output through the logger".to_string());
    }
    None
}

fn validate_subject_only(
    title: &str,
    classification: &Classification,
    max_title_length: usize,
) -> Option<CommitMessage> {
    let candidate = CommitMessage::subject_only(title);
    let policy = CommitPolicy {
        max_title_length,
        body_allowed: false,
        classification,
    };
    validate_commit_message(&candidate, &policy)
        .valid
        .then_some(candidate)
}

/// attempt deterministic repair of a near-miss subject; returns None when no
/// valid subject can be produced without another model call
pub fn repair(
    msg: &CommitMessage,
    diff: &ProcessedDiff,
    classification: &Classification,
    scope_hint: Option<&str>,
    max_title_length: usize,
    enable_behavior_templates: bool,
) -> Option<CommitMessage> {
    let parsed = parse_subject(&msg.title)?;

    // type-policy fixes are cheap and local
    let ctype = if classification.is_internal_change && parsed.ctype == "feat" {
        "refactor".to_string()
    } else {
        parsed.ctype
    };
    let scope = parsed
        .scope
        .filter(|s| !s.is_empty())
        .or_else(|| scope_hint.map(|s| s.to_string()));

    let prefix_len = format_subject(&ctype, scope.as_deref(), "").chars().count();
    let description_budget = max_title_length.saturating_sub(prefix_len);

    let mut description = strip_path_tokens(&parsed.description);
    description = remove_banned_words(&description);
    description = normalize_rename_phrasing(&description, description_budget);

    if description.is_empty()
        || VAGUE_SUBJECT_TEMPLATES.contains(&description.to_lowercase().as_str())
        || is_vague_description(&description)
    {
        if enable_behavior_templates {
            if let Some(canned) = behavior_template_subject(diff) {
                if let Some(valid) =
                    validate_subject_only(&canned, classification, max_title_length)
                {
                    return Some(valid);
                }
            }
        }
        description = if classification.is_docs_touched && !classification.is_docs_only {
            "sync the docs with the code".to_string()
        } else {
            "tidy internal structure".to_string()
        };
    }

    if classification.is_internal_change || classification.is_quality_tuning {
        description = refine_wording(&description);
    }

    let subject = truncate_subject_to_max(
        &format_subject(&ctype, scope.as_deref(), &description),
        max_title_length,
    );
    validate_subject_only(&subject, classification, max_title_length)
}

/// docs-only short-circuit: force `docs(<docs_scope>)` and keep only the
/// description, regardless of the model's chosen type
pub fn repair_docs(
    msg: &CommitMessage,
    classification: &Classification,
    max_title_length: usize,
) -> Option<CommitMessage> {
    if !classification.is_docs_only {
        return None;
    }
    let description = match SUBJECT_PARTS_RE.captures(msg.title.trim()) {
        Some(caps) => caps.get(3).map_or("", |m| m.as_str()).trim().to_string(),
        None => msg.title.trim().to_string(),
    };
    let mut description = strip_path_tokens(&description);
    if description.is_empty() {
        description = "refresh the documentation".to_string();
    }
    let scope = classification.docs_scope.as_deref();
    let subject =
        truncate_subject_to_max(&format_subject("docs", scope, &description), max_title_length);
    validate_subject_only(&subject, classification, max_title_length)
}

/// last-resort synthesis; tries the candidate, its truncation, a scope-hinted
/// maintenance subject, then the literal fallback - the chain cannot fail
pub fn build_fallback(
    raw_candidate: Option<&str>,
    classification: &Classification,
    scope_hint: Option<&str>,
    max_title_length: usize,
) -> CommitMessage {
    if let Some(raw) = raw_candidate {
        if let Some(valid) = validate_subject_only(raw, classification, max_title_length) {
            return valid;
        }
        let truncated = truncate_subject_to_max(raw, max_title_length);
        if let Some(valid) = validate_subject_only(&truncated, classification, max_title_length) {
            return valid;
        }
    }

    let hinted = if classification.is_docs_only {
        format_subject(
            "docs",
            classification.docs_scope.as_deref(),
            FALLBACK_DESCRIPTION,
        )
    } else if let Some(scope) = scope_hint {
        format_subject("refactor", Some(scope), FALLBACK_DESCRIPTION)
    } else {
        FALLBACK_SUBJECT.to_string()
    };
    let hinted = truncate_subject_to_max(&hinted, max_title_length);
    if let Some(valid) = validate_subject_only(&hinted, classification, max_title_length) {
        return valid;
    }

    let literal = if classification.is_docs_only {
        format_subject("docs", None, FALLBACK_DESCRIPTION)
    } else {
        FALLBACK_SUBJECT.to_string()
    };
    CommitMessage::subject_only(truncate_subject_to_max(&literal, max_title_length))
}

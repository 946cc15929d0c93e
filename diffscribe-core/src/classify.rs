// heuristic change classification - boolean/categorical facts about a diff
// that feed both prompt hints and validator decisions

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::ScopeRuleConfig;
use crate::diff::ProcessedDiff;

/// facts derived from a `ProcessedDiff`; recomputed each time, never persisted
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub is_internal_change: bool,
    pub is_docs_only: bool,
    pub is_docs_touched: bool,
    pub is_quality_tuning: bool,
    pub docs_scope: Option<String>,
    pub docs_touched: Vec<String>,
}

// internal-infrastructure layers; a change living mostly here is plumbing,
// not a user-visible feature
pub const INTERNAL_PATH_PREFIXES: &[&str] = &[
    "src/services/",
    "src/processors/",
    "src/types/",
    "src/constants/",
    "services/",
    "processors/",
    "types/",
    "constants/",
];

// paths that mark a change as user-facing even when internal layers dominate
pub const USER_FACING_HINTS: &[&str] = &["src/cli", "src/main", "src/index", "src/commands/", "bin/"];

// narrow allowlist: file stems whose changes may count as quality tuning
pub const QUALITY_TUNING_FILES: &[&str] = &[
    "validation",
    "validator",
    "prompts",
    "prompt-builder",
    "prompt_builder",
    "repair",
    "diff",
    "diff-processor",
    "diff_processor",
];

// vocabulary that must also appear in the patch snippets before a change is
// called quality tuning; keeps recall deliberately low
pub const QUALITY_TUNING_VOCAB: &[&str] = &[
    "repair",
    "validate",
    "validator",
    "template",
    "prompt",
    "fallback",
    "truncate",
];

// filler tokens for the vague-description detector
pub const FILLER_WORDS: &[&str] = &[
    "update", "updates", "updated", "change", "changes", "changed", "improve", "improves",
    "improved", "improvement", "improvements", "enhance", "enhanced", "enhancement",
    "enhancements", "fix", "fixes", "misc", "miscellaneous", "various", "minor", "general",
    "stuff", "things", "tweak", "tweaks", "cleanup", "code", "some", "small", "a", "the",
    "and", "few",
];

fn all_paths(diff: &ProcessedDiff) -> Vec<&str> {
    diff.signals
        .name_status
        .iter()
        .map(|e| e.path.as_str())
        .collect()
}

/// the path set classification heuristics look at: top churn files when
/// available, otherwise everything name-status reported
fn signal_paths(diff: &ProcessedDiff) -> Vec<&str> {
    if !diff.signals.top_files.is_empty() {
        diff.signals.top_files.iter().map(|p| p.as_str()).collect()
    } else {
        all_paths(diff)
    }
}

fn is_internal_path(path: &str) -> bool {
    INTERNAL_PATH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn is_user_facing_path(path: &str) -> bool {
    USER_FACING_HINTS.iter().any(|hint| path.starts_with(hint))
}

/// true when at least half of the touched paths live in internal layers and
/// nothing user-facing is touched
pub fn is_internal_tooling_change(diff: &ProcessedDiff) -> bool {
    let paths = signal_paths(diff);
    if paths.is_empty() {
        return false;
    }
    if paths.iter().any(|p| is_user_facing_path(p)) {
        return false;
    }
    let internal = paths.iter().filter(|p| is_internal_path(p)).count();
    internal * 2 >= paths.len()
}

fn is_docs_path(path: &str) -> bool {
    if path == "README.md" || path.starts_with("docs/") || path.ends_with(".md") {
        return true;
    }
    let file_name = path.rsplit('/').next().unwrap_or(path);
    file_name.starts_with("CHANGELOG") || file_name.starts_with("HISTORY")
}

pub fn docs_touched_list(diff: &ProcessedDiff) -> Vec<String> {
    all_paths(diff)
        .into_iter()
        .filter(|p| is_docs_path(p))
        .map(|p| p.to_string())
        .collect()
}

pub fn is_docs_touched(diff: &ProcessedDiff) -> bool {
    !docs_touched_list(diff).is_empty()
}

pub fn is_docs_only_change(diff: &ProcessedDiff) -> bool {
    let paths = all_paths(diff);
    !paths.is_empty() && paths.iter().all(|p| is_docs_path(p))
}

pub fn docs_scope(diff: &ProcessedDiff) -> Option<String> {
    let touched = docs_touched_list(diff);
    if touched.is_empty() {
        return None;
    }
    if touched.iter().any(|p| p == "README.md") {
        Some("readme".to_string())
    } else {
        Some("docs".to_string())
    }
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

/// true only when an allowlisted validation/prompt/diff file is touched AND
/// the snippets mention the internal vocabulary
pub fn is_quality_tuning_change(diff: &ProcessedDiff) -> bool {
    let touches_allowlisted = all_paths(diff).iter().any(|p| {
        let stem = file_stem(p).to_lowercase();
        QUALITY_TUNING_FILES.contains(&stem.as_str())
    });
    if !touches_allowlisted {
        return false;
    }
    let snippets = diff.signals.patch_snippets.join("\n").to_lowercase();
    QUALITY_TUNING_VOCAB.iter().any(|word| snippets.contains(word))
}

/// a description is vague when it is all filler, or so short that any filler
/// token dominates it
pub fn is_vague_description(text: &str) -> bool {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect();
    if tokens.is_empty() {
        return true;
    }
    let is_filler = |t: &String| FILLER_WORDS.contains(&t.as_str());
    tokens.iter().all(is_filler) || (tokens.len() <= 3 && tokens.iter().any(is_filler))
}

/// derive the full classification for one diff
pub fn classify(diff: &ProcessedDiff) -> Classification {
    let docs_touched = docs_touched_list(diff);
    Classification {
        is_internal_change: is_internal_tooling_change(diff),
        is_docs_only: is_docs_only_change(diff),
        is_docs_touched: !docs_touched.is_empty(),
        is_quality_tuning: is_quality_tuning_change(diff),
        docs_scope: docs_scope(diff),
        docs_touched,
    }
}

/// one scope rule; rules are ordered and the first best scorer wins
#[derive(Debug, Clone)]
pub struct ScopeRule {
    pub scope: String,
    pub pattern: Regex,
}

lazy_static! {
    static ref FALLBACK_RULE_SPECS: Vec<(&'static str, &'static str)> = vec![
        ("api", r"^(src/)?(api|routes|endpoints)(/|$)"),
        ("ui", r"^(src/)?(components|ui|views|pages)(/|$)"),
        ("services", r"^(src/)?services(/|$)"),
        ("core", r"^(src/)?(core|engine|lib)(/|$)"),
        ("config", r"(^|/)(config|settings)(/|\.|$)"),
        ("docs", r"(^|/)(docs/|README|CHANGELOG)|\.md$"),
        ("tests", r"(^|/)(tests?|spec)(/|\.|$)"),
        ("ci", r"^\.(github|gitlab|circleci)/"),
        ("build", r"(^|/)(Cargo\.toml|package\.json|Makefile|Dockerfile)$"),
    ];
}

pub fn fallback_scope_rules() -> Vec<ScopeRule> {
    FALLBACK_RULE_SPECS
        .iter()
        .map(|(scope, pattern)| ScopeRule {
            scope: scope.to_string(),
            // fallback patterns are fixed literals; compile cannot fail
            pattern: Regex::new(pattern).unwrap(),
        })
        .collect()
}

/// scores candidate scopes by match-count over a path set and picks the top
#[derive(Debug, Clone)]
pub struct ScopeInferrer {
    rules: Vec<ScopeRule>,
}

impl ScopeInferrer {
    pub fn new(rules: Vec<ScopeRule>) -> Self {
        ScopeInferrer { rules }
    }

    /// compile user rules, silently dropping malformed patterns; an empty
    /// result falls back to the fixed rule set
    pub fn from_config(configured: &[ScopeRuleConfig]) -> Self {
        let rules: Vec<ScopeRule> = configured
            .iter()
            .filter_map(|rule| {
                Regex::new(&rule.pattern).ok().map(|pattern| ScopeRule {
                    scope: rule.scope.clone(),
                    pattern,
                })
            })
            .collect();
        if rules.is_empty() {
            ScopeInferrer::new(fallback_scope_rules())
        } else {
            ScopeInferrer::new(rules)
        }
    }

    pub fn infer(&self, paths: &[String]) -> Option<String> {
        let mut best: Option<(&ScopeRule, usize)> = None;
        for rule in &self.rules {
            let count = paths.iter().filter(|p| rule.pattern.is_match(p)).count();
            if count == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((rule, count)),
            }
        }
        best.map(|(rule, _)| rule.scope.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{process_diff, FileStatus, NameStatusEntry, NumStatEntry};

    fn diff_for(paths: &[&str]) -> ProcessedDiff {
        let name_status = paths
            .iter()
            .map(|p| NameStatusEntry {
                status: FileStatus::Modified,
                path: p.to_string(),
                old_path: None,
            })
            .collect();
        let num_stat = paths
            .iter()
            .map(|p| NumStatEntry {
                insertions: 10,
                deletions: 2,
                path: p.to_string(),
                old_path: None,
            })
            .collect();
        process_diff("", name_status, num_stat, false, false)
    }

    #[test]
    fn test_internal_tooling_majority_rule() {
        let diff = diff_for(&["src/services/Foo.ts", "src/services/Bar.ts"]);
        assert!(is_internal_tooling_change(&diff));

        let diff = diff_for(&["src/services/Foo.ts", "src/cli.ts"]);
        assert!(!is_internal_tooling_change(&diff));

        let diff = diff_for(&["src/widgets/a.ts", "src/widgets/b.ts", "src/widgets/c.ts"]);
        assert!(!is_internal_tooling_change(&diff));
    }

    #[test]
    fn test_docs_only_implies_docs_touched() {
        let diff = diff_for(&["README.md"]);
        let cls = classify(&diff);
        assert!(cls.is_docs_only);
        assert!(cls.is_docs_touched);
        assert_eq!(cls.docs_scope.as_deref(), Some("readme"));
    }

    #[test]
    fn test_docs_touched_but_not_only() {
        let diff = diff_for(&["docs/guide.md", "src/lib.rs"]);
        let cls = classify(&diff);
        assert!(!cls.is_docs_only);
        assert!(cls.is_docs_touched);
        assert_eq!(cls.docs_scope.as_deref(), Some("docs"));
        assert_eq!(cls.docs_touched, vec!["docs/guide.md"]);
    }

    #[test]
    fn test_quality_tuning_requires_both_path_and_vocabulary() {
        let mut diff = diff_for(&["src/ai/validation.rs"]);
        diff.signals.patch_snippets = vec!["+fn validate_subject()".to_string()];
        assert!(is_quality_tuning_change(&diff));

        // allowlisted path, unrelated content
        diff.signals.patch_snippets = vec!["+const GREETING: &str = \"hi\";".to_string()];
        assert!(!is_quality_tuning_change(&diff));

        // vocabulary hit on a non-allowlisted path
        let mut diff = diff_for(&["src/server.rs"]);
        diff.signals.patch_snippets = vec!["+fn validate_input()".to_string()];
        assert!(!is_quality_tuning_change(&diff));
    }

    #[test]
    fn test_vague_description_rules() {
        assert!(is_vague_description("update code"));
        assert!(is_vague_description("misc changes"));
        assert!(is_vague_description("fix stuff"));
        assert!(is_vague_description(""));
        assert!(!is_vague_description("add retry backoff to the api client"));
        assert!(!is_vague_description("rework hunk scoring for snippet extraction"));
    }

    #[test]
    fn test_scope_inference_scores_by_match_count() {
        let inferrer = ScopeInferrer::new(fallback_scope_rules());
        let paths = vec![
            "src/api/users.rs".to_string(),
            "src/api/sessions.rs".to_string(),
            "src/components/button.rs".to_string(),
        ];
        assert_eq!(inferrer.infer(&paths).as_deref(), Some("api"));
        assert_eq!(inferrer.infer(&[]), None);
    }

    #[test]
    fn test_malformed_user_rules_fall_back() {
        let configured = vec![ScopeRuleConfig {
            scope: "broken".to_string(),
            pattern: "([unclosed".to_string(),
        }];
        let inferrer = ScopeInferrer::from_config(&configured);
        let paths = vec!["src/api/users.rs".to_string()];
        assert_eq!(inferrer.infer(&paths).as_deref(), Some("api"));
    }
}

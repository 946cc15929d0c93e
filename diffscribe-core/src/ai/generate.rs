// generation orchestration - the bounded state machine that turns a model
// call plus deterministic repair into a guaranteed-valid message.
// hard cap: two model calls per generation.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;

use crate::classify::{Classification, ScopeInferrer};
use crate::config::{Config, IncludeBody};
use crate::diff::ProcessedDiff;
use crate::git::MergeHeads;

use super::api::{ChatMessage, CompletionClient, CompletionRequest};
use super::prompts::{
    build_commit_prompt, build_pr_prompt, build_repair_prompt, commit_system_prompt,
    pr_system_prompt, CommitPromptContext, PrPromptContext,
};
use super::repair::{build_fallback, repair, repair_docs};
use super::validation::{
    validate_commit_message, validate_pr_message, CommitMessage, CommitPolicy, PrMessage,
    PrTemplate, ValidationResult,
};

const RETRY_TEMPERATURE_CAP: f32 = 0.1;

// body allowance thresholds for the `auto` policy
const BODY_FILES_THRESHOLD: usize = 4;
const BODY_LINES_THRESHOLD: usize = 150;

/// repository facts gathered once per generation and passed in, keeping the
/// orchestrator free of git calls
#[derive(Debug, Clone, Default)]
pub struct RepoContext {
    pub branch: Option<String>,
    pub recent_subjects: Vec<String>,
    pub merge: MergeHeads,
}

/// decide whether a body may appear at all this run
pub fn body_allowed_for(
    policy: IncludeBody,
    diff: &ProcessedDiff,
    user_context: Option<&str>,
) -> bool {
    match policy {
        IncludeBody::Always => true,
        IncludeBody::Never => false,
        IncludeBody::Auto => {
            diff.stats.files_changed >= BODY_FILES_THRESHOLD
                || diff.stats.additions + diff.stats.deletions >= BODY_LINES_THRESHOLD
                || user_context.is_some()
        }
    }
}

lazy_static! {
    static ref SCOPED_TITLE_RE: Regex =
        Regex::new(r"^([a-z]+)\(([A-Za-z0-9 _-]+)\)(!?): (.*)$").unwrap();
    static ref META_LINE_RE: Regex =
        Regex::new(r"(?i)^(commit message|generated commit|here'?s\b|note:|explanation:)").unwrap();
}

fn kebab_scope(scope: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in scope.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == ' ' || c == '_' {
            if !out.ends_with('-') {
                out.push('-');
            }
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    out.trim_matches('-').to_string()
}

fn strip_markdown(line: &str) -> String {
    line.trim()
        .trim_start_matches('#')
        .trim()
        .trim_matches('`')
        .trim_matches('*')
        .trim_matches('_')
        .trim_matches('"')
        .to_string()
}

/// turn a raw model response into a `{title, body}` candidate: markdown
/// artifacts stripped, bullets normalized, scope kebab-cased, title split
/// from body on the first blank line
pub fn parse_model_response(raw: &str) -> CommitMessage {
    let mut lines: Vec<String> = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || META_LINE_RE.is_match(trimmed) {
            continue;
        }
        // normalize bullet markers before markdown stripping can eat them
        let bullet = trimmed
            .strip_prefix("- ")
            .or_else(|| trimmed.strip_prefix("* "))
            .or_else(|| trimmed.strip_prefix("\u{2022} "));
        match bullet {
            Some(content) => lines.push(format!("- {}", strip_markdown(content))),
            None => lines.push(strip_markdown(line)),
        }
    }

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    if lines.is_empty() {
        return CommitMessage::subject_only("");
    }

    let mut title = lines.remove(0);
    if let Some(caps) = SCOPED_TITLE_RE.captures(&title) {
        title = format!(
            "{}({}){}: {}",
            &caps[1],
            kebab_scope(&caps[2]),
            &caps[3],
            &caps[4]
        );
    }

    while lines.first().is_some_and(|l| l.is_empty()) {
        lines.remove(0);
    }
    let body = if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    };

    CommitMessage { title, body }
}

enum Attempt {
    Accepted(CommitMessage),
    Rejected {
        candidate: CommitMessage,
        result: ValidationResult,
    },
}

/// coordinates prompt building, the model call, validation, local repair and
/// the single retry; constructed per process, stateless across requests
pub struct Generator<'a> {
    client: &'a dyn CompletionClient,
    config: &'a Config,
}

impl<'a> Generator<'a> {
    pub fn new(client: &'a dyn CompletionClient, config: &'a Config) -> Self {
        Generator { client, config }
    }

    fn commit_request(&self, system: &str, user: String, model: String, temperature: f32) -> CompletionRequest {
        CompletionRequest {
            model,
            messages: vec![ChatMessage::system(system), ChatMessage::user(user)],
            max_tokens: self.config.max_tokens,
            temperature,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
        }
    }

    fn retry_model(&self) -> String {
        if self.config.is_mini_model() {
            self.config.retry_model.clone()
        } else {
            self.config.model.clone()
        }
    }

    /// validate, rescue subject-only, then try deterministic repair
    fn settle_candidate(
        &self,
        raw: &str,
        diff: &ProcessedDiff,
        classification: &Classification,
        scope_hint: Option<&str>,
        body_allowed: bool,
    ) -> Attempt {
        let candidate = parse_model_response(raw);
        let policy = CommitPolicy {
            max_title_length: self.config.max_title_length,
            body_allowed,
            classification,
        };

        let result = validate_commit_message(&candidate, &policy);
        if result.valid {
            return Attempt::Accepted(candidate);
        }

        // bodies are optional, so a body-only failure is fixable by omission
        if candidate.body.is_some() {
            let subject_only = CommitMessage::subject_only(candidate.title.clone());
            if validate_commit_message(&subject_only, &policy).valid {
                return Attempt::Accepted(subject_only);
            }
        }

        if let Some(repaired) =
            repair_docs(&candidate, classification, self.config.max_title_length)
        {
            return Attempt::Accepted(repaired);
        }
        if let Some(repaired) = repair(
            &candidate,
            diff,
            classification,
            scope_hint,
            self.config.max_title_length,
            self.config.enable_behavior_templates,
        ) {
            return Attempt::Accepted(repaired);
        }

        Attempt::Rejected { candidate, result }
    }

    /// the commit state machine: BUILD_PROMPT -> CALL_MODEL -> PARSE ->
    /// VALIDATE -> {ACCEPT | LOCAL_REPAIR | RETRY_MODEL | FALLBACK}
    pub async fn generate_commit_message(
        &self,
        diff: &ProcessedDiff,
        classification: &Classification,
        repo: &RepoContext,
        user_context: Option<&str>,
    ) -> Result<CommitMessage> {
        let body_allowed = body_allowed_for(self.config.include_body, diff, user_context);
        let paths: Vec<String> = diff
            .signals
            .name_status
            .iter()
            .map(|e| e.path.clone())
            .collect();
        let scope_hint = ScopeInferrer::from_config(&self.config.scope_rules).infer(&paths);

        let ctx = CommitPromptContext {
            diff,
            classification,
            scope_hint: scope_hint.as_deref(),
            branch: repo.branch.as_deref(),
            recent_subjects: &repo.recent_subjects,
            merge: &repo.merge,
            user_context,
            body_allowed,
            max_title_length: self.config.max_title_length,
        };
        let base_prompt = build_commit_prompt(&ctx);
        let system = commit_system_prompt(body_allowed);

        let first = self
            .client
            .complete(self.commit_request(
                system,
                base_prompt.clone(),
                self.config.model.clone(),
                self.config.temperature,
            ))
            .await
            .context("model call failed")?;
        if first.content.trim().is_empty() {
            anyhow::bail!("model returned an empty completion");
        }

        let rejected = match self.settle_candidate(
            &first.content,
            diff,
            classification,
            scope_hint.as_deref(),
            body_allowed,
        ) {
            Attempt::Accepted(msg) => return Ok(msg),
            Attempt::Rejected { candidate, result } => (candidate, result),
        };
        let (first_candidate, first_result) = rejected;

        // style-only residue is a surface problem; a second model call cannot
        // say anything repair did not already try
        if !first_result.has_structural_errors() {
            return Ok(build_fallback(
                Some(&first_candidate.title),
                classification,
                scope_hint.as_deref(),
                self.config.max_title_length,
            ));
        }

        let retry_prompt =
            build_repair_prompt(&base_prompt, &first.content, &first_result.errors);
        let retry = self
            .client
            .complete(self.commit_request(
                system,
                retry_prompt,
                self.retry_model(),
                self.config.temperature.min(RETRY_TEMPERATURE_CAP),
            ))
            .await;

        let fallback = |title: Option<&str>| {
            build_fallback(
                title,
                classification,
                scope_hint.as_deref(),
                self.config.max_title_length,
            )
        };

        let retry = match retry {
            Ok(completion) => completion,
            Err(_) => return Ok(fallback(Some(&first_candidate.title))),
        };
        if retry.content.trim().is_empty() || !retry.finished_cleanly() {
            return Ok(fallback(Some(&first_candidate.title)));
        }

        match self.settle_candidate(
            &retry.content,
            diff,
            classification,
            scope_hint.as_deref(),
            body_allowed,
        ) {
            Attempt::Accepted(msg) => Ok(msg),
            Attempt::Rejected { candidate, .. } => Ok(fallback(Some(&candidate.title))),
        }
    }

    fn parse_pr_response(raw: &str) -> PrMessage {
        let mut lines: Vec<&str> = raw
            .lines()
            .filter(|l| !l.trim().starts_with("```"))
            .collect();
        while lines.first().is_some_and(|l| l.trim().is_empty()) {
            lines.remove(0);
        }
        let title = lines.first().copied().map(strip_markdown).unwrap_or_default();
        let body = if lines.len() > 1 {
            lines[1..].join("\n").trim().to_string()
        } else {
            String::new()
        };
        PrMessage { title, body }
    }

    fn pr_request(&self, template: PrTemplate, prompt: String, temperature: f32) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(pr_system_prompt(template)),
                ChatMessage::user(prompt),
            ],
            max_tokens: self.config.max_tokens.max(800),
            temperature,
            top_p: self.config.top_p,
            frequency_penalty: self.config.frequency_penalty,
            presence_penalty: self.config.presence_penalty,
        }
    }

    /// the PR variant of the state machine. on total failure the first,
    /// unrepaired attempt is returned: a synthesized PR description would
    /// fabricate claims, so best-effort text beats a canned substitute.
    pub async fn generate_pr_message(
        &self,
        diff: &ProcessedDiff,
        template: PrTemplate,
        repo: &RepoContext,
        user_context: Option<&str>,
    ) -> Result<PrMessage> {
        let ctx = PrPromptContext {
            diff,
            template,
            branch: repo.branch.as_deref(),
            user_context,
        };
        let prompt = build_pr_prompt(&ctx);

        let first = self
            .client
            .complete(self.pr_request(template, prompt.clone(), self.config.temperature))
            .await
            .context("model call failed")?;
        if first.content.trim().is_empty() {
            anyhow::bail!("model returned an empty completion");
        }

        let first_msg = Self::parse_pr_response(&first.content);
        let first_result = validate_pr_message(&first_msg, template);
        if first_result.valid {
            return Ok(first_msg);
        }

        let grouped_violation = first_result.errors.iter().any(|e| e.contains("grouped"));
        let (retry_template, retry_prompt) = if grouped_violation {
            // the model could not produce sane groups; ask for the flat shape
            let ctx = PrPromptContext {
                diff,
                template: PrTemplate::Default,
                branch: repo.branch.as_deref(),
                user_context,
            };
            (PrTemplate::Default, build_pr_prompt(&ctx))
        } else {
            (
                template,
                build_repair_prompt(&prompt, &first.content, &first_result.errors),
            )
        };

        let retry = self
            .client
            .complete(self.pr_request(
                retry_template,
                retry_prompt,
                self.config.temperature.min(RETRY_TEMPERATURE_CAP),
            ))
            .await;

        if let Ok(completion) = retry {
            if !completion.content.trim().is_empty() && completion.finished_cleanly() {
                let retry_msg = Self::parse_pr_response(&completion.content);
                if validate_pr_message(&retry_msg, retry_template).valid {
                    return Ok(retry_msg);
                }
            }
        }

        Ok(first_msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::api::{Completion, FinishReason};
    use crate::diff::{process_diff, FileStatus, NameStatusEntry, NumStatEntry};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedClient {
        responses: Mutex<Vec<Completion>>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<&str>) -> Self {
            ScriptedClient {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|content| Completion {
                            content: content.to_string(),
                            finish_reason: FinishReason::Stop,
                        })
                        .collect(),
                ),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_completions(responses: Vec<Completion>) -> Self {
            ScriptedClient {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn call(&self, index: usize) -> CompletionRequest {
            self.calls.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
            self.calls.lock().unwrap().push(request);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("scripted client exhausted");
            }
            Ok(responses.remove(0))
        }
    }

    fn diff_for(paths: &[(&str, usize, usize)]) -> ProcessedDiff {
        let name_status = paths
            .iter()
            .map(|(p, _, _)| NameStatusEntry {
                status: FileStatus::Modified,
                path: p.to_string(),
                old_path: None,
            })
            .collect();
        let num_stat = paths
            .iter()
            .map(|(p, i, d)| NumStatEntry {
                insertions: *i,
                deletions: *d,
                path: p.to_string(),
                old_path: None,
            })
            .collect();
        process_diff("", name_status, num_stat, false, false)
    }

    fn classification_for(diff: &ProcessedDiff) -> Classification {
        crate::classify::classify(diff)
    }

    #[tokio::test]
    async fn test_happy_path_repairs_internal_feat_without_second_call() {
        // scenario: one service file changed, model picks feat, validator
        // rejects it for an internal change, repair rewrites the type locally
        let diff = diff_for(&[("src/services/Foo.ts", 30, 2)]);
        let cls = classification_for(&diff);
        assert!(cls.is_internal_change);

        let client = ScriptedClient::new(vec!["feat(services): add retry logic"]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await
            .unwrap();

        assert_eq!(msg.title, "refactor(services): add retry logic");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_docs_only_change_is_forced_to_docs_type() {
        let diff = diff_for(&[("README.md", 5, 1)]);
        let cls = classification_for(&diff);
        assert!(cls.is_docs_only);

        let client = ScriptedClient::new(vec!["chore: describe the install steps"]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await
            .unwrap();

        assert_eq!(msg.title, "docs(readme): describe the install steps");
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_oversized_subject_is_truncated_locally() {
        let diff = diff_for(&[("src/api/client.rs", 20, 5)]);
        let cls = classification_for(&diff);

        let long = "feat(api): add exponential backoff with jitter and a retry budget so that throttled endpoints recover";
        assert!(long.chars().count() > 72);
        let client = ScriptedClient::new(vec![long]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await
            .unwrap();

        assert!(msg.title.chars().count() <= 72);
        assert!(crate::ai::validation::subject_matches_grammar(&msg.title));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_structural_failure_escalates_then_falls_back() {
        let diff = diff_for(&[("src/api/client.rs", 20, 5)]);
        let cls = classification_for(&diff);

        let client = ScriptedClient::new(vec![
            "this is not a commit message at all",
            "still not a commit message",
        ]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await
            .unwrap();

        assert_eq!(client.call_count(), 2);
        // escalated off the mini tier at clamped temperature
        let retry_request = client.call(1);
        assert_eq!(retry_request.model, config.retry_model);
        assert!(retry_request.temperature <= RETRY_TEMPERATURE_CAP);
        assert!(retry_request.messages[1].content.contains("VIOLATIONS"));

        // scope hint 'api' matched the touched path, so the fallback carries it
        assert_eq!(msg.title, "refactor(api): align commit flow");
    }

    #[tokio::test]
    async fn test_fallback_literal_when_nothing_matches() {
        let diff = diff_for(&[("notes.xyz", 2, 0)]);
        let cls = classification_for(&diff);

        let client = ScriptedClient::new(vec!["garbage", "more garbage"]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await
            .unwrap();
        assert_eq!(msg.title, crate::ai::repair::FALLBACK_SUBJECT);
    }

    #[tokio::test]
    async fn test_truncated_retry_falls_back() {
        let diff = diff_for(&[("src/api/client.rs", 20, 5)]);
        let cls = classification_for(&diff);

        let client = ScriptedClient::with_completions(vec![
            Completion {
                content: "nonsense with no grammar".to_string(),
                finish_reason: FinishReason::Stop,
            },
            Completion {
                content: "feat(api): add retry".to_string(),
                finish_reason: FinishReason::Truncated,
            },
        ]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await
            .unwrap();
        // the truncated retry is distrusted even though its text validates
        assert_eq!(msg.title, "refactor(api): align commit flow");
    }

    #[tokio::test]
    async fn test_empty_first_completion_is_an_error() {
        let diff = diff_for(&[("src/api/client.rs", 20, 5)]);
        let cls = classification_for(&diff);
        let client = ScriptedClient::new(vec!["   "]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let result = generator
            .generate_commit_message(&diff, &cls, &RepoContext::default(), None)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_body_allowed_auto_policy() {
        let small = diff_for(&[("src/a.rs", 10, 5)]);
        assert!(!body_allowed_for(IncludeBody::Auto, &small, None));
        assert!(body_allowed_for(IncludeBody::Auto, &small, Some("context")));

        let many_files = diff_for(&[
            ("src/a.rs", 1, 1),
            ("src/b.rs", 1, 1),
            ("src/c.rs", 1, 1),
            ("src/d.rs", 1, 1),
        ]);
        assert!(body_allowed_for(IncludeBody::Auto, &many_files, None));

        let big = diff_for(&[("src/a.rs", 160, 10)]);
        assert!(body_allowed_for(IncludeBody::Auto, &big, None));
        assert!(!body_allowed_for(IncludeBody::Never, &big, None));
        assert!(body_allowed_for(IncludeBody::Always, &small, None));
    }

    #[test]
    fn test_parse_model_response_cleans_artifacts() {
        let raw = "Here's the commit message:\n```\n**feat(ApiClient): add retry**\n\n* first bullet\n* second bullet\n```\n";
        let msg = parse_model_response(raw);
        assert_eq!(msg.title, "feat(api-client): add retry");
        assert_eq!(
            msg.body.as_deref(),
            Some("- first bullet\n- second bullet")
        );
    }

    #[tokio::test]
    async fn test_pr_grouped_rejection_retries_with_default_template() {
        let diff = diff_for(&[("src/api/client.rs", 40, 10)]);

        let grouped_attempt = [
            "refactor(api): split retry policy from transport",
            "",
            "### Summary",
            "Retry policy now lives apart from the transport.",
            "",
            "### Services",
            "- retry policy owns the backoff schedule",
            "",
            "### QA Focus",
            "- Throttled request path: retries stop after three attempts",
            "- the counter resets after a success",
        ]
        .join("\n");
        let default_attempt = [
            "refactor(api): split retry policy from transport",
            "",
            "### Summary",
            "Retry policy now lives apart from the transport.",
            "",
            "### Changes",
            "- move the backoff schedule into the retry policy",
            "- transport no longer retries on its own",
            "",
            "### QA Focus",
            "- Throttled request path: retries stop after three attempts",
            "- the counter resets after a success",
        ]
        .join("\n");

        let client = ScriptedClient::new(vec![grouped_attempt.as_str(), default_attempt.as_str()]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_pr_message(&diff, PrTemplate::Grouped, &RepoContext::default(), None)
            .await
            .unwrap();

        assert_eq!(client.call_count(), 2);
        assert!(client.call(1).messages[1].content.contains("### Changes"));
        assert!(msg.body.contains("### Changes"));
    }

    #[tokio::test]
    async fn test_pr_total_failure_returns_first_attempt() {
        let diff = diff_for(&[("src/api/client.rs", 40, 10)]);
        let client = ScriptedClient::new(vec!["not a pr at all", "still not a pr"]);
        let config = Config::default();
        let generator = Generator::new(&client, &config);
        let msg = generator
            .generate_pr_message(&diff, PrTemplate::Default, &RepoContext::default(), None)
            .await
            .unwrap();
        assert_eq!(client.call_count(), 2);
        // best-effort: the unrepaired first attempt comes back verbatim
        assert_eq!(msg.title, "not a pr at all");
    }
}

// diffscribe-core - policy-checked generation of commit messages, branch
// names and pr descriptions from the staged change-set

pub mod ai;
pub mod classify;
pub mod config;
pub mod diff;
pub mod git;
pub mod noise;
pub mod utils;

// re-export key items for the cli crate
pub use anyhow::{Context, Result};
pub use clap::{Parser, Subcommand};
pub use console::style;
pub use dotenv::dotenv;

pub use crate::ai::{
    branch_name_from_subject, CommitMessage, CommitPolicy, Generator, OpenRouterClient,
    PrTemplate, RepoContext,
};
pub use crate::classify::{classify, Classification};
pub use crate::config::{load_config, Config, IncludeBody};
pub use crate::diff::{process_diff, ProcessedDiff};
pub use crate::utils::check_openrouter_api_key;

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// argument surface shared by the cli wrapper
#[derive(Parser, Debug, Clone)]
#[command(
    name = "diffscribe",
    about = "policy-checked ai commit, branch and pr message generation"
)]
pub struct CoreCliArgs {
    /// path to git repository (defaults to current directory)
    #[arg(short, long)]
    pub path: Option<String>,

    /// free-text context forwarded to the model
    #[arg(short, long)]
    pub context: Option<String>,

    /// stage all pending changes before reading the diff
    #[arg(short = 'a', long)]
    pub stage_all: bool,

    /// automatically commit when the generated message is valid
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// show signal-extraction details
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<CoreCommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CoreCommand {
    /// generate a commit message for the staged changes (the default)
    Commit,
    /// generate a pull-request title and description
    Pr {
        /// template: default, grouped or subtle-bug
        #[arg(short, long, default_value = "default")]
        template: String,
    },
    /// derive a branch name from the staged changes
    Branch {
        /// create and switch to the branch instead of only printing it
        #[arg(long)]
        create: bool,
    },
}

fn analysis_spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// one fresh read of the staged change-set, compressed into signals
pub fn read_processed_diff(repo_path: &str, config: &Config) -> Result<ProcessedDiff> {
    let raw = git::get_staged_diff(repo_path)?;
    let name_status = git::get_staged_name_status(repo_path)?;
    let num_stat = git::get_staged_num_stat(repo_path)?;
    let merge = git::get_merge_heads(repo_path)?;
    let is_merge = merge.source.is_some() || merge.target.is_some();

    // snippets come from a focused per-path patch rather than the full diff
    let selected = diff::top_files(&num_stat, &name_status, diff::TOP_FILES_LIMIT);
    let focused = if selected.is_empty() {
        None
    } else {
        Some(git::get_staged_patch_for_paths(repo_path, &selected)?)
    };

    Ok(diff::process_diff_with_snippet_source(
        &raw,
        focused.as_deref(),
        name_status,
        num_stat,
        is_merge,
        config.is_mini_model(),
    ))
}

fn build_repo_context(repo_path: &str) -> Result<RepoContext> {
    Ok(RepoContext {
        branch: git::get_branch_name(repo_path)?,
        recent_subjects: git::get_recent_commit_subjects(repo_path, 10)?,
        merge: git::get_merge_heads(repo_path)?,
    })
}

fn preflight(args: &CoreCliArgs) -> Result<(String, Config)> {
    let repo_path = args.path.clone().unwrap_or_else(|| ".".to_string());
    dotenv().ok();
    check_openrouter_api_key()?;
    let config = load_config();

    if args.stage_all {
        git::stage_all(&repo_path)?;
    }
    if !git::has_staged_changes(&repo_path)? {
        anyhow::bail!("no staged changes found; stage files first or pass --stage-all");
    }
    Ok((repo_path, config))
}

fn print_signal_details(diff: &ProcessedDiff) {
    println!(
        "{}",
        style(format!(
            "{} files, +{} -{} lines, {} snippets{}",
            diff.stats.files_changed,
            diff.stats.additions,
            diff.stats.deletions,
            diff.signals.patch_snippets.len(),
            if diff.stats.was_summarized {
                " (summarized)"
            } else {
                ""
            }
        ))
        .dim()
    );
    for path in &diff.signals.top_files {
        println!("{}", style(format!("  - {path}")).dim());
    }
}

/// generate a commit message for the staged changes and, interactively or via
/// --yes, commit it; returns the final message and whether it was committed
pub async fn execute_commit_flow(args: CoreCliArgs) -> Result<(String, bool)> {
    let (repo_path, config) = preflight(&args)?;

    let spinner = analysis_spinner("analysing staged changes...");
    let diff = read_processed_diff(&repo_path, &config)?;
    let classification = classify(&diff);
    let repo_ctx = build_repo_context(&repo_path)?;
    spinner.finish_and_clear();

    if args.verbose {
        print_signal_details(&diff);
    }

    let client = OpenRouterClient::from_env()?;
    let generator = Generator::new(&client, &config);

    let spinner = analysis_spinner("generating commit message...");
    let mut message = generator
        .generate_commit_message(&diff, &classification, &repo_ctx, args.context.as_deref())
        .await
        .context("failed to generate commit message")?;
    spinner.finish_and_clear();

    println!("\n{}\n", style("generated commit message:").green().bold());
    println!("{}\n", style(message.full_text()).yellow());

    let interactive = !args.yes && atty::is(atty::Stream::Stdin);
    let mut should_commit = args.yes;

    if interactive {
        println!("{}", style("press ctrl+c at any time to exit").dim());
        loop {
            let options = &[
                "yes, commit this message",
                "edit this message",
                "no, regenerate message",
            ];
            let selection = dialoguer::Select::with_theme(&dialoguer::theme::ColorfulTheme::default())
                .with_prompt("what would you like to do?")
                .default(0)
                .items(options)
                .interact()?;

            match selection {
                0 => {
                    should_commit = true;
                    break;
                }
                1 => {
                    if let Some(edited) = open_editor_for_message(&message.full_text())? {
                        message = split_edited_message(&edited);
                        warn_if_invalid(&message, &classification, &config, &diff, &args);
                        println!("{}", style("commit message updated").green());
                    } else {
                        println!("{}", style("edit cancelled, keeping previous message").yellow());
                    }
                    println!("\n{}", style("current commit message:").cyan().bold());
                    println!("{}\n", style(message.full_text()).yellow());
                }
                2 => {
                    let spinner = analysis_spinner("regenerating...");
                    message = generator
                        .generate_commit_message(
                            &diff,
                            &classification,
                            &repo_ctx,
                            args.context.as_deref(),
                        )
                        .await
                        .context("failed to regenerate commit message")?;
                    spinner.finish_and_clear();
                    println!("\n{}", style("current commit message:").cyan().bold());
                    println!("{}\n", style(message.full_text()).yellow());
                }
                _ => unreachable!(),
            }
        }
    }

    let mut committed = false;
    if should_commit {
        git::commit(&repo_path, &message.full_text())?;
        println!("{}", style("commit successful").green().bold());
        committed = true;
    }

    Ok((message.full_text(), committed))
}

fn warn_if_invalid(
    message: &CommitMessage,
    classification: &Classification,
    config: &Config,
    diff: &ProcessedDiff,
    args: &CoreCliArgs,
) {
    let body_allowed =
        ai::body_allowed_for(config.include_body, diff, args.context.as_deref());
    let policy = CommitPolicy {
        max_title_length: config.max_title_length,
        body_allowed,
        classification,
    };
    let result = ai::validate_commit_message(message, &policy);
    if !result.valid {
        println!(
            "{}",
            style("warning: edited message no longer satisfies the commit policy:").yellow()
        );
        for error in &result.errors {
            println!("{}", style(format!("  - {error}")).yellow());
        }
    }
}

fn split_edited_message(edited: &str) -> CommitMessage {
    let mut parts = edited.splitn(2, "\n\n");
    let title = parts.next().unwrap_or("").trim().to_string();
    let body = parts
        .next()
        .map(|b| b.trim().to_string())
        .filter(|b| !b.is_empty());
    CommitMessage { title, body }
}

fn parse_pr_template(name: &str) -> Result<PrTemplate> {
    match name.to_lowercase().replace('_', "-").as_str() {
        "default" => Ok(PrTemplate::Default),
        "grouped" => Ok(PrTemplate::Grouped),
        "subtle-bug" => Ok(PrTemplate::SubtleBug),
        other => anyhow::bail!("unknown pr template '{other}'; use default, grouped or subtle-bug"),
    }
}

/// generate and print a pull-request title and description
pub async fn execute_pr_flow(args: CoreCliArgs, template: &str) -> Result<String> {
    let template = parse_pr_template(template)?;
    let (repo_path, config) = preflight(&args)?;

    let spinner = analysis_spinner("analysing staged changes...");
    let diff = read_processed_diff(&repo_path, &config)?;
    let repo_ctx = build_repo_context(&repo_path)?;
    spinner.finish_and_clear();

    if args.verbose {
        print_signal_details(&diff);
    }

    let client = OpenRouterClient::from_env()?;
    let generator = Generator::new(&client, &config);

    let spinner = analysis_spinner("generating pr description...");
    let message = generator
        .generate_pr_message(&diff, template, &repo_ctx, args.context.as_deref())
        .await
        .context("failed to generate pr description")?;
    spinner.finish_and_clear();

    println!("\n{}\n", style("generated pr description:").green().bold());
    println!("{}", style(&message.title).yellow().bold());
    println!("\n{}\n", message.body);

    Ok(format!("{}\n\n{}", message.title, message.body))
}

/// derive a branch name from a freshly generated commit subject
pub async fn execute_branch_flow(args: CoreCliArgs, create: bool) -> Result<String> {
    let (repo_path, config) = preflight(&args)?;

    let spinner = analysis_spinner("analysing staged changes...");
    let diff = read_processed_diff(&repo_path, &config)?;
    let classification = classify(&diff);
    let repo_ctx = build_repo_context(&repo_path)?;
    spinner.finish_and_clear();

    let client = OpenRouterClient::from_env()?;
    let generator = Generator::new(&client, &config);

    let spinner = analysis_spinner("deriving branch name...");
    let message = generator
        .generate_commit_message(&diff, &classification, &repo_ctx, args.context.as_deref())
        .await
        .context("failed to generate the subject behind the branch name")?;
    spinner.finish_and_clear();

    let name = branch_name_from_subject(&message.title, ai::branch::MAX_BRANCH_LENGTH)
        .context("generated subject did not yield a usable branch name")?;

    println!("\n{} {}", style("branch name:").green().bold(), style(&name).yellow());
    if create {
        git::create_branch(&repo_path, &name)?;
        println!("{}", style("branch created").green());
    }
    Ok(name)
}

/// open $VISUAL/$EDITOR (or the first available fallback) on the message
fn open_editor_for_message(current_message: &str) -> Result<Option<String>> {
    use std::io::Write;

    let millis = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_millis();
    let tmp_path = std::env::temp_dir().join(format!("diffscribe-{millis}.txt"));

    {
        let mut file = std::fs::File::create(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        file.write_all(current_message.as_bytes())
            .context("failed to write message for editing")?;
    }

    // the dialoguer prompt may have left the terminal in raw mode
    let _ = crossterm::terminal::disable_raw_mode();

    let editor = std::env::var("VISUAL")
        .or_else(|_| std::env::var("EDITOR"))
        .unwrap_or_else(|_| {
            let candidates = ["nvim", "vim", "vi", "nano"];
            candidates
                .iter()
                .find(|cand| which::which(cand).is_ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| "nano".to_string())
        });

    let mut editor_parts = editor.split_whitespace();
    let editor_executable = editor_parts.next().unwrap_or(editor.as_str());
    let editor_args: Vec<&str> = editor_parts.collect();

    let status = std::process::Command::new(editor_executable)
        .args(&editor_args)
        .arg(&tmp_path)
        .stdin(std::process::Stdio::inherit())
        .stdout(std::process::Stdio::inherit())
        .stderr(std::process::Stdio::inherit())
        .status()
        .with_context(|| format!("failed to execute editor '{editor}'"))?;

    if !status.success() {
        let _ = std::fs::remove_file(&tmp_path);
        return Ok(None);
    }

    let edited = std::fs::read_to_string(&tmp_path)
        .with_context(|| format!("failed to read {}", tmp_path.display()))?;
    let _ = std::fs::remove_file(&tmp_path);

    if edited.trim_end() != current_message.trim_end() {
        Ok(Some(edited.trim_end().to_string()))
    } else {
        Ok(None)
    }
}

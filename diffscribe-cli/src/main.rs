use clap::Parser;
use diffscribe_core::{
    execute_branch_flow, execute_commit_flow, execute_pr_flow, style, CoreCliArgs, CoreCommand,
};

#[tokio::main]
async fn main() {
    let args = CoreCliArgs::parse();

    let outcome = match args.command.clone() {
        None | Some(CoreCommand::Commit) => {
            match execute_commit_flow(args).await {
                Ok((message, committed)) => {
                    if !committed && !message.is_empty() {
                        println!("{}", style("run this command to commit:").cyan());
                        let git_command =
                            format!("git commit -m \"{}\"", message.replace('"', "\\\""));
                        println!("{}\n", style(git_command).yellow().bold());
                    }
                    Ok(())
                }
                Err(e) => Err(e),
            }
        }
        Some(CoreCommand::Pr { template }) => {
            execute_pr_flow(args, &template).await.map(|_| ())
        }
        Some(CoreCommand::Branch { create }) => {
            execute_branch_flow(args, create).await.map(|_| ())
        }
    };

    if let Err(e) = outcome {
        eprintln!(
            "{} {}",
            style("diffscribe failed:").red().bold(),
            style(&e).red()
        );
        std::process::exit(1);
    }
}

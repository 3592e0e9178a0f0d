use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use quorum::agent::SharedAgent;
use quorum::coder::{enhance_prompt, Coder, QueryOptions};
use quorum::config::Config;
use quorum::context::{build_context, DEFAULT_MAX_FILES};
use quorum::dispatch::Dispatcher;
use quorum::summary;
use quorum::workspace::Workspace;
use quorum::{qlog, Error, Result};

/// Quorum - ask several AI coding agents at once and keep the answer they agree is best
#[derive(Parser, Debug)]
#[command(name = "quorum")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    QUORUM_DEBUG=1     Enable debug logging (alternative to --debug)\n    QUORUM_LOG=<level> Set the log level explicitly")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.quorum/quorum.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Send a coding task to every agent and rank the answers
    Ask {
        /// The task description in natural language
        prompt: String,

        /// Only ask these agents (comma separated)
        #[arg(long, value_delimiter = ',')]
        agents: Option<Vec<String>>,

        /// Skip clarifying questions
        #[arg(long)]
        no_enhance: bool,

        /// Send a listing of the current directory as context
        #[arg(long)]
        context: bool,

        /// Apply the solution with this rank to the current directory
        #[arg(long, value_name = "RANK")]
        apply: Option<usize>,

        /// Show what would change without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip questions and confirmation prompts
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// List the configured or detected agents
    Agents,

    /// Manage file snapshots taken before applying changes
    Backups {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum BackupAction {
    /// List snapshots, newest first
    List,

    /// Restore a snapshot
    Restore {
        /// Backup id (see `quorum backups list`)
        id: String,

        /// Only restore these paths
        paths: Vec<PathBuf>,
    },

    /// Delete all but the newest snapshots
    Prune {
        /// How many snapshots to keep (defaults to the configured value)
        #[arg(long)]
        keep: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct AskArgs {
    prompt: String,
    agents: Option<Vec<String>>,
    no_enhance: bool,
    context: bool,
    apply: Option<usize>,
    dry_run: bool,
    yes: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    quorum::log::init(cli.debug);
    qlog!("quorum starting: {:?}", cli.command);

    if let Err(e) = run(cli.command).await {
        quorum::qlog_error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run(command: Command) -> Result<()> {
    let config = Config::load()?;
    match command {
        Command::Ask {
            prompt,
            agents,
            no_enhance,
            context,
            apply,
            dry_run,
            yes,
        } => {
            run_ask(
                &config,
                AskArgs {
                    prompt,
                    agents,
                    no_enhance,
                    context,
                    apply,
                    dry_run,
                    yes,
                },
            )
            .await
        }
        Command::Agents => run_agents(&config),
        Command::Backups { action } => run_backups(&config, action).await,
    }
}

fn resolve_agents(config: &Config) -> Result<Vec<SharedAgent>> {
    let agents = config.build_agents();
    if agents.is_empty() {
        return Err(Error::NoAgents);
    }
    Ok(agents)
}

fn workspace(config: &Config) -> Result<Workspace> {
    let root = std::env::current_dir()?;
    let backup_root = config.backup_root(&root);
    Ok(Workspace::new(root, backup_root).with_retention(config.keep_backups))
}

async fn run_ask(config: &Config, args: AskArgs) -> Result<()> {
    let dispatcher =
        Dispatcher::new(resolve_agents(config)?).with_timeout(config.request_timeout());
    let coder = Coder::from_dispatcher(dispatcher)
        .with_eval_timeout(config.evaluation_timeout())
        .with_max_questions(config.max_questions);

    println!("Agents: {}", coder.agent_names().join(", "));

    let prompt = if args.no_enhance || args.yes || config.max_questions == 0 {
        args.prompt.clone()
    } else {
        let questions = coder.clarifying_questions(&args.prompt).await;
        let answers = ask_questions(&questions)?;
        enhance_prompt(&args.prompt, &questions, &answers)
    };

    let context = if args.context {
        Some(build_context(&std::env::current_dir()?, DEFAULT_MAX_FILES)?)
    } else {
        None
    };

    println!("\nAsking {} agent(s)...", coder.agent_names().len());
    let result = coder
        .query(
            &prompt,
            QueryOptions {
                context,
                skip_enhancement: true,
                answers: Vec::new(),
                agents: args.agents.clone(),
            },
        )
        .await?;

    println!("\n{}", summary::evaluation_summary(&result.results));
    println!(
        "Finished in {:.1}s ({} failed)",
        result.elapsed.as_secs_f64(),
        result.failed_count()
    );

    let Some(rank) = args.apply else {
        let best = result.best()?;
        println!("\nBest solution ({}):\n\n{}", best.response.author.name, best.response.content);
        return Ok(());
    };

    let chosen = result
        .by_rank(rank)
        .ok_or_else(|| Error::Validation(format!("No solution with rank {}", rank)))?;
    if chosen.response.failed {
        return Err(Error::Validation(format!(
            "Solution #{} from {} failed and has nothing to apply",
            rank, chosen.response.author.name
        )));
    }

    let ws = workspace(config)?;
    println!("\n{}", summary::operations_summary(&ws.operations(&chosen.response)));
    let diffs = ws.preview(&chosen.response);
    if diffs.is_empty() {
        println!("\nNothing to apply.");
        return Ok(());
    }
    for diff in &diffs {
        println!("\n{}", summary::diff_detail(diff));
    }
    println!("\n{}", summary::diff_summary(&diffs));

    if !args.dry_run && !args.yes && !confirm("Apply these changes?")? {
        println!("Apply cancelled.");
        return Ok(());
    }

    let applied = ws.apply(diffs, args.dry_run).await?;
    let report = &applied.report;
    let verb = if args.dry_run { "Would apply" } else { "Applied" };
    println!("\n{} {} change(s)", verb, report.success.len());
    for path in &report.skipped {
        println!("  skipped: {}", path);
    }
    for failure in &report.failed {
        println!("  FAILED: {} ({})", failure.path, failure.error);
    }
    if let Some(id) = &applied.backup_id {
        println!("Backup: {} (undo with `quorum backups restore {}`)", id, id);
    }
    Ok(())
}

fn run_agents(config: &Config) -> Result<()> {
    let agents = config.build_agents();
    if agents.is_empty() {
        println!("No agents configured or detected.");
        println!("Install claude, gemini or codex, or add [[agents]] to ~/.quorum/quorum.toml");
        return Ok(());
    }
    let source = if config.agents.is_empty() {
        "detected"
    } else {
        "configured"
    };
    println!("{} agent(s) {}:", agents.len(), source);
    for agent in agents {
        let identity = agent.identity();
        println!("  {} ({})", identity.name, identity.kind);
    }
    Ok(())
}

async fn run_backups(config: &Config, action: BackupAction) -> Result<()> {
    let ws = workspace(config)?;
    match action {
        BackupAction::List => {
            println!("{}", summary::backup_list(&ws.backups().list_backups()?));
        }
        BackupAction::Restore { id, paths } => {
            let report = ws.restore(&id, paths).await?;
            println!("Restored {} file(s) from {}", report.restored.len(), id);
            for failure in &report.failed {
                println!("  FAILED: {} ({})", failure.path, failure.error);
            }
        }
        BackupAction::Prune { keep } => {
            let removed = ws.backups().prune_backups(keep.unwrap_or(config.keep_backups));
            println!("Removed {} backup(s)", removed);
        }
    }
    Ok(())
}

fn read_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn ask_questions(questions: &[String]) -> Result<Vec<String>> {
    if questions.is_empty() {
        return Ok(Vec::new());
    }
    println!("\nA few questions first (press Enter to skip):");
    questions
        .iter()
        .enumerate()
        .map(|(i, q)| read_line(&format!("  {}. {}\n     > ", i + 1, q)))
        .collect()
}

fn confirm(question: &str) -> Result<bool> {
    let input = read_line(&format!("{} [y/N] ", question))?.to_lowercase();
    Ok(input == "y" || input == "yes")
}

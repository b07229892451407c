use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ai_todo_helper::Result;
use ai_todo_helper::config::{self, ClientConfig};
use ai_todo_helper::gateway::{Api, HttpApi};
use ai_todo_helper::model::GoalId;
use ai_todo_helper::render;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Config file (defaults to ./todo-helper.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the backend base URL, e.g. http://127.0.0.1:8000/api
    #[arg(long, global = true)]
    api_base: Option<String>,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Terminal UI (goal form + goal list + action plan); the default
    Tui,
    /// Print every goal with its progress
    List,
    /// Print one goal's action plan
    Show {
        /// Goal id as listed by `todo list`
        id: i64,
    },
    /// Print the fully-resolved config (after extends, env and flags)
    Resolve,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = config::load(args.config.as_deref(), args.api_base.as_deref())?;
    ai_todo_helper::logging::init(&cfg.log)?;
    tracing::info!(api = %cfg.api.base_url, "starting");

    match args.cmd.unwrap_or(Command::Tui) {
        Command::Tui => ai_todo_helper::ui::run_tui(&cfg),
        Command::List => cmd_list(&cfg),
        Command::Show { id } => cmd_show(&cfg, GoalId(id)),
        Command::Resolve => cmd_resolve(&cfg),
    }
}

fn cmd_list(cfg: &ClientConfig) -> Result<()> {
    let api = HttpApi::new(&cfg.api)?;
    let goals = api.list_goals()?;
    if goals.is_empty() {
        println!("{}", render::NO_GOALS);
        return Ok(());
    }
    for goal in &goals {
        let percent = render::progress_percent(goal.completion);
        let filled = percent as usize / 5;
        println!(
            "{:>4}  [{}{}] {:>3}%  {}",
            goal.id.0,
            "#".repeat(filled),
            "-".repeat(20 - filled),
            percent,
            ai_todo_helper::sanitize::sanitize_line(&goal.title)
        );
    }
    Ok(())
}

fn cmd_show(cfg: &ClientConfig, id: GoalId) -> Result<()> {
    let api = HttpApi::new(&cfg.api)?;
    let goal = api.goal(id)?;
    let plan = render::render_plan(&goal);

    println!("{} ({}%)", plan.title, plan.percent);
    if let Some(empty) = &plan.empty {
        println!("{empty}");
    }
    for phase in &plan.phases {
        println!();
        println!("{}", phase.title);
        for task in &phase.tasks {
            let check = if task.checked { "x" } else { " " };
            println!("  [{check}] {:<40} {}  (task {})", task.title, task.due, task.task_id);
            if !task.description.is_empty() {
                println!("        {}", task.description);
            }
        }
    }
    Ok(())
}

fn cmd_resolve(cfg: &ClientConfig) -> Result<()> {
    // Best-effort pretty print of the resolved config.
    let s = toml::to_string_pretty(cfg).unwrap_or_else(|_| format!("{cfg:?}"));
    print!("{s}");
    Ok(())
}

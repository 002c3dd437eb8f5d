use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use condentis::agent::Agent;
use condentis::configuration::Settings;
use condentis::events::AgentEventType;
use console::{style, Term};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

mod renderer;

use renderer::Renderer;

const PROMPT: &str = "\x1b[1m\x1b[38;5;30m( O)> \x1b[0m";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Prompt to run. Without one, prompts are read from stdin line by line
    prompt: Option<String>,

    /// Model to use (can also be set via CONDENTIS_PROVIDER__MODEL)
    #[arg(short, long)]
    model: Option<String>,

    /// Directory tools resolve relative paths against
    #[arg(long)]
    cwd: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut settings = Settings::new().context("Failed to load settings")?;
    if let Some(model) = cli.model {
        settings.provider.model = model;
    }
    if let Some(cwd) = cli.cwd {
        settings.agent.cwd = Some(cwd);
    }

    tracing::debug!(
        "using model {} at {}",
        settings.provider.model,
        settings.provider.host
    );
    let mut agent = Agent::from_settings(&settings)?;
    let mut renderer = Renderer::new(Term::stdout());

    if let Some(prompt) = cli.prompt {
        if !run_turn(&mut agent, &mut renderer, &prompt).await? {
            std::process::exit(1);
        }
        return Ok(());
    }

    println!(
        "condentis {} {}",
        settings.provider.model,
        style("- type \"exit\" to end the session").dim()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{}", PROMPT);
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") {
            break;
        }

        run_turn(&mut agent, &mut renderer, line).await?;
        println!();
    }
    Ok(())
}

/// Render one turn; false when the agent reported an error.
async fn run_turn<W: Write>(
    agent: &mut Agent,
    renderer: &mut Renderer<W>,
    prompt: &str,
) -> Result<bool> {
    let mut ok = true;
    let mut events = agent.run(prompt);
    while let Some(event) = events.next().await {
        if event.kind == AgentEventType::AgentError {
            ok = false;
        }
        renderer.render(&event)?;
    }
    Ok(ok)
}

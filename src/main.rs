use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use waypoint_rs::engine::graph::new_thread_id;
use waypoint_rs::engine::{Engine, RunResult, RunStatus};
use waypoint_rs::waypoint::config::Settings;
use waypoint_rs::waypoint::server;
use waypoint_rs::waypoint::workflow::{Builder, StepRegistry, WorkflowLoader};
use waypoint_rs::waypoint::workflows;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to ./waypoint.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a built-in workflow, answering prompts interactively
    Run {
        /// outreach or collaboration
        #[arg(short, long)]
        workflow: String,

        /// Input to the workflow
        #[arg(short, long)]
        input: String,

        #[arg(short, long)]
        thread_id: Option<String>,
    },
    /// Answer one pending prompt of a checkpointed run
    Resume {
        #[arg(short, long)]
        workflow: String,

        #[arg(short, long)]
        thread_id: String,

        /// The answer; "cancel" ends the run
        #[arg(short, long)]
        input: String,
    },
    /// Run a workflow from a YAML file
    Workflow {
        /// Path to the workflow file
        #[arg(short, long)]
        file: String,

        /// Input to the workflow
        #[arg(short, long)]
        input: String,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = Settings::load(args.config.as_deref()).context("failed to load settings")?;

    match args.command {
        Commands::Run {
            workflow,
            input,
            thread_id,
        } => {
            let graph = workflows::build(&workflow, &settings)?;
            let engine = Arc::new(workflows::engine_for(&workflow, graph, &settings)?);
            println!("Running workflow: {}", workflow);
            interact(engine, &input, thread_id).await?;
        }
        Commands::Resume {
            workflow,
            thread_id,
            input,
        } => {
            if settings.checkpoint_dir.is_none() {
                bail!("resume needs a persistent store; set WAYPOINT_CHECKPOINT_DIR or checkpoint_dir");
            }
            let graph = workflows::build(&workflow, &settings)?;
            let engine = workflows::engine_for(&workflow, graph, &settings)?;
            let result = engine.resume(&input, &thread_id).await?;
            print_result(&result)?;
        }
        Commands::Workflow { file, input } => {
            let def = WorkflowLoader::new().load_workflow(&file)?;
            let builder = Builder::new(StepRegistry::with_builtins().await);
            let graph = builder.build(&def).await?;
            let engine = Arc::new(workflows::engine_for(&def.name, graph, &settings)?);
            println!("Running workflow: {}", def.name);
            interact(engine, &input, None).await?;
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(settings.port);
            server::serve(&settings, port).await?;
        }
    }

    Ok(())
}

/// Run to completion, prompting on stdin whenever the workflow waits for input.
/// Ctrl-C requests cancellation of the step in flight.
async fn interact(engine: Arc<Engine>, input: &str, thread_id: Option<String>) -> anyhow::Result<()> {
    let thread_id = thread_id.unwrap_or_else(new_thread_id);

    let watcher = {
        let engine = engine.clone();
        let thread_id = thread_id.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling {}", thread_id);
                engine.cancel(&thread_id).await;
            }
        })
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut result = engine.run(input, Some(thread_id.clone())).await;

    while result.status == RunStatus::AwaitingInput {
        print_prompt(&result);
        let answer = lines.next_line().await?.unwrap_or_else(|| "cancel".to_string());
        result = engine.resume(&answer, &thread_id).await?;
    }

    watcher.abort();
    print_result(&result)
}

fn print_prompt(result: &RunResult) {
    println!();
    if let Some(message) = &result.message {
        println!("{}", message);
    }
    if let Some(data) = &result.data {
        println!("  {}", data.instructions);
        for (key, value) in &data.extra {
            if key != "error" {
                println!("  {}: {}", key, value);
            }
        }
        if !data.options.is_empty() {
            println!("  Options: {}", data.options.join(" / "));
        }
    }
    println!("  (type 'cancel' to stop; thread {})", result.thread_id);
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn print_result(result: &RunResult) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if result.status == RunStatus::AwaitingInput {
        println!("Awaiting input; resume with --thread-id {}", result.thread_id);
    }
    Ok(())
}

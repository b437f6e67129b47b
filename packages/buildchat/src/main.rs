use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;

mod cli;
mod config;

use crate::config::BuildchatConfig;

#[derive(Parser)]
#[command(name = "buildchat")]
#[command(about = "Chat with a coding agent and watch it build, from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.buildchat)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an existing chat
    Attach(AttachArgs),

    /// Start a new chat from a prompt
    New(NewArgs),

    /// Transcode a message body and print its segments
    Render(RenderArgs),
}

#[derive(Parser)]
struct AttachArgs {
    /// Chat ID
    chat_id: i64,
}

#[derive(Parser)]
struct NewArgs {
    /// The first prompt
    prompt: String,

    /// Image to attach (file path or URL); may be repeated
    #[arg(long = "image")]
    images: Vec<String>,

    /// Stack pack to build on
    #[arg(long)]
    stack: Option<i64>,

    /// Project to file the chat under
    #[arg(long)]
    project: Option<i64>,

    /// Team that owns the chat
    #[arg(long)]
    team: Option<i64>,
}

#[derive(Parser)]
struct RenderArgs {
    /// Treat the input as a message that is still streaming
    #[arg(long)]
    partial: bool,

    /// File to read (defaults to stdin)
    file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.debug {
        "buildchat=debug,buildchat_session=debug,warn"
    } else {
        "buildchat=info,buildchat_session=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    match cli.command {
        Commands::Attach(args) => {
            let config = BuildchatConfig::new(cli.data_dir)?;
            cli::attach_command(&config, args.chat_id).await
        }
        Commands::New(args) => {
            let config = BuildchatConfig::new(cli.data_dir)?;
            let options = cli::NewChatOptions {
                prompt: args.prompt,
                images: args.images,
                stack_pack_id: args.stack,
                project_id: args.project,
                team_id: args.team,
            };
            cli::new_command(&config, options).await
        }
        Commands::Render(args) => cli::render_command(args.file.as_deref(), args.partial),
    }
}

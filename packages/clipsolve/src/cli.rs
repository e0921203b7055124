//! Command line arguments backing the `clipsolve` binary.
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::model::ModelSelection;

#[derive(Parser, Debug)]
#[command(
  name = "clipsolve",
  about = "Watches the clipboard or a screen region and streams LLM answers to the terminal and a companion device",
  version
)]
pub struct Args {
  /// Configuration file (TOML); defaults to ./clipsolve.toml when present
  #[arg(long, short = 'c', global = true)]
  pub config: Option<PathBuf>,

  /// Log level for clipsolve modules (RUST_LOG overrides)
  #[arg(long, global = true)]
  pub log_level: Option<String>,

  #[command(subcommand)]
  pub command: Commands,
}

/// Options shared by every command that talks to the model.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ModelArgs {
  /// Model to query (gpt-4o-mini, gpt-4o, gpt-3.5-turbo)
  #[arg(long, short = 'm', value_parser = parse_model)]
  pub model: Option<ModelSelection>,

  /// Use the general programming prompt instead of interview coaching
  #[arg(long)]
  pub no_interview: bool,
}

fn parse_model(value: &str) -> Result<ModelSelection, String> {
  value.parse::<ModelSelection>().map_err(|e| e.to_string())
}

#[derive(Subcommand, Debug)]
pub enum Commands {
  /// Print version information
  Version,
  /// List the models that can be selected
  Models,
  /// Monitor the clipboard and answer new content as it is copied
  Watch {
    #[command(flatten)]
    model: ModelArgs,

    /// Start with solving mode paused; toggle with `q`
    #[arg(long)]
    paused: bool,

    /// Start the companion server for a phone or second screen
    #[arg(long)]
    serve: bool,

    /// Companion server port (0 picks a free port)
    #[arg(long, short = 'p', allow_negative_numbers = true)]
    port: Option<i64>,

    /// Companion server bind address
    #[arg(long)]
    host: Option<String>,
  },
  /// Send one prompt and stream the answer to stdout
  Ask {
    /// Prompt text; read from stdin when omitted
    prompt: Option<String>,

    #[command(flatten)]
    model: ModelArgs,
  },
  /// Recognise text in an image or screen region, then answer it
  Ocr {
    /// Image file to recognise; `-` reads the image from stdin
    #[arg(long, short = 'i', conflicts_with_all = ["region", "screen"])]
    image: Option<PathBuf>,

    /// Screen region as x,y,width,height (needs the screen-capture feature)
    #[arg(long, short = 'r', value_delimiter = ',', allow_negative_numbers = true, conflicts_with = "screen")]
    region: Option<Vec<i64>>,

    /// Capture the whole primary monitor (needs the screen-capture feature)
    #[arg(long)]
    screen: bool,

    /// Print the recognised text without querying the model
    #[arg(long)]
    no_query: bool,

    #[command(flatten)]
    model: ModelArgs,
  },
  /// Send a test message to a running companion server
  Ping {
    /// Companion server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Companion server port
    #[arg(long, short = 'p', allow_negative_numbers = true)]
    port: Option<i64>,
  },
}

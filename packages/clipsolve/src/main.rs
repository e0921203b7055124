use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tracing::debug;

use clipsolve::cli::{Args, Commands, ModelArgs};
use clipsolve::console::{parse_command, ConsoleCommand, TerminalView, HELP};
use clipsolve::controller::{Controller, ControllerDeps, ControllerOptions, UiEvent};
use clipsolve::{logging, text, validate_port, validate_text, LlmClient, ModelSelection, PromptMode, Region, Settings, SystemClipboard};
use clipsolve_ocr::{decode_image, default_capture, load_image, perform_ocr, TesseractEngine};

#[tokio::main]
async fn main() {
  let args = Args::parse();

  if let Err(e) = run(args).await {
    eprintln!("Error: {}", e);
    std::process::exit(1);
  }
}

async fn run(args: Args) -> Result<()> {
  match &args.command {
    Commands::Version => {
      println!("clipsolve {}", env!("CARGO_PKG_VERSION"));
      return Ok(());
    }
    Commands::Models => {
      for model in ModelSelection::ALL {
        let marker = if model == ModelSelection::default() { " (default)" } else { "" };
        println!("{model}{marker}");
      }
      return Ok(());
    }
    _ => {}
  }

  let settings = Settings::load(args.config.as_deref())?;
  logging::init(args.log_level.as_deref().unwrap_or(&settings.log_level));

  match args.command {
    Commands::Watch { model, paused, serve, port, host } => {
      let port = validate_port(port.unwrap_or(settings.server.port))?;
      let host = host.unwrap_or_else(|| settings.server.host.clone());
      watch(&settings, &model, paused, serve, host, port).await
    }
    Commands::Ask { prompt, model } => {
      let prompt = match prompt {
        Some(prompt) => prompt,
        None => {
          let mut buf = String::new();
          tokio::io::stdin().read_to_string(&mut buf).await.context("failed to read prompt from stdin")?;
          buf
        }
      };
      let client = build_client(&settings, &model)?;
      stream_answer(&client, &prompt, model.model.unwrap_or(settings.model)).await
    }
    Commands::Ocr { image, region, screen, no_query, model } => {
      let engine = TesseractEngine::with_options(&settings.ocr.tesseract, &settings.ocr.language);
      let image = match (image, region) {
        (Some(path), _) if path.as_os_str() == "-" => {
          let mut bytes = Vec::new();
          tokio::io::stdin().read_to_end(&mut bytes).await.context("failed to read image from stdin")?;
          decode_image(&bytes)?
        }
        (Some(path), _) => load_image(&path)?,
        (None, Some(values)) => {
          let region = Region::try_from(values.as_slice())?;
          tokio::task::spawn_blocking(move || default_capture().capture(region.into())).await??
        }
        (None, None) if screen => tokio::task::spawn_blocking(|| default_capture().capture_full()).await??,
        (None, None) => bail!("one of --image, --region or --screen is required"),
      };
      let text = perform_ocr(&engine, Some(&image)).await?;
      if !validate_text(Some(&text)) {
        bail!("OCR found no usable text");
      }
      if no_query {
        println!("{text}");
        return Ok(());
      }
      eprintln!("--- captured ---\n{text}\n--- response ---");
      let client = build_client(&settings, &model)?;
      stream_answer(&client, &text, model.model.unwrap_or(settings.model)).await
    }
    Commands::Ping { host, port } => {
      let port = port.unwrap_or(settings.server.port);
      let ack = clipsolve::send_test_message(&host, port).await?;
      println!("companion replied: {} ({})", ack.status, ack.received);
      Ok(())
    }
    Commands::Version | Commands::Models => Ok(()),
  }
}

fn prompt_mode(model: &ModelArgs, settings: &Settings) -> PromptMode {
  if model.no_interview {
    PromptMode::Default
  } else {
    settings.prompt_mode
  }
}

fn build_client(settings: &Settings, model: &ModelArgs) -> Result<LlmClient> {
  let mut client = LlmClient::new(settings.llm_options())?;
  client.set_prompt_mode(prompt_mode(model, settings));
  Ok(client)
}

async fn stream_answer(client: &LlmClient, prompt: &str, model: ModelSelection) -> Result<()> {
  let mut stream = client
    .query_stream(prompt, model)
    .map_err(|e| anyhow!(text::user_message(&e.to_string())))?;

  let mut stdout = io::stdout();
  while let Some(item) = stream.next().await {
    match item {
      Ok(chunk) => {
        write!(stdout, "{chunk}")?;
        stdout.flush()?;
      }
      Err(e) => {
        writeln!(stdout)?;
        bail!(text::user_message(&e.to_string()));
      }
    }
  }
  writeln!(stdout)?;
  Ok(())
}

async fn watch(
  settings: &Settings,
  model: &ModelArgs,
  paused: bool,
  serve: bool,
  host: String,
  port: u16,
) -> Result<()> {
  let deps = ControllerDeps {
    llm: build_client(settings, model)?,
    clipboard: Arc::new(SystemClipboard),
    ocr: Arc::new(TesseractEngine::with_options(&settings.ocr.tesseract, &settings.ocr.language)),
    capture: Arc::from(default_capture()),
  };
  let options = ControllerOptions {
    polling_interval: settings.polling_interval(),
    debounce: settings.debounce(),
    server_host: host.clone(),
    server_port: i64::from(port),
  };
  let (controller, mut events) = Controller::new(deps, model.model.unwrap_or(settings.model), options);

  let mut view = TerminalView::new(io::stdout());
  println!("{HELP}");

  controller.set_solving_mode(!paused);
  controller.enable();
  if serve {
    controller.start_server(&host, i64::from(port)).await?;
  }

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut stdin_open = true;
  loop {
    tokio::select! {
      Some(event) = events.recv() => view.render(&event)?,
      line = lines.next_line(), if stdin_open => match line? {
        Some(line) => {
          if handle_command(&controller, &mut view, &line).await? {
            break;
          }
        }
        None => stdin_open = false,
      },
      _ = tokio::signal::ctrl_c() => break,
    }
  }

  controller.disable();
  controller.stop_server().await;
  while let Ok(event) = events.try_recv() {
    if !matches!(event, UiEvent::Indicator(_)) {
      view.render(&event)?;
    }
  }
  Ok(())
}

/// Runs one console command. Returns true when the user asked to exit.
async fn handle_command<W: Write>(
  controller: &Arc<Controller>,
  view: &mut TerminalView<W>,
  line: &str,
) -> io::Result<bool> {
  let command = match parse_command(line) {
    Ok(Some(command)) => command,
    Ok(None) => return Ok(false),
    Err(e) => {
      eprintln!("{e}");
      return Ok(false);
    }
  };

  match command {
    ConsoleCommand::Solve => {
      if let Err(e) = controller.force_solve().await {
        debug!(error = %e, "manual solve not started");
      }
    }
    ConsoleCommand::ToggleSolving => {
      controller.toggle_solving_mode();
    }
    ConsoleCommand::ToggleInterview => {
      controller.set_interview_mode(controller.prompt_mode() != PromptMode::Interview);
    }
    ConsoleCommand::Model(model) => controller.set_model(model),
    ConsoleCommand::Region(values) => {
      if let Err(e) = controller.solve_region(&values).await {
        debug!(error = %e, "region solve not started");
      }
    }
    ConsoleCommand::FullScreen => {
      if let Err(e) = controller.solve_screen().await {
        debug!(error = %e, "screen solve not started");
      }
    }
    ConsoleCommand::HistoryPrevious => {
      let history = controller.shared().history().await;
      view.page_back(&history)?;
    }
    ConsoleCommand::HistoryNext => {
      let history = controller.shared().history().await;
      let latest = controller.shared().latest().await;
      view.page_forward(&history, &latest)?;
    }
    ConsoleCommand::ToggleServer => {
      if let Err(e) = controller.toggle_server().await {
        eprintln!("companion server: {e}");
      }
    }
    ConsoleCommand::TestConnection => {
      if let Err(e) = controller.send_test_message().await {
        debug!(error = %e, "companion test failed");
      }
    }
    ConsoleCommand::Help => println!("{HELP}"),
    ConsoleCommand::Exit => return Ok(true),
  }
  Ok(false)
}

//! Terminal rendering of controller events and the single-letter commands that stand in
//! for global hotkeys in watch mode.
use std::io::{self, Write};

use crate::controller::UiEvent;
use crate::model::ModelSelection;
use crate::state::HistoryEntry;
use crate::text::truncate_chars;

const CAPTURE_PREVIEW_CHARS: usize = 200;

pub const HELP: &str = "commands: s=solve clipboard  q=toggle solving  i=toggle interview mode  \
m <model>=select model  r x,y,w,h=OCR region  o=OCR full screen  p/n=previous/next answer  \
c=toggle companion server  t=test companion  x=exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
  Solve,
  ToggleSolving,
  ToggleInterview,
  Model(ModelSelection),
  Region(Vec<i64>),
  FullScreen,
  HistoryPrevious,
  HistoryNext,
  ToggleServer,
  TestConnection,
  Help,
  Exit,
}

/// Parses one line typed in watch mode. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
  let line = line.trim();
  let (head, rest) = match line.split_once(char::is_whitespace) {
    Some((head, rest)) => (head, rest.trim()),
    None => (line, ""),
  };
  let command = match head {
    "" => return Ok(None),
    "s" | "solve" => ConsoleCommand::Solve,
    "q" => ConsoleCommand::ToggleSolving,
    "i" => ConsoleCommand::ToggleInterview,
    "o" => ConsoleCommand::FullScreen,
    "p" | "prev" => ConsoleCommand::HistoryPrevious,
    "n" | "next" => ConsoleCommand::HistoryNext,
    "c" => ConsoleCommand::ToggleServer,
    "t" => ConsoleCommand::TestConnection,
    "h" | "?" | "help" => ConsoleCommand::Help,
    "x" | "exit" | "quit" => ConsoleCommand::Exit,
    "m" | "model" => {
      let model = rest.parse::<ModelSelection>().map_err(|e| e.to_string())?;
      ConsoleCommand::Model(model)
    }
    "r" | "region" => {
      let values = rest
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|v| !v.is_empty())
        .map(|v| v.parse::<i64>().map_err(|_| format!("'{v}' is not a number")))
        .collect::<Result<Vec<_>, _>>()?;
      ConsoleCommand::Region(values)
    }
    other => return Err(format!("unknown command '{other}' (h for help)")),
  };
  Ok(Some(command))
}

/// Writes controller events to a terminal, printing streamed text incrementally.
pub struct TerminalView<W: Write> {
  out: W,
  printed: String,
  /// Index into history while paging; `None` shows the latest response.
  history_index: Option<usize>,
}

impl<W: Write> TerminalView<W> {
  pub fn new(out: W) -> Self {
    Self {
      out,
      printed: String::new(),
      history_index: None,
    }
  }

  pub fn into_inner(self) -> W {
    self.out
  }

  pub fn render(&mut self, event: &UiEvent) -> io::Result<()> {
    match event {
      UiEvent::Captured(text) => {
        let preview = truncate_chars(text.trim(), CAPTURE_PREVIEW_CHARS);
        let ellipsis = if preview.len() < text.trim().len() { "..." } else { "" };
        writeln!(self.out, "\n--- captured ({} chars) ---", text.chars().count())?;
        writeln!(self.out, "{preview}{ellipsis}")?;
      }
      UiEvent::Loading(true) => {
        self.printed.clear();
        self.history_index = None;
        writeln!(self.out, "\n--- response ---")?;
      }
      UiEvent::Loading(false) => {
        writeln!(self.out)?;
      }
      UiEvent::Response(text) => {
        if let Some(suffix) = text.strip_prefix(self.printed.as_str()) {
          write!(self.out, "{suffix}")?;
        } else {
          write!(self.out, "\n{text}")?;
        }
        self.printed.clone_from(text);
      }
      UiEvent::Status(message) => writeln!(self.out, "[status] {message}")?,
      UiEvent::Indicator(indicator) => writeln!(self.out, "[monitor] {}", indicator.label())?,
      UiEvent::SolvingMode(enabled) => {
        writeln!(self.out, "[solving] {}", if *enabled { "ACTIVE" } else { "PAUSED" })?
      }
      UiEvent::CompanionUrl(Some(url)) => writeln!(self.out, "[companion] open {url}")?,
      UiEvent::CompanionUrl(None) => writeln!(self.out, "[companion] stopped")?,
    }
    self.out.flush()
  }

  /// Shows the answer before the one on screen. From the latest response this is the
  /// newest history entry; at the oldest entry it stays put.
  pub fn page_back(&mut self, history: &[HistoryEntry]) -> io::Result<()> {
    if history.is_empty() {
      writeln!(self.out, "[history] empty")?;
      return self.out.flush();
    }
    let index = match self.history_index {
      None => history.len() - 1,
      Some(i) => i.saturating_sub(1).min(history.len() - 1),
    };
    self.show_entry(history, index)
  }

  /// Shows the answer after the one on screen, returning to `latest` past the newest entry.
  pub fn page_forward(&mut self, history: &[HistoryEntry], latest: &str) -> io::Result<()> {
    match self.history_index {
      None => writeln!(self.out, "[history] already at latest")?,
      Some(i) if i + 1 < history.len() => return self.show_entry(history, i + 1),
      Some(_) => {
        self.history_index = None;
        self.printed.clear();
        writeln!(self.out, "\n--- latest ---\n{latest}")?;
      }
    }
    self.out.flush()
  }

  fn show_entry(&mut self, history: &[HistoryEntry], index: usize) -> io::Result<()> {
    let Some(entry) = history.get(index) else {
      return Ok(());
    };
    self.history_index = Some(index);
    self.printed.clear();
    writeln!(
      self.out,
      "\n--- history {}/{} ({}, {}) ---\n{}",
      index + 1,
      history.len(),
      entry.model,
      entry.finished_at,
      entry.response
    )?;
    self.out.flush()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::controller::Indicator;

  #[test]
  fn test_parse_simple_commands() {
    assert_eq!(parse_command("  "), Ok(None));
    assert_eq!(parse_command("s"), Ok(Some(ConsoleCommand::Solve)));
    assert_eq!(parse_command("q\n"), Ok(Some(ConsoleCommand::ToggleSolving)));
    assert_eq!(parse_command("x"), Ok(Some(ConsoleCommand::Exit)));
    assert!(parse_command("zz").is_err());
  }

  #[test]
  fn test_parse_model_command() {
    assert_eq!(
      parse_command("m gpt-4o"),
      Ok(Some(ConsoleCommand::Model(ModelSelection::Gpt4o)))
    );
    assert!(parse_command("m").is_err());
    assert!(parse_command("m claude").is_err());
  }

  #[test]
  fn test_parse_region_command() {
    assert_eq!(
      parse_command("r 10,20, 300 400"),
      Ok(Some(ConsoleCommand::Region(vec![10, 20, 300, 400])))
    );
    assert_eq!(
      parse_command("r -1,0,10"),
      Ok(Some(ConsoleCommand::Region(vec![-1, 0, 10])))
    );
    assert!(parse_command("r 1,2,three,4").is_err());
  }

  #[test]
  fn test_streamed_response_prints_only_new_text() {
    let mut view = TerminalView::new(Vec::new());
    view.render(&UiEvent::Loading(true)).unwrap();
    view.render(&UiEvent::Response("Hel".into())).unwrap();
    view.render(&UiEvent::Response("Hello".into())).unwrap();
    view.render(&UiEvent::Loading(false)).unwrap();
    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(out, "\n--- response ---\nHello\n");
  }

  #[test]
  fn test_replaced_response_is_reprinted() {
    let mut view = TerminalView::new(Vec::new());
    view.render(&UiEvent::Response("partial".into())).unwrap();
    view.render(&UiEvent::Response("Error: Rate limit".into())).unwrap();
    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(out, "partial\nError: Rate limit");
  }

  fn entry(response: &str) -> HistoryEntry {
    HistoryEntry {
      model: "gpt-4o-mini".to_string(),
      finished_at: "t".to_string(),
      response: response.to_string(),
    }
  }

  #[test]
  fn test_parse_history_and_screen_commands() {
    assert_eq!(parse_command("p"), Ok(Some(ConsoleCommand::HistoryPrevious)));
    assert_eq!(parse_command("n"), Ok(Some(ConsoleCommand::HistoryNext)));
    assert_eq!(parse_command("o"), Ok(Some(ConsoleCommand::FullScreen)));
  }

  #[test]
  fn test_history_paging() {
    let history = vec![entry("first"), entry("second")];
    let mut view = TerminalView::new(Vec::new());

    view.page_back(&history).unwrap();
    view.page_back(&history).unwrap();
    view.page_back(&history).unwrap();
    view.page_forward(&history, "live").unwrap();
    view.page_forward(&history, "live").unwrap();
    view.page_forward(&history, "live").unwrap();

    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(
      out,
      "\n--- history 2/2 (gpt-4o-mini, t) ---\nsecond\n\
       \n--- history 1/2 (gpt-4o-mini, t) ---\nfirst\n\
       \n--- history 1/2 (gpt-4o-mini, t) ---\nfirst\n\
       \n--- history 2/2 (gpt-4o-mini, t) ---\nsecond\n\
       \n--- latest ---\nlive\n\
       [history] already at latest\n"
    );
  }

  #[test]
  fn test_history_paging_empty_and_reset_by_new_response() {
    let mut view = TerminalView::new(Vec::new());
    view.page_back(&[]).unwrap();

    let history = vec![entry("only")];
    view.page_back(&history).unwrap();
    view.render(&UiEvent::Loading(true)).unwrap();
    view.page_forward(&history, "live").unwrap();

    let out = String::from_utf8(view.into_inner()).unwrap();
    assert!(out.starts_with("[history] empty\n"));
    assert!(out.ends_with("--- response ---\n[history] already at latest\n"));
  }

  #[test]
  fn test_status_lines() {
    let mut view = TerminalView::new(Vec::new());
    view.render(&UiEvent::Indicator(Indicator::Paused)).unwrap();
    view.render(&UiEvent::SolvingMode(true)).unwrap();
    view.render(&UiEvent::CompanionUrl(Some("http://10.0.0.2:5000/".into()))).unwrap();
    let out = String::from_utf8(view.into_inner()).unwrap();
    assert_eq!(
      out,
      "[monitor] Paused\n[solving] ACTIVE\n[companion] open http://10.0.0.2:5000/\n"
    );
  }
}

//! Mediates between the clipboard, OCR, the model client, the UI and the companion server.
//!
//! The controller is shared as `Arc<Controller>`. Flags are atomics; UI updates are sent
//! as [`UiEvent`]s over a channel so that only the task owning the view renders.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use clipsolve_ocr::{perform_ocr, DynamicImage, OcrEngine, OcrError, ScreenCapture};

use crate::clipboard::{ClipboardError, ClipboardSource};
use crate::llm::LlmClient;
use crate::model::{ModelSelection, PromptMode};
use crate::notifier::{self, NotifyError};
use crate::result::{QueryResult, QueryState};
use crate::server::{local_ip, CompanionServer, ServerError, TestAck};
use crate::state::SharedResponse;
use crate::validation::{validate_text, Region, ValidationError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Monitoring,
    Querying,
}

/// Monitoring indicator shown next to the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Active,
    Paused,
    Inactive,
    Detected,
    Querying,
    Error,
}

impl Indicator {
    pub fn label(&self) -> &'static str {
        match self {
            Indicator::Active => "Active",
            Indicator::Paused => "Paused",
            Indicator::Inactive => "Inactive",
            Indicator::Detected => "Clipboard detected, processing...",
            Indicator::Querying => "Querying AI...",
            Indicator::Error => "Error, monitoring active",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// New captured input (clipboard or OCR text).
    Captured(String),
    /// Full response text so far.
    Response(String),
    Status(String),
    Indicator(Indicator),
    Loading(bool),
    SolvingMode(bool),
    CompanionUrl(Option<String>),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("a query is already running")]
    Busy,
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Ocr(#[from] OcrError),
    #[error(transparent)]
    Clipboard(#[from] ClipboardError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Notify(#[from] NotifyError),
    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone)]
pub struct ControllerOptions {
    pub polling_interval: Duration,
    pub debounce: Duration,
    pub server_host: String,
    pub server_port: i64,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            polling_interval: Duration::from_millis(1000),
            debounce: Duration::from_millis(750),
            server_host: "0.0.0.0".to_string(),
            server_port: crate::config::DEFAULT_PORT,
        }
    }
}

/// External collaborators of the controller.
pub struct ControllerDeps {
    pub llm: LlmClient,
    pub clipboard: Arc<dyn ClipboardSource>,
    pub ocr: Arc<dyn OcrEngine>,
    pub capture: Arc<dyn ScreenCapture>,
}

pub struct Controller {
    llm: RwLock<LlmClient>,
    clipboard: Arc<dyn ClipboardSource>,
    ocr: Arc<dyn OcrEngine>,
    capture: Arc<dyn ScreenCapture>,
    shared: SharedResponse,
    ui: mpsc::UnboundedSender<UiEvent>,
    options: ControllerOptions,
    model: Mutex<ModelSelection>,
    monitoring: AtomicBool,
    /// Bumped on every enable and disable; a monitor loop exits once it no longer matches.
    monitor_generation: AtomicU64,
    querying: AtomicBool,
    query_enabled: AtomicBool,
    debounce_generation: AtomicU64,
    last_clipboard: Mutex<String>,
    server: tokio::sync::Mutex<Option<CompanionServer>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Clears the in-flight flag when the query task ends, even if it panics.
struct QueryGuard<'a>(&'a AtomicBool);

impl Drop for QueryGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Controller {
    pub fn new(
        deps: ControllerDeps,
        model: ModelSelection,
        options: ControllerOptions,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<UiEvent>) {
        let (ui, rx) = mpsc::unbounded_channel();
        let controller = Arc::new(Self {
            llm: RwLock::new(deps.llm),
            clipboard: deps.clipboard,
            ocr: deps.ocr,
            capture: deps.capture,
            shared: SharedResponse::new(),
            ui,
            options,
            model: Mutex::new(model),
            monitoring: AtomicBool::new(false),
            monitor_generation: AtomicU64::new(0),
            querying: AtomicBool::new(false),
            query_enabled: AtomicBool::new(false),
            debounce_generation: AtomicU64::new(0),
            last_clipboard: Mutex::new(String::new()),
            server: tokio::sync::Mutex::new(None),
        });
        (controller, rx)
    }

    fn emit(&self, event: UiEvent) {
        // The receiver is gone only while shutting down.
        let _ = self.ui.send(event);
    }

    fn status(&self, message: impl Into<String>) {
        self.emit(UiEvent::Status(message.into()));
    }

    fn idle_indicator(&self) -> Indicator {
        if !self.monitoring.load(Ordering::SeqCst) {
            Indicator::Inactive
        } else if self.query_enabled.load(Ordering::SeqCst) {
            Indicator::Active
        } else {
            Indicator::Paused
        }
    }

    pub fn state(&self) -> ControllerState {
        if self.querying.load(Ordering::SeqCst) {
            ControllerState::Querying
        } else if self.monitoring.load(Ordering::SeqCst) {
            ControllerState::Monitoring
        } else {
            ControllerState::Idle
        }
    }

    pub fn shared(&self) -> &SharedResponse {
        &self.shared
    }

    pub fn model(&self) -> ModelSelection {
        *lock(&self.model)
    }

    pub fn set_model(&self, model: ModelSelection) {
        *lock(&self.model) = model;
        info!(%model, "model selected");
        self.status(format!("Model set to {model}"));
    }

    pub fn prompt_mode(&self) -> PromptMode {
        self.llm.read().unwrap_or_else(|e| e.into_inner()).prompt_mode()
    }

    pub fn set_interview_mode(&self, enabled: bool) -> bool {
        let mode = if enabled {
            PromptMode::Interview
        } else {
            PromptMode::Default
        };
        self.llm
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_prompt_mode(mode);
        self.status(format!(
            "Interview Mode {}",
            if enabled { "ENABLED" } else { "DISABLED" }
        ));
        enabled
    }

    pub fn update_api_key(&self, key: impl Into<String>) {
        self.llm
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .update_api_key(key);
    }

    pub fn is_solving(&self) -> bool {
        self.query_enabled.load(Ordering::SeqCst)
    }

    /// Flips whether new clipboard content is sent to the model. Returns the new value.
    pub fn toggle_solving_mode(&self) -> bool {
        let enabled = !self.query_enabled.fetch_xor(true, Ordering::SeqCst);
        self.set_solving_mode_inner(enabled);
        enabled
    }

    pub fn set_solving_mode(&self, enabled: bool) {
        self.query_enabled.store(enabled, Ordering::SeqCst);
        self.set_solving_mode_inner(enabled);
    }

    fn set_solving_mode_inner(&self, enabled: bool) {
        if !enabled {
            self.debounce_generation.fetch_add(1, Ordering::SeqCst);
        }
        info!(enabled, "solving mode changed");
        self.emit(UiEvent::Indicator(self.idle_indicator()));
        self.emit(UiEvent::SolvingMode(enabled));
    }

    /// Idle -> Monitoring. Starts the polling task unless it is already running.
    pub fn enable(self: &Arc<Self>) {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            return;
        }
        let generation = self.monitor_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move { this.monitor_loop(generation).await });
        self.emit(UiEvent::Indicator(self.idle_indicator()));
    }

    /// Stops new triggers. An in-flight query keeps streaming until it ends.
    pub fn disable(&self) {
        self.monitoring.store(false, Ordering::SeqCst);
        self.monitor_generation.fetch_add(1, Ordering::SeqCst);
        self.debounce_generation.fetch_add(1, Ordering::SeqCst);
        self.emit(UiEvent::Indicator(Indicator::Inactive));
    }

    fn is_current_monitor(&self, generation: u64) -> bool {
        self.monitoring.load(Ordering::SeqCst)
            && self.monitor_generation.load(Ordering::SeqCst) == generation
    }

    async fn monitor_loop(self: Arc<Self>, generation: u64) {
        info!(interval_ms = self.options.polling_interval.as_millis() as u64, "clipboard monitor started");
        while self.is_current_monitor(generation) {
            match self.read_clipboard().await {
                Ok(Some(content)) => self.on_clipboard(content),
                Ok(None) => {}
                Err(e) => error!(error = %e, "error reading clipboard"),
            }
            tokio::time::sleep(self.options.polling_interval).await;
        }
        info!("clipboard monitor stopped");
    }

    async fn read_clipboard(&self) -> Result<Option<String>, ControllerError> {
        let clipboard = Arc::clone(&self.clipboard);
        tokio::task::spawn_blocking(move || clipboard.read_text())
            .await
            .map_err(|e| ControllerError::Task(e.to_string()))?
            .map_err(ControllerError::from)
    }

    fn on_clipboard(self: &Arc<Self>, content: String) {
        {
            let mut last = lock(&self.last_clipboard);
            if *last == content || !validate_text(Some(&content)) {
                return;
            }
            *last = content.clone();
        }
        info!(chars = content.chars().count(), "new clipboard content detected");
        self.emit(UiEvent::Captured(content.clone()));

        if self.query_enabled.load(Ordering::SeqCst) {
            self.status("Clipboard changed. Debouncing...");
            self.emit(UiEvent::Indicator(Indicator::Detected));
            self.schedule_query(content);
        }
    }

    /// Runs a query for `text` after the debounce delay unless newer content arrives first.
    fn schedule_query(self: &Arc<Self>, text: String) {
        let generation = self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(this.options.debounce).await;
            if this.debounce_generation.load(Ordering::SeqCst) != generation {
                debug!("debounced query superseded");
                return;
            }
            if let Err(ControllerError::Busy) = this.trigger_query(text) {
                this.emit(UiEvent::Indicator(this.idle_indicator()));
            }
        });
    }

    /// Starts a query unless one is already in flight; new triggers while querying are
    /// ignored until the current stream ends.
    pub fn trigger_query(self: &Arc<Self>, text: String) -> Result<JoinHandle<QueryResult>, ControllerError> {
        if self
            .querying
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("query in flight; ignoring trigger");
            self.status("Query already running; trigger ignored.");
            return Err(ControllerError::Busy);
        }
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let _guard = QueryGuard(&this.querying);
            let result = this.run_query(&text).await;
            result
        }))
    }

    async fn run_query(&self, text: &str) -> QueryResult {
        let model = self.model();
        let client = self.llm.read().unwrap_or_else(|e| e.into_inner()).clone();

        self.status("Querying model API (streaming)...");
        self.emit(UiEvent::Indicator(Indicator::Querying));
        self.emit(UiEvent::Loading(true));

        let mut result = QueryResult::new(model);
        match client.query_stream(text, model) {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(chunk) => {
                            result.push(chunk);
                            let text = result.text();
                            self.emit(UiEvent::Response(text.clone()));
                            self.shared.update(text).await;
                        }
                        Err(e) => {
                            warn!(error = %e, "query ended with error");
                            result.fail(&e.user_message());
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "query rejected before sending");
                result.fail(&e.user_message());
            }
        }
        result.complete();

        match result.state() {
            QueryState::Errored(_) => {
                let text = result.text();
                self.emit(UiEvent::Response(text.clone()));
                self.shared.update(text).await;
                self.status("API Error.");
                self.emit(UiEvent::Indicator(Indicator::Error));
            }
            _ => {
                self.status("API response received.");
                self.emit(UiEvent::Indicator(self.idle_indicator()));
                self.shared.finalize(model.as_str()).await;
            }
        }
        self.emit(UiEvent::Loading(false));
        result
    }

    /// Sends the current clipboard content regardless of solving mode.
    pub async fn force_solve(self: &Arc<Self>) -> Result<JoinHandle<QueryResult>, ControllerError> {
        let content = self.read_clipboard().await?;
        if !validate_text(content.as_deref()) {
            self.status("Clipboard is empty or contains only whitespace.");
            return Err(ValidationError::InvalidText.into());
        }
        let content = content.unwrap_or_default();
        info!("manual solve triggered");
        self.status("Manual solve triggered...");
        self.emit(UiEvent::Captured(content.clone()));
        self.trigger_query(content)
    }

    /// OCRs `image` and queries the recognised text.
    pub async fn solve_image(
        self: &Arc<Self>,
        image: &DynamicImage,
    ) -> Result<JoinHandle<QueryResult>, ControllerError> {
        if self.querying.load(Ordering::SeqCst) {
            self.status("Query already running; trigger ignored.");
            return Err(ControllerError::Busy);
        }
        self.status("Running OCR...");
        let text = match perform_ocr(self.ocr.as_ref(), Some(image)).await {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "ocr failed");
                self.status(crate::text::user_message(&format!("OCR Error: {e}")));
                return Err(e.into());
            }
        };
        if !validate_text(Some(&text)) {
            self.status("OCR found no usable text.");
            return Err(ValidationError::InvalidText.into());
        }
        self.emit(UiEvent::Captured(text.clone()));
        self.trigger_query(text)
    }

    /// Captures `values` (`[x, y, width, height]`) from the screen, OCRs it and queries it.
    pub async fn solve_region(
        self: &Arc<Self>,
        values: &[i64],
    ) -> Result<JoinHandle<QueryResult>, ControllerError> {
        let region = match Region::try_from(values) {
            Ok(region) => region,
            Err(e) => {
                self.status(e.to_string());
                return Err(e.into());
            }
        };
        self.solve_capture(move |capture| capture.capture(region.into())).await
    }

    /// Captures the whole primary monitor without selecting a region, OCRs it and queries it.
    pub async fn solve_screen(self: &Arc<Self>) -> Result<JoinHandle<QueryResult>, ControllerError> {
        info!("full screen capture triggered");
        self.status("Capturing screen...");
        self.solve_capture(|capture| capture.capture_full()).await
    }

    async fn solve_capture<F>(self: &Arc<Self>, grab: F) -> Result<JoinHandle<QueryResult>, ControllerError>
    where
        F: FnOnce(&dyn ScreenCapture) -> Result<DynamicImage, OcrError> + Send + 'static,
    {
        let capture = Arc::clone(&self.capture);
        let image = tokio::task::spawn_blocking(move || grab(capture.as_ref()))
            .await
            .map_err(|e| ControllerError::Task(e.to_string()))?;
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                error!(error = %e, "screen capture failed");
                self.status(crate::text::user_message(&format!("Capture Error: {e}")));
                return Err(e.into());
            }
        };
        self.solve_image(&image).await
    }

    /// Validates the port and starts the companion server; returns the URL to open.
    pub async fn start_server(&self, host: &str, port: i64) -> Result<String, ControllerError> {
        let mut server = self.server.lock().await;
        if let Some(running) = server.as_ref() {
            return Ok(running.url());
        }
        let started = CompanionServer::start(host, port, self.shared.clone()).await?;
        let url = started.url();
        *server = Some(started);
        self.emit(UiEvent::CompanionUrl(Some(url.clone())));
        self.status(format!("Companion server running at {url}"));
        Ok(url)
    }

    pub async fn stop_server(&self) {
        if let Some(server) = self.server.lock().await.take() {
            server.stop().await;
            self.emit(UiEvent::CompanionUrl(None));
            self.status("Companion server stopped.");
        }
    }

    /// Starts the companion server on the configured address, or stops it if running.
    /// Returns the URL when the server is now running.
    pub async fn toggle_server(&self) -> Result<Option<String>, ControllerError> {
        if self.server.lock().await.is_some() {
            self.stop_server().await;
            return Ok(None);
        }
        let host = self.options.server_host.clone();
        let url = self.start_server(&host, self.options.server_port).await?;
        Ok(Some(url))
    }

    /// Checks the companion server is reachable, with a 5 second timeout.
    pub async fn send_test_message(&self) -> Result<TestAck, ControllerError> {
        let addr = match self.server.lock().await.as_ref() {
            Some(server) => server.local_addr(),
            None => {
                warn!("test message requested but companion server is not running");
                return Err(NotifyError::NotRunning.into());
            }
        };
        let ip = if addr.ip().is_unspecified() {
            local_ip()
        } else {
            addr.ip()
        };
        let result = notifier::send_test_message(&ip.to_string(), i64::from(addr.port())).await;
        match &result {
            Ok(_) => self.status("Companion connection OK."),
            Err(NotifyError::Timeout) => self.status("Companion connection timed out (5s)."),
            Err(e) => self.status(crate::text::user_message(&format!("Companion connection failed: {e}"))),
        }
        Ok(result?)
    }
}

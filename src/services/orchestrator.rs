//! Report lifecycle: input, configuration prompt, processing, report.

use futures::StreamExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use super::ReportService;
use crate::config::{ApiConfig, ConfigStore};
use crate::errors::{CouncilError, CouncilResult};
use crate::images::{self, ImageUpload, IngestReport};
use crate::types::context::ProductContext;

/// Where the user currently is in the report flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Editing the product context.
    Input,
    /// Base URL or API key must be entered before anything is sent.
    ConfigurationRequired,
    /// Request issued, no text received yet.
    Processing,
    /// Report text is arriving or has arrived.
    Report,
}

/// Drives one report at a time from a [`ProductContext`] to finished text.
///
/// The report string is append-only while a run is in flight and is only
/// ever cleared by [`reset`](Self::reset) or the start of the next run.
/// State changes are published to [`watch_state`](Self::watch_state)
/// receivers, which can follow a run while it holds `&mut self`.
pub struct ReportOrchestrator {
    service: ReportService,
    config: ApiConfig,
    context: ProductContext,
    state: watch::Sender<AppState>,
    report: String,
    error: Option<String>,
    cancel: CancellationToken,
}

impl ReportOrchestrator {
    /// Creates an orchestrator in the [`AppState::Input`] state.
    pub fn new(service: ReportService, config: ApiConfig) -> Self {
        Self {
            service,
            config,
            context: ProductContext::default(),
            state: watch::Sender::new(AppState::Input),
            report: String::new(),
            error: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> AppState {
        *self.state.borrow()
    }

    /// Receiver that sees every state change, including those made while a
    /// run is in flight.
    pub fn watch_state(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: AppState) {
        self.state.send_replace(state);
    }

    /// Report text received so far.
    pub fn report(&self) -> &str {
        &self.report
    }

    /// Message of the last failure, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Returns true once at least one chunk has been received.
    pub fn has_output(&self) -> bool {
        !self.report.is_empty()
    }

    /// Active connection settings.
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Product context.
    pub fn context(&self) -> &ProductContext {
        &self.context
    }

    /// Mutable product context, for field-by-field edits.
    pub fn context_mut(&mut self) -> &mut ProductContext {
        &mut self.context
    }

    /// Replaces the product context.
    pub fn set_context(&mut self, context: ProductContext) {
        self.context = context;
    }

    /// Attaches screenshots to the context.
    pub fn attach_images<I>(&mut self, uploads: I) -> IngestReport
    where
        I: IntoIterator<Item = ImageUpload>,
    {
        images::ingest(&mut self.context.images, uploads)
    }

    /// Removes the screenshot at `index`.
    pub fn remove_image(&mut self, index: usize) -> Option<String> {
        images::remove_image(&mut self.context.images, index)
    }

    /// Token that cancels the current run, or the next one if none is running.
    ///
    /// Cancelling drops the response body, which closes the connection.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Opens the configuration prompt explicitly.
    pub fn request_configuration(&mut self) {
        self.set_state(AppState::ConfigurationRequired);
    }

    /// Persists new connection settings and adopts them.
    ///
    /// Leaves [`AppState::ConfigurationRequired`] once the settings are
    /// complete. Nothing changes if the store fails to save.
    pub fn update_config(&mut self, config: ApiConfig, store: &dyn ConfigStore) -> CouncilResult<()> {
        store.save(&config)?;
        tracing::debug!(model = %config.model, key = %config.api_key_hint(), "Settings saved");

        self.config = config;
        if self.state() == AppState::ConfigurationRequired && self.config.is_complete() {
            self.set_state(AppState::Input);
            self.error = None;
        }

        Ok(())
    }

    /// Drops the report and the error and returns to input.
    ///
    /// A run in flight is stopped through [`cancel_handle`](Self::cancel_handle);
    /// `reset` only clears what it left behind. The product context and the
    /// settings are kept, and the next run gets a fresh cancellation token.
    pub fn reset(&mut self) {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        self.report.clear();
        self.error = None;
        self.set_state(AppState::Input);
    }

    /// Generates a report, calling `on_chunk` for every delta in order.
    ///
    /// Nothing is sent when the context is incomplete (state stays
    /// [`AppState::Input`]) or the settings are incomplete (state becomes
    /// [`AppState::ConfigurationRequired`]). A failure before the first chunk
    /// returns to [`AppState::Input`]; a failure after it keeps the partial
    /// report in [`AppState::Report`]. Both record the error message.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn run_analysis<F>(&mut self, mut on_chunk: F) -> CouncilResult<()>
    where
        F: FnMut(&str),
    {
        self.error = None;

        if let Err(e) = self.context.validate() {
            self.set_state(AppState::Input);
            self.error = Some(e.to_string());
            return Err(e);
        }

        if let Err(e) = self.config.ensure_complete() {
            tracing::info!("Settings incomplete; prompting for configuration");
            self.set_state(AppState::ConfigurationRequired);
            self.error = Some(e.to_string());
            return Err(e);
        }

        self.report.clear();
        self.set_state(AppState::Processing);

        let token = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(CouncilError::Cancelled),
            result = stream_into(
                &self.service,
                &self.config,
                &self.context,
                &mut self.report,
                &self.state,
                &mut on_chunk,
            ) => result,
        };

        if token.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        match outcome {
            Ok(()) => {
                tracing::info!(chars = self.report.chars().count(), "Report complete");
                self.set_state(AppState::Report);
                Ok(())
            }
            Err(e) => {
                self.set_state(if self.report.is_empty() {
                    AppState::Input
                } else {
                    AppState::Report
                });
                tracing::warn!(error = %e, partial = !self.report.is_empty(), "Report generation failed");
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}

async fn stream_into<F>(
    service: &ReportService,
    config: &ApiConfig,
    context: &ProductContext,
    report: &mut String,
    state: &watch::Sender<AppState>,
    on_chunk: &mut F,
) -> CouncilResult<()>
where
    F: FnMut(&str),
{
    let mut deltas = service.stream_report(config, context).await?;

    while let Some(delta) = deltas.next().await {
        let delta = delta?;
        if report.is_empty() {
            tracing::debug!("First chunk received");
            state.send_replace(AppState::Report);
        }
        report.push_str(&delta);
        on_chunk(&delta);
    }

    Ok(())
}

impl std::fmt::Debug for ReportOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportOrchestrator")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("report_len", &self.report.len())
            .field("error", &self.error)
            .finish()
    }
}

//! Report generation services.
//!
//! [`ReportService`] issues the streaming request; [`ReportOrchestrator`]
//! owns the form state and drives a report from input to finished text.

mod orchestrator;
mod report;

pub use orchestrator::{AppState, ReportOrchestrator};
pub use report::ReportService;

//! Command-line front end: collects the product context from flags, streams
//! the council's report to stdout and exits non-zero on failure.

use clap::{ArgAction, Parser};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use product_council::config::{load_or_default, ApiConfigBuilder, FileConfigStore};
use product_council::observability::{init_logging, LogFormat, LogLevel, LoggingConfig};
use product_council::types::context::{CURRENT_STATE_OPTIONS, PRODUCT_TYPE_OPTIONS};
use product_council::{
    AppState, CouncilError, CouncilResult, ImageUpload, ProductContext, ReportOrchestrator,
    ReportService,
};

/// Command line arguments
#[derive(Debug, Parser)]
#[command(
    name = "product-council",
    version,
    about = "Ask a virtual product council for a strategy and design critique"
)]
struct CliArgs {
    /// Who the product is for (required)
    #[arg(short = 'a', long)]
    audience: Option<String>,

    /// What the team is trying to achieve (required)
    #[arg(short = 'g', long)]
    goal: Option<String>,

    /// Kind of product, e.g. "B2B SaaS Platform"
    #[arg(short = 't', long = "type", value_name = "TYPE")]
    product_type: Option<String>,

    /// Lifecycle stage, e.g. "Feature Iteration"
    #[arg(short = 's', long = "stage", value_name = "STAGE")]
    current_state: Option<String>,

    /// Screenshot to attach; repeat for several (at most five are kept)
    #[arg(short = 'i', long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    base_url: Option<String>,

    /// API key for the endpoint
    #[arg(long)]
    api_key: Option<String>,

    /// Model name
    #[arg(long)]
    model: Option<String>,

    /// Seconds allowed until the response headers arrive
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Persist the effective connection settings
    #[arg(long)]
    save: bool,

    /// Settings file (defaults to the platform config directory)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the suggested product types and stages, then exit
    #[arg(long)]
    list_options: bool,

    /// Log output format: compact, pretty or json
    #[arg(long, default_value = "compact")]
    log_format: LogFormat,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl CliArgs {
    fn apply_connection_flags(&self, mut builder: ApiConfigBuilder) -> ApiConfigBuilder {
        if let Some(base_url) = &self.base_url {
            builder = builder.base_url(base_url.clone());
        }
        if let Some(api_key) = &self.api_key {
            builder = builder.api_key(api_key.clone());
        }
        if let Some(model) = &self.model {
            builder = builder.model(model.clone());
        }
        if let Some(secs) = self.timeout {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        builder
    }

    fn context(&self) -> ProductContext {
        ProductContext::new()
            .with_target_audience(self.audience.clone().unwrap_or_default())
            .with_primary_goal(self.goal.clone().unwrap_or_default())
            .with_product_type(self.product_type.clone().unwrap_or_default())
            .with_current_state(self.current_state.clone().unwrap_or_default())
    }

    fn has_context(&self) -> bool {
        self.audience.is_some() || self.goal.is_some() || !self.images.is_empty()
    }
}

/// Streams report chunks to `out`. A failed write cancels the run.
fn chunk_writer<W: Write>(mut out: W, cancel: CancellationToken) -> impl FnMut(&str) {
    move |chunk: &str| {
        if cancel.is_cancelled() {
            return;
        }
        if let Err(e) = out.write_all(chunk.as_bytes()).and_then(|()| out.flush()) {
            tracing::warn!(error = %e, "Output closed; cancelling the report");
            cancel.cancel();
        }
    }
}

fn print_options() {
    println!("Product types:");
    for option in PRODUCT_TYPE_OPTIONS {
        println!("  {}", option);
    }
    println!("Stages:");
    for option in CURRENT_STATE_OPTIONS {
        println!("  {}", option);
    }
}

async fn run(args: CliArgs) -> CouncilResult<()> {
    let store = match &args.config {
        Some(path) => FileConfigStore::new(path),
        None => FileConfigStore::at_default_location()?,
    };

    // flags > environment > settings file
    let stored = load_or_default(&store)?.apply_env_overrides()?;
    let config = args
        .apply_connection_flags(ApiConfigBuilder::from_config(&stored))
        .build()?;

    if config.uses_insecure_transport() {
        eprintln!("warning: {} is plain HTTP; the API key is sent unencrypted", config.base_url);
    }

    let service = ReportService::from_config(&config)?;
    let mut council = ReportOrchestrator::new(service, config.clone());

    if args.save {
        council.update_config(config, &store)?;
        eprintln!("Settings saved to {}", store.path().display());
        if !args.has_context() {
            return Ok(());
        }
    }

    council.set_context(args.context());

    let mut uploads = Vec::with_capacity(args.images.len());
    for path in &args.images {
        uploads.push(ImageUpload::from_path(path).await?);
    }
    let ingest = council.attach_images(uploads);
    for rejected in &ingest.rejected {
        eprintln!("warning: skipped {}: {}", rejected.file_name, rejected.reason);
    }

    let cancel = council.cancel_handle();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let mut states = council.watch_state();
    tokio::spawn(async move {
        let processing = states.wait_for(|s| *s == AppState::Processing).await.is_ok();
        if processing {
            eprintln!("Consulting the council...");
        }
    });

    let result = council
        .run_analysis(chunk_writer(std::io::stdout(), cancel))
        .await;

    if council.has_output() {
        let _ = writeln!(std::io::stdout());
    }

    if council.state() == AppState::ConfigurationRequired {
        eprintln!("Run again with --base-url and --api-key (add --save to remember them).");
    }

    result
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    if args.list_options {
        print_options();
        return ExitCode::SUCCESS;
    }

    let logging = LoggingConfig::new()
        .with_level(LogLevel::from_verbosity(args.verbose))
        .with_format(args.log_format);
    if let Err(e) = init_logging(&logging) {
        eprintln!("warning: {}", e);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(CouncilError::Cancelled) => {
            eprintln!("Cancelled.");
            ExitCode::from(130)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            if e.needs_configuration() {
                eprintln!("Failed to generate report. Please check your API key or connection.");
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_chunk_writer_writes_in_order() {
        let cancel = CancellationToken::new();
        let mut out = Vec::new();
        {
            let mut write = chunk_writer(&mut out, cancel.clone());
            write("第");
            write("一部分");
        }

        assert_eq!(String::from_utf8(out).unwrap(), "第一部分");
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn test_closed_output_cancels_run() {
        let cancel = CancellationToken::new();
        let mut write = chunk_writer(ClosedPipe, cancel.clone());

        write("诊断");

        assert!(cancel.is_cancelled());
    }
}

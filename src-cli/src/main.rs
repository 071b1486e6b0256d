mod cli;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info};

use confsync::config::{load_config, load_config_or_default, validate_config, DEFAULT_CONFIG_FILE};
use confsync::processor::{error_queue, run_once, IntervalProcessor, Processor, WatchProcessor};
use confsync::{BackendRegistry, Config, ConfsyncError, ResourceLoader, TemplateResource};

use cli::Cli;

const EXIT_FAILURE: u8 = 1;
const EXIT_STARTUP: u8 = 2;

fn load_settings(cli: &Cli) -> Result<Config, ConfsyncError> {
    let mut config = match &cli.config_file {
        Some(path) => load_config(path)?,
        None => load_config_or_default(DEFAULT_CONFIG_FILE)?,
    };
    cli.apply(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_settings(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("confsync: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("confsync: failed to initialize logging: {}", e);
        return ExitCode::from(EXIT_STARTUP);
    }

    info!("Starting confsync v{}", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    runtime.block_on(run(config))
}

async fn run(config: Config) -> ExitCode {
    let client = match BackendRegistry::default().create(&config) {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(EXIT_STARTUP);
        }
    };

    let loaded = ResourceLoader::new(&config).load();
    let invalid = loaded.errors.len();
    let resources: Vec<Arc<TemplateResource>> = loaded
        .resources
        .into_iter()
        .map(|resource| {
            Arc::new(TemplateResource::new(
                resource,
                Arc::clone(&client),
                config.noop,
            ))
        })
        .collect();

    if config.onetime {
        let failures = run_once(&resources).await + invalid;
        if failures > 0 {
            error!("{} resource(s) failed", failures);
            return ExitCode::from(EXIT_FAILURE);
        }
        return ExitCode::SUCCESS;
    }

    let (trigger, shutdown) = confsync::shutdown::channel();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        trigger.trigger();
    }) {
        error!("Failed to install signal handler: {}", e);
        return ExitCode::from(EXIT_STARTUP);
    }

    let (errors, mut error_rx) = error_queue();
    let reporter = tokio::spawn(async move {
        while let Some(failure) = error_rx.recv().await {
            error!("{}", failure);
        }
    });

    let mut processor: Box<dyn Processor> = if config.watch {
        Box::new(WatchProcessor::new(resources, errors, shutdown))
    } else {
        Box::new(IntervalProcessor::new(
            resources,
            config.interval_duration(),
            errors,
            shutdown,
        ))
    };

    processor.process().await;
    drop(processor);
    let _ = reporter.await;

    info!("confsync stopped");
    ExitCode::SUCCESS
}

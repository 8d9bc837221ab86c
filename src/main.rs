use std::process;

use serde_json::json;
use stowage::{
    CacheError,
    config::{self, Command, LoadError, Settings},
    service::StorageAdapterFactory,
    storage::Storage,
    telemetry::{self, TelemetryError},
};
use thiserror::Error;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[derive(Debug, Error)]
enum AppError {
    #[error("failed to load configuration: {0}")]
    Config(#[from] LoadError),
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

fn main() {
    if let Err(error) = run() {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;
    let command = cli_args.command.unwrap_or(Command::Validate);

    telemetry::init(&settings.logging)?;
    let factory = StorageAdapterFactory::default();

    match command {
        Command::Validate => run_validate(&factory, &settings),
        Command::Capabilities => run_capabilities(&factory, &settings),
        Command::Registry => run_registry(&factory),
    }
}

fn run_validate(factory: &StorageAdapterFactory, settings: &Settings) -> Result<(), AppError> {
    factory.create_from_array_configuration(&settings.storage)?;

    info!(adapter = %settings.storage["adapter"], "storage configuration is valid");
    println!("storage configuration is valid");
    Ok(())
}

fn run_capabilities(factory: &StorageAdapterFactory, settings: &Settings) -> Result<(), AppError> {
    let mut storage = factory.create_from_array_configuration(&settings.storage)?;
    let capabilities = storage.capabilities()?;
    println!("{}", serde_json::to_string_pretty(&capabilities)?);
    Ok(())
}

fn run_registry(factory: &StorageAdapterFactory) -> Result<(), AppError> {
    let listing = json!({
        "adapters": factory.adapters().names(),
        "plugins": factory.plugins().registry().names(),
        "serializers": factory.plugins().serializers().names(),
    });
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

use std::{process, sync::Arc};

use multicache::{
    application::{error::AppError, users::UserDirectory},
    cache::{BatchCache, CacheFacade, JsonCodec},
    config,
    infra::{error::InfraError, http, memory::InMemoryStore, telemetry},
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
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

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = Arc::new(InMemoryStore::new());
    let facade = Arc::new(CacheFacade::new(
        store,
        Arc::new(JsonCodec),
        settings.cache.default_ttl,
    ));
    let engine = Arc::new(BatchCache::new(facade.clone()));
    let users = Arc::new(UserDirectory::new(facade, engine));

    let router = http::build_router(http::AppState { users });

    let listener = tokio::net::TcpListener::bind(settings.server.listen)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "multicache::serve",
        addr = %settings.server.listen,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

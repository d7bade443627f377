use std::{process, sync::Arc};

use canopy::{
    application::{
        content::{ContentRegistry, ContentRepos, DispatchService, DispatchSettings},
        error::AppError,
        pages::PageMaintenanceService,
        permalink::PermalinkService,
        remote::{PrefetchReport, RemoteCache, RemoteCacheSettings},
        repos::{
            ArticlesRepo, CachedResourcesRepo, EventsRepo, MediaRepo, PagesRepo, PagesWriteRepo,
        },
        syndication::SyndicationService,
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        memory::InMemoryRepositories,
        remote::HttpFetcher,
        telemetry,
    },
};
use tokio::{
    sync::Notify,
    task::{JoinError, JoinHandle},
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const SOURCE: &str = "canopy::main";

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
        config::Command::Prefetch(_) => run_prefetch(settings).await,
        config::Command::Pages(args) => run_pages(settings, args.command).await,
    }
}

/// Repository handles shared by every command.
struct Repositories {
    pages: Arc<dyn PagesRepo>,
    pages_write: Arc<dyn PagesWriteRepo>,
    articles: Arc<dyn ArticlesRepo>,
    events: Arc<dyn EventsRepo>,
    media: Arc<dyn MediaRepo>,
    resources: Arc<dyn CachedResourcesRepo>,
    db: Option<Arc<PostgresRepositories>>,
}

impl Repositories {
    fn from_store<S>(store: Arc<S>, db: Option<Arc<PostgresRepositories>>) -> Self
    where
        S: PagesRepo
            + PagesWriteRepo
            + ArticlesRepo
            + EventsRepo
            + MediaRepo
            + CachedResourcesRepo
            + 'static,
    {
        Self {
            pages: store.clone(),
            pages_write: store.clone(),
            articles: store.clone(),
            events: store.clone(),
            media: store.clone(),
            resources: store,
            db,
        }
    }
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        warn!(
            target = SOURCE,
            "database url is not configured; using the in-memory store"
        );
        return Ok(Repositories::from_store(
            Arc::new(InMemoryRepositories::new()),
            None,
        ));
    };

    let max_connections = settings.database.max_connections.get();
    let pool = PostgresRepositories::connect(database_url, max_connections)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let store = Arc::new(PostgresRepositories::new(pool));
    Ok(Repositories::from_store(store.clone(), Some(store)))
}

fn build_remote_cache(
    settings: &config::Settings,
    resources: Arc<dyn CachedResourcesRepo>,
) -> Result<RemoteCache, AppError> {
    let remote = &settings.remote;
    let fetcher = HttpFetcher::new(remote.timeout, &remote.user_agent).map_err(AppError::from)?;
    let to_time = |key: &str, value: std::time::Duration| {
        time::Duration::try_from(value)
            .map_err(|err| AppError::from(InfraError::configuration(format!("{key}: {err}"))))
    };

    let cache_settings = RemoteCacheSettings {
        ttl: to_time("remote.ttl_seconds", remote.ttl)?,
        prefetch_ttl: to_time("remote.prefetch_ttl_seconds", remote.prefetch_ttl)?,
        prefetch_concurrency: remote.prefetch_concurrency.get() as usize,
    };

    Ok(RemoteCache::new(resources, Arc::new(fetcher), cache_settings))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repos = init_repositories(&settings).await?;

    let registry = ContentRegistry::standard(ContentRepos {
        articles: repos.articles.clone(),
        events: repos.events.clone(),
        media: repos.media.clone(),
    })
    .map_err(|err| AppError::unexpected(format!("failed to register content types: {err}")))?;

    let dispatch = DispatchService::new(
        repos.pages.clone(),
        Arc::new(registry),
        DispatchSettings {
            append_slash: settings.dispatch.append_slash,
            pagination_key: settings.dispatch.pagination_key.clone(),
        },
    );
    let permalinks = PermalinkService::new(
        repos.pages.clone(),
        repos.articles.clone(),
        repos.events.clone(),
        repos.media.clone(),
    );
    let syndication = SyndicationService::new(
        repos.pages.clone(),
        repos.articles.clone(),
        repos.events.clone(),
        settings.site.name.clone(),
        &settings.site.public_url,
    );

    let state = HttpState {
        dispatch: Arc::new(dispatch),
        permalinks: Arc::new(permalinks),
        syndication: Arc::new(syndication),
        site_name: Arc::from(settings.site.name.as_str()),
        db: repos.db.clone(),
    };

    let prefetch_handle = match settings.remote.prefetch_interval {
        Some(interval) => {
            let cache = build_remote_cache(&settings, repos.resources.clone())?;
            Some(spawn_prefetch_loop(cache, interval))
        }
        None => None,
    };

    let result = serve_http(&settings, state).await;

    if let Some(handle) = prefetch_handle {
        handle.abort();
        report_prefetch_exit(handle.await);
    }

    result
}

fn spawn_prefetch_loop(cache: RemoteCache, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match cache.prefetch(None).await {
                Ok(report) => info!(
                    target = SOURCE,
                    refreshed = report.refreshed,
                    skipped = report.skipped,
                    failed = report.failed,
                    "background prefetch finished"
                ),
                Err(err) => warn!(target = SOURCE, error = %err, "background prefetch failed"),
            }
        }
    })
}

/// Logs a panic in the prefetch task. Cancellation is the normal exit.
fn report_prefetch_exit(result: Result<(), JoinError>) -> bool {
    match result {
        Err(err) if err.is_panic() => {
            error!(target = SOURCE, error = %err, "background prefetch task panicked");
            true
        }
        _ => false,
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = SOURCE, addr = %settings.server.addr, "listening");

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown({
        let shutdown = shutdown.clone();
        async move { shutdown.notified().await }
    });

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = async {
            wait_for_signal().await;
            info!(target = SOURCE, grace_secs = grace.as_secs(), "shutting down");
            shutdown.notify_one();
            tokio::time::sleep(grace).await;
        } => {
            warn!(target = SOURCE, "graceful shutdown timed out; dropping open connections");
        }
    }

    Ok(())
}

async fn wait_for_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = SOURCE, error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

async fn run_prefetch(settings: config::Settings) -> Result<(), AppError> {
    let repos = init_repositories(&settings).await?;
    let cache = build_remote_cache(&settings, repos.resources)?;

    let report = cache
        .prefetch(None)
        .await
        .map_err(|err| AppError::unexpected(format!("prefetch failed: {err}")))?;

    print_prefetch_report(&report);
    if report.failed > 0 {
        return Err(AppError::unexpected(format!(
            "{} remote resources failed to refresh",
            report.failed
        )));
    }
    Ok(())
}

fn print_prefetch_report(report: &PrefetchReport) {
    println!(
        "refreshed: {}\nskipped:   {}\nfailed:    {}",
        report.refreshed, report.skipped, report.failed
    );
}

async fn run_pages(
    settings: config::Settings,
    command: config::PagesCommand,
) -> Result<(), AppError> {
    let repos = init_repositories(&settings).await?;
    let service = PageMaintenanceService::new(repos.pages, repos.pages_write);

    match command {
        config::PagesCommand::Swap { first, second } => {
            service.swap_order(first, second).await?;
            println!("swapped {first} and {second}");
        }
        config::PagesCommand::Delete { id } => {
            let removed = service.delete(id).await?;
            println!("deleted {removed} page(s)");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn prefetch_task_panics_are_reported() {
        let handle = tokio::spawn(async { panic!("prefetch loop failed") });
        assert!(report_prefetch_exit(handle.await));
    }

    #[tokio::test]
    async fn aborted_prefetch_task_is_a_clean_exit() {
        let handle = tokio::spawn(std::future::pending::<()>());
        handle.abort();
        assert!(!report_prefetch_exit(handle.await));

        let finished = tokio::spawn(async {});
        assert!(!report_prefetch_exit(finished.await));
    }
}

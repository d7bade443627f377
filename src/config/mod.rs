//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

pub use cli::{
    CliArgs, Command, DatabaseOverride, PagesArgs, PagesCommand, PrefetchArgs, ServeArgs,
    ServeOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "canopy";
const ENV_PREFIX: &str = "CANOPY";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_PAGINATION_KEY: &str = "page";
const DEFAULT_REMOTE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_REMOTE_PREFETCH_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REMOTE_PREFETCH_CONCURRENCY: u32 = 4;
const DEFAULT_USER_AGENT: &str = concat!("canopy/", env!("CARGO_PKG_VERSION"));
const DEFAULT_SITE_NAME: &str = "Canopy";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub dispatch: DispatchConfig,
    pub remote: RemoteSettings,
    pub site: SiteSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Absent means the in-memory store.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub append_slash: bool,
    pub pagination_key: String,
}

#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub ttl: Duration,
    pub prefetch_ttl: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    pub prefetch_concurrency: NonZeroU32,
    /// Background prefetch cadence while serving; `None` disables it.
    pub prefetch_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub name: String,
    /// Absolute origin used for links in syndication feeds.
    pub public_url: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_command(cli.command.as_ref());
    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    dispatch: RawDispatchSettings,
    remote: RawRemoteSettings,
    site: RawSiteSettings,
}

impl RawSettings {
    fn apply_command(&mut self, command: Option<&Command>) {
        match command {
            Some(Command::Serve(args)) => self.apply_serve_overrides(&args.overrides),
            Some(Command::Prefetch(args)) => {
                self.apply_database_override(&args.database);
                if let Some(concurrency) = args.concurrency {
                    self.remote.prefetch_concurrency = Some(concurrency);
                }
            }
            Some(Command::Pages(args)) => self.apply_database_override(&args.database),
            None => self.apply_serve_overrides(&ServeOverrides::default()),
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(append_slash) = overrides.append_slash {
            self.dispatch.append_slash = Some(append_slash);
        }
        if let Some(seconds) = overrides.prefetch_interval_seconds {
            self.remote.prefetch_interval_seconds = Some(seconds);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            dispatch,
            remote,
            site,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let dispatch = build_dispatch_settings(dispatch)?;
        let remote = build_remote_settings(remote)?;
        let site = build_site_settings(site, &server)?;

        Ok(Self {
            server,
            logging,
            database,
            dispatch,
            remote,
            site,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_dispatch_settings(dispatch: RawDispatchSettings) -> Result<DispatchConfig, LoadError> {
    let pagination_key = dispatch
        .pagination_key
        .unwrap_or_else(|| DEFAULT_PAGINATION_KEY.to_string());
    if pagination_key.trim().is_empty() {
        return Err(LoadError::invalid(
            "dispatch.pagination_key",
            "must not be empty",
        ));
    }

    Ok(DispatchConfig {
        append_slash: dispatch.append_slash.unwrap_or(true),
        pagination_key,
    })
}

fn build_remote_settings(remote: RawRemoteSettings) -> Result<RemoteSettings, LoadError> {
    let ttl = remote.ttl_seconds.unwrap_or(DEFAULT_REMOTE_TTL_SECS);
    let prefetch_ttl = remote
        .prefetch_ttl_seconds
        .unwrap_or(DEFAULT_REMOTE_PREFETCH_TTL_SECS);
    if prefetch_ttl == 0 {
        return Err(LoadError::invalid(
            "remote.prefetch_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let timeout = remote.timeout_seconds.unwrap_or(DEFAULT_REMOTE_TIMEOUT_SECS);
    if timeout == 0 {
        return Err(LoadError::invalid(
            "remote.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let user_agent = remote
        .user_agent
        .filter(|agent| !agent.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    let prefetch_concurrency = non_zero_u32(
        remote
            .prefetch_concurrency
            .unwrap_or(DEFAULT_REMOTE_PREFETCH_CONCURRENCY)
            .into(),
        "remote.prefetch_concurrency",
    )?;

    let prefetch_interval = match remote.prefetch_interval_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "remote.prefetch_interval_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(RemoteSettings {
        ttl: Duration::from_secs(ttl),
        prefetch_ttl: Duration::from_secs(prefetch_ttl),
        timeout: Duration::from_secs(timeout),
        user_agent,
        prefetch_concurrency,
        prefetch_interval,
    })
}

fn build_site_settings(
    site: RawSiteSettings,
    server: &ServerSettings,
) -> Result<SiteSettings, LoadError> {
    let name = site
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SITE_NAME.to_string());

    let public_url = match site.public_url {
        Some(raw) => {
            let parsed = Url::parse(raw.trim())
                .map_err(|err| LoadError::invalid("site.public_url", err.to_string()))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(LoadError::invalid(
                    "site.public_url",
                    "scheme must be http or https",
                ));
            }
            parsed.as_str().trim_end_matches('/').to_string()
        }
        None => format!("http://{}", server.addr),
    };

    Ok(SiteSettings { name, public_url })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDispatchSettings {
    append_slash: Option<bool>,
    pagination_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRemoteSettings {
    ttl_seconds: Option<u64>,
    prefetch_ttl_seconds: Option<u64>,
    timeout_seconds: Option<u64>,
    user_agent: Option<String>,
    prefetch_concurrency: Option<u32>,
    prefetch_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    name: Option<String>,
    public_url: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

//! Durable cache in front of remote HTTP resources.
//!
//! [`RemoteCache::fetch`] returns remote content, optionally serving it from
//! the `cached_resources` store while it is younger than the configured TTL.
//! Each cached access can keep the record enrolled for batch prefetch, which
//! [`RemoteCache::prefetch`] uses to refresh every enrolled record in one run.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use metrics::counter;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};
use url::Url;

use crate::application::repos::{CachedResourcesRepo, RepoError, StoreResourceParams};
use crate::domain::entities::CachedResourceRecord;

const SOURCE: &str = "application::remote::RemoteCache";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Fully resolved request handed to a [`RemoteFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub method: Method,
    /// Target URL; for `GET` the parameters are already in its query.
    pub url: String,
    /// Form fields sent as the body of a `POST`.
    pub form: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to `{url}` timed out")]
    Timeout { url: String },
    #[error("request to `{url}` failed: {message}")]
    Failed { url: String, message: String },
}

/// Network collaborator performing one live request.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, request: &RemoteRequest) -> Result<FetchedResponse, TransportError>;
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("invalid remote url `{url}`: {message}")]
    InvalidUrl { url: String, message: String },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("`{url}` responded with status {status}")]
    Status { url: String, status: u16 },
    #[error("cached resource store failed: {0}")]
    Store(#[from] RepoError),
}

/// One live network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchLogEntry {
    pub method: Method,
    pub url: String,
    /// `None` when the transport failed.
    pub status: Option<u16>,
    pub at: OffsetDateTime,
}

#[derive(Debug, Default)]
pub struct FetchLog {
    entries: Vec<FetchLogEntry>,
}

impl FetchLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[FetchLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn record(&mut self, entry: FetchLogEntry) {
        self.entries.push(entry);
    }
}

/// Per-call options for [`RemoteCache::fetch`].
///
/// `use_prefetch` only has an effect together with `use_cache`, and `POST`
/// requests always bypass the cache.
#[derive(Debug)]
pub struct FetchOptions<'a> {
    pub use_cache: bool,
    pub use_prefetch: bool,
    pub require_success: bool,
    pub method: Method,
    pub params: Vec<(String, String)>,
    pub log: Option<&'a mut FetchLog>,
}

impl Default for FetchOptions<'_> {
    fn default() -> Self {
        Self {
            use_cache: false,
            use_prefetch: false,
            require_success: true,
            method: Method::Get,
            params: Vec::new(),
            log: None,
        }
    }
}

impl<'a> FetchOptions<'a> {
    pub fn cached() -> Self {
        Self {
            use_cache: true,
            ..Self::default()
        }
    }

    pub fn prefetched() -> Self {
        Self {
            use_cache: true,
            use_prefetch: true,
            ..Self::default()
        }
    }

    pub fn allow_errors(mut self) -> Self {
        self.require_success = false;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn post(mut self) -> Self {
        self.method = Method::Post;
        self
    }

    pub fn with_log(mut self, log: &'a mut FetchLog) -> Self {
        self.log = Some(log);
        self
    }
}

/// Remote content as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    pub url: String,
    pub status: u16,
    pub body: Vec<u8>,
    pub from_cache: bool,
}

impl RemoteResource {
    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PrefetchReport {
    pub refreshed: usize,
    /// Records whose prefetch expiry had passed.
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RemoteCacheSettings {
    pub ttl: Duration,
    pub prefetch_ttl: Duration,
    pub prefetch_concurrency: usize,
}

impl Default for RemoteCacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(1),
            prefetch_ttl: Duration::days(7),
            prefetch_concurrency: 4,
        }
    }
}

#[derive(Clone)]
pub struct RemoteCache {
    store: Arc<dyn CachedResourcesRepo>,
    fetcher: Arc<dyn RemoteFetcher>,
    settings: RemoteCacheSettings,
}

impl RemoteCache {
    pub fn new(
        store: Arc<dyn CachedResourcesRepo>,
        fetcher: Arc<dyn RemoteFetcher>,
        settings: RemoteCacheSettings,
    ) -> Self {
        Self {
            store,
            fetcher,
            settings,
        }
    }

    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions<'_>,
    ) -> Result<RemoteResource, RemoteError> {
        self.fetch_at(url, options, OffsetDateTime::now_utc()).await
    }

    /// [`fetch`](Self::fetch) against an explicit clock reading.
    pub async fn fetch_at(
        &self,
        url: &str,
        options: FetchOptions<'_>,
        now: OffsetDateTime,
    ) -> Result<RemoteResource, RemoteError> {
        let FetchOptions {
            use_cache,
            use_prefetch,
            require_success,
            method,
            params,
            mut log,
        } = options;

        let request = build_request(url, method, params)?;

        if !use_cache || method == Method::Post {
            let response = self.live(&request, log.as_deref_mut(), now).await?;
            return finish(request.url, response.status, response.body, false, require_success);
        }

        match self.store.find_resource(&request.url).await? {
            Some(record) if !record.is_stale(now, self.settings.ttl) => {
                counter!("canopy_remote_cache_hit_total").increment(1);
                debug!(target = SOURCE, url = %record.url, "serving cached resource");
                if use_prefetch {
                    self.store
                        .renew_prefetch(record.id, now + self.settings.prefetch_ttl)
                        .await?;
                }
                let CachedResourceRecord {
                    url,
                    payload,
                    status,
                    ..
                } = record;
                finish(url, status, payload, true, require_success)
            }
            existing => {
                if existing.is_some() {
                    counter!("canopy_remote_cache_refresh_total").increment(1);
                } else {
                    counter!("canopy_remote_cache_miss_total").increment(1);
                }

                let response = self.live(&request, log.as_deref_mut(), now).await?;
                self.store
                    .upsert_resource(StoreResourceParams {
                        url: request.url.clone(),
                        payload: response.body.clone(),
                        status: response.status,
                        fetched_at: now,
                        prefetch_expires_at: now + self.settings.prefetch_ttl,
                    })
                    .await?;
                finish(request.url, response.status, response.body, false, require_success)
            }
        }
    }

    pub async fn prefetch(&self, log: Option<&mut FetchLog>) -> Result<PrefetchReport, RemoteError> {
        self.prefetch_at(log, OffsetDateTime::now_utc()).await
    }

    /// Refresh every stored record that is still enrolled for prefetch,
    /// regardless of staleness. Each refresh resets the record's prefetch
    /// expiry to `now + prefetch_ttl`.
    pub async fn prefetch_at(
        &self,
        mut log: Option<&mut FetchLog>,
        now: OffsetDateTime,
    ) -> Result<PrefetchReport, RemoteError> {
        let records = self.store.list_resources().await?;
        let mut report = PrefetchReport::default();

        let eligible: Vec<CachedResourceRecord> = records
            .into_iter()
            .filter(|record| {
                let keep = !record.is_prefetch_expired(now);
                if !keep {
                    report.skipped += 1;
                }
                keep
            })
            .collect();

        let fetcher = &self.fetcher;
        let results: Vec<_> = stream::iter(eligible)
            .map(|record| async move {
                let request = RemoteRequest {
                    method: Method::Get,
                    url: record.url.clone(),
                    form: Vec::new(),
                };
                let outcome = fetcher.fetch(&request).await;
                (record, outcome)
            })
            .buffer_unordered(self.settings.prefetch_concurrency.max(1))
            .collect()
            .await;

        for (record, outcome) in results {
            let status = outcome.as_ref().ok().map(|response| response.status);
            if let Some(log) = log.as_deref_mut() {
                log.record(FetchLogEntry {
                    method: Method::Get,
                    url: record.url.clone(),
                    status,
                    at: now,
                });
            }

            let response = match outcome {
                Ok(response) => response,
                Err(err) => {
                    counter!("canopy_remote_prefetch_failed_total").increment(1);
                    warn!(target = SOURCE, url = %record.url, error = %err, "prefetch fetch failed");
                    report.failed += 1;
                    continue;
                }
            };

            if !is_success(response.status) {
                warn!(
                    target = SOURCE,
                    url = %record.url,
                    status = response.status,
                    "prefetch stored a non-success response"
                );
            }

            match self
                .store
                .refresh_resource(
                    record.id,
                    response.body,
                    response.status,
                    now,
                    now + self.settings.prefetch_ttl,
                )
                .await
            {
                Ok(()) => {
                    counter!("canopy_remote_prefetch_refreshed_total").increment(1);
                    report.refreshed += 1;
                }
                Err(err) => {
                    counter!("canopy_remote_prefetch_failed_total").increment(1);
                    warn!(target = SOURCE, url = %record.url, error = %err, "prefetch store update failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            target = SOURCE,
            refreshed = report.refreshed,
            skipped = report.skipped,
            failed = report.failed,
            "prefetch finished"
        );
        Ok(report)
    }

    async fn live(
        &self,
        request: &RemoteRequest,
        log: Option<&mut FetchLog>,
        now: OffsetDateTime,
    ) -> Result<FetchedResponse, RemoteError> {
        let outcome = self.fetcher.fetch(request).await;

        if let Some(log) = log {
            log.record(FetchLogEntry {
                method: request.method,
                url: request.url.clone(),
                status: outcome.as_ref().ok().map(|response| response.status),
                at: now,
            });
        }

        match &outcome {
            Ok(response) => debug!(
                target = SOURCE,
                method = request.method.as_str(),
                url = %request.url,
                status = response.status,
                "fetched remote resource"
            ),
            Err(err) => warn!(
                target = SOURCE,
                method = request.method.as_str(),
                url = %request.url,
                error = %err,
                "remote fetch failed"
            ),
        }

        Ok(outcome?)
    }
}

fn build_request(
    url: &str,
    method: Method,
    params: Vec<(String, String)>,
) -> Result<RemoteRequest, RemoteError> {
    let mut parsed = Url::parse(url).map_err(|err| RemoteError::InvalidUrl {
        url: url.to_string(),
        message: err.to_string(),
    })?;

    match method {
        Method::Get => {
            if !params.is_empty() {
                parsed.query_pairs_mut().extend_pairs(params.iter());
            }
            Ok(RemoteRequest {
                method,
                url: parsed.into(),
                form: Vec::new(),
            })
        }
        Method::Post => Ok(RemoteRequest {
            method,
            url: parsed.into(),
            form: params,
        }),
    }
}

fn finish(
    url: String,
    status: u16,
    body: Vec<u8>,
    from_cache: bool,
    require_success: bool,
) -> Result<RemoteResource, RemoteError> {
    if require_success && !is_success(status) {
        return Err(RemoteError::Status { url, status });
    }
    Ok(RemoteResource {
        url,
        status,
        body,
        from_cache,
    })
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode, Uri,
        header::{CONTENT_TYPE, LOCATION},
    },
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use metrics::counter;
use tracing::error;

use crate::{
    application::{
        content::{ContentResponse, DispatchFailure, DispatchService, QueryParams},
        error::{AppError, ErrorReport},
        permalink::PermalinkService,
        syndication::SyndicationService,
    },
    infra::db::PostgresRepositories,
    presentation::views::render_page_response,
};

use super::{
    db_health_response,
    middleware::{log_responses, set_request_context},
};

const SOURCE: &str = "infra::http::public";
const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub dispatch: Arc<DispatchService>,
    pub permalinks: Arc<PermalinkService>,
    pub syndication: Arc<SyndicationService>,
    pub site_name: Arc<str>,
    /// `None` when serving from the in-memory store.
    pub db: Option<Arc<PostgresRepositories>>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(public_health))
        .route("/feed/{kind}/{page_id}/", get(feed))
        .route("/feed/{kind}/{page_id}", get(append_slash))
        .route("/r/{content_type}/{object_id}/", get(permalink))
        .route("/r/{content_type}/{object_id}", get(append_slash))
        .fallback(dispatch_page)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn dispatch_page(State(state): State<HttpState>, uri: Uri) -> Response {
    let query = QueryParams::parse(uri.query());

    match state.dispatch.dispatch(uri.path(), &query).await {
        Ok(ContentResponse::Page(page)) => {
            render_page_response(*page, &state.site_name, StatusCode::OK)
        }
        Ok(ContentResponse::Redirect {
            location,
            permanent,
        }) => redirect_response(&location, permanent),
        Err(failure) => failure_response(failure, &state.site_name),
    }
}

async fn feed(
    State(state): State<HttpState>,
    Path((kind, page_id)): Path<(String, String)>,
) -> Response {
    match state.syndication.feed(&kind, &page_id).await {
        Ok(body) => xml_response(body),
        Err(err) => err.into_response(),
    }
}

async fn permalink(
    State(state): State<HttpState>,
    Path((content_type, object_id)): Path<(String, String)>,
) -> Response {
    match state.permalinks.resolve(&content_type, &object_id).await {
        Ok(location) => redirect_response(&location, false),
        Err(err) => err.into_response(),
    }
}

/// Slash-less variants of the fixed routes.
async fn append_slash(State(state): State<HttpState>, uri: Uri) -> Response {
    if !state.dispatch.settings().append_slash {
        return AppError::not_found(format!("no route matches `{}`", uri.path())).into_response();
    }

    let location = match uri.query() {
        Some(query) => format!("{}/?{query}", uri.path()),
        None => format!("{}/", uri.path()),
    };
    redirect_response(&location, true)
}

async fn public_health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn failure_response(failure: DispatchFailure, site_name: &str) -> Response {
    let DispatchFailure { error, error_page } = failure;
    let status = error.status_code();

    match error_page {
        Some(page) => {
            let mut response = render_page_response(page, site_name, status);
            ErrorReport::from_error(SOURCE, status, &error).attach(&mut response);
            response
        }
        None => error.into_response(),
    }
}

fn redirect_response(location: &str, permanent: bool) -> Response {
    let status = if permanent {
        StatusCode::MOVED_PERMANENTLY
    } else {
        StatusCode::FOUND
    };
    let value = match HeaderValue::from_str(location) {
        Ok(value) => value,
        Err(err) => {
            error!(target = SOURCE, location, error = %err, "redirect target is not a valid header");
            return AppError::unexpected(format!("invalid redirect target `{location}`"))
                .into_response();
        }
    };

    counter!(
        "canopy_http_redirect_total",
        "kind" => if permanent { "permanent" } else { "found" }
    )
    .increment(1);

    let mut response = status.into_response();
    response.headers_mut().insert(LOCATION, value);
    response
}

fn xml_response(body: String) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(RSS_CONTENT_TYPE));
    response
}

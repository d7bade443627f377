//! Live HTTP transport for the remote resource cache.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::CONTENT_TYPE};
use tracing::debug;

use crate::application::remote::{
    FetchedResponse, Method, RemoteFetcher, RemoteRequest, TransportError,
};
use crate::infra::error::InfraError;

const SOURCE: &str = "infra::remote::HttpFetcher";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, InfraError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, request: &RemoteRequest) -> Result<FetchedResponse, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self
                .client
                .post(&request.url)
                .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
                .body(encode_form(&request.form)),
        };

        let response = builder
            .send()
            .await
            .map_err(|err| transport_error(&request.url, err))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|err| transport_error(&request.url, err))?;

        debug!(
            target = SOURCE,
            method = request.method.as_str(),
            url = %request.url,
            status,
            bytes = body.len(),
            "remote request completed"
        );

        Ok(FetchedResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn encode_form(fields: &[(String, String)]) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter().map(|(key, value)| (key.as_str(), value.as_str())))
        .finish()
}

fn transport_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else {
        TransportError::Failed {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

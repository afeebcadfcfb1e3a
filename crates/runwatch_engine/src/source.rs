use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use url::Url;

use crate::{ChannelError, SupervisorSettings};

pub type ByteStream = BoxStream<'static, Result<Bytes, ChannelError>>;

/// Transport used by the channels. Implemented over HTTP by [`ReqwestSource`];
/// tests substitute scripted sources.
#[async_trait::async_trait]
pub trait StreamSource: Send + Sync {
    /// Opens a long-lived streaming GET.
    async fn open(&self, url: &Url) -> Result<ByteStream, ChannelError>;

    /// One-shot GET returning the full body.
    async fn fetch(&self, url: &Url) -> Result<Bytes, ChannelError>;

    /// One-shot POST with an empty body.
    async fn post(&self, url: &Url) -> Result<Bytes, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSource {
    /// No overall timeout: the streams stay open for the whole run.
    streaming: reqwest::Client,
    requests: reqwest::Client,
}

impl ReqwestSource {
    pub fn new(settings: &SupervisorSettings) -> Result<Self, ChannelError> {
        let streaming = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        let requests = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self {
            streaming,
            requests,
        })
    }
}

#[async_trait::async_trait]
impl StreamSource for ReqwestSource {
    async fn open(&self, url: &Url) -> Result<ByteStream, ChannelError> {
        let response = self
            .streaming
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChannelError::HttpStatus(status.as_u16()));
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }

    async fn fetch(&self, url: &Url) -> Result<Bytes, ChannelError> {
        let response = self
            .requests
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_body(response).await
    }

    async fn post(&self, url: &Url) -> Result<Bytes, ChannelError> {
        let response = self
            .requests
            .post(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        read_body(response).await
    }
}

async fn read_body(response: reqwest::Response) -> Result<Bytes, ChannelError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ChannelError::HttpStatus(status.as_u16()));
    }
    response.bytes().await.map_err(map_reqwest_error)
}

fn map_reqwest_error(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        return ChannelError::Timeout;
    }
    if err.is_builder() {
        return ChannelError::InvalidUrl(err.to_string());
    }
    ChannelError::Network(err.to_string())
}

use runwatch_core::RunSummary;
use url::Url;

use crate::{ChannelError, StreamSource};

/// Fetches and parses the run-summary document.
pub async fn fetch_summary(source: &dyn StreamSource, url: &Url) -> Result<RunSummary, ChannelError> {
    let body = source.fetch(url).await?;
    let text = std::str::from_utf8(&body).map_err(|err| ChannelError::Decode(err.to_string()))?;
    RunSummary::from_json_str(text)
        .ok_or_else(|| ChannelError::Decode("not a run summary document".to_string()))
}

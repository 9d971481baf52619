// ABOUTME: Provider exchange implementations and the helpers they share.
// ABOUTME: Data-URL handling and HTTP status mapping live here; wire shapes live per provider.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod openai_image;
pub mod openai_responses;

pub use anthropic::AnthropicExchange;
pub use gemini::GeminiExchange;
pub use openai::OpenAiChatExchange;
pub use openai_image::OpenAiImage;
pub use openai_responses::OpenAiResponsesExchange;

use tokio_util::sync::CancellationToken;

use crate::api::AdapterError;

/// data:[<media-type>][;base64],<data>
pub fn data_url(mime: &str, base64_data: &str) -> String {
    format!("data:{mime};base64,{base64_data}")
}

/// Split a base64 data URL into (media type, base64 payload).
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (mime, data) = rest.split_once(";base64,")?;
    if mime.is_empty() { None } else { Some((mime, data)) }
}

/// Map non-success provider statuses to transport errors, keeping the body
/// for diagnosis. Rate limiting and bad credentials get dedicated messages.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    provider: &str,
) -> Result<reqwest::Response, AdapterError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(AdapterError::Transport(format!("{provider}: rate limited")));
    }
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(AdapterError::Transport(format!(
            "{provider}: unauthorized, check the api key"
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AdapterError::Transport(format!(
            "{provider}: api error {status}: {body}"
        )));
    }
    Ok(response)
}

/// Await a provider round trip, returning early when the caller cancels.
pub(crate) async fn await_cancellable<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, reqwest::Error>>,
) -> Result<T, AdapterError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AdapterError::Cancelled),
        result = fut => Ok(result?),
    }
}

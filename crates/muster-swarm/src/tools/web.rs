// ABOUTME: Web tools: DuckDuckGo instant-answer search and a plain GET fetch.
// ABOUTME: Both honour cancellation; responses are clipped before feeding the model.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use muster_core::{
    Arguments, CoreError, JsonMap, Outcome, ToolHandler, ToolRegistry, ToolSpec,
};

use crate::tools::shell::clip;

const SEARCH_ENDPOINT: &str = "https://api.duckduckgo.com/";
const MAX_FETCH: usize = 100_000;

/// Flatten an instant-answer payload into a short text summary: the
/// abstract when present, otherwise related topic snippets.
pub(crate) fn parse_search_results(body: &Value, count: usize) -> String {
    let abstract_text = body
        .get("AbstractText")
        .and_then(|a| a.as_str())
        .unwrap_or("");
    if !abstract_text.is_empty() {
        return abstract_text.to_string();
    }

    let mut lines = Vec::new();
    if let Some(topics) = body.get("RelatedTopics").and_then(|t| t.as_array()) {
        for topic in topics {
            if let Some(text) = topic.get("Text").and_then(|t| t.as_str()) {
                lines.push(format!("- {text}"));
            }
            if lines.len() >= count {
                break;
            }
        }
    }
    if lines.is_empty() {
        return "no results".to_string();
    }
    lines.join("\n")
}

pub fn register_web_tools(registry: &mut ToolRegistry) -> Result<(), CoreError> {
    let client = reqwest::Client::new();

    let search_client = client.clone();
    let search: Arc<dyn ToolHandler> = Arc::new(
        move |cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let client = search_client.clone();
            Box::pin(async move {
                let view = Arguments::new(&args);
                let Some(query) = view.str("query") else {
                    return Ok(Outcome::text("missing required argument: query"));
                };
                let count = view.i64_or("count", 5).clamp(1, 25) as usize;

                let request = client
                    .get(SEARCH_ENDPOINT)
                    .query(&[("q", query), ("format", "json"), ("no_html", "1")])
                    .send();
                let response = tokio::select! {
                    _ = cancel.cancelled() => anyhow::bail!("search cancelled"),
                    resp = request => resp?,
                };
                let body: Value = response.error_for_status()?.json().await?;
                Ok(Outcome::text(parse_search_results(&body, count)))
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "web.search",
            "DuckDuckGo search; returns a short text summary of results.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query."},
                    "count": {"type": "integer", "description": "Max results, default 5."}
                },
                "required": ["query"]
            }),
        ),
        search,
    )?;

    let fetch: Arc<dyn ToolHandler> = Arc::new(
        move |cancel: CancellationToken, args: JsonMap| -> BoxFuture<'static, anyhow::Result<Outcome>> {
            let client = client.clone();
            Box::pin(async move {
                let view = Arguments::new(&args);
                let Some(url) = view.str("url") else {
                    return Ok(Outcome::text("missing required argument: url"));
                };
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Ok(Outcome::text(format!("unsupported url scheme: {url}")));
                }

                let request = client.get(url).send();
                let response = tokio::select! {
                    _ = cancel.cancelled() => anyhow::bail!("fetch cancelled"),
                    resp = request => resp?,
                };
                let text = response.error_for_status()?.text().await?;
                Ok(Outcome::text(clip(&text, MAX_FETCH)))
            })
        },
    );
    registry.register(
        ToolSpec::new(
            "web.fetch",
            "Fetch a URL and return the response body as text.",
            json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string", "description": "The http(s) URL to fetch."}
                },
                "required": ["url"]
            }),
        ),
        fetch,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abstract_text_wins_when_present() {
        let body = json!({
            "AbstractText": "Rust is a systems programming language.",
            "RelatedTopics": [{"Text": "ignored"}]
        });
        assert_eq!(
            parse_search_results(&body, 5),
            "Rust is a systems programming language."
        );
    }

    #[test]
    fn related_topics_list_when_no_abstract() {
        let body = json!({
            "AbstractText": "",
            "RelatedTopics": [
                {"Text": "first"},
                {"Text": "second"},
                {"FirstURL": "no text field"},
                {"Text": "third"}
            ]
        });
        let out = parse_search_results(&body, 2);
        assert_eq!(out, "- first\n- second");
    }

    #[test]
    fn empty_payload_reports_no_results() {
        assert_eq!(parse_search_results(&json!({}), 5), "no results");
    }

    #[tokio::test]
    async fn fetch_rejects_non_http_schemes() {
        let mut registry = ToolRegistry::new();
        register_web_tools(&mut registry).unwrap();

        let cancel = CancellationToken::new();
        let out = registry
            .run(
                &cancel,
                "web.fetch",
                json!({"url": "file:///etc/passwd"}).as_object().unwrap(),
            )
            .await
            .unwrap();
        assert!(out.value.contains("unsupported url scheme"));
    }

    #[tokio::test]
    async fn search_requires_a_query() {
        let mut registry = ToolRegistry::new();
        register_web_tools(&mut registry).unwrap();

        let cancel = CancellationToken::new();
        let out = registry
            .run(&cancel, "web.search", &JsonMap::new())
            .await
            .unwrap();
        assert!(out.value.contains("missing required argument"));
    }
}

use serde::Serialize;
use simple_search_core::SearchOutcome;

pub(crate) const SUCCESS_BANNER: &str = "Fetched data successfully:";

/// Render an outcome as the text a client reads: pretty JSON, with a banner on success.
pub(crate) fn outcome_text(outcome: &SearchOutcome) -> String {
    let json = match serde_json::to_string_pretty(outcome) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to render search outcome");
            serde_json::json!({
                "query": outcome.query(),
                "error": format!("Search failed: {e}"),
                "results": []
            })
            .to_string()
        }
    };
    if outcome.is_success() {
        format!("{SUCCESS_BANNER}\n\n{json}")
    } else {
        json
    }
}

#[derive(Serialize)]
struct TextContent<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
struct CallToolResult<'a> {
    content: [TextContent<'a>; 1],
}

/// `{"content":[{"type":"text","text":...}]}`
pub(crate) fn text_result(text: &str) -> serde_json::Value {
    let r = CallToolResult {
        content: [TextContent { kind: "text", text }],
    };
    match serde_json::to_value(r) {
        Ok(v) => v,
        Err(_) => serde_json::json!({
            "content": [{ "type": "text", "text": text }]
        }),
    }
}

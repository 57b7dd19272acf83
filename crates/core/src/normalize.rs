//! Image URL extraction and cross-origin canonicalization.
//!
//! The upstream generation providers answer in half a dozen different
//! JSON shapes. Extraction is modelled as an ordered list of pure
//! strategies, each trying one known shape; the first hit wins. The
//! resulting URLs are then canonicalized: relative paths are anchored
//! to the configured API base and absolute URLs are wrapped in the
//! same-origin proxy so browsers can load them despite CORS.

use serde_json::Value;

/// Property names probed, in priority order, when an array item is an
/// object rather than a bare URL string.
const URL_PROPERTIES: [&str; 5] = ["outputImageUrl", "url", "imageUrl", "output_url", "image_url"];

/// Path prefix of the same-origin image proxy.
pub const PROXY_PREFIX: &str = "/api/proxy?url=";

// ---------------------------------------------------------------------------
// Extraction strategies
// ---------------------------------------------------------------------------

/// One way of reading image URLs out of a provider response.
type Strategy = fn(&Value) -> Option<Vec<String>>;

/// Known provider response shapes, tried in order.
const STRATEGIES: [Strategy; 6] = [
    images_array,
    output_array,
    output_urls,
    results_output_image_urls,
    results_task_image_list,
    output_object_scan,
];

/// `{"images": [...]}` — Fashn-style flat array.
fn images_array(value: &Value) -> Option<Vec<String>> {
    collect_urls(value.get("images")?.as_array()?)
}

/// `{"output": [...]}` — direct output array.
fn output_array(value: &Value) -> Option<Vec<String>> {
    collect_urls(value.get("output")?.as_array()?)
}

/// `{"output": {"output_urls": [...]}}`.
fn output_urls(value: &Value) -> Option<Vec<String>> {
    collect_urls(value.get("output")?.get("output_urls")?.as_array()?)
}

/// `{"results": [{"outputImageUrls": [...]}]}` — Aidge flat form.
fn results_output_image_urls(value: &Value) -> Option<Vec<String>> {
    collect_urls(value.get("results")?.get(0)?.get("outputImageUrls")?.as_array()?)
}

/// `{"results": [{"taskResult": {"result": {"imageList": [...]}}}]}` —
/// deeply nested Aidge form; list items carry `imageUrl`/`url` or are
/// bare strings.
fn results_task_image_list(value: &Value) -> Option<Vec<String>> {
    let list = value
        .get("results")?
        .get(0)?
        .get("taskResult")?
        .get("result")?
        .get("imageList")?
        .as_array()?;
    collect_urls(list)
}

/// Last resort: `output` is an object with URL-looking string values.
fn output_object_scan(value: &Value) -> Option<Vec<String>> {
    let object = value.get("output")?.as_object()?;
    let urls: Vec<String> = object
        .values()
        .filter_map(|v| v.as_str())
        .filter(|s| s.starts_with("http") || s.starts_with('/'))
        .map(str::to_string)
        .collect();
    if urls.is_empty() {
        None
    } else {
        Some(urls)
    }
}

/// Map an array of heterogeneous items to URLs, dropping items no
/// strategy can read. Returns `None` for an empty result so the next
/// strategy gets a chance.
fn collect_urls(items: &[Value]) -> Option<Vec<String>> {
    let urls: Vec<String> = items.iter().filter_map(extract_item_url).collect();
    if urls.is_empty() {
        None
    } else {
        Some(urls)
    }
}

/// Extract a single URL from one response item.
///
/// Strings are taken as-is; objects are probed by [`URL_PROPERTIES`]
/// first, then scanned for any `http…` string value.
pub fn extract_item_url(item: &Value) -> Option<String> {
    match item {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(map) => {
            for prop in URL_PROPERTIES {
                if let Some(url) = map.get(prop).and_then(Value::as_str) {
                    return Some(url.to_string());
                }
            }
            map.values()
                .filter_map(Value::as_str)
                .find(|s| s.starts_with("http"))
                .map(str::to_string)
        }
        _ => None,
    }
}

/// Extract every image URL from a provider response, whatever its shape.
///
/// Tries each known shape in order; falls back to treating the whole
/// response as a single item. Items that yield no URL are dropped, not
/// retained as placeholders.
pub fn extract_image_urls(value: &Value) -> Vec<String> {
    for strategy in STRATEGIES {
        if let Some(urls) = strategy(value) {
            return urls;
        }
    }
    extract_item_url(value).into_iter().collect()
}

/// Extract URLs from the background generator's
/// `{"result": [[url, seed, filename], ...]}` shape.
pub fn extract_background_urls(value: &Value) -> Vec<String> {
    value
        .get("result")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| row.get(0))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Canonicalization
// ---------------------------------------------------------------------------

/// Rewrites extracted URLs into a form the browser can always load.
#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    /// Base URL prefixed onto relative paths (e.g. `http://localhost:8000`).
    pub api_base: String,
}

impl UrlPolicy {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }

    /// Canonicalize one URL: anchor relative paths to the API base,
    /// then wrap absolute URLs in the same-origin proxy. Already
    /// proxied URLs pass through untouched.
    pub fn canonicalize(&self, url: &str) -> String {
        if url.is_empty() || is_proxied(url) {
            return url.to_string();
        }
        let absolute = if url.starts_with('/') {
            format!("{}{}", self.api_base, url)
        } else {
            url.to_string()
        };
        if absolute.starts_with("http") {
            proxy_wrap(&absolute)
        } else {
            absolute
        }
    }

    /// Canonicalize a batch, preserving order.
    pub fn canonicalize_all(&self, urls: &[String]) -> Vec<String> {
        urls.iter().map(|u| self.canonicalize(u)).collect()
    }

    /// The inverse direction: a URL an upstream service can fetch.
    /// Unwraps the proxy and anchors bare relative paths to the API
    /// base; absolute URLs pass through.
    pub fn to_remote(&self, url: &str) -> String {
        if let Some(inner) = unwrap_proxied(url) {
            return inner;
        }
        if url.starts_with('/') {
            return format!("{}{}", self.api_base, url);
        }
        url.to_string()
    }
}

/// Wrap an absolute URL in the same-origin proxy endpoint.
pub fn proxy_wrap(url: &str) -> String {
    format!("{}{}", PROXY_PREFIX, urlencoding::encode(url))
}

/// True if the URL already routes through the proxy.
pub fn is_proxied(url: &str) -> bool {
    url.contains(PROXY_PREFIX)
}

/// Recover the remote URL inside a proxy-wrapped one, e.g. for
/// fetching the bytes directly during a public-URL re-upload.
pub fn unwrap_proxied(url: &str) -> Option<String> {
    let encoded = url.strip_prefix(PROXY_PREFIX)?;
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}

/// True when an upstream provider must be able to fetch this URL
/// itself, requiring a re-upload to obtain a stable public URL:
/// proxied URLs, `data:` URLs, known-flaky CDN hosts, and anything
/// that is not plain `http(s)`.
pub fn needs_public_url(url: &str) -> bool {
    url.starts_with(PROXY_PREFIX)
        || url.starts_with("data:")
        || url.contains("cdn.fashn.ai")
        || !url.starts_with("http")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- Extraction --

    #[test]
    fn string_item_is_taken_directly() {
        assert_eq!(
            extract_item_url(&json!("http://x/y.png")),
            Some("http://x/y.png".to_string())
        );
    }

    #[test]
    fn object_item_uses_prioritized_properties() {
        let item = json!({"outputImageUrl": "http://a/1.png", "url": "http://b/2.png"});
        assert_eq!(extract_item_url(&item), Some("http://a/1.png".to_string()));
    }

    #[test]
    fn object_item_falls_back_to_url_looking_string() {
        let item = json!({"note": "done", "somewhere": "http://c/3.png"});
        assert_eq!(extract_item_url(&item), Some("http://c/3.png".to_string()));
    }

    #[test]
    fn unreadable_item_is_dropped() {
        assert_eq!(extract_item_url(&json!(42)), None);
        assert_eq!(extract_item_url(&json!({"count": 2})), None);
    }

    #[test]
    fn all_known_shapes_extract_the_same_url() {
        let shapes = [
            json!({"images": ["http://x/y.png"]}),
            json!({"output": ["http://x/y.png"]}),
            json!({"output": {"output_urls": ["http://x/y.png"]}}),
            json!({"results": [{"outputImageUrls": ["http://x/y.png"]}]}),
            json!({"results": [{"taskResult": {"result": {"imageList": [{"imageUrl": "http://x/y.png"}]}}}]}),
            json!({"output": {"first": "http://x/y.png"}}),
        ];
        for shape in &shapes {
            assert_eq!(
                extract_image_urls(shape),
                vec!["http://x/y.png".to_string()],
                "shape: {shape}"
            );
        }
    }

    #[test]
    fn background_tuple_rows_yield_first_element() {
        let response = json!({
            "result": [
                ["http://x/a.png", 1234, "a.png"],
                ["http://x/b.png", 5678, "b.png"]
            ]
        });
        assert_eq!(
            extract_background_urls(&response),
            vec!["http://x/a.png".to_string(), "http://x/b.png".to_string()]
        );
    }

    // -- Canonicalization --

    #[test]
    fn heterogeneous_shapes_canonicalize_identically() {
        let policy = UrlPolicy::new("http://localhost:8000");
        let expected = "/api/proxy?url=http%3A%2F%2Fx%2Fy.png";
        for raw in [
            json!({"outputImageUrl": "http://x/y.png"}),
            json!("http://x/y.png"),
            json!({"output": {"output_urls": ["http://x/y.png"]}}),
        ] {
            let urls = extract_image_urls(&raw);
            assert_eq!(policy.canonicalize(&urls[0]), expected);
        }
    }

    #[test]
    fn relative_url_is_anchored_before_wrapping() {
        let policy = UrlPolicy::new("http://localhost:8000");
        assert_eq!(
            policy.canonicalize("/foo.png"),
            format!("/api/proxy?url={}", urlencoding::encode("http://localhost:8000/foo.png"))
        );
    }

    #[test]
    fn proxy_wrap_is_idempotent() {
        let policy = UrlPolicy::new("http://localhost:8000");
        let once = policy.canonicalize("http://x/y.png");
        assert_eq!(policy.canonicalize(&once), once);
    }

    #[test]
    fn to_remote_reverses_canonicalization() {
        let policy = UrlPolicy::new("http://localhost:8000");
        let canonical = policy.canonicalize("http://x/y.png");
        assert_eq!(policy.to_remote(&canonical), "http://x/y.png");
        assert_eq!(policy.to_remote("/foo.png"), "http://localhost:8000/foo.png");
        assert_eq!(policy.to_remote("https://img/1.png"), "https://img/1.png");
    }

    #[test]
    fn public_url_repair_triggers() {
        assert!(needs_public_url("/api/proxy?url=http%3A%2F%2Fx"));
        assert!(needs_public_url("data:image/png;base64,AAAA"));
        assert!(needs_public_url("https://cdn.fashn.ai/out/1.png"));
        assert!(needs_public_url("relative/path.png"));
        assert!(!needs_public_url("https://images.example.com/1.png"));
    }
}

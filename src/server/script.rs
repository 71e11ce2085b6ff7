//! Client script configuration
//!
//! The served JavaScript asset carries a placeholder token that gets
//! replaced with a JSON config object resolved per request, so one
//! static template serves every site with its own connection settings.

use std::collections::HashMap;

use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use serde::Serialize;
use url::Url;

/// Token in the script template replaced by the JSON config object
pub const CONFIG_PLACEHOLDER: &str = "__LIVECOUNT_CONFIG__";

/// Site key used when neither query nor Referer names one
pub const DEFAULT_SITE: &str = "default-site";

/// Configuration injected into the client script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    /// WebSocket URL the client connects to
    pub server_url: String,
    /// Site key the client joins
    pub site_id: String,
    /// Id of the DOM element that displays the count
    pub display_element_id: String,
    /// Delay before reconnect attempts, in milliseconds
    pub reconnect_delay: u64,
    /// Verbose console logging in the client
    pub debug: bool,
}

impl ScriptConfig {
    /// Resolve the config for one request
    ///
    /// Query parameters win over inference. The site key falls back to
    /// the Referer host (the page embedding the script is usually the
    /// site being counted), then to [`DEFAULT_SITE`].
    pub fn from_request(uri: &Uri, headers: &HeaderMap) -> Self {
        let params = query_params(uri);

        let server_url = params
            .get("serverUrl")
            .cloned()
            .unwrap_or_else(|| default_server_url(headers));
        let site_id = params
            .get("siteId")
            .cloned()
            .or_else(|| referer_host(headers))
            .unwrap_or_else(|| DEFAULT_SITE.to_string());
        let display_element_id = params
            .get("displayElementId")
            .cloned()
            .unwrap_or_else(|| "livecount".to_string());
        let reconnect_delay = params
            .get("reconnectDelay")
            .and_then(|v| v.parse().ok())
            .unwrap_or(3000);
        let debug = params
            .get("debug")
            .and_then(|v| v.parse().ok())
            .unwrap_or(true);

        Self {
            server_url,
            site_id,
            display_element_id,
            reconnect_delay,
            debug,
        }
    }
}

/// Substitute the config into the script template
pub fn render_script(template: &str, config: &ScriptConfig) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(config)?;
    Ok(template.replace(CONFIG_PLACEHOLDER, &json))
}

fn query_params(uri: &Uri) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(uri)
        .map(|Query(params)| params)
        .unwrap_or_default()
}

/// Build the WebSocket URL from the request's own host
///
/// `wss://` when a proxy reports the outer connection as HTTPS via
/// X-Forwarded-Proto, `ws://` otherwise.
fn default_server_url(headers: &HeaderMap) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = match headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok()) {
        Some(proto) if proto.eq_ignore_ascii_case("https") => "wss",
        _ => "ws",
    };
    format!("{scheme}://{host}/")
}

/// Host (with any explicit port) of the Referer URL
fn referer_host(headers: &HeaderMap) -> Option<String> {
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let url = Url::parse(referer).ok()?;
    let host = url.host_str()?;
    match url.port() {
        Some(port) => Some(format!("{host}:{port}")),
        None => Some(host.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn test_defaults_without_hints() {
        let config = ScriptConfig::from_request(&uri("/livecount.js"), &HeaderMap::new());

        assert_eq!(config.server_url, "ws://localhost/");
        assert_eq!(config.site_id, DEFAULT_SITE);
        assert_eq!(config.display_element_id, "livecount");
        assert_eq!(config.reconnect_delay, 3000);
        assert!(config.debug);
    }

    #[test]
    fn test_query_parameters_win() {
        let config = ScriptConfig::from_request(
            &uri("/livecount.js?siteId=blog&displayElementId=c&reconnectDelay=500&debug=false&serverUrl=ws://cdn.example/"),
            &HeaderMap::new(),
        );

        assert_eq!(config.server_url, "ws://cdn.example/");
        assert_eq!(config.site_id, "blog");
        assert_eq!(config.display_element_id, "c");
        assert_eq!(config.reconnect_delay, 500);
        assert!(!config.debug);
    }

    #[test]
    fn test_site_from_referer_host() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("https://example.com/post/42"),
        );

        let config = ScriptConfig::from_request(&uri("/livecount.js"), &headers);
        assert_eq!(config.site_id, "example.com");
    }

    #[test]
    fn test_referer_keeps_explicit_port() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::REFERER,
            HeaderValue::from_static("http://example.com:8080/"),
        );

        let config = ScriptConfig::from_request(&uri("/livecount.js"), &headers);
        assert_eq!(config.site_id, "example.com:8080");
    }

    #[test]
    fn test_server_url_from_host_and_proto() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("count.example.com"));
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));

        let config = ScriptConfig::from_request(&uri("/livecount.js"), &headers);
        assert_eq!(config.server_url, "wss://count.example.com/");
    }

    #[test]
    fn test_bad_parameters_fall_back() {
        let config = ScriptConfig::from_request(
            &uri("/livecount.js?reconnectDelay=soon&debug=yes"),
            &HeaderMap::new(),
        );

        assert_eq!(config.reconnect_delay, 3000);
        assert!(config.debug);
    }

    #[test]
    fn test_render_replaces_placeholder() {
        let config = ScriptConfig {
            server_url: "ws://localhost/".to_string(),
            site_id: "blog".to_string(),
            display_element_id: "livecount".to_string(),
            reconnect_delay: 3000,
            debug: false,
        };

        let rendered = render_script("var cfg = __LIVECOUNT_CONFIG__;", &config).unwrap();
        assert!(rendered.starts_with("var cfg = {"));
        assert!(rendered.contains(r#""siteId":"blog""#));
        assert!(rendered.contains(r#""serverUrl":"ws://localhost/""#));
        assert!(!rendered.contains(CONFIG_PLACEHOLDER));
    }

    #[test]
    fn test_render_without_placeholder_is_identity() {
        let config = ScriptConfig::from_request(&uri("/x.js"), &HeaderMap::new());
        let rendered = render_script("console.log('hi');", &config).unwrap();

        assert_eq!(rendered, "console.log('hi');");
    }
}

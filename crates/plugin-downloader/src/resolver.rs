use core::{fmt, time::Duration};
use std::collections::HashMap;

use plugin_core::error::{HTTP_TIMEOUT, with_timeout};
use plugin_core::{BotError, CallClass};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    TikTok,
    Instagram,
    YouTube,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::TikTok, Self::Instagram, Self::YouTube];

    /// Plugin id used in the registry and the YAML config.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::TikTok => "tiktok",
            Self::Instagram => "instagram",
            Self::YouTube => "youtube",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::TikTok => "TikTok",
            Self::Instagram => "Instagram",
            Self::YouTube => "YouTube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Where and how to ask a third-party resolver for a direct media URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Resolver URL; the page URL is appended as a query parameter.
    pub endpoint: String,
    #[serde(default = "default_query_param")]
    pub query_param: String,
    /// JSON pointer to the media URL in the resolver's response.
    pub media_field: String,
}

fn default_query_param() -> String {
    "url".to_owned()
}

impl Endpoint {
    #[must_use]
    pub fn default_for(platform: Platform) -> Self {
        let (endpoint, media_field) = match platform {
            Platform::TikTok => ("https://www.tikwm.com/api/", "/data/play"),
            Platform::Instagram => ("https://api.ryzendesu.vip/api/downloader/igdl", "/data/0/url"),
            Platform::YouTube => ("https://api.ryzendesu.vip/api/downloader/ytmp4", "/url"),
        };
        Self {
            endpoint: endpoint.to_owned(),
            query_param: default_query_param(),
            media_field: media_field.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadResult {
    /// Absolute http(s) URL of the media file.
    pub url: String,
    pub platform: Platform,
}

/// Turns short-video page URLs into direct media URLs. Every call goes
/// upstream; nothing is cached or retried.
#[derive(Debug, Clone)]
pub struct Resolver {
    http: reqwest::Client,
    endpoints: HashMap<Platform, Endpoint>,
    timeout: Duration,
}

impl Resolver {
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            endpoints: HashMap::new(),
            timeout: HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, platform: Platform, endpoint: Endpoint) -> Self {
        self.endpoints.insert(platform, endpoint);
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, platform: Platform) -> Endpoint {
        self.endpoints
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| Endpoint::default_for(platform))
    }

    /// Resolve `url` through `platform`'s resolver. `url` is passed through
    /// untouched; a URL from another site simply fails upstream.
    ///
    /// # Errors
    ///
    /// `Resolution` on network failure, non-2xx status, undecodable body, a
    /// missing media field or a media value that is not an absolute URL.
    /// `Timeout` when the resolver outlives the deadline.
    pub async fn resolve(&self, platform: Platform, url: &str) -> Result<DownloadResult, BotError> {
        let endpoint = self.endpoint(platform);
        let request_url =
            Url::parse_with_params(&endpoint.endpoint, &[(endpoint.query_param.as_str(), url)])
                .map_err(|e| {
                    BotError::Resolution(format!("invalid endpoint {}: {e}", endpoint.endpoint))
                })?;

        with_timeout(CallClass::Resolve, self.timeout, async {
            let body: Value = self
                .http
                .get(request_url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| BotError::Resolution(e.to_string()))?
                .json()
                .await
                .map_err(|e| BotError::Resolution(format!("undecodable response: {e}")))?;

            let media = extract_media_url(&body, &endpoint.media_field)?;
            Ok(DownloadResult {
                url: media,
                platform,
            })
        })
        .await
    }
}

fn extract_media_url(body: &Value, pointer: &str) -> Result<String, BotError> {
    let raw = body
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| BotError::Resolution(format!("response has no {pointer}")))?;
    let parsed = Url::parse(raw)
        .map_err(|e| BotError::Resolution(format!("media url {raw:?} is not absolute: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed.into()),
        other => Err(BotError::Resolution(format!("unsupported media scheme {other}"))),
    }
}

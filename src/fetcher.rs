use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::FetchError;

/// User agent sent with every feed request.
pub const USER_AGENT: &str = "gator";

/// A decoded RSS channel with HTML entities already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub description: String,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub description: String,
    /// Publication date exactly as the source wrote it.
    pub pub_date: String,
}

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "item")]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    description: String,
    #[serde(default, rename = "pubDate")]
    pub_date: String,
}

impl From<RssDocument> for ParsedFeed {
    fn from(document: RssDocument) -> Self {
        let channel = document.channel;
        ParsedFeed {
            title: unescape_html(&channel.title),
            description: unescape_html(&channel.description),
            items: channel
                .items
                .into_iter()
                .map(|item| FeedItem {
                    title: unescape_html(&item.title),
                    link: item.link.trim().to_string(),
                    description: unescape_html(&item.description),
                    pub_date: item.pub_date.trim().to_string(),
                })
                .collect(),
        }
    }
}

/// Decode an RSS 2.0 document. There is no partial result on malformed input.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, quick_xml::DeError> {
    let document: RssDocument = quick_xml::de::from_reader(bytes)?;
    Ok(document.into())
}

/// Resolve HTML entities left over after XML decoding (`&amp;amp;`, CDATA
/// sections, numeric references). A bare `&` or an unknown entity is kept
/// as written and does not stop the rest of the text from being decoded.
pub fn unescape_html(text: &str) -> String {
    let text = text.trim();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];

        let decoded = entity_len(rest)
            .and_then(|len| htmlescape::decode_html(&rest[..len]).ok().map(|d| (len, d)));

        match decoded {
            Some((len, entity)) => {
                out.push_str(&entity);
                rest = &rest[len..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    out
}

/// Length of the `&name;` or `&#nn;` run at the start of `text`, if any.
fn entity_len(text: &str) -> Option<usize> {
    let body = text.strip_prefix('&')?;
    let end = body.find(|c: char| !(c.is_ascii_alphanumeric() || c == '#'))?;
    (end > 0 && body[end..].starts_with(';')).then_some(end + 2)
}

pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client })
    }

    /// Fetch and decode one feed. Cancelling `cancel` abandons the request.
    pub async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ParsedFeed, FetchError> {
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(FetchError::Cancelled { url: url.to_string() });
            }
            result = self.download(url) => result?,
        };

        debug!("Downloaded {} bytes from {}", body.len(), url);

        parse_feed(&body).map_err(|e| FetchError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await.map_err(request_error)?;
        Ok(bytes.to_vec())
    }
}

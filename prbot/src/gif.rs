//! Animated-image lookup through the Tenor API.

use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;

const TENOR_BASE_URL: &str = "https://g.tenor.com/v1";

#[derive(Debug, Deserialize)]
struct GifObject {
    url: String,
}

#[derive(Debug, Deserialize)]
struct GifResult {
    media: Vec<HashMap<String, GifObject>>,
}

#[derive(Debug, Deserialize)]
struct GifResponse {
    results: Vec<GifResult>,
}

#[async_trait]
pub trait GifClient: Send + Sync {
    /// First matching GIF URL for a query, if any.
    async fn query_first_match(&self, query: &str) -> Result<Option<String>>;
}

pub struct TenorGifClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl TenorGifClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: TENOR_BASE_URL.to_owned(),
            api_key,
        }
    }
}

#[async_trait]
impl GifClient for TenorGifClient {
    async fn query_first_match(&self, query: &str) -> Result<Option<String>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("key", &self.api_key),
                ("limit", "3"),
                ("locale", "en_US"),
                ("contentfilter", "low"),
                ("media_filter", "basic"),
                ("ar_range", "all"),
            ])
            .send()
            .await?;

        let data: GifResponse = response.json().await?;
        Ok(first_tiny_gif(data))
    }
}

fn first_tiny_gif(response: GifResponse) -> Option<String> {
    for result in response.results {
        for media in result.media {
            if let Some(object) = media.get("tinygif") {
                return Some(object.url.clone());
            }
        }
    }

    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn picks_first_tinygif() {
        let response: GifResponse = serde_json::from_str(
            r#"{
                "results": [
                    {"media": [{"gif": {"url": "https://gif.example/full"}}]},
                    {"media": [{"tinygif": {"url": "https://gif.example/tiny"}}]}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(
            first_tiny_gif(response),
            Some("https://gif.example/tiny".to_owned())
        );
    }

    #[test]
    fn no_match_yields_none() {
        let response: GifResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(first_tiny_gif(response), None);
    }
}

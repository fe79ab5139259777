use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use a11yscan_core::collaborators::{FetchResponse, HtmlFetcher};
use a11yscan_core::FetchError;

/// Plain HTTP fetcher with rustls, bounded bodies, and no redirect
/// surprises (redirects are followed but the final URL is reported).
pub struct ReqwestFetcher {
    client: reqwest::Client,
    max_body: usize,
}

impl ReqwestFetcher {
    pub fn new(user_agent: &str, max_body: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self { client, max_body })
    }

    fn classify(e: reqwest::Error, timeout: Duration) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(timeout.as_secs())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl HtmlFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        if let Some(length) = response.content_length() {
            if length as usize > self.max_body {
                return Err(FetchError::BodyTooLarge {
                    size: length as usize,
                    max: self.max_body,
                });
            }
        }

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let mut headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let body = response
            .bytes()
            .await
            .map_err(|e| Self::classify(e, timeout))?;
        if body.len() > self.max_body {
            return Err(FetchError::BodyTooLarge {
                size: body.len(),
                max: self.max_body,
            });
        }

        Ok(FetchResponse {
            final_url,
            status,
            headers,
            body: body.to_vec(),
            content_type,
        })
    }
}

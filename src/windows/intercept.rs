use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Context, Result};
use log::debug;
use regex::{Regex, RegexBuilder};
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
    Client, Method,
};

const BUNDLED_HARVEST_PAGE: &str = include_str!("../../assets/harvest.html");

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPart {
    Bytes(Vec<u8>),
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub upload: Vec<UploadPart>,
}

impl InterceptedRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".into(),
            url: url.into(),
            headers: Vec::new(),
            upload: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: u16,
    pub mime_type: Option<String>,
    pub headers: Vec<(String, String)>,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptDecision {
    ServeHarvestPage,
    PassThrough,
}

/// Serves the harvesting page in place of captcha-hosting pages and forwards
/// everything else unchanged.
pub struct Interceptor {
    pattern: Regex,
    page: Arc<str>,
    client: Client,
}

impl Interceptor {
    pub fn new(pattern: &str, page: impl Into<Arc<str>>) -> Result<Self> {
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid intercept pattern '{pattern}'"))?;

        Ok(Self {
            pattern,
            page: page.into(),
            client: Client::new(),
        })
    }

    pub fn from_config(pattern: &str, override_path: Option<&PathBuf>) -> Result<Self> {
        let page: Arc<str> = match override_path {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read harvest page {}", path.display()))?
                .into(),
            None => BUNDLED_HARVEST_PAGE.into(),
        };
        Self::new(pattern, page)
    }

    pub fn decide(&self, url: &str) -> InterceptDecision {
        if self.pattern.is_match(url) {
            InterceptDecision::ServeHarvestPage
        } else {
            InterceptDecision::PassThrough
        }
    }

    pub fn harvest_page(&self) -> &str {
        &self.page
    }

    pub async fn handle(&self, request: InterceptedRequest) -> Result<InterceptedResponse> {
        match self.decide(&request.url) {
            InterceptDecision::ServeHarvestPage => {
                debug!("Serving harvest page for {}", request.url);
                Ok(InterceptedResponse {
                    status: 200,
                    mime_type: Some("text/html".into()),
                    headers: Vec::new(),
                    data: self.page.as_bytes().to_vec(),
                })
            }
            InterceptDecision::PassThrough => self.forward(request).await,
        }
    }

    async fn forward(&self, request: InterceptedRequest) -> Result<InterceptedResponse> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|err| anyhow!("invalid method '{}': {err}", request.method))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name '{name}'"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header '{name}'"))?;
            headers.append(name, value);
        }

        let mut builder = self
            .client
            .request(method, request.url.as_str())
            .headers(headers);

        if !request.upload.is_empty() {
            builder = builder.body(collect_upload(&request.upload).await?);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("pass-through request to {} failed", request.url))?;

        let status = response.status().as_u16();
        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let data = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from {}", request.url))?
            .to_vec();

        Ok(InterceptedResponse {
            status,
            mime_type,
            headers,
            data,
        })
    }
}

async fn collect_upload(parts: &[UploadPart]) -> Result<Vec<u8>> {
    let mut body = Vec::new();
    for part in parts {
        match part {
            UploadPart::Bytes(bytes) => body.extend_from_slice(bytes),
            UploadPart::File(path) => {
                let contents = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read upload file {}", path.display()))?;
                body.extend_from_slice(&contents);
            }
        }
    }
    Ok(body)
}

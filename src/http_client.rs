use reqwest::cookie::Jar;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// One crawl session: cookies and default headers are shared by every
/// request, whether or not it follows redirects.
pub struct HttpClient {
    client: Client,
    no_redirect: Client,
}

/// Response of a form submission, kept whole so callers can inspect the
/// redirect target as well as the body.
#[derive(Debug, Clone)]
pub struct FormResponse {
    pub status: StatusCode,
    pub final_url: Url,
    pub location: Option<String>,
    pub body: String,
}

impl HttpClient {
    pub fn new(user_agent: &str, headers: &[(&str, &str)]) -> Result<Self, FetchError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in headers {
            default_headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        let jar = Arc::new(Jar::default());
        let build = |policy: Policy| {
            Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .user_agent(user_agent)
                .default_headers(default_headers.clone())
                .cookie_provider(jar.clone())
                .redirect(policy)
                .build()
        };

        Ok(Self {
            client: build(Policy::default())?,
            no_redirect: build(Policy::none())?,
        })
    }

    /// Fetches an HTML page, rejecting error statuses and non-HTML bodies.
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError(status.as_u16()));
        }

        if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
            let content_type_str = content_type.to_str().unwrap_or("");
            if !content_type_str.contains("html") {
                return Err(FetchError::InvalidContentType(content_type_str.to_string()));
            }
        }

        if let Some(content_length) = response.content_length() {
            if content_length > MAX_RESPONSE_SIZE as u64 {
                return Err(FetchError::TooLarge(content_length));
            }
        }

        let body = response.text().await?;
        if body.len() > MAX_RESPONSE_SIZE {
            return Err(FetchError::TooLarge(body.len() as u64));
        }

        Ok(body)
    }

    /// Fetches raw bytes, used for CAPTCHA images.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        if bytes.len() > MAX_RESPONSE_SIZE {
            return Err(FetchError::TooLarge(bytes.len() as u64));
        }

        Ok(bytes.to_vec())
    }

    /// Follows every redirect from `url` and returns where the chain ends.
    /// The final status is not checked: only the address matters.
    pub async fn final_url(&self, url: &str) -> Result<Url, FetchError> {
        let response = self.client.get(url).send().await?;
        Ok(response.url().clone())
    }

    /// Submits an urlencoded form. With `follow_redirects` off, a 3xx comes
    /// back as-is with its `Location` header.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(&str, &str)],
        headers: &[(&str, &str)],
        follow_redirects: bool,
    ) -> Result<FormResponse, FetchError> {
        let client = if follow_redirects {
            &self.client
        } else {
            &self.no_redirect
        };

        let mut request = client.post(url).form(form);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request.send().await?;

        let status = response.status();
        let final_url = response.url().clone();
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        Ok(FormResponse {
            status,
            final_url,
            location,
            body,
        })
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    HttpError(u16),
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),
    #[error("Response too large: {0} bytes")]
    TooLarge(u64),
    #[error("Request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("HTML parse error: {0}")]
    HtmlError(#[from] lol_html::errors::RewritingError),
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
}

//! HTTP client for the InfluxDB 2.x API
//!
//! The [`Client`] is constructed either from a base URL or from an InfluxDB connection string of
//! the form `http://<host>:<port>?token=<token>`, which is the shape produced by the hosting
//! integration. The HTTP transport is injectable through [`Client::with_http_client`] so that a
//! host can hand out a managed [`reqwest::Client`].
use std::{fmt::Display, str::FromStr};

use reqwest::{Body, IntoUrl, Method, RequestBuilder, StatusCode, header::AUTHORIZATION};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use url::Url;

/// Primary error type for the [`Client`]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("base URL error: {0}")]
    BaseUrl(#[source] reqwest::Error),

    #[error("invalid connection string: {0}")]
    ConnectionString(String),

    #[error("no {0} given for write")]
    MissingWriteTarget(&'static str),

    #[error("request URL error: {0}")]
    RequestUrl(#[from] url::ParseError),

    #[error("failed to parse JSON response: {0}")]
    Json(#[source] reqwest::Error),

    #[error("failed to parse plaintext response: {0}")]
    Text(#[source] reqwest::Error),

    #[error("server responded with error [{code}]: {message}")]
    ApiError { code: StatusCode, message: String },

    #[error("failed to send {method} {url} request: {source}")]
    RequestSend {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl Error {
    fn request_send(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::RequestSend {
            method,
            url: url.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A parsed InfluxDB connection string
///
/// The recognized query parameters are `token`, `org` and `bucket`; they are removed from the
/// URL and kept separately. Any other query parameters stay on the base URL.
#[derive(Debug, Clone)]
pub struct ConnectionString {
    base_url: Url,
    token: Option<Secret<String>>,
    org: Option<String>,
    bucket: Option<String>,
}

impl ConnectionString {
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn token(&self) -> Option<&Secret<String>> {
        self.token.as_ref()
    }

    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }
}

impl FromStr for ConnectionString {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // the parse error never echoes the input, which may carry a token
        let mut url = Url::parse(s.trim()).map_err(|e| Error::ConnectionString(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(Error::ConnectionString(format!(
                    "unsupported scheme '{other}', expected http or https"
                )));
            }
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::ConnectionString("missing host".to_string()));
        }

        let mut token = None;
        let mut org = None;
        let mut bucket = None;
        let mut remaining = Vec::new();
        // `+` is a literal character here, base64 tokens carry it
        let query = url.query().unwrap_or_default().replace('+', "%2B");
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "token" => token = Some(Secret::new(value.into_owned())),
                "org" => org = Some(value.into_owned()),
                "bucket" => bucket = Some(value.into_owned()),
                _ => remaining.push((key.into_owned(), value.into_owned())),
            }
        }
        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }

        Ok(Self {
            base_url: url,
            token,
            org,
            bucket,
        })
    }
}

/// The InfluxDB client
///
/// For programmatic access to the HTTP API of an InfluxDB 2.x server
#[derive(Debug, Clone)]
pub struct Client {
    /// The base URL for making requests to a running InfluxDB server
    base_url: Url,
    /// The API token sent as `Authorization: Token <token>` on each request
    auth_token: Option<Secret<String>>,
    /// Organization used when a write does not name one
    default_org: Option<String>,
    /// Bucket used when a write does not name one
    default_bucket: Option<String>,
    /// A [`reqwest::Client`] for handling HTTP requests
    http_client: reqwest::Client,
}

impl Client {
    /// Create a new [`Client`]
    pub fn new<U: IntoUrl>(base_url: U) -> Result<Self> {
        Ok(Self {
            base_url: base_url.into_url().map_err(Error::BaseUrl)?,
            auth_token: None,
            default_org: None,
            default_bucket: None,
            http_client: reqwest::Client::new(),
        })
    }

    /// Create a new [`Client`] from a connection string
    ///
    /// # Example
    /// ```
    /// # use influxdb3_client::Client;
    /// let client = Client::from_connection_string("http://localhost:8086?token=my-token")?;
    /// assert_eq!(client.base_url().as_str(), "http://localhost:8086/");
    /// # Ok::<(), influxdb3_client::Error>(())
    /// ```
    pub fn from_connection_string(connection_string: &str) -> Result<Self> {
        let ConnectionString {
            base_url,
            token,
            org,
            bucket,
        } = connection_string.parse()?;
        Ok(Self {
            base_url,
            auth_token: token,
            default_org: org,
            default_bucket: bucket,
            http_client: reqwest::Client::new(),
        })
    }

    /// Set the API token that will be sent with each request to the server
    pub fn with_auth_token<S: Into<String>>(mut self, auth_token: S) -> Self {
        self.auth_token = Some(Secret::new(auth_token.into()));
        self
    }

    /// Replace the HTTP transport, e.g., with one handed out by a host
    pub fn with_http_client(mut self, http_client: reqwest::Client) -> Self {
        self.http_client = http_client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn has_auth_token(&self) -> bool {
        self.auth_token.is_some()
    }

    pub fn default_org(&self) -> Option<&str> {
        self.default_org.as_deref()
    }

    pub fn default_bucket(&self) -> Option<&str> {
        self.default_bucket.as_deref()
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http_client.request(method, url);
        match &self.auth_token {
            Some(token) => req.header(AUTHORIZATION, format!("Token {}", token.expose_secret())),
            None => req,
        }
    }

    /// Check that the server is reachable via the `GET /ping` API
    pub async fn ping(&self) -> Result<()> {
        let url = self.base_url.join("/ping")?;
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|src| Error::request_send(Method::GET, "/ping", src))?;
        match resp.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            code => Err(Error::ApiError {
                code,
                message: resp.text().await.map_err(Error::Text)?,
            }),
        }
    }

    /// Make a request to the `GET /health` API
    pub async fn health(&self) -> Result<HealthResponse> {
        let url = self.base_url.join("/health")?;
        let resp = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|src| Error::request_send(Method::GET, "/health", src))?;
        match resp.status() {
            // an unhealthy server answers 503 with the same body
            StatusCode::OK | StatusCode::SERVICE_UNAVAILABLE => {
                resp.json().await.map_err(Error::Json)
            }
            code => Err(Error::ApiError {
                code,
                message: resp.text().await.map_err(Error::Text)?,
            }),
        }
    }

    /// Compose a request to the `/api/v2/write` API
    ///
    /// The organization and bucket default to those given in the connection string, and can be
    /// set on the returned builder.
    ///
    /// # Example
    /// ```no_run
    /// # use influxdb3_client::{Client, Precision};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    /// let client = Client::from_connection_string("http://localhost:8086?token=my-token")?;
    /// client
    ///     .api_v2_write()
    ///     .org("influxdata")
    ///     .bucket("default")
    ///     .precision(Precision::Millisecond)
    ///     .body("cpu,host=s1 usage=0.5")
    ///     .send()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn api_v2_write(&self) -> WriteRequestBuilder<'_, NoBody> {
        WriteRequestBuilder {
            client: self,
            org: self.default_org.clone(),
            bucket: self.default_bucket.clone(),
            precision: None,
            body: NoBody,
        }
    }
}

/// Response body of the `/health` API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthResponse {
    pub name: String,
    pub status: HealthStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Pass,
    Fail,
}

/// Time series precision
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum Precision {
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "ms")]
    Millisecond,
    #[serde(rename = "us")]
    Microsecond,
    #[serde(rename = "ns")]
    Nanosecond,
}

impl Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Second => write!(f, "s"),
            Self::Millisecond => write!(f, "ms"),
            Self::Microsecond => write!(f, "us"),
            Self::Nanosecond => write!(f, "ns"),
        }
    }
}

/// Builder type for composing a request to `/api/v2/write`
///
/// Produced by [`Client::api_v2_write`]
#[derive(Debug)]
pub struct WriteRequestBuilder<'c, B> {
    client: &'c Client,
    org: Option<String>,
    bucket: Option<String>,
    precision: Option<Precision>,
    body: B,
}

impl<B> WriteRequestBuilder<'_, B> {
    /// Set the organization
    pub fn org(mut self, org: impl Into<String>) -> Self {
        self.org = Some(org.into());
        self
    }

    /// Set the bucket
    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    /// Set the precision
    pub fn precision(mut self, set_to: Precision) -> Self {
        self.precision = Some(set_to);
        self
    }
}

impl<'c> WriteRequestBuilder<'c, NoBody> {
    /// Set the line protocol body of the request
    pub fn body<T: Into<Body>>(self, body: T) -> WriteRequestBuilder<'c, Body> {
        WriteRequestBuilder {
            client: self.client,
            org: self.org,
            bucket: self.bucket,
            precision: self.precision,
            body: body.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WriteParams<'a> {
    org: &'a str,
    bucket: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    precision: Option<Precision>,
}

impl WriteRequestBuilder<'_, Body> {
    /// Send the request to the server
    pub async fn send(self) -> Result<()> {
        let url = self.client.base_url.join("/api/v2/write")?;
        // the server rejects writes without both, so fail before sending
        let org = self
            .org
            .as_deref()
            .ok_or(Error::MissingWriteTarget("organization"))?;
        let bucket = self
            .bucket
            .as_deref()
            .ok_or(Error::MissingWriteTarget("bucket"))?;
        let params = WriteParams {
            org,
            bucket,
            precision: self.precision,
        };
        let resp = self
            .client
            .request(Method::POST, url)
            .query(&params)
            .body(self.body)
            .send()
            .await
            .map_err(|src| Error::request_send(Method::POST, "/api/v2/write", src))?;
        match resp.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            code => Err(Error::ApiError {
                code,
                message: resp.text().await.map_err(Error::Text)?,
            }),
        }
    }
}

#[doc(hidden)]
/// Typestate type for [`WriteRequestBuilder`]
#[derive(Debug, Copy, Clone)]
pub struct NoBody;

//! Client for the lab's ARI endpoint: submits a measured sample and lists the
//! samples still waiting for a measurement.
//!
//! Both operations are a single GET against the same URL. The client is
//! blocking; the UI runs it on a worker thread and receives the result over a
//! channel.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{FetchError, SubmitError, TransportError, ValidationError};
use crate::form::Form;
use crate::parser::parse_number;
use crate::pending::PendingEntry;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

pub type Query = Vec<(&'static str, String)>;

/// Seam between the client and the HTTP stack.
pub trait HttpTransport: Send + Sync {
    fn get(&self, url: &str, query: &Query) -> Result<HttpResponse, TransportError>;
}

pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, url: &str, query: &Query) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(transport_error)?;
        Ok(HttpResponse { status, body })
    }
}

/// A validated record ready to be sent.
#[derive(Clone, Debug, PartialEq)]
pub struct Submission {
    pub kartu_ari: String,
    pub brix: f64,
    pub pol: f64,
    pub pol_baca: f64,
    pub rendemen: f64,
    /// Id of the pending-list entry this sample was picked from.
    pub id: Option<String>,
}

impl Submission {
    pub fn from_form(form: &Form, id: Option<String>) -> Result<Self, ValidationError> {
        if form.kartu_ari.trim().is_empty() {
            return Err(ValidationError::MissingIdentifier);
        }
        let field = |value: &str, name: &'static str| {
            parse_number(value).ok_or(ValidationError::NotNumeric(name))
        };
        Ok(Self {
            kartu_ari: form.kartu_ari.clone(),
            brix: field(&form.brix, "Brix")?,
            pol: field(&form.pol, "Pol")?,
            pol_baca: field(&form.pol_baca, "Pol Baca")?,
            rendemen: field(&form.rendemen, "Rendemen")?,
            id,
        })
    }

    fn query(&self) -> Query {
        let mut query = vec![
            ("kartu_ari", self.kartu_ari.clone()),
            ("brix_ari", format!("{:?}", self.brix)),
            ("pol_ari", format!("{:?}", self.pol)),
            ("pol_baca_ari", format!("{:?}", self.pol_baca)),
            ("rendemen_ari", format!("{:?}", self.rendemen)),
        ];
        if let Some(id) = &self.id {
            query.push(("id", id.clone()));
        }
        query
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Acceptance {
    /// Server answered `status: success`; carries its message.
    Confirmed(String),
    /// HTTP 200 but the body could not be read as a reply.
    Unconfirmed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Submitted {
    pub submission: Submission,
    pub status: u16,
    pub body: String,
    pub acceptance: Acceptance,
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
    status: String,
    message: Option<String>,
    data: Option<T>,
}

impl<T> Reply<T> {
    fn is_success(&self) -> bool {
        self.status == "success"
    }
}

pub struct ApiClient {
    url: String,
    transport: Box<dyn HttpTransport>,
}

impl ApiClient {
    pub fn new(url: impl Into<String>, transport: Box<dyn HttpTransport>) -> Self {
        Self {
            url: url.into(),
            transport,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Validates the form and sends it. Validation failures never reach the
    /// transport. The form is not touched; resetting it is up to the caller.
    pub fn submit(&self, form: &Form, id: Option<String>) -> Result<Submitted, SubmitError> {
        let submission = Submission::from_form(form, id)?;
        info!(kartu_ari = %submission.kartu_ari, id = ?submission.id, "submitting sample");

        let response = self.transport.get(&self.url, &submission.query())?;
        debug!(status = response.status, body = %response.body, "submit response");

        if response.status != 200 {
            return Err(SubmitError::HttpStatus {
                status: response.status,
                body: response.body,
            });
        }

        let acceptance = match serde_json::from_str::<Reply<serde_json::Value>>(&response.body) {
            Ok(reply) if reply.is_success() => {
                Acceptance::Confirmed(reply.message.unwrap_or_default())
            }
            Ok(reply) => {
                return Err(SubmitError::Rejected(
                    reply.message.unwrap_or_else(|| "Unknown error".to_string()),
                ))
            }
            Err(e) => {
                warn!(error = %e, "submit response is not a JSON reply");
                Acceptance::Unconfirmed
            }
        };

        Ok(Submitted {
            submission,
            status: response.status,
            body: response.body,
            acceptance,
        })
    }

    pub fn fetch_pending(&self) -> Result<Vec<PendingEntry>, FetchError> {
        let response = self.transport.get(&self.url, &Vec::new())?;
        if response.status != 200 {
            return Err(FetchError::HttpStatus(response.status));
        }
        let reply: Reply<Vec<PendingEntry>> = serde_json::from_str(&response.body)
            .map_err(|e| FetchError::Malformed(e.to_string()))?;
        if !reply.is_success() {
            return Err(FetchError::Rejected(
                reply.message.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }
        let entries = reply.data.unwrap_or_default();
        info!(count = entries.len(), "fetched pending samples");
        Ok(entries)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Warning,
    Error,
}

/// A message for the user, shown as a dismissable overlay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.level == NoticeLevel::Success
    }

    pub fn from_submit(result: &Result<Submitted, SubmitError>) -> Self {
        match result {
            Ok(Submitted {
                submission,
                acceptance: Acceptance::Confirmed(server_message),
                ..
            }) => Self {
                level: NoticeLevel::Success,
                title: "SUCCESS".into(),
                message: format!(
                    "Data sent!\n\nKartu ARI: {}\nBrix ARI: {:?}\nPol ARI: {:?}\nPol Baca ARI: {:?}\nRendemen ARI: {:?}\n\nAPI response:\n{}",
                    submission.kartu_ari,
                    submission.brix,
                    submission.pol,
                    submission.pol_baca,
                    submission.rendemen,
                    server_message
                ),
            },
            Ok(Submitted {
                status,
                body,
                acceptance: Acceptance::Unconfirmed,
                ..
            }) => Self {
                level: NoticeLevel::Warning,
                title: "ATTENTION".into(),
                message: format!("Data was sent with status {status}\n\nAPI response:\n{body}"),
            },
            Err(SubmitError::Validation(e)) => Self::error("Error", e.to_string()),
            Err(SubmitError::Timeout) => Self::error(
                "ERROR",
                "Timeout: the API took too long to answer.\nCheck your network connection.",
            ),
            Err(SubmitError::Unreachable(_)) => Self::error(
                "ERROR",
                "Cannot connect to the API server.\nCheck the network connection or the API address.",
            ),
            Err(SubmitError::Rejected(message)) => {
                Self::error("FAILED", format!("Failed to send data!\n\nError: {message}"))
            }
            Err(SubmitError::HttpStatus { status, body }) => Self::error(
                "FAILED",
                format!("Failed to send data!\nStatus code: {status}\nError: {body}"),
            ),
            Err(SubmitError::Transport(message)) => {
                Self::error("ERROR", format!("Something went wrong:\n{message}"))
            }
        }
    }
}

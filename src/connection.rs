use crate::backoff::Backoff;
use crate::config::ApiCredentials;
use crate::error::{AuthError, StreamError};
use crate::oauth;
use crate::settings::Settings;
use crate::stream::ByteStream;
use crate::utils::logs;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;

/// Supplies live, authenticated filter streams.
pub trait Connector {
    fn acquire(&self) -> impl Future<Output = Result<ByteStream, AuthError>> + Send;
}

/// What to do after a failed handshake attempt.
#[derive(Debug)]
enum Verdict {
    Retry(String),
    Fail(AuthError),
}

fn classify_status(status: StatusCode) -> Verdict {
    match status.as_u16() {
        401 | 403 => Verdict::Fail(AuthError::Rejected {
            status: status.as_u16(),
        }),
        420 | 429 => Verdict::Retry(format!("rate limited ({status})")),
        s if (500..600).contains(&s) => Verdict::Retry(format!("upstream error ({status})")),
        _ => Verdict::Fail(AuthError::Handshake(format!("unexpected status {status}"))),
    }
}

pub struct StreamConnector {
    client: reqwest::Client,
    credentials: ApiCredentials,
    stream_url: String,
    track: String,
    language: String,
    header_timeout: Duration,
    backoff: Backoff,
}

impl StreamConnector {
    pub fn new(
        settings: &Settings,
        credentials: ApiCredentials,
        track: &str,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.stream.connect_timeout())
            .build()
            .map_err(|e| AuthError::Handshake(format!("http client: {e}")))?;

        Ok(Self {
            client,
            credentials,
            stream_url: settings.stream.url.clone(),
            track: track.to_string(),
            language: settings.stream.language.clone(),
            header_timeout: settings.stream.connect_timeout(),
            backoff: settings.auth.backoff.clone(),
        })
    }

    /// User-context OAuth1 when all four keys are set, else the preset bearer token.
    fn authorization(&self, form: &[(&str, &str)]) -> Result<String, AuthError> {
        if !self.credentials.has_user_context() {
            if let Some(token) = &self.credentials.bearer_token {
                return Ok(format!("Bearer {token}"));
            }
        }

        oauth::authorization_header(
            &self.credentials,
            "POST",
            &self.stream_url,
            form,
            &oauth::nonce(),
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| AuthError::Handshake(format!("oauth signing: {e}")))
    }

    async fn open_once(&self) -> Result<ByteStream, Verdict> {
        let form = [
            ("track", self.track.as_str()),
            ("language", self.language.as_str()),
        ];
        let authorization = self.authorization(&form).map_err(Verdict::Fail)?;

        let request = self
            .client
            .post(&self.stream_url)
            .header(AUTHORIZATION, authorization)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(oauth::form_body(&form))
            .send();

        let response = match tokio::time::timeout(self.header_timeout, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(Verdict::Retry(format!("stream request failed: {e}"))),
            Err(_) => {
                return Err(Verdict::Retry(format!(
                    "no response headers within {:?}",
                    self.header_timeout
                )))
            }
        };

        if !response.status().is_success() {
            return Err(classify_status(response.status()));
        }

        Ok(response.bytes_stream().map_err(StreamError::from).boxed())
    }
}

impl Connector for StreamConnector {
    async fn acquire(&self) -> Result<ByteStream, AuthError> {
        let mut attempt = 1;
        loop {
            match self.open_once().await {
                Ok(stream) => {
                    logs::log_stream_connected(&self.stream_url, &self.track);
                    return Ok(stream);
                }
                Err(Verdict::Fail(err)) => return Err(err),
                Err(Verdict::Retry(reason)) => {
                    if !self.backoff.allows(attempt + 1) {
                        return Err(AuthError::Exhausted {
                            attempts: attempt,
                            last: reason,
                        });
                    }
                    let delay = self.backoff.delay(attempt);
                    logs::log_auth_retry(attempt, delay, &reason);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

//! Shared request pipeline behind every vendor adapter.
//!
//! A [`VendorClient`] owns one vendor's transport, credentials, circuit breaker, retry policy,
//! local request quota and timeout. Adapters build [`HttpRequest`]s and decode payloads; this
//! type decides whether a request is sent, how long it may take, and how its outcome is
//! classified.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest, HttpResponse};
use crate::notify::{titles, Notification, NotificationSink};
use crate::throttling::RequestQuota;
use crate::{CircuitBreaker, CircuitState, RetryPolicy, VendorError, VendorId, VendorPolicy};

const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
const MAX_ERROR_BODY_CHARS: usize = 200;

pub struct VendorClient {
    vendor: VendorId,
    http: Arc<dyn HttpClient>,
    auth: HttpAuth,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
    quota: RequestQuota,
    timeout: Duration,
    rate_limit_floor: u32,
    sink: Arc<dyn NotificationSink>,
}

impl std::fmt::Debug for VendorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VendorClient")
            .field("vendor", &self.vendor)
            .field("breaker", &self.breaker)
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl VendorClient {
    pub fn new(
        policy: &VendorPolicy,
        http: Arc<dyn HttpClient>,
        auth: HttpAuth,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            vendor: policy.vendor,
            http,
            auth,
            breaker: CircuitBreaker::with_sink(policy.vendor, policy.breaker, Arc::clone(&sink)),
            retry: policy.retry,
            quota: RequestQuota::from_policy(policy),
            timeout: policy.timeout,
            rate_limit_floor: policy.rate_limit_floor,
            sink,
        }
    }

    pub const fn vendor(&self) -> VendorId {
        self.vendor
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Sends `request` through the breaker and retry policy, returning a 2xx response.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, VendorError> {
        let request = &request;
        self.retry
            .execute(&self.breaker, move || self.attempt(request))
            .await
    }

    /// Sends `request` and decodes the JSON body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
    ) -> Result<T, VendorError> {
        let response = self.send(request).await?;
        self.decode(&response.body)
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: impl Into<String>,
    ) -> Result<T, VendorError> {
        self.send_json(HttpRequest::get(url)).await
    }

    pub fn decode<T: DeserializeOwned>(&self, body: &str) -> Result<T, VendorError> {
        serde_json::from_str(body).map_err(|error| {
            VendorError::decode(
                self.vendor,
                format!("failed to decode {} payload: {error}", self.vendor),
            )
        })
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<HttpResponse, VendorError> {
        if !self.quota.acquire_within(self.timeout).await {
            return Err(VendorError::throttled(self.vendor));
        }

        let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
        let request = request
            .clone()
            .with_auth(&self.auth)
            .with_timeout_ms(timeout_ms);
        tracing::debug!(
            vendor = %self.vendor,
            method = request.method.as_str(),
            url = %redact(&request.url),
            "vendor request"
        );

        let response = match tokio::time::timeout(self.timeout, self.http.execute(request)).await {
            Err(_) => return Err(VendorError::timeout(self.vendor, self.timeout)),
            Ok(Err(error)) => return Err(VendorError::network(self.vendor, error.message())),
            Ok(Ok(response)) => response,
        };

        self.inspect_rate_limit(&response);

        if response.is_success() {
            return Ok(response);
        }

        let error = VendorError::from_status(
            self.vendor,
            response.status,
            format!(
                "{} returned HTTP {}: {}",
                self.vendor,
                response.status,
                truncate(&response.body)
            ),
        );
        tracing::warn!(vendor = %self.vendor, status = response.status, "vendor request failed");
        Err(error)
    }

    fn inspect_rate_limit(&self, response: &HttpResponse) {
        let remaining = response
            .header(RATE_LIMIT_REMAINING_HEADER)
            .and_then(|value| value.trim().parse::<u32>().ok());

        let message = match remaining {
            Some(remaining) if remaining <= self.rate_limit_floor => {
                format!("{} reports {remaining} requests remaining", self.vendor)
            }
            _ if response.status == 429 => {
                format!("{} rejected a request with HTTP 429", self.vendor)
            }
            _ => return,
        };

        self.sink.publish(Notification::warning(titles::RATE_LIMIT, message));
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_owned();
    }
    let mut cut = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect::<String>();
    cut.push_str("...");
    cut
}

fn redact(url: &str) -> String {
    match url.find("apikey=") {
        Some(index) => {
            let start = index + "apikey=".len();
            let end = url[start..]
                .find('&')
                .map_or(url.len(), |offset| start + offset);
            format!("{}***{}", &url[..start], &url[end..])
        }
        None => url.to_owned(),
    }
}

use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

use crate::config::FiscalConfig;
use crate::core::{AppError, Result};

/// One SOAP call
#[derive(Debug, Clone)]
pub struct SoapRequest {
    pub url: String,
    pub soap_action: String,
    pub body: String,
    /// Only idempotent reads may be retried automatically
    pub idempotent: bool,
}

impl SoapRequest {
    pub fn new(url: impl Into<String>, soap_action: impl Into<String>, body: String) -> Self {
        Self {
            url: url.into(),
            soap_action: soap_action.into(),
            body,
            idempotent: false,
        }
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }
}

/// Raw HTTP reply; SOAP faults arrive with a 500 status and are parsed by the caller
#[derive(Debug, Clone)]
pub struct SoapReply {
    pub status: u16,
    pub body: String,
}

/// Sends SOAP envelopes to the authority
///
/// An `Err` means the request may or may not have reached the authority
/// (connection failure, timeout, unreadable body).
#[async_trait]
pub trait SoapTransport: Send + Sync {
    async fn call(&self, request: SoapRequest) -> Result<SoapReply>;
}

/// reqwest-backed transport with retries on idempotent calls only
pub struct HttpSoapTransport {
    plain: Client,
    retrying: ClientWithMiddleware,
}

impl HttpSoapTransport {
    pub fn new(timeout: Duration, read_retries: u32) -> Result<Self> {
        let plain = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()
            .map_err(|e| AppError::Configuration(format!("Cannot build HTTP client: {}", e)))?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(read_retries);
        let retrying = ClientBuilder::new(plain.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { plain, retrying })
    }

    pub fn from_config(config: &FiscalConfig) -> Result<Self> {
        Self::new(config.request_timeout, config.read_retries)
    }
}

#[async_trait]
impl SoapTransport for HttpSoapTransport {
    async fn call(&self, request: SoapRequest) -> Result<SoapReply> {
        tracing::debug!(
            url = %request.url,
            action = %request.soap_action,
            idempotent = request.idempotent,
            "Sending SOAP request"
        );

        let response = if request.idempotent {
            self.retrying
                .post(&request.url)
                .header("Content-Type", "text/xml; charset=utf-8")
                .header("SOAPAction", request.soap_action.as_str())
                .body(request.body)
                .send()
                .await
                .map_err(|e| AppError::upstream(format!("Transport error: {}", e)))?
        } else {
            self.plain
                .post(&request.url)
                .header("Content-Type", "text/xml; charset=utf-8")
                .header("SOAPAction", request.soap_action.as_str())
                .body(request.body)
                .send()
                .await
                .map_err(|e| AppError::upstream(format!("Transport error: {}", e)))?
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::upstream(format!("Cannot read response body: {}", e)))?;

        tracing::debug!(status, bytes = body.len(), "SOAP response received");

        Ok(SoapReply { status, body })
    }
}

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

use super::signer::TicketSigner;
use super::transport::{SoapRequest, SoapTransport};
use super::wsaa;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::AccessTicket;

/// Process-wide cache of access tickets, one per service
///
/// Renewal is single-flight: concurrent callers that find no usable ticket
/// queue on `refresh` and all but the first reuse the ticket it obtained.
pub struct CredentialCache {
    transport: Arc<dyn SoapTransport>,
    signer: Option<Arc<dyn TicketSigner>>,
    wsaa_url: String,
    safety_margin: Duration,
    tickets: RwLock<HashMap<String, AccessTicket>>,
    refresh: Mutex<()>,
}

impl CredentialCache {
    pub fn new(
        transport: Arc<dyn SoapTransport>,
        signer: Option<Arc<dyn TicketSigner>>,
        wsaa_url: impl Into<String>,
        safety_margin: Duration,
    ) -> Self {
        Self {
            transport,
            signer,
            wsaa_url: wsaa_url.into(),
            safety_margin,
            tickets: RwLock::new(HashMap::new()),
            refresh: Mutex::new(()),
        }
    }

    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }

    async fn cached(&self, service: &str) -> Option<AccessTicket> {
        let now = Utc::now();
        self.tickets
            .read()
            .await
            .get(service)
            .filter(|t| t.is_usable_at(now, self.safety_margin))
            .cloned()
    }

    /// A usable ticket for `service`, logging in when needed
    pub async fn get_ticket(&self, service: &str) -> Result<AccessTicket> {
        if let Some(ticket) = self.cached(service).await {
            return Ok(ticket);
        }

        let _renewal = self.refresh.lock().await;

        // Another caller may have renewed while we waited
        if let Some(ticket) = self.cached(service).await {
            return Ok(ticket);
        }

        let ticket = self.login(service).await?;
        self.tickets
            .write()
            .await
            .insert(service.to_string(), ticket.clone());

        Ok(ticket)
    }

    async fn login(&self, service: &str) -> Result<AccessTicket> {
        let signer = self.signer.as_ref().ok_or_else(|| {
            AppError::credential("Signing certificate and private key are not configured")
        })?;

        tracing::info!(service, "Requesting access ticket");

        let request = wsaa::login_ticket_request(service, Utc::now());
        let signed = signer.sign(&request).await?;

        let reply = self
            .transport
            .call(SoapRequest::new(
                self.wsaa_url.as_str(),
                "",
                wsaa::login_envelope(&signed),
            ))
            .await?;

        let ticket = wsaa::parse_login_response(&reply.body, service, Utc::now()).map_err(|e| {
            tracing::error!(service, status = reply.status, error = %e, "Login failed");
            e
        })?;

        tracing::info!(
            service,
            expires_at = %ticket.expires_at,
            token_len = ticket.token.len(),
            "Access ticket obtained"
        );

        Ok(ticket)
    }

    /// Whether a usable ticket is cached, without contacting anyone
    pub async fn has_valid_ticket(&self, service: &str) -> bool {
        self.cached(service).await.is_some()
    }

    /// Drop the ticket of `service`, or every ticket when `None`
    pub async fn invalidate(&self, service: Option<&str>) {
        let mut tickets = self.tickets.write().await;
        match service {
            Some(service) => {
                tickets.remove(service);
            }
            None => tickets.clear(),
        }
        tracing::debug!(service = service.unwrap_or("*"), "Access tickets invalidated");
    }
}

use std::sync::Arc;

use super::credential_cache::CredentialCache;
use super::signer::{OpensslSigner, TicketSigner};
use super::soap::fault_string;
use super::transport::{HttpSoapTransport, SoapRequest, SoapTransport};
use super::wsfe::{self, AuthorizationReply};
use crate::config::FiscalConfig;
use crate::core::timezone::today_in_argentina;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::{
    AccessTicket, PointOfSale, ServiceStatus, VoucherOutcome, VoucherRequest, VoucherResult,
    VoucherType, INVOICING_SERVICE,
};

/// Client for the electronic invoicing service
pub struct FiscalClient {
    transport: Arc<dyn SoapTransport>,
    credentials: Arc<CredentialCache>,
    cuit: String,
    wsfe_url: String,
}

impl FiscalClient {
    pub fn new(
        transport: Arc<dyn SoapTransport>,
        credentials: Arc<CredentialCache>,
        cuit: impl Into<String>,
        wsfe_url: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            cuit: cuit.into(),
            wsfe_url: wsfe_url.into(),
        }
    }

    /// Wire the HTTP transport, the openssl signer and the ticket cache from configuration
    pub fn from_config(config: &FiscalConfig) -> Result<Self> {
        let transport: Arc<dyn SoapTransport> = Arc::new(HttpSoapTransport::from_config(config)?);
        let signer = config.signing.clone().map(|material| {
            Arc::new(OpensslSigner::new(material, config.openssl_bin.as_str())) as Arc<dyn TicketSigner>
        });

        if signer.is_none() {
            tracing::warn!("No signing material configured; authenticated calls will fail");
        }

        let credentials = Arc::new(CredentialCache::new(
            transport.clone(),
            signer,
            config.wsaa_url.as_str(),
            config.ticket_safety_margin,
        ));

        Ok(Self::new(
            transport,
            credentials,
            config.cuit.as_str(),
            config.wsfe_url.as_str(),
        ))
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    pub fn cuit(&self) -> &str {
        &self.cuit
    }

    async fn ticket(&self) -> Result<AccessTicket> {
        if self.cuit.is_empty() {
            return Err(AppError::credential("Issuer CUIT is not configured"));
        }
        self.credentials.get_ticket(INVOICING_SERVICE).await
    }

    /// Drop the cached ticket when the service refuses it
    async fn checked<T>(&self, parsed: Result<T>) -> Result<T> {
        if let Err(AppError::Credential(message)) = &parsed {
            tracing::warn!(%message, "Invoicing service refused the access ticket");
            self.credentials.invalidate(Some(INVOICING_SERVICE)).await;
        }
        parsed
    }

    async fn read(&self, operation: &str, body: String) -> Result<String> {
        let reply = self
            .transport
            .call(
                SoapRequest::new(self.wsfe_url.as_str(), wsfe::soap_action(operation), body)
                    .idempotent(),
            )
            .await?;
        Ok(reply.body)
    }

    /// Last authorized number for the pair; 0 when nothing was ever issued
    pub async fn last_voucher_number(
        &self,
        point_of_sale: u32,
        voucher_type: VoucherType,
    ) -> Result<u64> {
        let ticket = self.ticket().await?;
        let body = self
            .read(
                "FECompUltimoAutorizado",
                wsfe::last_authorized_request(&ticket, &self.cuit, point_of_sale, voucher_type),
            )
            .await?;
        let last = self.checked(wsfe::parse_last_authorized(&body)).await?;

        tracing::debug!(point_of_sale, voucher_type = %voucher_type, last, "Last authorized voucher");
        Ok(last)
    }

    /// Authorize a standard invoice, debit note or credit note
    pub async fn create_invoice(&self, request: VoucherRequest) -> Result<VoucherResult> {
        ensure_standard_flow(&request)?;
        self.authorize(request, None).await
    }

    /// Authorize a standard voucher under a number obtained from `next_voucher_number`
    pub async fn create_invoice_numbered(
        &self,
        request: VoucherRequest,
        number: u64,
    ) -> Result<VoucherResult> {
        ensure_standard_flow(&request)?;
        self.authorize(request, Some(number)).await
    }

    /// Authorize a factoring-eligible invoice
    pub async fn create_fce(&self, request: VoucherRequest) -> Result<VoucherResult> {
        if !request.voucher_type.is_credit_invoice() {
            return Err(AppError::validation(format!(
                "{} is not an FCE voucher type",
                request.voucher_type
            )));
        }
        self.authorize(request, None).await
    }

    /// Number the next authorization for the request's pair will carry
    pub async fn next_voucher_number(&self, request: &VoucherRequest) -> Result<u64> {
        let last = self
            .last_voucher_number(request.point_of_sale, request.voucher_type)
            .await?;
        Ok(last + 1)
    }

    async fn authorize(&self, request: VoucherRequest, number: Option<u64>) -> Result<VoucherResult> {
        let request = request.normalized();
        request.validate()?;

        let ticket = self.ticket().await?;
        let attempted = match number {
            Some(number) => number,
            None => self.next_voucher_number(&request).await?,
        };

        tracing::info!(
            point_of_sale = request.point_of_sale,
            voucher_type = %request.voucher_type,
            voucher_number = attempted,
            total = %request.amounts.total,
            "Requesting voucher authorization"
        );

        let envelope = wsfe::authorization_request(&ticket, &self.cuit, &request, attempted);
        let reply = self
            .transport
            .call(SoapRequest::new(
                self.wsfe_url.as_str(),
                wsfe::soap_action("FECAESolicitar"),
                envelope,
            ))
            .await;

        let reply = match reply {
            Ok(reply) => reply,
            Err(transport_error) => return self.recover(&request, attempted, transport_error).await,
        };

        if !(200..300).contains(&reply.status) && fault_string(&reply.body).is_none() {
            let failure = AppError::upstream_with_raw(
                format!("FECAESolicitar answered HTTP {}", reply.status),
                reply.body,
            );
            return self.recover(&request, attempted, failure).await;
        }

        let result = match self.checked(wsfe::parse_authorization(&reply.body, attempted)).await? {
            AuthorizationReply::Decided(result) => result,
            AuthorizationReply::Inconclusive(failure) => {
                return self.recover(&request, attempted, failure).await
            }
        };

        match result.outcome {
            VoucherOutcome::Rejected => tracing::warn!(
                point_of_sale = request.point_of_sale,
                voucher_type = %request.voucher_type,
                errors = ?result.errors,
                "Voucher rejected"
            ),
            _ => tracing::info!(
                point_of_sale = request.point_of_sale,
                voucher_type = %request.voucher_type,
                voucher_number = ?result.voucher_number,
                cae = ?result.cae,
                observations = result.observations.len(),
                "Voucher authorized"
            ),
        }

        Ok(result)
    }

    /// Decide what happened to an authorization whose reply was lost or unreadable; never resubmits
    async fn recover(
        &self,
        request: &VoucherRequest,
        attempted: u64,
        failure: AppError,
    ) -> Result<VoucherResult> {
        tracing::warn!(
            point_of_sale = request.point_of_sale,
            voucher_type = %request.voucher_type,
            voucher_number = attempted,
            error = %failure,
            "No usable authorization reply, checking whether the voucher registered"
        );

        let last = match self
            .last_voucher_number(request.point_of_sale, request.voucher_type)
            .await
        {
            Ok(last) => last,
            Err(e) => {
                tracing::error!(
                    voucher_number = attempted,
                    error = %e,
                    "Cannot confirm the outcome of the authorization"
                );
                return Err(AppError::UnknownOutcome(format!(
                    "Authorization of voucher {} has an unknown outcome ({}); verify before resubmitting",
                    attempted, failure
                )));
            }
        };

        if last < attempted {
            return Err(AppError::upstream(format!(
                "Authorization request did not register ({}); it is safe to resubmit",
                failure
            )));
        }

        let registered = match self
            .get_voucher(request.point_of_sale, request.voucher_type, attempted)
            .await
        {
            Ok(registered) => registered,
            Err(e) => {
                tracing::error!(voucher_number = attempted, error = %e, "Voucher lookup failed");
                None
            }
        };

        match registered {
            Some(result)
                if result.outcome.is_approved()
                    && result.cae.is_some()
                    && result.issued_for(&request.doc_number, request.amounts.total) =>
            {
                tracing::info!(
                    voucher_number = attempted,
                    cae = ?result.cae,
                    "Recovered authorization from the registered voucher"
                );
                Ok(result)
            }
            _ => Err(AppError::UnknownOutcome(format!(
                "Voucher {} registered but could not be matched to this request; verify before resubmitting",
                attempted
            ))),
        }
    }

    /// Look up an issued voucher
    pub async fn get_voucher(
        &self,
        point_of_sale: u32,
        voucher_type: VoucherType,
        number: u64,
    ) -> Result<Option<VoucherResult>> {
        let ticket = self.ticket().await?;
        let body = self
            .read(
                "FECompConsultar",
                wsfe::voucher_query_request(&ticket, &self.cuit, point_of_sale, voucher_type, number),
            )
            .await?;
        self.checked(wsfe::parse_voucher_query(&body)).await
    }

    /// Probe the three sub-services; a failed probe reports everything down
    pub async fn check_service_status(&self) -> ServiceStatus {
        match self.read("FEDummy", wsfe::dummy_request()).await {
            Ok(body) => wsfe::parse_service_status(&body),
            Err(e) => {
                tracing::warn!(error = %e, "Service status probe failed");
                ServiceStatus::default()
            }
        }
    }

    /// Registered points of sale with the voucher types enabled for the issuer
    pub async fn get_points_of_sale(&self) -> Result<Vec<PointOfSale>> {
        let ticket = self.ticket().await?;

        let body = self
            .read(
                "FEParamGetPtosVenta",
                wsfe::points_of_sale_request(&ticket, &self.cuit),
            )
            .await?;
        let mut points = self.checked(wsfe::parse_points_of_sale(&body)).await?;

        let body = self
            .read(
                "FEParamGetTiposCbte",
                wsfe::voucher_types_request(&ticket, &self.cuit),
            )
            .await?;
        let enabled = self
            .checked(wsfe::parse_voucher_types(&body, today_in_argentina()))
            .await?;

        for point in &mut points {
            point.enabled_voucher_types = enabled.clone();
        }

        Ok(points)
    }

    /// Reject a point of sale that is unregistered, blocked, deleted or lacks the voucher type
    pub async fn ensure_point_of_sale_enabled(
        &self,
        point_of_sale: u32,
        voucher_type: VoucherType,
    ) -> Result<()> {
        let points = self.get_points_of_sale().await?;
        let point = points
            .iter()
            .find(|p| p.number == point_of_sale)
            .ok_or_else(|| {
                AppError::validation(format!("Point of sale {} is not registered", point_of_sale))
            })?;

        if !point.is_active() {
            return Err(AppError::validation(format!(
                "Point of sale {} is blocked or deleted",
                point_of_sale
            )));
        }

        if !point.enabled_voucher_types.is_empty()
            && !point.enabled_voucher_types.contains(&voucher_type)
        {
            return Err(AppError::validation(format!(
                "Voucher type {} is not enabled for point of sale {}",
                voucher_type, point_of_sale
            )));
        }

        Ok(())
    }
}

fn ensure_standard_flow(request: &VoucherRequest) -> Result<()> {
    if request.voucher_type.is_credit_invoice() {
        return Err(AppError::validation(
            "FCE vouchers must be issued through the FCE flow",
        ));
    }
    Ok(())
}

use std::sync::Arc;

use chrono::{Duration, NaiveDate};

use crate::config::fiscal::strip_dashes;
use crate::config::FiscalConfig;
use crate::core::timezone::{previous_month, today_in_argentina};
use crate::core::{AppError, Result, VoucherAmounts};
use crate::middleware::AuthenticatedUser;
use crate::modules::fiscal::models::{
    Concept, CreditInvoiceDetails, DocType, PointOfSale, VoucherClass, VoucherRequest,
    VoucherResult, VoucherType, INVOICING_SERVICE,
};
use crate::modules::fiscal::FiscalClient;
use crate::modules::invoices::models::{
    ConfigSummary, CredentialSummary, Invoice, InvoiceFilter, InvoiceNumber, IssueInvoiceRequest,
    IssuedInvoice, NewInvoice, StatusQuery, StatusReport, DEFAULT_IVA_CONDITION,
};
use crate::modules::invoices::repositories::InvoiceRepository;

/// Which issuance route a request came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueFlow {
    Standard,
    CreditInvoice,
}

/// Counterparty fields copied onto an invoice record
#[derive(Debug, Clone)]
pub struct InvoiceCounterparty {
    pub entity_id: Option<i64>,
    pub cuit: String,
    pub name: String,
}

/// Issues direct invoices and FCE vouchers and serves the invoice records
pub struct InvoiceService {
    client: Arc<FiscalClient>,
    repository: Arc<dyn InvoiceRepository>,
    config: Arc<FiscalConfig>,
}

impl InvoiceService {
    pub fn new(
        client: Arc<FiscalClient>,
        repository: Arc<dyn InvoiceRepository>,
        config: Arc<FiscalConfig>,
    ) -> Self {
        Self {
            client,
            repository,
            config,
        }
    }

    /// `POST /invoices/standard`
    pub async fn issue_standard(
        &self,
        request: IssueInvoiceRequest,
        user: &AuthenticatedUser,
    ) -> Result<IssuedInvoice> {
        self.issue(request, IssueFlow::Standard, user).await
    }

    /// `POST /invoices/fce`
    pub async fn issue_fce(
        &self,
        request: IssueInvoiceRequest,
        user: &AuthenticatedUser,
    ) -> Result<IssuedInvoice> {
        self.issue(request, IssueFlow::CreditInvoice, user).await
    }

    async fn issue(
        &self,
        request: IssueInvoiceRequest,
        flow: IssueFlow,
        user: &AuthenticatedUser,
    ) -> Result<IssuedInvoice> {
        let today = today_in_argentina();
        let (voucher, counterparty, notes) = self.draft(request, flow, today)?;
        let voucher = voucher.normalized();
        voucher.validate()?;

        if self.config.validate_point_of_sale {
            self.client
                .ensure_point_of_sale_enabled(voucher.point_of_sale, voucher.voucher_type)
                .await?;
        }

        let service = self.client.check_service_status().await;
        if !service.all_up() {
            tracing::warn!(
                ?service,
                point_of_sale = voucher.point_of_sale,
                voucher_type = %voucher.voucher_type,
                "Tax authority reports degraded services; attempting authorization anyway"
            );
        }

        let result = match flow {
            IssueFlow::Standard => self.client.create_invoice(voucher.clone()).await?,
            IssueFlow::CreditInvoice => self.client.create_fce(voucher.clone()).await?,
        };

        if !result.outcome.is_approved() {
            return Err(result.into_rejection());
        }

        let new_invoice = approved_invoice(&voucher, &result, counterparty, notes, None, user)?;
        let invoice = self
            .record(&new_invoice)
            .await?
            .with_qr_url(self.client.cuit());

        Ok(IssuedInvoice::from_invoice(&invoice, result.observations))
    }

    /// Persist an authorized voucher; failures keep the CAE in the error
    async fn record(&self, invoice: &NewInvoice) -> Result<Invoice> {
        self.repository.create(invoice).await.map_err(|e| {
            tracing::error!(
                cae = %invoice.cae,
                invoice_number = %invoice.invoice_number,
                voucher_type = %invoice.voucher_type,
                error = %e,
                "Authorized voucher could not be recorded; reconcile manually"
            );
            AppError::Persistence {
                message: e.to_string(),
                cae: invoice.cae.clone(),
                invoice_number: invoice.invoice_number.clone(),
            }
        })
    }

    /// Turn a request body into the voucher to authorize, filling defaults
    fn draft(
        &self,
        request: IssueInvoiceRequest,
        flow: IssueFlow,
        today: NaiveDate,
    ) -> Result<(VoucherRequest, InvoiceCounterparty, Option<String>)> {
        let cuit = request
            .client_cuit
            .as_deref()
            .map(strip_dashes)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AppError::validation("Client CUIT is required"))?;

        let voucher_type = match (flow, request.voucher_type) {
            (IssueFlow::Standard, None) => VoucherType::invoice(VoucherClass::A),
            (IssueFlow::CreditInvoice, None) => VoucherType::credit_invoice(VoucherClass::A),
            (IssueFlow::Standard, Some(t)) if t.is_credit_invoice() => {
                return Err(AppError::validation(
                    "FCE vouchers must be issued through /invoices/fce",
                ))
            }
            (IssueFlow::CreditInvoice, Some(t)) if !t.is_credit_invoice() => {
                return Err(AppError::validation(format!(
                    "{} is not an FCE voucher type",
                    t
                )))
            }
            (_, Some(t)) => t,
        };

        let concept = request.concept.unwrap_or(Concept::Services);
        let amounts = VoucherAmounts::new(request.net, request.vat, request.total)?;

        let (service_from, service_to) = match (request.service_from, request.service_to) {
            (None, None) if concept.requires_service_dates() => {
                let (from, to) = previous_month(today);
                (Some(from), Some(to))
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(AppError::validation(
                    "Service period needs both start and end dates",
                ))
            }
            (from, to) => (from, to),
        };

        let payment_due = if concept.requires_service_dates() || voucher_type.is_credit_invoice() {
            Some(
                request
                    .payment_due
                    .unwrap_or(today + Duration::days(self.config.payment_term_days)),
            )
        } else {
            request.payment_due
        };

        let credit = match flow {
            IssueFlow::CreditInvoice => Some(CreditInvoiceDetails {
                issuer_cbu: request
                    .issuer_cbu
                    .clone()
                    .ok_or_else(|| AppError::validation("Issuer CBU is required for FCE vouchers"))?,
                issuer_alias: request.issuer_alias.clone(),
                receiver_cbu: request.receiver_cbu.clone().filter(|c| !c.trim().is_empty()),
                receiver_alias: request.receiver_alias.clone(),
                transferable: transferable(&request)?,
            }),
            IssueFlow::Standard => None,
        };

        let notes = match &credit {
            Some(credit) => Some(credit_notes(credit, request.notes.as_deref())),
            None => request.notes.clone(),
        };

        let voucher = VoucherRequest {
            point_of_sale: request
                .point_of_sale
                .unwrap_or(self.config.default_point_of_sale),
            voucher_type,
            concept,
            doc_type: request.doc_type.unwrap_or(DocType::Cuit),
            doc_number: cuit.clone(),
            issue_date: request.issue_date.unwrap_or(today),
            amounts,
            service_from,
            service_to,
            payment_due,
            associated: request.associated_voucher,
            credit,
        };

        let counterparty = InvoiceCounterparty {
            entity_id: request.client_entity_id,
            name: request
                .client_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| cuit.clone()),
            cuit,
        };

        Ok((voucher, counterparty, notes))
    }

    /// `GET /invoices/status`
    pub async fn status(&self, query: StatusQuery) -> Result<StatusReport> {
        let point_of_sale = query
            .point_of_sale
            .unwrap_or(self.config.default_point_of_sale);
        let voucher_type = query
            .voucher_type
            .unwrap_or(VoucherType::invoice(VoucherClass::A));

        let service = self.client.check_service_status().await;
        if !service.all_up() {
            tracing::warn!(?service, "Tax authority reports degraded services");
        }

        let last_number = match self.client.last_voucher_number(point_of_sale, voucher_type).await {
            Ok(last) => Some(last),
            Err(e) => {
                tracing::warn!(
                    point_of_sale,
                    voucher_type = %voucher_type,
                    error = %e,
                    "Last voucher number unavailable"
                );
                None
            }
        };

        Ok(StatusReport {
            success: true,
            config: ConfigSummary {
                has_cert: self.config.has_signing_material(),
                cuit: self.client.cuit().to_string(),
                environment: self.config.environment.to_string(),
            },
            credentials: CredentialSummary {
                cached: self
                    .client
                    .credentials()
                    .has_valid_ticket(INVOICING_SERVICE)
                    .await,
            },
            service,
            point_of_sale,
            voucher_type,
            last_number,
            next_number: last_number.map(|n| n + 1),
        })
    }

    pub async fn points_of_sale(&self) -> Result<Vec<PointOfSale>> {
        self.client.get_points_of_sale().await
    }

    pub async fn list(&self, filter: InvoiceFilter) -> Result<Vec<Invoice>> {
        let invoices = self.repository.search(&filter.clamped()).await?;
        Ok(invoices
            .into_iter()
            .map(|invoice| invoice.with_qr_url(self.client.cuit()))
            .collect())
    }

    pub async fn get(&self, id: i64) -> Result<Invoice> {
        self.repository
            .find_by_id(id)
            .await?
            .map(|invoice| invoice.with_qr_url(self.client.cuit()))
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", id)))
    }

    pub async fn attach_pdf(&self, id: i64, url: &str) -> Result<Invoice> {
        let url = url.trim();
        if url.is_empty() {
            return Err(AppError::validation("PDF URL is required"));
        }

        let invoice = self
            .repository
            .attach_pdf_url(id, url)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Invoice {} not found", id)))?;

        tracing::info!(invoice_id = id, invoice_number = %invoice.invoice_number, "PDF attached");
        Ok(invoice.with_qr_url(self.client.cuit()))
    }
}

/// Build the record for an approved authorization
pub(crate) fn approved_invoice(
    voucher: &VoucherRequest,
    result: &VoucherResult,
    counterparty: InvoiceCounterparty,
    notes: Option<String>,
    settlement_id: Option<i64>,
    user: &AuthenticatedUser,
) -> Result<NewInvoice> {
    let (cae, cae_expiration, voucher_number) = result.authorization()?;
    let invoice_number = InvoiceNumber::new(voucher.point_of_sale, voucher_number);

    Ok(NewInvoice {
        invoice_number: invoice_number.to_string(),
        invoice_class: voucher.voucher_type.class().to_string(),
        voucher_type: voucher.voucher_type,
        point_of_sale: voucher.point_of_sale,
        voucher_number,
        issue_date: voucher.issue_date,
        client_entity_id: counterparty.entity_id,
        client_cuit: counterparty.cuit,
        client_name: counterparty.name,
        client_iva_condition: DEFAULT_IVA_CONDITION.to_string(),
        net_amount: voucher.amounts.net,
        vat_amount: voucher.amounts.vat,
        total_amount: voucher.amounts.balanced_total(),
        cae,
        cae_expiration,
        settlement_id,
        afip_response: Some(result.raw_response.clone()),
        notes,
        created_by: Some(user.recorded_name()),
    })
}

fn transferable(request: &IssueInvoiceRequest) -> Result<bool> {
    if let Some(flag) = request.transferable {
        return Ok(flag);
    }
    match request.sca.as_deref().map(str::trim) {
        None | Some("") => Ok(true),
        Some(s) if s.eq_ignore_ascii_case("S") => Ok(true),
        Some(s) if s.eq_ignore_ascii_case("N") => Ok(false),
        Some(other) => Err(AppError::validation(format!(
            "sca must be 'S' or 'N', got '{}'",
            other
        ))),
    }
}

fn credit_notes(credit: &CreditInvoiceDetails, extra: Option<&str>) -> String {
    let mut parts = vec![format!("CBU Emisor: {}", strip_dashes(&credit.issuer_cbu))];
    if let Some(cbu) = credit.receiver_cbu.as_deref() {
        parts.push(format!("CBU Receptor: {}", strip_dashes(cbu)));
    }
    if let Some(alias) = credit.receiver_alias.as_deref().filter(|a| !a.trim().is_empty()) {
        parts.push(format!("Alias Receptor: {}", alias.trim()));
    }
    if let Some(extra) = extra.map(str::trim).filter(|e| !e.is_empty()) {
        parts.push(extra.to_string());
    }
    parts.join(" | ")
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::core::timezone::flexible_date;
use super::FiscalQr;
use crate::core::AuthorityMessage;
use crate::modules::fiscal::models::{
    AssociatedVoucher, Concept, DocType, ServiceStatus, VoucherType,
};

/// VAT condition recorded for invoiced counterparties
pub const DEFAULT_IVA_CONDITION: &str = "IVA Responsable Inscripto";

/// Authorized voucher as stored locally
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    /// Letter class (`A`, `B`, `C`)
    pub invoice_class: String,
    #[sqlx(try_from = "String")]
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub voucher_number: u64,
    pub issue_date: NaiveDate,
    pub client_entity_id: Option<i64>,
    pub client_cuit: String,
    pub client_name: String,
    pub client_iva_condition: String,
    pub net_amount: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub cae: String,
    pub cae_expiration: NaiveDate,
    pub settlement_id: Option<i64>,
    #[serde(skip_serializing)]
    pub afip_response: Option<String>,
    pub notes: Option<String>,
    pub pdf_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Verification QR link; derived, never stored
    #[sqlx(skip)]
    #[serde(default)]
    pub qr_url: Option<String>,
}

impl Invoice {
    /// Fill `qr_url` for an invoice issued under `issuer_cuit`
    pub fn with_qr_url(mut self, issuer_cuit: &str) -> Self {
        match FiscalQr::from_invoice(&self, issuer_cuit).and_then(|qr| qr.url()) {
            Ok(url) => self.qr_url = Some(url),
            Err(e) => tracing::debug!(invoice_id = self.id, error = %e, "No QR link for invoice"),
        }
        self
    }
}

/// Invoice about to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub invoice_number: String,
    pub invoice_class: String,
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub voucher_number: u64,
    pub issue_date: NaiveDate,
    pub client_entity_id: Option<i64>,
    pub client_cuit: String,
    pub client_name: String,
    pub client_iva_condition: String,
    pub net_amount: Decimal,
    pub vat_amount: Decimal,
    pub total_amount: Decimal,
    pub cae: String,
    pub cae_expiration: NaiveDate,
    pub settlement_id: Option<i64>,
    pub afip_response: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
}

/// Body of `POST /invoices/standard` and `POST /invoices/fce`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IssueInvoiceRequest {
    #[serde(alias = "cliente_id")]
    pub client_entity_id: Option<i64>,
    #[serde(alias = "cliente_cuit", alias = "cuit")]
    pub client_cuit: Option<String>,
    #[serde(alias = "cliente_nombre")]
    pub client_name: Option<String>,
    #[serde(alias = "invoice_type", alias = "fce_type")]
    pub voucher_type: Option<VoucherType>,
    pub point_of_sale: Option<u32>,
    #[serde(alias = "concepto")]
    pub concept: Option<Concept>,
    pub doc_type: Option<DocType>,
    #[serde(alias = "neto")]
    pub net: Decimal,
    #[serde(alias = "iva")]
    pub vat: Decimal,
    pub total: Decimal,
    #[serde(default, with = "flexible_date", alias = "fecha")]
    pub issue_date: Option<NaiveDate>,
    #[serde(default, with = "flexible_date", alias = "periodo_desde")]
    pub service_from: Option<NaiveDate>,
    #[serde(default, with = "flexible_date", alias = "periodo_hasta")]
    pub service_to: Option<NaiveDate>,
    #[serde(default, with = "flexible_date", alias = "vencimiento_pago")]
    pub payment_due: Option<NaiveDate>,
    pub associated_voucher: Option<AssociatedVoucher>,
    #[serde(alias = "cbu_emisor")]
    pub issuer_cbu: Option<String>,
    #[serde(alias = "alias_emisor")]
    pub issuer_alias: Option<String>,
    #[serde(alias = "cbu_receptor")]
    pub receiver_cbu: Option<String>,
    #[serde(alias = "alias_receptor")]
    pub receiver_alias: Option<String>,
    pub transferable: Option<bool>,
    /// `S` transferable, `N` not
    pub sca: Option<String>,
    pub notes: Option<String>,
}

/// Successful issuance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedInvoice {
    pub success: bool,
    pub invoice_id: i64,
    pub cae: String,
    pub cae_expiration: NaiveDate,
    pub invoice_number: String,
    pub invoice_type: String,
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub voucher_number: u64,
    pub client: String,
    pub total: Decimal,
    pub qr_url: Option<String>,
    pub observations: Vec<AuthorityMessage>,
}

impl IssuedInvoice {
    pub fn from_invoice(invoice: &Invoice, observations: Vec<AuthorityMessage>) -> Self {
        Self {
            success: true,
            invoice_id: invoice.id,
            cae: invoice.cae.clone(),
            cae_expiration: invoice.cae_expiration,
            invoice_number: invoice.invoice_number.clone(),
            invoice_type: invoice.invoice_class.clone(),
            voucher_type: invoice.voucher_type,
            point_of_sale: invoice.point_of_sale,
            voucher_number: invoice.voucher_number,
            client: invoice.client_name.clone(),
            total: invoice.total_amount,
            qr_url: invoice.qr_url.clone(),
            observations,
        }
    }
}

/// Query string of `GET /invoices/status`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    #[serde(alias = "point_of_sale")]
    pub point_of_sale: Option<u32>,
    #[serde(alias = "voucher_type", alias = "invoiceType", alias = "invoice_type")]
    pub voucher_type: Option<VoucherType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub has_cert: bool,
    pub cuit: String,
    pub environment: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialSummary {
    pub cached: bool,
}

/// Response of `GET /invoices/status`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub success: bool,
    pub config: ConfigSummary,
    pub credentials: CredentialSummary,
    pub service: ServiceStatus,
    pub point_of_sale: u32,
    pub voucher_type: VoucherType,
    pub last_number: Option<u64>,
    pub next_number: Option<u64>,
}

/// Which vouchers a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceKind {
    #[default]
    All,
    Invoices,
    Notes,
    Fce,
}

impl InvoiceKind {
    pub fn voucher_types(&self) -> Vec<VoucherType> {
        VoucherType::ALL
            .into_iter()
            .filter(|t| match self {
                InvoiceKind::All => true,
                InvoiceKind::Invoices => !t.is_note() && !t.is_credit_invoice(),
                InvoiceKind::Notes => t.is_note(),
                InvoiceKind::Fce => t.is_credit_invoice(),
            })
            .collect()
    }
}

/// Query string of `GET /invoices`
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceFilter {
    pub q: Option<String>,
    #[serde(default)]
    pub kind: InvoiceKind,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl Default for InvoiceFilter {
    fn default() -> Self {
        Self {
            q: None,
            kind: InvoiceKind::All,
            limit: default_limit(),
            offset: 0,
        }
    }
}

pub const MAX_PAGE_SIZE: i64 = 200;

fn default_limit() -> i64 {
    50
}

impl InvoiceFilter {
    pub fn clamped(mut self) -> Self {
        self.limit = self.limit.clamp(1, MAX_PAGE_SIZE);
        self.offset = self.offset.max(0);
        self.q = self
            .q
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());
        self
    }
}

/// Body of `PUT /invoices/{id}/pdf`
#[derive(Debug, Clone, Deserialize)]
pub struct AttachPdfRequest {
    #[serde(alias = "pdf_url")]
    pub url: String,
}

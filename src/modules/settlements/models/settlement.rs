use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use crate::core::{AppError, Result, VoucherAmounts};
use crate::modules::fiscal::models::VoucherType;
use crate::modules::invoices::models::Invoice;

/// Settlement lifecycle; invoicing moves `generada` (or a later pre-invoice state) to `facturada`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Generada,
    Enviada,
    Conformada,
    Disputada,
    Facturada,
    Pagada,
    Anulada,
}

impl SettlementStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementStatus::Generada => "generada",
            SettlementStatus::Enviada => "enviada",
            SettlementStatus::Conformada => "conformada",
            SettlementStatus::Disputada => "disputada",
            SettlementStatus::Facturada => "facturada",
            SettlementStatus::Pagada => "pagada",
            SettlementStatus::Anulada => "anulada",
        }
    }

    /// States from which an invoice may still be requested
    pub fn is_invoiceable(&self) -> bool {
        matches!(
            self,
            SettlementStatus::Generada
                | SettlementStatus::Enviada
                | SettlementStatus::Conformada
                | SettlementStatus::Disputada
        )
    }
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SettlementStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "generada" => Ok(SettlementStatus::Generada),
            "enviada" => Ok(SettlementStatus::Enviada),
            "conformada" => Ok(SettlementStatus::Conformada),
            "disputada" => Ok(SettlementStatus::Disputada),
            "facturada" => Ok(SettlementStatus::Facturada),
            "pagada" => Ok(SettlementStatus::Pagada),
            "anulada" => Ok(SettlementStatus::Anulada),
            other => Err(AppError::validation(format!(
                "Unknown settlement status '{}'",
                other
            ))),
        }
    }
}

impl TryFrom<String> for SettlementStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Billable aggregation of a client's shipments
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientSettlement {
    pub id: i64,
    pub settlement_number: Option<String>,
    pub client_entity_id: i64,
    #[sqlx(try_from = "String")]
    pub status: SettlementStatus,
    pub freight_subtotal: Decimal,
    pub insurance_subtotal: Decimal,
    pub vat_subtotal: Decimal,
    pub total_amount: Decimal,
    pub invoice_number: Option<String>,
    pub invoice_type: Option<String>,
    pub invoice_point_of_sale: Option<u32>,
    pub invoice_date: Option<NaiveDate>,
    pub cae: Option<String>,
    pub cae_expiration: Option<NaiveDate>,
    #[serde(skip_serializing)]
    pub afip_response: Option<String>,
    pub invoicing_claim: Option<String>,
    pub claim_point_of_sale: Option<u32>,
    pub claim_voucher_type: Option<String>,
    /// Number sent to the authority under the claim; written before the request goes out
    pub claim_voucher_number: Option<u64>,
    /// CAE granted under the claim when recording the invoice failed
    pub claim_cae: Option<String>,
    pub invoicing_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClientSettlement {
    /// Net is freight plus insurance; VAT and total come from the settlement
    pub fn amounts(&self) -> Result<VoucherAmounts> {
        VoucherAmounts::new(
            self.freight_subtotal + self.insurance_subtotal,
            self.vat_subtotal,
            self.total_amount,
        )
    }

    pub fn is_invoiced(&self) -> bool {
        self.cae.is_some()
    }
}

/// Client entity a settlement bills
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Counterparty {
    pub id: i64,
    pub legal_name: String,
    pub tax_id: Option<String>,
    pub iva_condition: Option<String>,
}

/// Claim taken on a settlement before the authority is contacted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementClaim {
    pub token: String,
    pub point_of_sale: u32,
    pub voucher_type: VoucherType,
}

impl SettlementClaim {
    pub fn new(point_of_sale: u32, voucher_type: VoucherType) -> Self {
        Self {
            token: uuid::Uuid::new_v4().to_string(),
            point_of_sale,
            voucher_type,
        }
    }
}

/// Invoicing fields written onto a settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementInvoicing {
    pub invoice_number: String,
    pub invoice_type: String,
    pub point_of_sale: u32,
    pub invoice_date: NaiveDate,
    pub cae: String,
    pub cae_expiration: NaiveDate,
    pub afip_response: Option<String>,
}

impl SettlementInvoicing {
    pub fn from_invoice(invoice: &Invoice) -> Self {
        Self {
            invoice_number: invoice.invoice_number.clone(),
            invoice_type: invoice.invoice_class.clone(),
            point_of_sale: invoice.point_of_sale,
            invoice_date: invoice.issue_date,
            cae: invoice.cae.clone(),
            cae_expiration: invoice.cae_expiration,
            afip_response: invoice.afip_response.clone(),
        }
    }
}

/// Optional body of `POST /settlements/{id}/invoice`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceSettlementRequest {
    #[serde(alias = "invoice_type", alias = "voucherType", alias = "invoiceType")]
    pub voucher_type: Option<VoucherType>,
    #[serde(alias = "pointOfSale")]
    pub point_of_sale: Option<u32>,
}

/// Settlement with its client and linked invoice
#[derive(Debug, Clone, Serialize)]
pub struct SettlementView {
    pub settlement: ClientSettlement,
    pub client: Option<Counterparty>,
    pub invoice: Option<Invoice>,
}

/// Invoice copied onto a settlement that had lost its invoicing fields
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairedSettlement {
    pub settlement_id: i64,
    pub invoice_number: String,
    pub cae: String,
}

/// Expired claim dropped by the repair run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleasedClaim {
    pub settlement_id: i64,
    pub claimed_at: Option<DateTime<Utc>>,
    pub point_of_sale: Option<u32>,
    pub voucher_type: Option<String>,
    pub voucher_number: Option<u64>,
    /// Authority's last number for the claimed pair, when it was consulted
    pub last_authorized: Option<u64>,
}

/// Expired claim left in place because the authority may hold its voucher
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeldClaim {
    pub settlement_id: i64,
    pub claimed_at: Option<DateTime<Utc>>,
    pub point_of_sale: Option<u32>,
    pub voucher_type: Option<String>,
    pub voucher_number: Option<u64>,
    pub cae: Option<String>,
    pub reason: String,
}

/// Result of `POST /settlements/reconcile`
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Recorded invoices copied onto their settlements
    pub repaired: Vec<RepairedSettlement>,
    /// Vouchers found at the authority and recorded under their claim
    pub recovered: Vec<RepairedSettlement>,
    pub released_claims: Vec<ReleasedClaim>,
    pub held_claims: Vec<HeldClaim>,
}

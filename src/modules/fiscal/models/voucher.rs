use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::fiscal::strip_dashes;
use crate::core::money::VoucherAmounts;
use crate::core::{AppError, AuthorityMessage, Result};

/// Letter class of a voucher; determines VAT discrimination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherClass {
    A,
    B,
    C,
}

impl fmt::Display for VoucherClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoucherClass::A => write!(f, "A"),
            VoucherClass::B => write!(f, "B"),
            VoucherClass::C => write!(f, "C"),
        }
    }
}

/// Voucher types accepted by the electronic invoicing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoucherType {
    #[serde(rename = "A", alias = "a")]
    InvoiceA,
    #[serde(rename = "B", alias = "b")]
    InvoiceB,
    #[serde(rename = "C", alias = "c")]
    InvoiceC,
    #[serde(rename = "ND_A")]
    DebitNoteA,
    #[serde(rename = "ND_B")]
    DebitNoteB,
    #[serde(rename = "ND_C")]
    DebitNoteC,
    #[serde(rename = "NC_A")]
    CreditNoteA,
    #[serde(rename = "NC_B")]
    CreditNoteB,
    #[serde(rename = "NC_C")]
    CreditNoteC,
    #[serde(rename = "FCE_A")]
    CreditInvoiceA,
    #[serde(rename = "FCE_B")]
    CreditInvoiceB,
    #[serde(rename = "FCE_C")]
    CreditInvoiceC,
}

impl VoucherType {
    pub const ALL: [VoucherType; 12] = [
        VoucherType::InvoiceA,
        VoucherType::InvoiceB,
        VoucherType::InvoiceC,
        VoucherType::DebitNoteA,
        VoucherType::DebitNoteB,
        VoucherType::DebitNoteC,
        VoucherType::CreditNoteA,
        VoucherType::CreditNoteB,
        VoucherType::CreditNoteC,
        VoucherType::CreditInvoiceA,
        VoucherType::CreditInvoiceB,
        VoucherType::CreditInvoiceC,
    ];

    /// Numeric code (`CbteTipo`)
    pub fn code(&self) -> u16 {
        match self {
            VoucherType::InvoiceA => 1,
            VoucherType::DebitNoteA => 2,
            VoucherType::CreditNoteA => 3,
            VoucherType::InvoiceB => 6,
            VoucherType::DebitNoteB => 7,
            VoucherType::CreditNoteB => 8,
            VoucherType::InvoiceC => 11,
            VoucherType::DebitNoteC => 12,
            VoucherType::CreditNoteC => 13,
            VoucherType::CreditInvoiceA => 201,
            VoucherType::CreditInvoiceB => 206,
            VoucherType::CreditInvoiceC => 211,
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            VoucherType::InvoiceA => "A",
            VoucherType::InvoiceB => "B",
            VoucherType::InvoiceC => "C",
            VoucherType::DebitNoteA => "ND_A",
            VoucherType::DebitNoteB => "ND_B",
            VoucherType::DebitNoteC => "ND_C",
            VoucherType::CreditNoteA => "NC_A",
            VoucherType::CreditNoteB => "NC_B",
            VoucherType::CreditNoteC => "NC_C",
            VoucherType::CreditInvoiceA => "FCE_A",
            VoucherType::CreditInvoiceB => "FCE_B",
            VoucherType::CreditInvoiceC => "FCE_C",
        }
    }

    pub fn class(&self) -> VoucherClass {
        match self {
            VoucherType::InvoiceA
            | VoucherType::DebitNoteA
            | VoucherType::CreditNoteA
            | VoucherType::CreditInvoiceA => VoucherClass::A,
            VoucherType::InvoiceB
            | VoucherType::DebitNoteB
            | VoucherType::CreditNoteB
            | VoucherType::CreditInvoiceB => VoucherClass::B,
            VoucherType::InvoiceC
            | VoucherType::DebitNoteC
            | VoucherType::CreditNoteC
            | VoucherType::CreditInvoiceC => VoucherClass::C,
        }
    }

    /// Factoring-eligible invoice (FCE)
    pub fn is_credit_invoice(&self) -> bool {
        matches!(
            self,
            VoucherType::CreditInvoiceA | VoucherType::CreditInvoiceB | VoucherType::CreditInvoiceC
        )
    }

    /// Debit and credit notes must reference the voucher they adjust
    pub fn is_note(&self) -> bool {
        matches!(
            self,
            VoucherType::DebitNoteA
                | VoucherType::DebitNoteB
                | VoucherType::DebitNoteC
                | VoucherType::CreditNoteA
                | VoucherType::CreditNoteB
                | VoucherType::CreditNoteC
        )
    }

    /// Plain invoice of the given class
    pub fn invoice(class: VoucherClass) -> Self {
        match class {
            VoucherClass::A => VoucherType::InvoiceA,
            VoucherClass::B => VoucherType::InvoiceB,
            VoucherClass::C => VoucherType::InvoiceC,
        }
    }

    pub fn credit_invoice(class: VoucherClass) -> Self {
        match class {
            VoucherClass::A => VoucherType::CreditInvoiceA,
            VoucherClass::B => VoucherType::CreditInvoiceB,
            VoucherClass::C => VoucherType::CreditInvoiceC,
        }
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for VoucherType {
    type Err = AppError;

    /// Accepts wire names (`A`, `NC_B`, `FCE_A`) or numeric codes (`1`, `201`)
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(code) = s.parse::<u16>() {
            return Self::from_code(code)
                .ok_or_else(|| AppError::validation(format!("Unknown voucher type code: {}", code)));
        }

        let upper = s.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|t| t.wire_name() == upper)
            .ok_or_else(|| AppError::validation(format!("Unknown voucher type: {}", s)))
    }
}

impl TryFrom<String> for VoucherType {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// What the voucher bills for (`Concepto`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Concept {
    #[serde(alias = "productos")]
    Products,
    #[serde(alias = "servicios")]
    Services,
    #[serde(alias = "productos_y_servicios")]
    ProductsAndServices,
}

impl Concept {
    pub fn code(&self) -> u8 {
        match self {
            Concept::Products => 1,
            Concept::Services => 2,
            Concept::ProductsAndServices => 3,
        }
    }

    /// Service period and payment due date are mandatory for these concepts
    pub fn requires_service_dates(&self) -> bool {
        !matches!(self, Concept::Products)
    }
}

/// Counterparty document type (`DocTipo`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocType {
    Cuit,
    Cuil,
    Dni,
    #[serde(alias = "FINAL_CONSUMER")]
    ConsumidorFinal,
}

impl DocType {
    pub fn code(&self) -> u8 {
        match self {
            DocType::Cuit => 80,
            DocType::Cuil => 86,
            DocType::Dni => 96,
            DocType::ConsumidorFinal => 99,
        }
    }
}

/// Voucher adjusted by a credit or debit note (`CbtesAsoc`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociatedVoucher {
    pub voucher_type: VoucherType,
    pub point_of_sale: u32,
    pub number: u64,
}

/// Bank account details carried by factoring invoices
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditInvoiceDetails {
    /// Issuer CBU, 22 digits
    pub issuer_cbu: String,
    pub issuer_alias: Option<String>,
    pub receiver_cbu: Option<String>,
    pub receiver_alias: Option<String>,
    /// Transmitted as `SCA` (transferable) or `ADC`
    pub transferable: bool,
}

/// One voucher to authorize
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoucherRequest {
    pub point_of_sale: u32,
    pub voucher_type: VoucherType,
    pub concept: Concept,
    pub doc_type: DocType,
    /// Counterparty document number, digits only once normalized
    pub doc_number: String,
    pub issue_date: NaiveDate,
    pub amounts: VoucherAmounts,
    pub service_from: Option<NaiveDate>,
    pub service_to: Option<NaiveDate>,
    pub payment_due: Option<NaiveDate>,
    pub associated: Option<AssociatedVoucher>,
    pub credit: Option<CreditInvoiceDetails>,
}

/// Maximum point of sale number the authority accepts
pub const MAX_POINT_OF_SALE: u32 = 99_999;

pub const CBU_LENGTH: usize = 22;

fn is_cbu(value: &str) -> bool {
    value.len() == CBU_LENGTH && value.chars().all(|c| c.is_ascii_digit())
}

impl VoucherRequest {
    /// Strip separators from tax ids and bank accounts
    pub fn normalized(mut self) -> Self {
        self.doc_number = strip_dashes(&self.doc_number);
        if let Some(credit) = self.credit.as_mut() {
            credit.issuer_cbu = strip_dashes(&credit.issuer_cbu);
            credit.receiver_cbu = credit.receiver_cbu.as_deref().map(strip_dashes);
            credit.issuer_alias = credit
                .issuer_alias
                .take()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty());
            credit.receiver_alias = credit
                .receiver_alias
                .take()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty());
        }
        self
    }

    /// Local checks run before anything is sent to the authority
    pub fn validate(&self) -> Result<()> {
        if self.point_of_sale == 0 || self.point_of_sale > MAX_POINT_OF_SALE {
            return Err(AppError::validation(format!(
                "Point of sale must be between 1 and {}",
                MAX_POINT_OF_SALE
            )));
        }

        if self.doc_number.is_empty() || !self.doc_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(AppError::validation(
                "Counterparty document number is required and must be numeric",
            ));
        }

        if matches!(self.doc_type, DocType::Cuit | DocType::Cuil) && self.doc_number.len() != 11 {
            return Err(AppError::validation("Counterparty CUIT must have 11 digits"));
        }

        self.amounts.validate()?;

        if self.voucher_type.class() == VoucherClass::C && !self.amounts.vat.is_zero() {
            return Err(AppError::validation(
                "Class C vouchers cannot discriminate VAT",
            ));
        }

        if self.concept.requires_service_dates() {
            let (Some(from), Some(to)) = (self.service_from, self.service_to) else {
                return Err(AppError::validation(
                    "Service period start and end dates are required for services",
                ));
            };
            if self.payment_due.is_none() {
                return Err(AppError::validation(
                    "Payment due date is required for services",
                ));
            }
            if from > to {
                return Err(AppError::validation(
                    "Service period start must not be after its end",
                ));
            }
        }

        if self.voucher_type.is_note() && self.associated.is_none() {
            return Err(AppError::validation(
                "Credit and debit notes require the associated voucher",
            ));
        }

        if self.voucher_type.is_credit_invoice() {
            self.validate_credit_invoice()?;
        } else if self.credit.is_some() {
            return Err(AppError::validation(
                "Bank account details only apply to FCE vouchers",
            ));
        }

        Ok(())
    }

    fn validate_credit_invoice(&self) -> Result<()> {
        let credit = self
            .credit
            .as_ref()
            .ok_or_else(|| AppError::validation("Issuer CBU is required for FCE vouchers"))?;

        if !is_cbu(&credit.issuer_cbu) {
            return Err(AppError::validation("Issuer CBU must have exactly 22 digits"));
        }

        if let Some(receiver) = credit.receiver_cbu.as_deref() {
            if !is_cbu(receiver) {
                return Err(AppError::validation(
                    "Receiver CBU must have exactly 22 digits",
                ));
            }
        }

        if self.doc_type != DocType::Cuit {
            return Err(AppError::validation("FCE receivers must be identified by CUIT"));
        }

        if self.payment_due.is_none() {
            return Err(AppError::validation(
                "Payment due date is required for FCE vouchers",
            ));
        }

        Ok(())
    }
}

/// Result code returned by the authority (`Resultado`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoucherOutcome {
    Approved,
    Rejected,
    ApprovedWithObservations,
}

impl VoucherOutcome {
    pub fn is_approved(&self) -> bool {
        !matches!(self, VoucherOutcome::Rejected)
    }
}

/// Interpreted authorization response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherResult {
    pub outcome: VoucherOutcome,
    /// Present only when approved
    pub voucher_number: Option<u64>,
    pub cae: Option<String>,
    pub cae_expiration: Option<NaiveDate>,
    pub errors: Vec<AuthorityMessage>,
    pub observations: Vec<AuthorityMessage>,
    pub raw_response: String,
    /// Receiver document, total and date as registered; only voucher queries report them
    #[serde(default)]
    pub doc_number: Option<String>,
    #[serde(default)]
    pub total: Option<Decimal>,
    #[serde(default)]
    pub issue_date: Option<NaiveDate>,
}

impl VoucherResult {
    /// Whether a queried voucher was issued to `doc_number` for `total`
    pub fn issued_for(&self, doc_number: &str, total: Decimal) -> bool {
        self.doc_number.as_deref() == Some(doc_number) && self.total == Some(total)
    }

    /// CAE, its expiration and the assigned number, or an error when any is missing
    pub fn authorization(&self) -> Result<(String, NaiveDate, u64)> {
        match (&self.cae, self.cae_expiration, self.voucher_number) {
            (Some(cae), Some(expiration), Some(number)) if self.outcome.is_approved() => {
                Ok((cae.clone(), expiration, number))
            }
            _ => Err(AppError::upstream_with_raw(
                "Approved response without CAE, expiration or voucher number",
                self.raw_response.clone(),
            )),
        }
    }

    /// Turn a rejection into the matching error
    pub fn into_rejection(self) -> AppError {
        AppError::RejectedVoucher {
            errors: self.errors,
            observations: self.observations,
            raw: Some(self.raw_response),
        }
    }
}

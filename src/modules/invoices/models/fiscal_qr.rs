use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Invoice;
use crate::config::fiscal::strip_dashes;
use crate::core::money::PESOS_CODE;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::DocType;

/// Verification page the QR points to; the payload follows as base64 JSON
pub const QR_URL_PREFIX: &str = "https://www.afip.gob.ar/fe/qr/?p=";

const QR_VERSION: u8 = 1;
/// Authorization by CAE
const CAE_CODE_KIND: &str = "E";

/// Payload of the invoice verification QR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FiscalQr {
    pub ver: u8,
    pub fecha: NaiveDate,
    pub cuit: u64,
    pub pto_vta: u32,
    pub tipo_cmp: u16,
    pub nro_cmp: u64,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub importe: Decimal,
    pub moneda: String,
    pub ctz: u32,
    pub tipo_doc_rec: u8,
    pub nro_doc_rec: u64,
    pub tipo_cod_aut: String,
    pub cod_aut: u64,
}

impl FiscalQr {
    pub fn from_invoice(invoice: &Invoice, issuer_cuit: &str) -> Result<Self> {
        Ok(Self {
            ver: QR_VERSION,
            fecha: invoice.issue_date,
            cuit: numeric("issuer CUIT", issuer_cuit)?,
            pto_vta: invoice.point_of_sale,
            tipo_cmp: invoice.voucher_type.code(),
            nro_cmp: invoice.voucher_number,
            importe: invoice.total_amount,
            moneda: PESOS_CODE.to_string(),
            ctz: 1,
            tipo_doc_rec: DocType::Cuit.code(),
            nro_doc_rec: numeric("client CUIT", &invoice.client_cuit)?,
            tipo_cod_aut: CAE_CODE_KIND.to_string(),
            cod_aut: numeric("CAE", &invoice.cae)?,
        })
    }

    pub fn url(&self) -> Result<String> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| AppError::internal(format!("Cannot encode QR payload: {}", e)))?;
        Ok(format!("{}{}", QR_URL_PREFIX, BASE64.encode(payload)))
    }

    /// Read the payload back from a verification URL
    pub fn from_url(url: &str) -> Result<Self> {
        let encoded = url
            .strip_prefix(QR_URL_PREFIX)
            .ok_or_else(|| AppError::validation("Not a fiscal QR URL"))?;
        let payload = BASE64
            .decode(encoded)
            .map_err(|e| AppError::validation(format!("Invalid QR payload: {}", e)))?;
        Ok(serde_json::from_slice(&payload)?)
    }
}

fn numeric(field: &str, value: &str) -> Result<u64> {
    strip_dashes(value)
        .parse()
        .map_err(|_| AppError::validation(format!("{} '{}' is not numeric", field, value)))
}

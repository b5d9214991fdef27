//! Request builders and response parsers for the electronic invoicing service.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt::Write;

use super::soap::{self, decode_entities, extract_all, extract_tag, fault_string};
use crate::core::money::{format_wire_amount, PESOS_CODE};
use crate::core::timezone::{format_authority_date, parse_date};
use crate::core::{AppError, AuthorityMessage, Result};
use crate::modules::fiscal::models::{
    AccessTicket, PointOfSale, ServiceStatus, VoucherClass, VoucherOutcome, VoucherRequest,
    VoucherResult, VoucherType,
};

pub const WSFE_NAMESPACE: &str = "http://ar.gov.afip.dif.FEV1/";

/// VAT aliquot ids
const VAT_21_ID: u8 = 5;
const VAT_0_ID: u8 = 3;

/// Optional field ids for factoring invoices
const OPTIONAL_ISSUER_CBU: &str = "2101";
const OPTIONAL_ISSUER_ALIAS: &str = "2102";
const OPTIONAL_TRANSFER_MODE: &str = "27";

/// Error codes with special meaning
const NO_RESULTS_CODE: i64 = 602;
const TOKEN_ERROR_CODES: [i64; 2] = [600, 601];

pub fn soap_action(operation: &str) -> String {
    format!("{}{}", WSFE_NAMESPACE, operation)
}

fn operation(name: &str, inner: &str) -> String {
    soap::envelope("ar", WSFE_NAMESPACE, &format!("<ar:{0}>{1}</ar:{0}>", name, inner))
}

fn auth(ticket: &AccessTicket, cuit: &str) -> String {
    format!(
        "<ar:Auth><ar:Token>{}</ar:Token><ar:Sign>{}</ar:Sign><ar:Cuit>{}</ar:Cuit></ar:Auth>",
        soap::escape_xml(&ticket.token),
        soap::escape_xml(&ticket.sign),
        cuit
    )
}

pub fn dummy_request() -> String {
    soap::envelope("ar", WSFE_NAMESPACE, "<ar:FEDummy/>")
}

pub fn last_authorized_request(
    ticket: &AccessTicket,
    cuit: &str,
    point_of_sale: u32,
    voucher_type: VoucherType,
) -> String {
    operation(
        "FECompUltimoAutorizado",
        &format!(
            "{}<ar:PtoVta>{}</ar:PtoVta><ar:CbteTipo>{}</ar:CbteTipo>",
            auth(ticket, cuit),
            point_of_sale,
            voucher_type.code()
        ),
    )
}

pub fn points_of_sale_request(ticket: &AccessTicket, cuit: &str) -> String {
    operation("FEParamGetPtosVenta", &auth(ticket, cuit))
}

pub fn voucher_types_request(ticket: &AccessTicket, cuit: &str) -> String {
    operation("FEParamGetTiposCbte", &auth(ticket, cuit))
}

pub fn voucher_query_request(
    ticket: &AccessTicket,
    cuit: &str,
    point_of_sale: u32,
    voucher_type: VoucherType,
    number: u64,
) -> String {
    operation(
        "FECompConsultar",
        &format!(
            "{}<ar:FeCompConsReq><ar:CbteTipo>{}</ar:CbteTipo><ar:CbteNro>{}</ar:CbteNro><ar:PtoVta>{}</ar:PtoVta></ar:FeCompConsReq>",
            auth(ticket, cuit),
            voucher_type.code(),
            number,
            point_of_sale
        ),
    )
}

/// `FECAESolicitar` for exactly one voucher numbered `number`
pub fn authorization_request(
    ticket: &AccessTicket,
    cuit: &str,
    request: &VoucherRequest,
    number: u64,
) -> String {
    let amounts = &request.amounts;
    let class_c = request.voucher_type.class() == VoucherClass::C;
    let vat = if class_c { Decimal::ZERO } else { amounts.vat };

    let mut detail = String::with_capacity(1024);
    // write! into a String cannot fail
    let _ = write!(
        detail,
        "<ar:Concepto>{}</ar:Concepto><ar:DocTipo>{}</ar:DocTipo><ar:DocNro>{}</ar:DocNro><ar:CbteDesde>{n}</ar:CbteDesde><ar:CbteHasta>{n}</ar:CbteHasta><ar:CbteFch>{}</ar:CbteFch>",
        request.concept.code(),
        request.doc_type.code(),
        request.doc_number,
        format_authority_date(request.issue_date),
        n = number,
    );
    let _ = write!(
        detail,
        "<ar:ImpTotal>{}</ar:ImpTotal><ar:ImpTotConc>0.00</ar:ImpTotConc><ar:ImpNeto>{}</ar:ImpNeto><ar:ImpOpEx>0.00</ar:ImpOpEx><ar:ImpTrib>0.00</ar:ImpTrib><ar:ImpIVA>{}</ar:ImpIVA>",
        format_wire_amount(amounts.net + vat),
        format_wire_amount(amounts.net),
        format_wire_amount(vat),
    );

    if request.concept.requires_service_dates() {
        if let (Some(from), Some(to)) = (request.service_from, request.service_to) {
            let _ = write!(
                detail,
                "<ar:FchServDesde>{}</ar:FchServDesde><ar:FchServHasta>{}</ar:FchServHasta>",
                format_authority_date(from),
                format_authority_date(to)
            );
        }
    }
    if request.concept.requires_service_dates() || request.voucher_type.is_credit_invoice() {
        if let Some(due) = request.payment_due {
            let _ = write!(detail, "<ar:FchVtoPago>{}</ar:FchVtoPago>", format_authority_date(due));
        }
    }

    let _ = write!(detail, "<ar:MonId>{}</ar:MonId><ar:MonCotiz>1</ar:MonCotiz>", PESOS_CODE);

    if let Some(associated) = request.associated {
        let _ = write!(
            detail,
            "<ar:CbtesAsoc><ar:CbteAsoc><ar:Tipo>{}</ar:Tipo><ar:PtoVta>{}</ar:PtoVta><ar:Nro>{}</ar:Nro></ar:CbteAsoc></ar:CbtesAsoc>",
            associated.voucher_type.code(),
            associated.point_of_sale,
            associated.number
        );
    }

    if !class_c {
        let aliquot = if vat.is_zero() { VAT_0_ID } else { VAT_21_ID };
        let _ = write!(
            detail,
            "<ar:Iva><ar:AlicIva><ar:Id>{}</ar:Id><ar:BaseImp>{}</ar:BaseImp><ar:Importe>{}</ar:Importe></ar:AlicIva></ar:Iva>",
            aliquot,
            format_wire_amount(amounts.net),
            format_wire_amount(vat)
        );
    }

    if let Some(credit) = request.credit.as_ref().filter(|_| request.voucher_type.is_credit_invoice()) {
        detail.push_str("<ar:Opcionales>");
        push_optional(&mut detail, OPTIONAL_ISSUER_CBU, &credit.issuer_cbu);
        if let Some(alias) = credit.issuer_alias.as_deref() {
            push_optional(&mut detail, OPTIONAL_ISSUER_ALIAS, alias);
        }
        push_optional(
            &mut detail,
            OPTIONAL_TRANSFER_MODE,
            if credit.transferable { "SCA" } else { "ADC" },
        );
        detail.push_str("</ar:Opcionales>");
    }

    operation(
        "FECAESolicitar",
        &format!(
            "{}<ar:FeCAEReq><ar:FeCabReq><ar:CantReg>1</ar:CantReg><ar:PtoVta>{}</ar:PtoVta><ar:CbteTipo>{}</ar:CbteTipo></ar:FeCabReq><ar:FeDetReq><ar:FECAEDetRequest>{}</ar:FECAEDetRequest></ar:FeDetReq></ar:FeCAEReq>",
            auth(ticket, cuit),
            request.point_of_sale,
            request.voucher_type.code(),
            detail
        ),
    )
}

fn push_optional(out: &mut String, id: &str, value: &str) {
    let _ = write!(
        out,
        "<ar:Opcional><ar:Id>{}</ar:Id><ar:Valor>{}</ar:Valor></ar:Opcional>",
        id,
        soap::escape_xml(value)
    );
}

fn messages(xml: &str, item: &str) -> Vec<AuthorityMessage> {
    extract_all(xml, item)
        .into_iter()
        .map(|block| {
            let code = extract_tag(block, "Code")
                .and_then(|c| c.parse().ok())
                .unwrap_or(0);
            let message = extract_tag(block, "Msg")
                .map(|m| decode_entities(&m))
                .unwrap_or_default();
            AuthorityMessage::new(code, message)
        })
        .collect()
}

/// Authority-level errors (`Errors/Err`)
pub fn errors(xml: &str) -> Vec<AuthorityMessage> {
    messages(xml, "Err")
}

pub fn observations(xml: &str) -> Vec<AuthorityMessage> {
    messages(xml, "Obs")
}

fn describe(errors: &[AuthorityMessage]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Fault or error list in a non-authorization response
fn ensure_no_errors(body: &str, operation: &str) -> Result<()> {
    if let Some(fault) = fault_string(body) {
        return Err(AppError::upstream_with_raw(
            format!("{} fault: {}", operation, fault),
            body,
        ));
    }

    let errors = errors(body);
    if errors.is_empty() {
        return Ok(());
    }

    if errors.iter().any(|e| TOKEN_ERROR_CODES.contains(&e.code)) {
        return Err(AppError::credential(format!(
            "Access ticket refused by {}: {}",
            operation,
            describe(&errors)
        )));
    }

    Err(AppError::upstream_with_raw(
        format!("{} failed: {}", operation, describe(&errors)),
        body,
    ))
}

fn only_no_results(body: &str) -> bool {
    let errors = errors(body);
    !errors.is_empty() && errors.iter().all(|e| e.code == NO_RESULTS_CODE)
}

pub fn parse_last_authorized(body: &str) -> Result<u64> {
    ensure_no_errors(body, "FECompUltimoAutorizado")?;
    extract_tag(body, "CbteNro")
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| {
            AppError::upstream_with_raw("FECompUltimoAutorizado response without CbteNro", body)
        })
}

pub fn parse_service_status(body: &str) -> ServiceStatus {
    let ok = |tag: &str| {
        extract_tag(body, tag)
            .map(|v| v.eq_ignore_ascii_case("OK"))
            .unwrap_or(false)
    };
    ServiceStatus {
        app_server: ok("AppServer"),
        db_server: ok("DbServer"),
        auth_server: ok("AuthServer"),
    }
}

/// Points of sale without their enabled voucher types
pub fn parse_points_of_sale(body: &str) -> Result<Vec<PointOfSale>> {
    if fault_string(body).is_none() && only_no_results(body) {
        return Ok(Vec::new());
    }
    ensure_no_errors(body, "FEParamGetPtosVenta")?;

    let mut points = Vec::new();
    for block in extract_all(body, "PtoVenta") {
        let Some(number) = extract_tag(block, "Nro").and_then(|n| n.parse().ok()) else {
            continue;
        };
        points.push(PointOfSale {
            number,
            emission_type: extract_tag(block, "EmisionTipo").unwrap_or_default(),
            blocked: extract_tag(block, "Bloqueado")
                .map(|b| b.eq_ignore_ascii_case("S"))
                .unwrap_or(false),
            deleted_on: extract_tag(block, "FchBaja").and_then(|d| optional_date(&d)),
            enabled_voucher_types: Vec::new(),
        });
    }
    Ok(points)
}

/// Voucher types currently enabled for the issuer and known to this client
pub fn parse_voucher_types(body: &str, today: NaiveDate) -> Result<Vec<VoucherType>> {
    ensure_no_errors(body, "FEParamGetTiposCbte")?;

    let mut types = Vec::new();
    for block in extract_all(body, "CbteTipo") {
        let Some(voucher_type) = extract_tag(block, "Id")
            .and_then(|id| id.parse().ok())
            .and_then(VoucherType::from_code)
        else {
            continue;
        };
        let retired = extract_tag(block, "FchHasta")
            .and_then(|d| optional_date(&d))
            .map(|until| until < today)
            .unwrap_or(false);
        if !retired && !types.contains(&voucher_type) {
            types.push(voucher_type);
        }
    }
    Ok(types)
}

fn optional_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("NULL") {
        return None;
    }
    parse_date(raw)
}

/// What a `FECAESolicitar` reply says about the attempted voucher
#[derive(Debug)]
pub enum AuthorizationReply {
    Decided(VoucherResult),
    /// Neither a fault nor a readable decision; the voucher may have registered
    Inconclusive(AppError),
}

/// Interpret a `FECAESolicitar` response for the voucher numbered `attempted`
pub fn parse_authorization(body: &str, attempted: u64) -> Result<AuthorizationReply> {
    if let Some(fault) = fault_string(body) {
        return Err(AppError::upstream_with_raw(
            format!("FECAESolicitar fault: {}", fault),
            body,
        ));
    }

    let detail = extract_all(body, "FECAEDetResponse")
        .into_iter()
        .next()
        .unwrap_or(body);
    let errors = errors(body);
    let observations = observations(detail);

    let result_code = extract_tag(detail, "Resultado").or_else(|| extract_tag(body, "Resultado"));

    let outcome = match result_code.as_deref() {
        Some("A") if observations.is_empty() => VoucherOutcome::Approved,
        Some("A") => VoucherOutcome::ApprovedWithObservations,
        Some("R") | Some("P") => VoucherOutcome::Rejected,
        None if !errors.is_empty() => {
            if errors.iter().any(|e| TOKEN_ERROR_CODES.contains(&e.code)) {
                return Err(AppError::credential(format!(
                    "Access ticket refused by FECAESolicitar: {}",
                    describe(&errors)
                )));
            }
            VoucherOutcome::Rejected
        }
        other => {
            return Ok(AuthorizationReply::Inconclusive(AppError::upstream_with_raw(
                format!("Unreadable FECAESolicitar reply (result {:?})", other),
                body,
            )))
        }
    };

    if outcome == VoucherOutcome::Rejected {
        let errors = if !errors.is_empty() {
            errors
        } else if !observations.is_empty() {
            observations.clone()
        } else {
            vec![AuthorityMessage::new(-1, "Rejected without an error detail")]
        };
        return Ok(AuthorizationReply::Decided(VoucherResult {
            outcome,
            voucher_number: None,
            cae: None,
            cae_expiration: None,
            errors,
            observations,
            raw_response: body.to_string(),
            doc_number: None,
            total: None,
            issue_date: None,
        }));
    }

    let cae = extract_tag(detail, "CAE").filter(|c| !c.is_empty());
    let cae_expiration = extract_tag(detail, "CAEFchVto").and_then(|d| parse_date(&d));
    if cae.is_none() || cae_expiration.is_none() {
        return Ok(AuthorizationReply::Inconclusive(AppError::upstream_with_raw(
            "Approved response without CAE or its expiration",
            body,
        )));
    }

    let voucher_number = extract_tag(detail, "CbteDesde")
        .and_then(|n| n.parse().ok())
        .unwrap_or(attempted);

    Ok(AuthorizationReply::Decided(VoucherResult {
        outcome,
        voucher_number: Some(voucher_number),
        cae,
        cae_expiration,
        errors,
        observations,
        raw_response: body.to_string(),
        doc_number: None,
        total: None,
        issue_date: None,
    }))
}

/// Interpret a `FECompConsultar` response; `None` when the voucher does not exist
pub fn parse_voucher_query(body: &str) -> Result<Option<VoucherResult>> {
    if fault_string(body).is_none() && only_no_results(body) {
        return Ok(None);
    }
    ensure_no_errors(body, "FECompConsultar")?;

    let Some(result) = extract_all(body, "ResultGet").into_iter().next() else {
        return Ok(None);
    };

    let cae = extract_tag(result, "CodAutorizacion").filter(|c| !c.is_empty());
    let cae_expiration = extract_tag(result, "FchVto").and_then(|d| parse_date(&d));
    let voucher_number = extract_tag(result, "CbteDesde").and_then(|n| n.parse().ok());
    let observations = observations(result);

    let outcome = match extract_tag(result, "Resultado").as_deref() {
        Some("A") if observations.is_empty() => VoucherOutcome::Approved,
        Some("A") => VoucherOutcome::ApprovedWithObservations,
        _ => VoucherOutcome::Rejected,
    };

    Ok(Some(VoucherResult {
        outcome,
        voucher_number,
        cae,
        cae_expiration,
        errors: Vec::new(),
        observations,
        raw_response: body.to_string(),
        doc_number: extract_tag(result, "DocNro"),
        total: extract_tag(result, "ImpTotal").and_then(|t| t.parse::<Decimal>().ok()),
        issue_date: extract_tag(result, "CbteFch").and_then(|d| parse_date(&d)),
    }))
}

// Canned authority replies and request bodies

use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use fiscal_billing::fiscal::services::soap::escape_xml;

fn envelope(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?><soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>{}</soap:Body></soap:Envelope>"#,
        body
    )
}

/// `loginCms` reply with a ticket valid for twelve hours
pub fn login_reply(token: &str) -> String {
    let expires = (Utc::now() + Duration::hours(12)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let ticket = format!(
        "<loginTicketResponse version=\"1.0\"><header><expirationTime>{}</expirationTime></header><credentials><token>{}</token><sign>SIGN-{}</sign></credentials></loginTicketResponse>",
        expires, token, token
    );
    format!(
        "<soapenv:Envelope><soapenv:Body><loginCmsResponse><loginCmsReturn>{}</loginCmsReturn></loginCmsResponse></soapenv:Body></soapenv:Envelope>",
        escape_xml(&ticket)
    )
}

pub fn login_fault(message: &str) -> String {
    format!(
        "<soapenv:Envelope><soapenv:Body><soapenv:Fault><faultcode>ns1:coe.notAuthorized</faultcode><faultstring>{}</faultstring></soapenv:Fault></soapenv:Body></soapenv:Envelope>",
        message
    )
}

pub fn last_authorized_reply(last: u64) -> String {
    envelope(&format!(
        "<FECompUltimoAutorizadoResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FECompUltimoAutorizadoResult><PtoVta>4</PtoVta><CbteTipo>1</CbteTipo><CbteNro>{}</CbteNro></FECompUltimoAutorizadoResult></FECompUltimoAutorizadoResponse>",
        last
    ))
}

pub fn dummy_reply(app: &str, db: &str, auth: &str) -> String {
    envelope(&format!(
        "<FEDummyResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FEDummyResult><AppServer>{}</AppServer><DbServer>{}</DbServer><AuthServer>{}</AuthServer></FEDummyResult></FEDummyResponse>",
        app, db, auth
    ))
}

pub fn approved_reply(number: u64, cae: &str, expiration: &str) -> String {
    envelope(&format!(
        "<FECAESolicitarResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FECAESolicitarResult><FeCabResp><Resultado>A</Resultado></FeCabResp><FeDetResp><FECAEDetResponse><Concepto>2</Concepto><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><Resultado>A</Resultado><CAE>{}</CAE><CAEFchVto>{}</CAEFchVto></FECAEDetResponse></FeDetResp></FECAESolicitarResult></FECAESolicitarResponse>",
        cae,
        expiration,
        n = number
    ))
}

pub fn rejected_reply(code: i64, message: &str) -> String {
    envelope(&format!(
        "<FECAESolicitarResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FECAESolicitarResult><FeCabResp><Resultado>R</Resultado></FeCabResp><FeDetResp><FECAEDetResponse><Resultado>R</Resultado><CAE></CAE></FECAEDetResponse></FeDetResp><Errors><Err><Code>{}</Code><Msg>{}</Msg></Err></Errors></FECAESolicitarResult></FECAESolicitarResponse>",
        code, message
    ))
}

/// Error list with the given code, e.g. 602 (no results) or 600 (bad token)
pub fn error_reply(operation: &str, code: i64, message: &str) -> String {
    envelope(&format!(
        "<{op}Response xmlns=\"http://ar.gov.afip.dif.FEV1/\"><{op}Result><Errors><Err><Code>{}</Code><Msg>{}</Msg></Err></Errors></{op}Result></{op}Response>",
        code,
        message,
        op = operation
    ))
}

/// Approved voucher issued to 30716254972 for 1000.00
pub fn voucher_query_reply(number: u64, cae: &str, expiration: &str) -> String {
    voucher_query_reply_for(number, cae, expiration, "30716254972", "1000.00")
}

pub fn voucher_query_reply_for(
    number: u64,
    cae: &str,
    expiration: &str,
    doc_number: &str,
    total: &str,
) -> String {
    envelope(&format!(
        "<FECompConsultarResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FECompConsultarResult><ResultGet><Concepto>2</Concepto><DocTipo>80</DocTipo><DocNro>{}</DocNro><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><CbteFch>20250210</CbteFch><ImpTotal>{}</ImpTotal><Resultado>A</Resultado><CodAutorizacion>{}</CodAutorizacion><EmisionTipo>CAE</EmisionTipo><FchVto>{}</FchVto></ResultGet></FECompConsultarResult></FECompConsultarResponse>",
        doc_number,
        total,
        cae,
        expiration,
        n = number
    ))
}

/// Approval that lost its CAE on the way
pub fn approved_without_cae_reply(number: u64) -> String {
    envelope(&format!(
        "<FECAESolicitarResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FECAESolicitarResult><FeCabResp><Resultado>A</Resultado></FeCabResp><FeDetResp><FECAEDetResponse><CbteDesde>{n}</CbteDesde><CbteHasta>{n}</CbteHasta><Resultado>A</Resultado><CAE></CAE><CAEFchVto></CAEFchVto></FECAEDetResponse></FeDetResp></FECAESolicitarResult></FECAESolicitarResponse>",
        n = number
    ))
}

pub const GATEWAY_TIMEOUT_PAGE: &str = "<html><body>504 Gateway Time-out</body></html>";

/// Points of sale as `(number, blocked)`
pub fn points_of_sale_reply(points: &[(u32, bool)]) -> String {
    let items: String = points
        .iter()
        .map(|(number, blocked)| {
            format!(
                "<PtoVenta><Nro>{}</Nro><EmisionTipo>CAE - RECE</EmisionTipo><Bloqueado>{}</Bloqueado><FchBaja>NULL</FchBaja></PtoVenta>",
                number,
                if *blocked { "S" } else { "N" }
            )
        })
        .collect();
    envelope(&format!(
        "<FEParamGetPtosVentaResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FEParamGetPtosVentaResult><ResultGet>{}</ResultGet></FEParamGetPtosVentaResult></FEParamGetPtosVentaResponse>",
        items
    ))
}

pub fn voucher_types_reply(codes: &[u16]) -> String {
    let items: String = codes
        .iter()
        .map(|code| {
            format!(
                "<CbteTipo><Id>{}</Id><Desc>Tipo {}</Desc><FchDesde>20100917</FchDesde><FchHasta>NULL</FchHasta></CbteTipo>",
                code, code
            )
        })
        .collect();
    envelope(&format!(
        "<FEParamGetTiposCbteResponse xmlns=\"http://ar.gov.afip.dif.FEV1/\"><FEParamGetTiposCbteResult><ResultGet>{}</ResultGet></FEParamGetTiposCbteResult></FEParamGetTiposCbteResponse>",
        items
    ))
}

/// Services invoice for January 2025, 826.45 + 173.55
pub fn services_invoice_body() -> Value {
    json!({
        "cuit": "30716254972",
        "total": 1000.00,
        "neto": 826.45,
        "iva": 173.55,
        "concepto": "servicios",
        "periodo_desde": "20250101",
        "periodo_hasta": "20250131"
    })
}

pub fn fce_invoice_body(issuer_cbu: &str) -> Value {
    json!({
        "cuit": "30716254972",
        "cliente_nombre": "Transportes del Sur SA",
        "total": 1000.00,
        "neto": 826.45,
        "iva": 173.55,
        "concepto": "servicios",
        "periodo_desde": "2025-01-01",
        "periodo_hasta": "2025-01-31",
        "cbu_emisor": issuer_cbu,
        "cbu_receptor": "0170099220000067890123",
        "alias_receptor": "SUR.PAGOS"
    })
}

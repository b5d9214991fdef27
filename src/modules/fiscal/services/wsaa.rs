//! Login ticket request (TRA) construction and `loginCms` response parsing.

use chrono::{DateTime, Duration, Utc};

use super::soap::{self, decode_entities, extract_tag, fault_string};
use crate::core::timezone::format_ticket_timestamp;
use crate::core::{AppError, Result};
use crate::modules::fiscal::models::AccessTicket;

pub const WSAA_NAMESPACE: &str = "http://wsaa.view.sua.dvadac.desein.afip.gov";

/// Lifetime requested for the login ticket request itself
const REQUEST_VALIDITY_MINUTES: i64 = 10;

/// Assumed ticket lifetime when the response omits `expirationTime`
const DEFAULT_TICKET_HOURS: i64 = 12;

/// Fault text returned while a previous ticket is still live
const TICKET_ALREADY_ISSUED: &str = "ya posee un ta valido";

pub fn login_ticket_request(service: &str, now: DateTime<Utc>) -> String {
    let expiration = now + Duration::minutes(REQUEST_VALIDITY_MINUTES);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><loginTicketRequest version="1.0"><header><uniqueId>{}</uniqueId><generationTime>{}</generationTime><expirationTime>{}</expirationTime></header><service>{}</service></loginTicketRequest>"#,
        now.timestamp(),
        format_ticket_timestamp(now),
        format_ticket_timestamp(expiration),
        soap::escape_xml(service)
    )
}

pub fn login_envelope(signed_cms: &str) -> String {
    soap::envelope(
        "wsaa",
        WSAA_NAMESPACE,
        &format!("<wsaa:loginCms><wsaa:in0>{}</wsaa:in0></wsaa:loginCms>", signed_cms),
    )
}

/// Extract the ticket embedded (escaped) in `loginCmsReturn`
pub fn parse_login_response(body: &str, service: &str, now: DateTime<Utc>) -> Result<AccessTicket> {
    if let Some(fault) = fault_string(body) {
        if fault.to_lowercase().contains(TICKET_ALREADY_ISSUED) {
            return Err(AppError::credential(format!(
                "The authentication service already issued a ticket that is still valid; wait for it to expire ({})",
                fault
            )));
        }
        return Err(AppError::credential(format!("Login rejected: {}", fault)));
    }

    let escaped = extract_tag(body, "loginCmsReturn").ok_or_else(|| {
        AppError::upstream_with_raw("Login response without loginCmsReturn", body)
    })?;
    let ticket_xml = decode_entities(&escaped);

    let token = extract_tag(&ticket_xml, "token").filter(|t| !t.is_empty());
    let sign = extract_tag(&ticket_xml, "sign").filter(|s| !s.is_empty());
    let (Some(token), Some(sign)) = (token, sign) else {
        return Err(AppError::upstream_with_raw(
            "Login response without token or sign",
            body,
        ));
    };

    let expires_at = extract_tag(&ticket_xml, "expirationTime")
        .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| now + Duration::hours(DEFAULT_TICKET_HOURS));

    Ok(AccessTicket {
        service: service.to_string(),
        token,
        sign,
        expires_at,
    })
}

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::core::{AppError, Result};

/// Tax authority environment (homologation or production)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AfipEnvironment {
    Testing,
    Production,
}

impl AfipEnvironment {
    pub fn wsaa_url(&self) -> &'static str {
        match self {
            AfipEnvironment::Production => "https://wsaa.afip.gov.ar/ws/services/LoginCms",
            AfipEnvironment::Testing => "https://wsaahomo.afip.gov.ar/ws/services/LoginCms",
        }
    }

    pub fn wsfe_url(&self) -> &'static str {
        match self {
            AfipEnvironment::Production => "https://servicios1.afip.gov.ar/wsfev1/service.asmx",
            AfipEnvironment::Testing => "https://wswhomo.afip.gov.ar/wsfev1/service.asmx",
        }
    }
}

impl std::fmt::Display for AfipEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AfipEnvironment::Testing => write!(f, "testing"),
            AfipEnvironment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for AfipEnvironment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "testing" | "homologacion" | "homo" => Ok(AfipEnvironment::Testing),
            "production" | "produccion" | "prod" => Ok(AfipEnvironment::Production),
            _ => Err(format!("Invalid AFIP environment: {}", s)),
        }
    }
}

/// Certificate and private key used to sign login requests, both PEM
#[derive(Clone)]
pub struct SigningMaterial {
    pub certificate_pem: String,
    pub private_key_pem: String,
}

// Key material must never reach the logs
impl std::fmt::Debug for SigningMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningMaterial")
            .field("certificate_pem", &format!("<{} bytes>", self.certificate_pem.len()))
            .field("private_key_pem", &"<redacted>")
            .finish()
    }
}

impl SigningMaterial {
    /// Accepts PEM text or base64-encoded PEM for both parts
    pub fn from_raw(certificate: &str, private_key: &str) -> Result<Self> {
        Ok(Self {
            certificate_pem: normalize_pem(certificate, "certificate")?,
            private_key_pem: normalize_pem(private_key, "private key")?,
        })
    }
}

fn normalize_pem(raw: &str, what: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.contains("-----BEGIN") {
        return Ok(raw.to_string());
    }

    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let decoded = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| AppError::Configuration(format!("Invalid base64 {}: {}", what, e)))?;
    let pem = String::from_utf8(decoded)
        .map_err(|_| AppError::Configuration(format!("Decoded {} is not UTF-8", what)))?;

    if !pem.contains("-----BEGIN") {
        return Err(AppError::Configuration(format!(
            "Decoded {} is not PEM encoded",
            what
        )));
    }

    Ok(pem)
}

/// Settings for the tax authority integration
#[derive(Debug, Clone)]
pub struct FiscalConfig {
    /// Issuer tax id (CUIT), digits only
    pub cuit: String,
    pub environment: AfipEnvironment,
    pub signing: Option<SigningMaterial>,
    pub wsaa_url: String,
    pub wsfe_url: String,
    pub request_timeout: Duration,
    pub read_retries: u32,
    pub ticket_safety_margin: Duration,
    pub default_point_of_sale: u32,
    pub payment_term_days: i64,
    pub validate_point_of_sale: bool,
    pub openssl_bin: String,
    pub settlement_claim_ttl: Duration,
}

impl FiscalConfig {
    pub fn new(cuit: impl Into<String>, environment: AfipEnvironment) -> Self {
        Self {
            cuit: strip_dashes(&cuit.into()),
            environment,
            signing: None,
            wsaa_url: environment.wsaa_url().to_string(),
            wsfe_url: environment.wsfe_url().to_string(),
            request_timeout: Duration::from_secs(30),
            read_retries: 2,
            ticket_safety_margin: Duration::from_secs(300),
            default_point_of_sale: 4,
            payment_term_days: 30,
            validate_point_of_sale: true,
            openssl_bin: "openssl".to_string(),
            settlement_claim_ttl: Duration::from_secs(900),
        }
    }

    pub fn from_env() -> Result<Self> {
        let environment: AfipEnvironment = env::var("AFIP_ENV")
            .unwrap_or_else(|_| "testing".to_string())
            .parse()
            .map_err(AppError::Configuration)?;

        let cuit = env::var("AFIP_CUIT").unwrap_or_default();
        let mut config = FiscalConfig::new(cuit, environment);

        config.signing = signing_material_from_env()?;

        if let Ok(url) = env::var("AFIP_WSAA_URL") {
            config.wsaa_url = url;
        }
        if let Ok(url) = env::var("AFIP_WSFE_URL") {
            config.wsfe_url = url;
        }

        config.request_timeout = Duration::from_secs(parse_var("AFIP_TIMEOUT_SECS", 30)?);
        config.read_retries = parse_var("AFIP_READ_RETRIES", 2)?;
        config.ticket_safety_margin =
            Duration::from_secs(parse_var("AFIP_TICKET_SAFETY_MARGIN_SECS", 300)?);
        config.default_point_of_sale = parse_var("AFIP_DEFAULT_POINT_OF_SALE", 4)?;
        config.payment_term_days = parse_var("AFIP_PAYMENT_TERM_DAYS", 30)?;
        config.validate_point_of_sale = env::var("AFIP_VALIDATE_POINT_OF_SALE")
            .map(|v| !(v.eq_ignore_ascii_case("false") || v == "0"))
            .unwrap_or(true);
        config.openssl_bin = env::var("OPENSSL_BIN").unwrap_or_else(|_| "openssl".to_string());
        config.settlement_claim_ttl =
            Duration::from_secs(parse_var("SETTLEMENT_CLAIM_TTL_SECS", 900)?);

        Ok(config)
    }

    /// Fill in values missing from the environment with a stored configuration row
    pub fn merge_stored(&mut self, stored: StoredFiscalConfig) -> Result<()> {
        if self.cuit.is_empty() {
            self.cuit = strip_dashes(&stored.cuit);
        }
        if self.signing.is_none() {
            self.signing = Some(SigningMaterial::from_raw(
                &stored.certificate,
                &stored.private_key,
            )?);
        }
        if let Some(environment) = stored
            .environment
            .as_deref()
            .and_then(|e| e.parse::<AfipEnvironment>().ok())
        {
            if env::var("AFIP_ENV").is_err() && environment != self.environment {
                self.environment = environment;
                if env::var("AFIP_WSAA_URL").is_err() {
                    self.wsaa_url = environment.wsaa_url().to_string();
                }
                if env::var("AFIP_WSFE_URL").is_err() {
                    self.wsfe_url = environment.wsfe_url().to_string();
                }
            }
        }
        Ok(())
    }

    pub fn has_signing_material(&self) -> bool {
        self.signing.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cuit.is_empty()
            && (self.cuit.len() != 11 || !self.cuit.chars().all(|c| c.is_ascii_digit()))
        {
            return Err(AppError::Configuration(
                "AFIP_CUIT must have 11 digits".to_string(),
            ));
        }

        if self.default_point_of_sale == 0 {
            return Err(AppError::Configuration(
                "AFIP_DEFAULT_POINT_OF_SALE must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(AppError::Configuration(
                "AFIP_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration row kept in the `afip_config` table
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredFiscalConfig {
    pub certificate: String,
    pub private_key: String,
    pub cuit: String,
    pub environment: Option<String>,
}

pub fn strip_dashes(value: &str) -> String {
    value.trim().replace('-', "")
}

fn signing_material_from_env() -> Result<Option<SigningMaterial>> {
    let certificate = read_inline_or_file("AFIP_CERT", "AFIP_CERT_PATH")?;
    let private_key = read_inline_or_file("AFIP_KEY", "AFIP_KEY_PATH")?;

    match (certificate, private_key) {
        (Some(cert), Some(key)) => Ok(Some(SigningMaterial::from_raw(&cert, &key)?)),
        (None, None) => Ok(None),
        _ => Err(AppError::Configuration(
            "AFIP certificate and private key must be configured together".to_string(),
        )),
    }
}

fn read_inline_or_file(inline_var: &str, path_var: &str) -> Result<Option<String>> {
    if let Ok(value) = env::var(inline_var) {
        if !value.trim().is_empty() {
            return Ok(Some(value));
        }
    }

    match env::var(path_var) {
        Ok(path) if !path.trim().is_empty() => std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| AppError::Configuration(format!("Cannot read {}: {}", path, e))),
        _ => Ok(None),
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| AppError::Configuration(format!("Invalid {}", name))),
        Err(_) => Ok(default),
    }
}

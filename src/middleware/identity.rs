use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    Error, FromRequest, HttpMessage, HttpRequest,
};
use futures_util::future::LocalBoxFuture;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use crate::core::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_EMAIL_HEADER: &str = "X-User-Email";
pub const SIGNATURE_HEADER: &str = "X-Identity-Signature";

const PUBLIC_PATHS: [&str; 3] = ["/health", "/ready", "/"];

/// User verified by the identity provider in front of the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
}

impl AuthenticatedUser {
    /// Used when identity checks are disabled and no user headers are sent
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            email: String::new(),
        }
    }

    /// Email when known, id otherwise
    pub fn recorded_name(&self) -> String {
        if self.email.is_empty() {
            self.id.clone()
        } else {
            self.email.clone()
        }
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<std::result::Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| AppError::unauthorized("Missing user identity").into()),
        )
    }
}

/// Hex HMAC-SHA256 over `{id}:{email}`
pub fn sign_identity(secret: &str, user_id: &str, email: &str) -> crate::core::Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::internal(format!("Invalid identity key: {}", e)))?;
    mac.update(format!("{}:{}", user_id, email).as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify_identity(secret: &str, user_id: &str, email: &str, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("{}:{}", user_id, email).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

fn header<'a>(req: &'a ServiceRequest, name: &str) -> Option<&'a str> {
    req.headers()
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn authenticate(req: &ServiceRequest, secret: Option<&str>) -> crate::core::Result<AuthenticatedUser> {
    let user_id = header(req, USER_ID_HEADER);
    let email = header(req, USER_EMAIL_HEADER).unwrap_or_default();

    let Some(secret) = secret else {
        return Ok(match user_id {
            Some(id) => AuthenticatedUser {
                id: id.to_string(),
                email: email.to_string(),
            },
            None => AuthenticatedUser::system(),
        });
    };

    let user_id = user_id.ok_or_else(|| AppError::unauthorized("Missing X-User-Id header"))?;
    let signature = header(req, SIGNATURE_HEADER)
        .ok_or_else(|| AppError::unauthorized("Missing X-Identity-Signature header"))?;

    if !verify_identity(secret, user_id, email, signature) {
        return Err(AppError::unauthorized("Invalid identity signature"));
    }

    Ok(AuthenticatedUser {
        id: user_id.to_string(),
        email: email.to_string(),
    })
}

/// Verifies the identity assertion forwarded by the identity provider
#[derive(Clone)]
pub struct IdentityAuth {
    secret: Option<Arc<str>>,
}

impl IdentityAuth {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.map(Arc::from),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for IdentityAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = IdentityAuthMiddleware<S>;
    type Future = Ready<std::result::Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(IdentityAuthMiddleware {
            service: Rc::new(service),
            secret: self.secret.clone(),
        }))
    }
}

pub struct IdentityAuthMiddleware<S> {
    service: Rc<S>,
    secret: Option<Arc<str>>,
}

impl<S, B> Service<ServiceRequest> for IdentityAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();
        let secret = self.secret.clone();

        Box::pin(async move {
            if PUBLIC_PATHS.contains(&req.path()) {
                return svc.call(req).await;
            }

            let user = match authenticate(&req, secret.as_deref()) {
                Ok(user) => user,
                Err(err) => {
                    tracing::warn!(path = %req.path(), error = %err, "Rejected identity assertion");
                    return Err(err.into());
                }
            };

            req.extensions_mut().insert(user);
            svc.call(req).await
        })
    }
}

// Scripted stand-in for the tax authority web services

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use fiscal_billing::core::{AppError, Result};
use fiscal_billing::fiscal::services::{SoapReply, SoapRequest, SoapTransport, TicketSigner};

pub const LOGIN: &str = "loginCms";
pub const DUMMY: &str = "FEDummy";
pub const LAST_AUTHORIZED: &str = "FECompUltimoAutorizado";
pub const AUTHORIZE: &str = "FECAESolicitar";
pub const QUERY: &str = "FECompConsultar";
pub const POINTS_OF_SALE: &str = "FEParamGetPtosVenta";
pub const VOUCHER_TYPES: &str = "FEParamGetTiposCbte";

#[derive(Debug, Clone)]
enum Scripted {
    Reply(String),
    Status(u16, String),
    TransportError(String),
}

/// Replies queued per operation; the last one left for an operation repeats
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    calls: Mutex<Vec<(String, String)>>,
    login_delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slow down logins so concurrent callers overlap
    pub fn with_login_delay(mut self, delay: Duration) -> Self {
        self.login_delay = Some(delay);
        self
    }

    pub fn on(&self, operation: &str, body: impl Into<String>) -> &Self {
        self.push(operation, Scripted::Reply(body.into()));
        self
    }

    /// Reply with an HTTP status other than 200
    pub fn on_status(&self, operation: &str, status: u16, body: impl Into<String>) -> &Self {
        self.push(operation, Scripted::Status(status, body.into()));
        self
    }

    pub fn fail(&self, operation: &str, message: &str) -> &Self {
        self.push(operation, Scripted::TransportError(message.to_string()));
        self
    }

    /// Forget the queued replies of `operation`
    pub fn reset(&self, operation: &str) -> &Self {
        self.routes.lock().unwrap().remove(operation);
        self
    }

    fn push(&self, operation: &str, scripted: Scripted) {
        self.routes
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(scripted);
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Request bodies sent to `operation`, oldest first
    pub fn requests(&self, operation: &str) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn next(&self, operation: &str) -> Option<Scripted> {
        let mut routes = self.routes.lock().unwrap();
        let queue = routes.get_mut(operation)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

fn operation_of(request: &SoapRequest) -> String {
    if request.soap_action.is_empty() {
        return LOGIN.to_string();
    }
    request
        .soap_action
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

#[async_trait]
impl SoapTransport for ScriptedTransport {
    async fn call(&self, request: SoapRequest) -> Result<SoapReply> {
        let operation = operation_of(&request);
        self.calls
            .lock()
            .unwrap()
            .push((operation.clone(), request.body.clone()));

        if operation == LOGIN {
            if let Some(delay) = self.login_delay {
                tokio::time::sleep(delay).await;
            }
        }

        match self.next(&operation) {
            Some(Scripted::Reply(body)) => Ok(SoapReply { status: 200, body }),
            Some(Scripted::Status(status, body)) => Ok(SoapReply { status, body }),
            Some(Scripted::TransportError(message)) => Err(AppError::upstream(message)),
            None => Err(AppError::upstream(format!(
                "no scripted reply for {}",
                operation
            ))),
        }
    }
}

/// Returns a fixed CMS blob
pub struct FakeSigner;

#[async_trait]
impl TicketSigner for FakeSigner {
    async fn sign(&self, _payload: &str) -> Result<String> {
        Ok("TUlJQ01TRkFLRQ==".to_string())
    }
}

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};

use crate::config::fiscal::strip_dashes;
use crate::config::FiscalConfig;
use crate::core::timezone::today_in_argentina;
use crate::core::{AppError, Result, VoucherAmounts};
use crate::middleware::AuthenticatedUser;
use crate::modules::fiscal::models::{
    Concept, DocType, VoucherClass, VoucherRequest, VoucherResult, VoucherType,
};
use crate::modules::fiscal::FiscalClient;
use crate::modules::invoices::models::{IssuedInvoice, NewInvoice};
use crate::modules::invoices::repositories::InvoiceRepository;
use crate::modules::invoices::services::invoice_service::approved_invoice;
use crate::modules::invoices::services::InvoiceCounterparty;
use crate::modules::settlements::models::{
    ClientSettlement, HeldClaim, InvoiceSettlementRequest, ReconcileReport, ReleasedClaim,
    RepairedSettlement, SettlementClaim, SettlementInvoicing, SettlementView,
};
use crate::modules::settlements::repositories::SettlementRepository;

/// Turns settlements into authorized invoices and repairs interrupted runs
pub struct SettlementService {
    client: Arc<FiscalClient>,
    settlements: Arc<dyn SettlementRepository>,
    invoices: Arc<dyn InvoiceRepository>,
    config: Arc<FiscalConfig>,
}

impl SettlementService {
    pub fn new(
        client: Arc<FiscalClient>,
        settlements: Arc<dyn SettlementRepository>,
        invoices: Arc<dyn InvoiceRepository>,
        config: Arc<FiscalConfig>,
    ) -> Self {
        Self {
            client,
            settlements,
            invoices,
            config,
        }
    }

    /// `POST /settlements/{id}/invoice`
    ///
    /// The settlement is claimed before the authority is contacted, so a second
    /// submission fails with a conflict without any upstream call. The claim is
    /// released on failures that leave nothing issued and kept when the outcome
    /// is unknown or the authorized voucher could not be recorded.
    pub async fn invoice_settlement(
        &self,
        settlement_id: i64,
        request: InvoiceSettlementRequest,
        user: &AuthenticatedUser,
    ) -> Result<IssuedInvoice> {
        let settlement = self
            .settlements
            .find_by_id(settlement_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Settlement {} not found", settlement_id)))?;

        let client = self
            .settlements
            .find_counterparty(settlement.client_entity_id)
            .await?
            .ok_or_else(|| {
                AppError::validation(format!(
                    "Client {} of settlement {} not found",
                    settlement.client_entity_id, settlement_id
                ))
            })?;

        let tax_id = client
            .tax_id
            .as_deref()
            .map(strip_dashes)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::validation(format!("Client {} has no CUIT", client.legal_name))
            })?;

        if let Some(cae) = settlement.cae.as_deref() {
            return Err(AppError::conflict(format!(
                "Settlement {} is already invoiced (CAE {})",
                settlement_id, cae
            )));
        }

        if !settlement.status.is_invoiceable() {
            return Err(AppError::conflict(format!(
                "Settlement {} is {} and cannot be invoiced",
                settlement_id, settlement.status
            )));
        }

        let amounts = settlement.amounts()?;

        let voucher_type = request
            .voucher_type
            .unwrap_or(VoucherType::invoice(VoucherClass::A));
        if voucher_type.is_note() || voucher_type.is_credit_invoice() {
            return Err(AppError::validation(format!(
                "Settlements are invoiced with A, B or C invoices, not {}",
                voucher_type
            )));
        }

        let voucher = self.settlement_voucher(
            &tax_id,
            request
                .point_of_sale
                .unwrap_or(self.config.default_point_of_sale),
            voucher_type,
            amounts,
            today_in_argentina(),
        );
        voucher.validate()?;

        let claim = SettlementClaim::new(voucher.point_of_sale, voucher.voucher_type);
        if !self.settlements.claim(settlement_id, &claim).await? {
            return Err(AppError::conflict(format!(
                "Settlement {} is already being invoiced",
                settlement_id
            )));
        }

        tracing::info!(
            settlement_id,
            point_of_sale = voucher.point_of_sale,
            voucher_type = %voucher.voucher_type,
            total = %voucher.amounts.total,
            "Settlement claimed for invoicing"
        );

        let counterparty = InvoiceCounterparty {
            entity_id: Some(client.id),
            cuit: tax_id,
            name: client.legal_name.clone(),
        };

        match self
            .authorize_and_record(settlement_id, &claim, voucher, counterparty, user)
            .await
        {
            Ok(issued) => Ok(issued),
            Err(e @ (AppError::Persistence { .. } | AppError::UnknownOutcome(_))) => {
                tracing::error!(
                    settlement_id,
                    claim = %claim.token,
                    error = %e,
                    "Settlement invoicing interrupted; claim kept until reconciled"
                );
                Err(e)
            }
            Err(e) => {
                if let Err(release_error) =
                    self.settlements.release_claim(settlement_id, &claim.token).await
                {
                    tracing::error!(
                        settlement_id,
                        error = %release_error,
                        "Could not release settlement claim"
                    );
                }
                Err(e)
            }
        }
    }

    fn settlement_voucher(
        &self,
        tax_id: &str,
        point_of_sale: u32,
        voucher_type: VoucherType,
        amounts: VoucherAmounts,
        issue_date: NaiveDate,
    ) -> VoucherRequest {
        VoucherRequest {
            point_of_sale,
            voucher_type,
            concept: Concept::Services,
            doc_type: DocType::Cuit,
            doc_number: tax_id.to_string(),
            issue_date,
            amounts,
            service_from: Some(issue_date),
            service_to: Some(issue_date),
            payment_due: Some(issue_date + Duration::days(self.config.payment_term_days)),
            associated: None,
            credit: None,
        }
        .normalized()
    }

    async fn authorize_and_record(
        &self,
        settlement_id: i64,
        claim: &SettlementClaim,
        voucher: VoucherRequest,
        counterparty: InvoiceCounterparty,
        user: &AuthenticatedUser,
    ) -> Result<IssuedInvoice> {
        if self.config.validate_point_of_sale {
            self.client
                .ensure_point_of_sale_enabled(voucher.point_of_sale, voucher.voucher_type)
                .await?;
        }

        let number = self.client.next_voucher_number(&voucher).await?;
        if !self
            .settlements
            .record_claim_number(settlement_id, &claim.token, number)
            .await?
        {
            return Err(AppError::conflict(format!(
                "Settlement {} lost its invoicing claim",
                settlement_id
            )));
        }

        let result = self
            .client
            .create_invoice_numbered(voucher.clone(), number)
            .await?;
        if !result.outcome.is_approved() {
            return Err(result.into_rejection());
        }

        let new_invoice = approved_invoice(
            &voucher,
            &result,
            counterparty,
            None,
            Some(settlement_id),
            user,
        )?;
        let invoicing = invoicing_of(&new_invoice);

        let persisted = self
            .settlements
            .complete_invoicing(settlement_id, &claim.token, &new_invoice, &invoicing)
            .await;

        let invoice_id = match persisted {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(
                    settlement_id,
                    cae = %new_invoice.cae,
                    invoice_number = %new_invoice.invoice_number,
                    error = %e,
                    "Authorized settlement invoice could not be recorded; claim kept for reconciliation"
                );
                if let Err(note_error) = self
                    .settlements
                    .record_claim_cae(settlement_id, &claim.token, &new_invoice.cae)
                    .await
                {
                    tracing::error!(
                        settlement_id,
                        error = %note_error,
                        "Could not note the CAE on the settlement claim"
                    );
                }
                return Err(AppError::Persistence {
                    message: e.to_string(),
                    cae: new_invoice.cae,
                    invoice_number: new_invoice.invoice_number,
                });
            }
        };

        tracing::info!(
            settlement_id,
            invoice_id,
            cae = %new_invoice.cae,
            invoice_number = %new_invoice.invoice_number,
            "Settlement invoiced"
        );

        let invoice = self
            .invoices
            .find_by_id(invoice_id)
            .await?
            .ok_or_else(|| AppError::internal(format!("Invoice {} missing after insert", invoice_id)))?
            .with_qr_url(self.client.cuit());

        Ok(IssuedInvoice::from_invoice(&invoice, result.observations))
    }

    /// `GET /settlements/{id}`
    pub async fn get(&self, settlement_id: i64) -> Result<SettlementView> {
        let settlement = self
            .settlements
            .find_by_id(settlement_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Settlement {} not found", settlement_id)))?;
        let client = self
            .settlements
            .find_counterparty(settlement.client_entity_id)
            .await?;
        let invoice = self
            .invoices
            .find_by_settlement(settlement_id)
            .await?
            .map(|invoice| invoice.with_qr_url(self.client.cuit()));

        Ok(SettlementView {
            settlement,
            client,
            invoice,
        })
    }

    /// `POST /settlements/reconcile`
    ///
    /// Copies recorded invoices onto settlements that lack them, then settles
    /// claims older than the configured TTL against the authority: a voucher
    /// registered under the claim is recorded, a claim whose number never
    /// registered is released, anything undecidable is held and reported.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for invoice in self.settlements.orphaned_invoices().await? {
            let Some(settlement_id) = invoice.settlement_id else {
                continue;
            };
            let invoicing = SettlementInvoicing::from_invoice(&invoice);
            if self
                .settlements
                .apply_invoicing(settlement_id, &invoicing)
                .await?
            {
                tracing::warn!(
                    settlement_id,
                    cae = %invoice.cae,
                    invoice_number = %invoice.invoice_number,
                    "Settlement repaired from its recorded invoice"
                );
                report.repaired.push(RepairedSettlement {
                    settlement_id,
                    invoice_number: invoice.invoice_number,
                    cae: invoice.cae,
                });
            }
        }

        let ttl = Duration::from_std(self.config.settlement_claim_ttl)
            .map_err(|e| AppError::Configuration(format!("Invalid claim TTL: {}", e)))?;
        let cutoff = Utc::now() - ttl;

        for settlement in self.settlements.stale_claims(cutoff).await? {
            let Some(token) = settlement.invoicing_claim.clone() else {
                continue;
            };

            match self.settle_claim(&settlement, &token).await? {
                StaleClaim::Recovered(recovered) => {
                    tracing::warn!(
                        settlement_id = settlement.id,
                        cae = %recovered.cae,
                        invoice_number = %recovered.invoice_number,
                        "Settlement invoice recovered from the authority"
                    );
                    report.recovered.push(recovered);
                }
                StaleClaim::Released(released) => {
                    tracing::warn!(
                        settlement_id = settlement.id,
                        claimed_at = ?released.claimed_at,
                        voucher_number = ?released.voucher_number,
                        last_authorized = ?released.last_authorized,
                        "Stale invoicing claim released"
                    );
                    report.released_claims.push(released);
                }
                StaleClaim::Held(held) => {
                    tracing::error!(
                        settlement_id = settlement.id,
                        voucher_number = ?held.voucher_number,
                        reason = %held.reason,
                        "Stale invoicing claim held"
                    );
                    report.held_claims.push(held);
                }
            }
        }

        Ok(report)
    }

    async fn settle_claim(&self, settlement: &ClientSettlement, token: &str) -> Result<StaleClaim> {
        let Some(number) = settlement.claim_voucher_number else {
            // No request went out under this claim
            self.settlements.release_claim(settlement.id, token).await?;
            return Ok(StaleClaim::Released(released_claim(settlement, None)));
        };

        let claimed_type = settlement
            .claim_voucher_type
            .as_deref()
            .and_then(|t| t.parse::<VoucherType>().ok());
        let (Some(point_of_sale), Some(voucher_type)) = (settlement.claim_point_of_sale, claimed_type)
        else {
            return Ok(held_claim(settlement, "claim names no point of sale or voucher type"));
        };

        let last = match self
            .client
            .last_voucher_number(point_of_sale, voucher_type)
            .await
        {
            Ok(last) => last,
            Err(e) => {
                return Ok(held_claim(
                    settlement,
                    format!("last authorized number unavailable: {}", e),
                ))
            }
        };

        if last < number {
            self.settlements.release_claim(settlement.id, token).await?;
            return Ok(StaleClaim::Released(released_claim(settlement, Some(last))));
        }

        let registered = match self
            .client
            .get_voucher(point_of_sale, voucher_type, number)
            .await
        {
            Ok(Some(registered)) => registered,
            Ok(None) => {
                return Ok(held_claim(
                    settlement,
                    format!("voucher {} is numbered but not readable", number),
                ))
            }
            Err(e) => {
                return Ok(held_claim(
                    settlement,
                    format!("lookup of voucher {} failed: {}", number, e),
                ))
            }
        };

        self.record_registered(settlement, token, point_of_sale, voucher_type, registered)
            .await
    }

    /// Record a voucher found at the authority when it is the one the claim sent
    async fn record_registered(
        &self,
        settlement: &ClientSettlement,
        token: &str,
        point_of_sale: u32,
        voucher_type: VoucherType,
        registered: VoucherResult,
    ) -> Result<StaleClaim> {
        let Some(client) = self
            .settlements
            .find_counterparty(settlement.client_entity_id)
            .await?
        else {
            return Ok(held_claim(settlement, "settlement client not found"));
        };
        let tax_id = client.tax_id.as_deref().map(strip_dashes).unwrap_or_default();

        let same_cae = match (&settlement.claim_cae, &registered.cae) {
            (Some(noted), Some(found)) => noted == found,
            (None, Some(_)) => true,
            (_, None) => false,
        };
        if !registered.outcome.is_approved()
            || !same_cae
            || !registered.issued_for(&tax_id, settlement.total_amount)
        {
            return Ok(held_claim(
                settlement,
                format!(
                    "voucher {:?} at the authority does not match the settlement",
                    registered.voucher_number
                ),
            ));
        }

        let amounts = match settlement.amounts() {
            Ok(amounts) => amounts,
            Err(e) => return Ok(held_claim(settlement, e.to_string())),
        };
        let voucher = self.settlement_voucher(
            &tax_id,
            point_of_sale,
            voucher_type,
            amounts,
            registered.issue_date.unwrap_or_else(today_in_argentina),
        );
        let counterparty = InvoiceCounterparty {
            entity_id: Some(client.id),
            cuit: tax_id,
            name: client.legal_name,
        };
        let new_invoice = approved_invoice(
            &voucher,
            &registered,
            counterparty,
            None,
            Some(settlement.id),
            &AuthenticatedUser::system(),
        )?;

        if let Err(e) = self
            .settlements
            .complete_invoicing(settlement.id, token, &new_invoice, &invoicing_of(&new_invoice))
            .await
        {
            return Ok(held_claim(
                settlement,
                format!(
                    "voucher {} (CAE {}) could not be recorded: {}",
                    new_invoice.invoice_number, new_invoice.cae, e
                ),
            ));
        }

        Ok(StaleClaim::Recovered(RepairedSettlement {
            settlement_id: settlement.id,
            invoice_number: new_invoice.invoice_number,
            cae: new_invoice.cae,
        }))
    }
}

/// Outcome of checking one expired claim
enum StaleClaim {
    Recovered(RepairedSettlement),
    Released(ReleasedClaim),
    Held(HeldClaim),
}

fn released_claim(settlement: &ClientSettlement, last_authorized: Option<u64>) -> ReleasedClaim {
    ReleasedClaim {
        settlement_id: settlement.id,
        claimed_at: settlement.invoicing_claimed_at,
        point_of_sale: settlement.claim_point_of_sale,
        voucher_type: settlement.claim_voucher_type.clone(),
        voucher_number: settlement.claim_voucher_number,
        last_authorized,
    }
}

fn held_claim(settlement: &ClientSettlement, reason: impl Into<String>) -> StaleClaim {
    StaleClaim::Held(HeldClaim {
        settlement_id: settlement.id,
        claimed_at: settlement.invoicing_claimed_at,
        point_of_sale: settlement.claim_point_of_sale,
        voucher_type: settlement.claim_voucher_type.clone(),
        voucher_number: settlement.claim_voucher_number,
        cae: settlement.claim_cae.clone(),
        reason: reason.into(),
    })
}

fn invoicing_of(invoice: &NewInvoice) -> SettlementInvoicing {
    SettlementInvoicing {
        invoice_number: invoice.invoice_number.clone(),
        invoice_type: invoice.invoice_class.clone(),
        point_of_sale: invoice.point_of_sale,
        invoice_date: invoice.issue_date,
        cae: invoice.cae.clone(),
        cae_expiration: invoice.cae_expiration,
        afip_response: invoice.afip_response.clone(),
    }
}

// In-memory repositories sharing one store
//
// The conditional updates mirror the SQL: a claim only lands on a settlement
// without CAE or claim, completion needs the claim token, repairs never
// overwrite a CAE.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use fiscal_billing::core::{AppError, Result};
use fiscal_billing::invoices::models::{Invoice, InvoiceFilter, NewInvoice};
use fiscal_billing::invoices::InvoiceRepository;
use fiscal_billing::settlements::models::{
    ClientSettlement, Counterparty, SettlementClaim, SettlementInvoicing, SettlementStatus,
};
use fiscal_billing::settlements::SettlementRepository;

#[derive(Default)]
struct Tables {
    invoices: BTreeMap<i64, Invoice>,
    settlements: BTreeMap<i64, ClientSettlement>,
    counterparties: BTreeMap<i64, Counterparty>,
    next_invoice_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every invoice insert fail until switched off
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn writes_fail(&self) -> bool {
        self.fail_writes.load(Ordering::SeqCst)
    }

    pub fn add_counterparty(&self, id: i64, legal_name: &str, tax_id: Option<&str>) {
        self.tables.lock().unwrap().counterparties.insert(
            id,
            Counterparty {
                id,
                legal_name: legal_name.to_string(),
                tax_id: tax_id.map(str::to_string),
                iva_condition: Some("IVA Responsable Inscripto".to_string()),
            },
        );
    }

    pub fn add_settlement(&self, settlement: ClientSettlement) {
        self.tables
            .lock()
            .unwrap()
            .settlements
            .insert(settlement.id, settlement);
    }

    pub fn settlement(&self, id: i64) -> Option<ClientSettlement> {
        self.tables.lock().unwrap().settlements.get(&id).cloned()
    }

    pub fn update_settlement(&self, id: i64, change: impl FnOnce(&mut ClientSettlement)) {
        if let Some(settlement) = self.tables.lock().unwrap().settlements.get_mut(&id) {
            change(settlement);
        }
    }

    pub fn invoices(&self) -> Vec<Invoice> {
        self.tables.lock().unwrap().invoices.values().cloned().collect()
    }

    /// Insert directly, bypassing the failure switch
    pub fn seed_invoice(&self, invoice: &NewInvoice) -> Invoice {
        let mut tables = self.tables.lock().unwrap();
        insert(&mut tables, invoice)
    }
}

fn insert(tables: &mut Tables, invoice: &NewInvoice) -> Invoice {
    tables.next_invoice_id += 1;
    let id = tables.next_invoice_id;
    let record = Invoice {
        id,
        invoice_number: invoice.invoice_number.clone(),
        invoice_class: invoice.invoice_class.clone(),
        voucher_type: invoice.voucher_type,
        point_of_sale: invoice.point_of_sale,
        voucher_number: invoice.voucher_number,
        issue_date: invoice.issue_date,
        client_entity_id: invoice.client_entity_id,
        client_cuit: invoice.client_cuit.clone(),
        client_name: invoice.client_name.clone(),
        client_iva_condition: invoice.client_iva_condition.clone(),
        net_amount: invoice.net_amount,
        vat_amount: invoice.vat_amount,
        total_amount: invoice.total_amount,
        cae: invoice.cae.clone(),
        cae_expiration: invoice.cae_expiration,
        settlement_id: invoice.settlement_id,
        afip_response: invoice.afip_response.clone(),
        notes: invoice.notes.clone(),
        pdf_url: None,
        created_by: invoice.created_by.clone(),
        created_at: Utc::now(),
        qr_url: None,
    };
    tables.invoices.insert(id, record.clone());
    record
}

fn check_unique(tables: &Tables, invoice: &NewInvoice) -> Result<()> {
    let duplicate = tables.invoices.values().any(|existing| {
        (existing.point_of_sale == invoice.point_of_sale
            && existing.voucher_type == invoice.voucher_type
            && existing.voucher_number == invoice.voucher_number)
            || (invoice.settlement_id.is_some() && existing.settlement_id == invoice.settlement_id)
    });
    if duplicate {
        return Err(AppError::conflict(format!(
            "Invoice {} already recorded",
            invoice.invoice_number
        )));
    }
    Ok(())
}

fn apply(settlement: &mut ClientSettlement, invoicing: &SettlementInvoicing) {
    settlement.status = SettlementStatus::Facturada;
    settlement.invoice_number = Some(invoicing.invoice_number.clone());
    settlement.invoice_type = Some(invoicing.invoice_type.clone());
    settlement.invoice_point_of_sale = Some(invoicing.point_of_sale);
    settlement.invoice_date = Some(invoicing.invoice_date);
    settlement.cae = Some(invoicing.cae.clone());
    settlement.cae_expiration = Some(invoicing.cae_expiration);
    settlement.afip_response = invoicing.afip_response.clone();
    clear_claim(settlement);
}

fn clear_claim(settlement: &mut ClientSettlement) {
    settlement.invoicing_claim = None;
    settlement.claim_point_of_sale = None;
    settlement.claim_voucher_type = None;
    settlement.claim_voucher_number = None;
    settlement.claim_cae = None;
    settlement.invoicing_claimed_at = None;
    settlement.updated_at = Utc::now();
}

pub struct MemoryInvoiceRepository {
    store: MemoryStore,
}

impl MemoryInvoiceRepository {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl InvoiceRepository for MemoryInvoiceRepository {
    async fn create(&self, invoice: &NewInvoice) -> Result<Invoice> {
        if self.store.writes_fail() {
            return Err(AppError::internal("simulated write failure"));
        }
        let mut tables = self.store.tables.lock().unwrap();
        check_unique(&tables, invoice)?;
        Ok(insert(&mut tables, invoice))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Invoice>> {
        Ok(self.store.tables.lock().unwrap().invoices.get(&id).cloned())
    }

    async fn find_by_settlement(&self, settlement_id: i64) -> Result<Option<Invoice>> {
        Ok(self
            .store
            .tables
            .lock()
            .unwrap()
            .invoices
            .values()
            .find(|i| i.settlement_id == Some(settlement_id))
            .cloned())
    }

    async fn search(&self, filter: &InvoiceFilter) -> Result<Vec<Invoice>> {
        let types = filter.kind.voucher_types();
        let needle = filter.q.as_deref().map(str::to_lowercase);
        let tables = self.store.tables.lock().unwrap();

        Ok(tables
            .invoices
            .values()
            .rev()
            .filter(|i| types.contains(&i.voucher_type))
            .filter(|i| match needle.as_deref() {
                Some(q) => {
                    i.invoice_number.to_lowercase().contains(q)
                        || i.client_name.to_lowercase().contains(q)
                        || i.client_cuit.contains(q)
                }
                None => true,
            })
            .skip(filter.offset as usize)
            .take(filter.limit as usize)
            .cloned()
            .collect())
    }

    async fn attach_pdf_url(&self, id: i64, url: &str) -> Result<Option<Invoice>> {
        let mut tables = self.store.tables.lock().unwrap();
        Ok(tables.invoices.get_mut(&id).map(|invoice| {
            invoice.pdf_url = Some(url.to_string());
            invoice.clone()
        }))
    }
}

pub struct MemorySettlementRepository {
    store: MemoryStore,
}

impl MemorySettlementRepository {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SettlementRepository for MemorySettlementRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<ClientSettlement>> {
        Ok(self.store.settlement(id))
    }

    async fn find_counterparty(&self, entity_id: i64) -> Result<Option<Counterparty>> {
        Ok(self
            .store
            .tables
            .lock()
            .unwrap()
            .counterparties
            .get(&entity_id)
            .cloned())
    }

    async fn claim(&self, settlement_id: i64, claim: &SettlementClaim) -> Result<bool> {
        let mut tables = self.store.tables.lock().unwrap();
        let Some(settlement) = tables.settlements.get_mut(&settlement_id) else {
            return Ok(false);
        };
        if settlement.cae.is_some() || settlement.invoicing_claim.is_some() {
            return Ok(false);
        }
        settlement.invoicing_claim = Some(claim.token.clone());
        settlement.claim_point_of_sale = Some(claim.point_of_sale);
        settlement.claim_voucher_type = Some(claim.voucher_type.wire_name().to_string());
        settlement.invoicing_claimed_at = Some(Utc::now());
        Ok(true)
    }

    async fn release_claim(&self, settlement_id: i64, token: &str) -> Result<()> {
        let mut tables = self.store.tables.lock().unwrap();
        if let Some(settlement) = tables.settlements.get_mut(&settlement_id) {
            if settlement.invoicing_claim.as_deref() == Some(token) {
                clear_claim(settlement);
            }
        }
        Ok(())
    }

    async fn record_claim_number(
        &self,
        settlement_id: i64,
        token: &str,
        voucher_number: u64,
    ) -> Result<bool> {
        let mut tables = self.store.tables.lock().unwrap();
        match tables.settlements.get_mut(&settlement_id) {
            Some(settlement) if settlement.invoicing_claim.as_deref() == Some(token) => {
                settlement.claim_voucher_number = Some(voucher_number);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_claim_cae(&self, settlement_id: i64, token: &str, cae: &str) -> Result<()> {
        let mut tables = self.store.tables.lock().unwrap();
        if let Some(settlement) = tables.settlements.get_mut(&settlement_id) {
            if settlement.invoicing_claim.as_deref() == Some(token) {
                settlement.claim_cae = Some(cae.to_string());
            }
        }
        Ok(())
    }

    async fn complete_invoicing(
        &self,
        settlement_id: i64,
        token: &str,
        invoice: &NewInvoice,
        invoicing: &SettlementInvoicing,
    ) -> Result<i64> {
        if self.store.writes_fail() {
            return Err(AppError::internal("simulated write failure"));
        }

        let mut tables = self.store.tables.lock().unwrap();
        check_unique(&tables, invoice)?;

        let claimable = tables
            .settlements
            .get(&settlement_id)
            .map(|s| s.cae.is_none() && s.invoicing_claim.as_deref() == Some(token))
            .unwrap_or(false);
        if !claimable {
            return Err(AppError::conflict(format!(
                "Settlement {} lost its invoicing claim",
                settlement_id
            )));
        }

        let record = insert(&mut tables, invoice);
        if let Some(settlement) = tables.settlements.get_mut(&settlement_id) {
            apply(settlement, invoicing);
        }
        Ok(record.id)
    }

    async fn orphaned_invoices(&self) -> Result<Vec<Invoice>> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .invoices
            .values()
            .filter(|invoice| {
                invoice
                    .settlement_id
                    .and_then(|id| tables.settlements.get(&id))
                    .map(|s| s.cae.is_none())
                    .unwrap_or(false)
            })
            .cloned()
            .collect())
    }

    async fn apply_invoicing(
        &self,
        settlement_id: i64,
        invoicing: &SettlementInvoicing,
    ) -> Result<bool> {
        let mut tables = self.store.tables.lock().unwrap();
        match tables.settlements.get_mut(&settlement_id) {
            Some(settlement) if settlement.cae.is_none() => {
                apply(settlement, invoicing);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> Result<Vec<ClientSettlement>> {
        let tables = self.store.tables.lock().unwrap();
        Ok(tables
            .settlements
            .values()
            .filter(|s| {
                s.cae.is_none()
                    && s.invoicing_claim.is_some()
                    && s.invoicing_claimed_at.map(|at| at < cutoff).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}

/// Settlement of 800 freight + 26.45 insurance + 173.55 VAT
pub fn pending_settlement(id: i64, client_entity_id: i64) -> ClientSettlement {
    settlement_with_amounts(
        id,
        client_entity_id,
        Decimal::new(80000, 2),
        Decimal::new(2645, 2),
        Decimal::new(17355, 2),
        Decimal::new(100000, 2),
    )
}

pub fn settlement_with_amounts(
    id: i64,
    client_entity_id: i64,
    freight: Decimal,
    insurance: Decimal,
    vat: Decimal,
    total: Decimal,
) -> ClientSettlement {
    ClientSettlement {
        id,
        settlement_number: Some(format!("LIQ-{:04}", id)),
        client_entity_id,
        status: SettlementStatus::Generada,
        freight_subtotal: freight,
        insurance_subtotal: insurance,
        vat_subtotal: vat,
        total_amount: total,
        invoice_number: None,
        invoice_type: None,
        invoice_point_of_sale: None,
        invoice_date: None,
        cae: None,
        cae_expiration: None,
        afip_response: None,
        invoicing_claim: None,
        claim_point_of_sale: None,
        claim_voucher_type: None,
        claim_voucher_number: None,
        claim_cae: None,
        invoicing_claimed_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

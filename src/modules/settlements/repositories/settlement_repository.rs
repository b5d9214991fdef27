use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::MySqlPool;

use crate::core::{AppError, Result};
use crate::modules::invoices::models::{Invoice, NewInvoice};
use crate::modules::invoices::repositories::insert_invoice;
use crate::modules::invoices::repositories::invoice_repository::INVOICE_COLUMNS;
use crate::modules::settlements::models::{
    ClientSettlement, Counterparty, SettlementClaim, SettlementInvoicing,
};

const SETTLEMENT_COLUMNS: &str = r#"
    id, settlement_number, client_entity_id, status, freight_subtotal, insurance_subtotal,
    vat_subtotal, total_amount, invoice_number, invoice_type, invoice_point_of_sale,
    invoice_date, cae, cae_expiration, afip_response, invoicing_claim, claim_point_of_sale,
    claim_voucher_type, claim_voucher_number, claim_cae, invoicing_claimed_at, created_at,
    updated_at
"#;

#[async_trait]
pub trait SettlementRepository: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<ClientSettlement>>;

    async fn find_counterparty(&self, entity_id: i64) -> Result<Option<Counterparty>>;

    /// Atomically mark the settlement as being invoiced; `false` when it already
    /// has a CAE or another claim
    async fn claim(&self, settlement_id: i64, claim: &SettlementClaim) -> Result<bool>;

    async fn release_claim(&self, settlement_id: i64, token: &str) -> Result<()>;

    /// Note the voucher number about to be sent under the claim; `false` if the claim is gone
    async fn record_claim_number(
        &self,
        settlement_id: i64,
        token: &str,
        voucher_number: u64,
    ) -> Result<bool>;

    async fn record_claim_cae(&self, settlement_id: i64, token: &str, cae: &str) -> Result<()>;

    /// Insert the invoice and mark the settlement invoiced in one transaction;
    /// returns the invoice id
    async fn complete_invoicing(
        &self,
        settlement_id: i64,
        token: &str,
        invoice: &NewInvoice,
        invoicing: &SettlementInvoicing,
    ) -> Result<i64>;

    /// Invoices linked to a settlement that still has no CAE
    async fn orphaned_invoices(&self) -> Result<Vec<Invoice>>;

    /// Copy invoicing fields onto a settlement without a CAE; `false` if it already has one
    async fn apply_invoicing(
        &self,
        settlement_id: i64,
        invoicing: &SettlementInvoicing,
    ) -> Result<bool>;

    /// Claims taken before `cutoff` on settlements still without a CAE
    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> Result<Vec<ClientSettlement>>;
}

pub struct MySqlSettlementRepository {
    pool: MySqlPool,
}

impl MySqlSettlementRepository {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettlementRepository for MySqlSettlementRepository {
    async fn find_by_id(&self, id: i64) -> Result<Option<ClientSettlement>> {
        let sql = format!(
            "SELECT {} FROM client_settlements WHERE id = ?",
            SETTLEMENT_COLUMNS
        );
        let settlement = sqlx::query_as::<_, ClientSettlement>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(settlement)
    }

    async fn find_counterparty(&self, entity_id: i64) -> Result<Option<Counterparty>> {
        let counterparty = sqlx::query_as::<_, Counterparty>(
            "SELECT id, legal_name, tax_id, iva_condition FROM entities WHERE id = ?",
        )
        .bind(entity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(counterparty)
    }

    async fn claim(&self, settlement_id: i64, claim: &SettlementClaim) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE client_settlements
            SET invoicing_claim = ?, claim_point_of_sale = ?, claim_voucher_type = ?,
                invoicing_claimed_at = UTC_TIMESTAMP(), updated_at = UTC_TIMESTAMP()
            WHERE id = ? AND cae IS NULL AND invoicing_claim IS NULL
            "#,
        )
        .bind(&claim.token)
        .bind(claim.point_of_sale)
        .bind(claim.voucher_type.wire_name())
        .bind(settlement_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_claim(&self, settlement_id: i64, token: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE client_settlements
            SET invoicing_claim = NULL, claim_point_of_sale = NULL, claim_voucher_type = NULL,
                claim_voucher_number = NULL, claim_cae = NULL, invoicing_claimed_at = NULL,
                updated_at = UTC_TIMESTAMP()
            WHERE id = ? AND invoicing_claim = ?
            "#,
        )
        .bind(settlement_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_claim_number(
        &self,
        settlement_id: i64,
        token: &str,
        voucher_number: u64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE client_settlements
            SET claim_voucher_number = ?, updated_at = UTC_TIMESTAMP()
            WHERE id = ? AND cae IS NULL AND invoicing_claim = ?
            "#,
        )
        .bind(voucher_number)
        .bind(settlement_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_claim_cae(&self, settlement_id: i64, token: &str, cae: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE client_settlements
            SET claim_cae = ?, updated_at = UTC_TIMESTAMP()
            WHERE id = ? AND invoicing_claim = ?
            "#,
        )
        .bind(cae)
        .bind(settlement_id)
        .bind(token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_invoicing(
        &self,
        settlement_id: i64,
        token: &str,
        invoice: &NewInvoice,
        invoicing: &SettlementInvoicing,
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;

        let invoice_id = insert_invoice(&mut *tx, invoice).await?;

        let result = sqlx::query(
            r#"
            UPDATE client_settlements
            SET status = 'facturada', invoice_number = ?, invoice_type = ?,
                invoice_point_of_sale = ?, invoice_date = ?, cae = ?, cae_expiration = ?,
                afip_response = ?, invoicing_claim = NULL, claim_point_of_sale = NULL,
                claim_voucher_type = NULL, claim_voucher_number = NULL, claim_cae = NULL,
                invoicing_claimed_at = NULL, updated_at = UTC_TIMESTAMP()
            WHERE id = ? AND cae IS NULL AND invoicing_claim = ?
            "#,
        )
        .bind(&invoicing.invoice_number)
        .bind(&invoicing.invoice_type)
        .bind(invoicing.point_of_sale)
        .bind(invoicing.invoice_date)
        .bind(&invoicing.cae)
        .bind(invoicing.cae_expiration)
        .bind(&invoicing.afip_response)
        .bind(settlement_id)
        .bind(token)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(AppError::conflict(format!(
                "Settlement {} lost its invoicing claim",
                settlement_id
            )));
        }

        tx.commit().await?;
        Ok(invoice_id)
    }

    async fn orphaned_invoices(&self) -> Result<Vec<Invoice>> {
        let columns = INVOICE_COLUMNS
            .split(',')
            .map(|c| format!("i.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            r#"
            SELECT {}
            FROM invoices i
            JOIN client_settlements s ON s.id = i.settlement_id
            WHERE s.cae IS NULL
            ORDER BY i.id
            "#,
            columns
        );

        let invoices = sqlx::query_as::<_, Invoice>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(invoices)
    }

    async fn apply_invoicing(
        &self,
        settlement_id: i64,
        invoicing: &SettlementInvoicing,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE client_settlements
            SET status = 'facturada', invoice_number = ?, invoice_type = ?,
                invoice_point_of_sale = ?, invoice_date = ?, cae = ?, cae_expiration = ?,
                afip_response = ?, invoicing_claim = NULL, claim_point_of_sale = NULL,
                claim_voucher_type = NULL, claim_voucher_number = NULL, claim_cae = NULL,
                invoicing_claimed_at = NULL, updated_at = UTC_TIMESTAMP()
            WHERE id = ? AND cae IS NULL
            "#,
        )
        .bind(&invoicing.invoice_number)
        .bind(&invoicing.invoice_type)
        .bind(invoicing.point_of_sale)
        .bind(invoicing.invoice_date)
        .bind(&invoicing.cae)
        .bind(invoicing.cae_expiration)
        .bind(&invoicing.afip_response)
        .bind(settlement_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn stale_claims(&self, cutoff: DateTime<Utc>) -> Result<Vec<ClientSettlement>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM client_settlements
            WHERE cae IS NULL
              AND invoicing_claim IS NOT NULL
              AND invoicing_claimed_at < ?
            ORDER BY invoicing_claimed_at
            "#,
            SETTLEMENT_COLUMNS
        );

        let settlements = sqlx::query_as::<_, ClientSettlement>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Ok(settlements)
    }
}

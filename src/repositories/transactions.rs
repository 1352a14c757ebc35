use std::sync::Arc;

use super::backend::{decode_row, decode_rows, Backend, BackendResult, Query, Table};
use crate::models::transactions::{
    NewTransaction, Transaction, TransactionStatus, TransactionType,
};

#[derive(Clone)]
pub struct TransactionRepository {
    conn: Arc<dyn Backend>,
}

impl TransactionRepository {
    pub fn new(conn: Arc<dyn Backend>) -> Self {
        TransactionRepository { conn }
    }

    pub async fn new_withdrawal(
        &self,
        user_id: &str,
        transaction_type: TransactionType,
        amount: f64,
        wallet_hash: &str,
    ) -> BackendResult<Transaction> {
        let transaction = NewTransaction {
            user_id: user_id.to_string(),
            transaction_type,
            amount,
            wallet_hash: wallet_hash.to_string(),
            status: TransactionStatus::Pending,
        };

        let row = self
            .conn
            .insert(Table::Transactions, serde_json::to_value(transaction)?)
            .await?;

        decode_row(row)
    }

    pub async fn get_transactions(&self, user_id: &str) -> BackendResult<Vec<Transaction>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order("created_at", false);

        decode_rows(self.conn.select(Table::Transactions, &query).await?)
    }
}

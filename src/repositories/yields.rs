use std::sync::Arc;

use super::backend::{decode_rows, Backend, BackendResult, Query, Table};
use crate::models::yields::DailyYield;

#[derive(Clone)]
pub struct YieldRepository {
    conn: Arc<dyn Backend>,
}

impl YieldRepository {
    pub fn new(conn: Arc<dyn Backend>) -> Self {
        Self { conn }
    }

    pub async fn get_daily_yields(&self, user_id: &str) -> BackendResult<Vec<DailyYield>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order("yield_date", false);

        decode_rows(self.conn.select(Table::DailyYields, &query).await?)
    }
}

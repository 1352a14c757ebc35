use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::backend::{decode_row, decode_rows, Backend, BackendResult, Query, Table};
use crate::models::packages::{NewPackage, Package, PackageActivation, PackageStatus};

#[derive(Clone)]
pub struct PackageRepository {
    conn: Arc<dyn Backend>,
}

impl PackageRepository {
    pub fn new(conn: Arc<dyn Backend>) -> Self {
        Self { conn }
    }

    pub async fn insert_package(
        &self,
        user_id: &str,
        amount: f64,
        purchase_date: DateTime<Utc>,
    ) -> BackendResult<Package> {
        let package = NewPackage {
            user_id: user_id.to_string(),
            amount,
            status: PackageStatus::Pending,
            purchase_date,
        };

        let row = self
            .conn
            .insert(Table::Packages, serde_json::to_value(package)?)
            .await?;

        decode_row(row)
    }

    pub async fn get_packages(&self, user_id: &str) -> BackendResult<Vec<Package>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .order("created_at", false);

        decode_rows(self.conn.select(Table::Packages, &query).await?)
    }

    pub async fn get_packages_by_status(
        &self,
        user_id: &str,
        status: PackageStatus,
    ) -> BackendResult<Vec<Package>> {
        let query = Query::new()
            .eq("user_id", user_id)
            .eq("status", status.as_str());

        decode_rows(self.conn.select(Table::Packages, &query).await?)
    }

    pub async fn get_package(&self, user_id: &str, id: &str) -> BackendResult<Option<Package>> {
        let query = Query::new().eq("id", id).eq("user_id", user_id);
        let packages: Vec<Package> = decode_rows(self.conn.select(Table::Packages, &query).await?)?;

        Ok(packages.into_iter().next())
    }

    /// Moves a pending package to active. Returns `None` when the package was
    /// no longer pending.
    pub async fn activate_package(
        &self,
        id: &str,
        activated_at: DateTime<Utc>,
        hash_payment: &str,
    ) -> BackendResult<Option<Package>> {
        let activation = PackageActivation {
            status: PackageStatus::Active,
            activation_date: activated_at,
            hash_payment: hash_payment.to_string(),
        };
        let query = Query::new()
            .eq("id", id)
            .eq("status", PackageStatus::Pending.as_str());

        let rows = self
            .conn
            .update(Table::Packages, &query, serde_json::to_value(activation)?)
            .await?;
        let packages: Vec<Package> = decode_rows(rows)?;

        Ok(packages.into_iter().next())
    }

    /// Only pending packages can be deleted.
    pub async fn delete_pending_package(&self, user_id: &str, id: &str) -> BackendResult<bool> {
        let query = Query::new()
            .eq("id", id)
            .eq("user_id", user_id)
            .eq("status", PackageStatus::Pending.as_str());

        Ok(self.conn.delete(Table::Packages, &query).await? > 0)
    }
}

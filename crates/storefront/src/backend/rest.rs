//! REST table operations.

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use super::{BackendClient, BackendError, Query};

const RETURN_MINIMAL: &str = "return=minimal";
const RETURN_REPRESENTATION: &str = "return=representation";
const UPSERT_REPRESENTATION: &str = "resolution=merge-duplicates,return=representation";

impl BackendClient {
    fn table_url(&self, table: &str) -> Result<url::Url, BackendError> {
        self.endpoint(&format!("rest/v1/{table}"))
    }

    fn require_filters(
        operation: &'static str,
        table: &str,
        query: &Query,
    ) -> Result<(), BackendError> {
        if query.has_filters() {
            Ok(())
        } else {
            Err(BackendError::UnfilteredWrite {
                operation,
                table: table.to_string(),
            })
        }
    }

    /// Fetch rows.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails or rows don't parse as `T`.
    #[instrument(skip(self, query), fields(table = %table))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.table_url(table)?;
        let request = self
            .request(Method::GET, url)
            .await
            .query(&query.to_pairs());
        self.execute_json(request).await
    }

    /// Fetch the first matching row, if any.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the request fails or the row doesn't parse.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &Query,
    ) -> Result<Option<T>, BackendError> {
        let rows: Vec<T> = self.select(table, &query.clone().limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert one row or an array of rows without reading them back.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend rejects the insert.
    #[instrument(skip(self, rows), fields(table = %table))]
    pub async fn insert<B: Serialize + ?Sized + Sync>(
        &self,
        table: &str,
        rows: &B,
    ) -> Result<(), BackendError> {
        let url = self.table_url(table)?;
        let request = self
            .request(Method::POST, url)
            .await
            .header("Prefer", RETURN_MINIMAL)
            .json(rows);
        self.execute(request).await.map(drop)
    }

    /// Insert rows and return them as stored (with generated columns).
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend rejects the insert or the rows
    /// don't parse as `T`.
    #[instrument(skip(self, rows), fields(table = %table))]
    pub async fn insert_returning<B, T>(
        &self,
        table: &str,
        rows: &B,
        select: &str,
    ) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.table_url(table)?;
        let request = self
            .request(Method::POST, url)
            .await
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&[("select", select)])
            .json(rows);
        self.execute_json(request).await
    }

    /// Insert or merge rows by primary key and return them as stored.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if the backend rejects the write or the rows
    /// don't parse as `T`.
    #[instrument(skip(self, rows), fields(table = %table))]
    pub async fn upsert_returning<B, T>(&self, table: &str, rows: &B) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.table_url(table)?;
        let request = self
            .request(Method::POST, url)
            .await
            .header("Prefer", UPSERT_REPRESENTATION)
            .json(rows);
        self.execute_json(request).await
    }

    /// Patch every row matching the query's filters.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::UnfilteredWrite` without a filter, or any
    /// request failure.
    #[instrument(skip(self, query, patch), fields(table = %table))]
    pub async fn update<B: Serialize + ?Sized + Sync>(
        &self,
        table: &str,
        query: &Query,
        patch: &B,
    ) -> Result<(), BackendError> {
        Self::require_filters("update", table, query)?;
        let url = self.table_url(table)?;
        let request = self
            .request(Method::PATCH, url)
            .await
            .header("Prefer", RETURN_MINIMAL)
            .query(&query.to_pairs())
            .json(patch);
        self.execute(request).await.map(drop)
    }

    /// Patch matching rows and return them as stored.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::UnfilteredWrite` without a filter, or any
    /// request or parse failure.
    #[instrument(skip(self, query, patch), fields(table = %table))]
    pub async fn update_returning<B, T>(
        &self,
        table: &str,
        query: &Query,
        patch: &B,
    ) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        Self::require_filters("update", table, query)?;
        let url = self.table_url(table)?;
        let request = self
            .request(Method::PATCH, url)
            .await
            .header("Prefer", RETURN_REPRESENTATION)
            .query(&query.to_pairs())
            .json(patch);
        self.execute_json(request).await
    }

    /// Delete every row matching the query's filters.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::UnfilteredWrite` without a filter, or any
    /// request failure.
    #[instrument(skip(self, query), fields(table = %table))]
    pub async fn delete(&self, table: &str, query: &Query) -> Result<(), BackendError> {
        Self::require_filters("delete", table, query)?;
        let url = self.table_url(table)?;
        let request = self
            .request(Method::DELETE, url)
            .await
            .header("Prefer", RETURN_MINIMAL)
            .query(&query.to_pairs());
        self.execute(request).await.map(drop)
    }
}

//! Measurement archive repository.
//!
//! # Responsibility
//! - Provide the write path used by ingestion collaborators and the read
//!   paths used by export/query collaborators.
//!
//! # Invariants
//! - Every write is an upsert keyed on `(attribute_id, timestamp)`; repeated
//!   writes converge on the last value instead of duplicating rows.
//! - Writes pass through the store, so installed maintenance rules fire inside
//!   the same statement.

use super::RepoResult;
use crate::consistency::UPSERT_ARCHIVE_SQL;
use crate::model::measurement::{MeasurementRecord, TimeRange};
use crate::model::{AttributeId, Timestamp};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OptionalExtension, Transaction, TransactionBehavior,
};

/// Repository interface for measurement records.
pub trait MeasurementRepository {
    /// Writes one record, overwriting any value at the same key.
    fn upsert_measurement(&self, record: &MeasurementRecord) -> RepoResult<()>;
    /// Writes a batch atomically. Must not be called inside an open transaction.
    fn upsert_measurements(&self, records: &[MeasurementRecord]) -> RepoResult<usize>;
    /// Removes one record. Returns whether a row existed.
    fn delete_measurement(&self, attribute_id: AttributeId, timestamp: Timestamp)
        -> RepoResult<bool>;
    /// Loads one record.
    fn get_measurement(
        &self,
        attribute_id: AttributeId,
        timestamp: Timestamp,
    ) -> RepoResult<Option<MeasurementRecord>>;
    /// Lists records of one attribute ordered by timestamp.
    fn list_measurements(
        &self,
        attribute_id: AttributeId,
        range: TimeRange,
    ) -> RepoResult<Vec<MeasurementRecord>>;
    /// Counts records of one attribute, value-absent ones included.
    fn count_for_attribute(&self, attribute_id: AttributeId) -> RepoResult<usize>;
    /// Deletes every record of one attribute and returns the count.
    fn delete_for_attribute(&self, attribute_id: AttributeId) -> RepoResult<usize>;
    /// Returns the earliest and latest timestamp stored for one attribute.
    fn timestamp_range(
        &self,
        attribute_id: AttributeId,
    ) -> RepoResult<Option<(Timestamp, Timestamp)>>;
}

/// SQLite-backed measurement repository.
pub struct SqliteMeasurementRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteMeasurementRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl MeasurementRepository for SqliteMeasurementRepository<'_> {
    fn upsert_measurement(&self, record: &MeasurementRecord) -> RepoResult<()> {
        self.conn.execute(
            UPSERT_ARCHIVE_SQL,
            params![record.attribute_id, record.timestamp, record.value],
        )?;
        Ok(())
    }

    fn upsert_measurements(&self, records: &[MeasurementRecord]) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_ARCHIVE_SQL)?;
            for record in records {
                stmt.execute(params![record.attribute_id, record.timestamp, record.value])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    fn delete_measurement(
        &self,
        attribute_id: AttributeId,
        timestamp: Timestamp,
    ) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "DELETE FROM archive WHERE attribute_id = ?1 AND timestamp = ?2;",
            params![attribute_id, timestamp],
        )?;
        Ok(changed > 0)
    }

    fn get_measurement(
        &self,
        attribute_id: AttributeId,
        timestamp: Timestamp,
    ) -> RepoResult<Option<MeasurementRecord>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM archive WHERE attribute_id = ?1 AND timestamp = ?2;",
                params![attribute_id, timestamp],
                |row| row.get::<_, Option<f64>>(0),
            )
            .optional()?;
        Ok(value.map(|value| MeasurementRecord::new(attribute_id, timestamp, value)))
    }

    fn list_measurements(
        &self,
        attribute_id: AttributeId,
        range: TimeRange,
    ) -> RepoResult<Vec<MeasurementRecord>> {
        let mut sql = String::from(
            "SELECT timestamp, value
             FROM archive
             WHERE attribute_id = ?",
        );
        let mut bind_values = vec![Value::Integer(attribute_id)];
        if let Some(start) = range.start {
            sql.push_str(" AND timestamp >= ?");
            bind_values.push(Value::Integer(start));
        }
        if let Some(end) = range.end {
            sql.push_str(" AND timestamp <= ?");
            bind_values.push(Value::Integer(end));
        }
        sql.push_str(" ORDER BY timestamp ASC;");

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(MeasurementRecord::new(attribute_id, row.get(0)?, row.get(1)?));
        }
        Ok(records)
    }

    fn count_for_attribute(&self, attribute_id: AttributeId) -> RepoResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM archive WHERE attribute_id = ?1;",
            [attribute_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete_for_attribute(&self, attribute_id: AttributeId) -> RepoResult<usize> {
        let changed = self
            .conn
            .execute("DELETE FROM archive WHERE attribute_id = ?1;", [attribute_id])?;
        Ok(changed)
    }

    fn timestamp_range(
        &self,
        attribute_id: AttributeId,
    ) -> RepoResult<Option<(Timestamp, Timestamp)>> {
        let (min, max): (Option<Timestamp>, Option<Timestamp>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM archive WHERE attribute_id = ?1;",
            [attribute_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(min.zip(max))
    }
}

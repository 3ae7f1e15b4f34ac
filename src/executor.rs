use crate::{Result, Value};
use std::{future::Future, sync::Arc};

/// Shared column name list of a fetched result set.
pub type RowNames = Arc<[String]>;
/// Owned row value slice matching `RowNames` length.
pub type Row = Box<[Value]>;

/// A result row with its corresponding column labels.
#[derive(Debug, Clone)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn get_column(&self, name: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }
}

/// Metadata about modify operations (INSERT/UPDATE/DELETE).
#[derive(Default, Debug, Clone, Copy)]
pub struct RowsAffected {
    pub rows_affected: u64,
    /// Backend-assigned identifier of the inserted row when available.
    pub last_insert_id: Option<i64>,
}

/// The external query-execution layer. The core renders complete SQL text
/// and delegates every round trip here; it never retries, masks, or times
/// out on its own.
pub trait Executor: Send {
    /// Executes the query and returns the rows.
    fn fetch(&mut self, sql: String) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send;

    /// Executes the query and returns the modify effect.
    fn execute(&mut self, sql: String) -> impl Future<Output = Result<RowsAffected>> + Send;
}

impl<E: Executor> Executor for &mut E {
    fn fetch(&mut self, sql: String) -> impl Future<Output = Result<Vec<RowLabeled>>> + Send {
        (**self).fetch(sql)
    }

    fn execute(&mut self, sql: String) -> impl Future<Output = Result<RowsAffected>> + Send {
        (**self).execute(sql)
    }
}

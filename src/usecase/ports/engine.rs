use thiserror::Error;

use crate::domain::entities::row::Row;
use crate::domain::entities::sql::{CompiledQuery, Dialect, Params};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    /// Declared type as reported by the engine, e.g. `INTEGER` or `varchar(255)`.
    pub sql_type: String,
}

/// One link of an engine error's cause chain, kept as text so errors stay `Clone`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Cause {
    message: String,
    #[source]
    next: Option<Box<Cause>>,
}

impl Cause {
    fn chain(mut messages: impl Iterator<Item = String>) -> Option<Box<Cause>> {
        let message = messages.next()?;
        Some(Box::new(Cause {
            message,
            next: Cause::chain(messages),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("query failed: {message}")]
    Query {
        message: String,
        #[source]
        cause: Option<Box<Cause>>,
    },
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        cause: Option<Box<Cause>>,
    },
    #[error("schema lookup failed: {message}")]
    Schema {
        message: String,
        #[source]
        cause: Option<Box<Cause>>,
    },
}

impl EngineError {
    pub fn query(message: impl Into<String>) -> Self {
        EngineError::Query {
            message: message.into(),
            cause: None,
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        EngineError::Connection {
            message: message.into(),
            cause: None,
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        EngineError::Schema {
            message: message.into(),
            cause: None,
        }
    }

    /// Keeps the outermost context as the message and the rest of the chain as sources.
    pub fn query_from(err: &anyhow::Error) -> Self {
        let (message, cause) = split_chain(err);
        EngineError::Query { message, cause }
    }

    pub fn connection_from(err: &anyhow::Error) -> Self {
        let (message, cause) = split_chain(err);
        EngineError::Connection { message, cause }
    }

    pub fn schema_from(err: &anyhow::Error) -> Self {
        let (message, cause) = split_chain(err);
        EngineError::Schema { message, cause }
    }

    pub fn class_name(&self) -> &'static str {
        match self {
            EngineError::Query { .. } => "query",
            EngineError::Connection { .. } => "connection",
            EngineError::Schema { .. } => "schema",
        }
    }
}

fn split_chain(err: &anyhow::Error) -> (String, Option<Box<Cause>>) {
    let cause = Cause::chain(err.chain().skip(1).map(|link| link.to_string()));
    (err.to_string(), cause)
}

/// The SQL execution engine. Calls are synchronous; callers on an async runtime wrap them in
/// a blocking task.
pub trait QueryEngine: Send + Sync {
    fn dialect(&self) -> Dialect;

    /// Runs a `SELECT COUNT(1) ...` statement and returns its single value.
    fn count_rows(&self, query: &CompiledQuery) -> Result<i64, EngineError>;

    /// `limit = None` fetches every row from `offset` on.
    fn fetch_page(
        &self,
        query: &CompiledQuery,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Row>, EngineError>;

    /// Returns the number of affected rows.
    fn execute(&self, sql: &str, params: &Params) -> Result<u64, EngineError>;

    /// Empty when the table does not exist.
    fn column_metadata(&self, table: &str) -> Result<Vec<ColumnMeta>, EngineError>;
}

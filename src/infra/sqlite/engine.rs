use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{Connection, Statement};
use serde_json::{Number, Value};
use tracing::debug;

use crate::domain::entities::row::Row;
use crate::domain::entities::sql::{CompiledQuery, Dialect, Params, SqlValue};
use crate::infra::sqlite::schema::open_connection;
use crate::usecase::ports::engine::{ColumnMeta, EngineError, QueryEngine};

/// Opens a connection per call, like every other SQLite access in this crate.
#[derive(Debug, Clone)]
pub struct SqliteEngine {
    pub db_path: PathBuf,
}

impl SqliteEngine {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    fn connect(&self) -> Result<Connection, EngineError> {
        open_connection(&self.db_path).map_err(|err| EngineError::connection_from(&err))
    }
}

impl QueryEngine for SqliteEngine {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn count_rows(&self, query: &CompiledQuery) -> Result<i64, EngineError> {
        let conn = self.connect()?;
        count_rows(&conn, query).map_err(|err| EngineError::query_from(&err))
    }

    fn fetch_page(
        &self,
        query: &CompiledQuery,
        offset: i64,
        limit: Option<i64>,
    ) -> Result<Vec<Row>, EngineError> {
        let conn = self.connect()?;
        fetch_rows(&conn, query, offset, limit).map_err(|err| EngineError::query_from(&err))
    }

    fn execute(&self, sql: &str, params: &Params) -> Result<u64, EngineError> {
        let conn = self.connect()?;
        execute(&conn, sql, params).map_err(|err| EngineError::query_from(&err))
    }

    fn column_metadata(&self, table: &str) -> Result<Vec<ColumnMeta>, EngineError> {
        let conn = self.connect()?;
        column_metadata(&conn, table).map_err(|err| EngineError::schema_from(&err))
    }
}

fn count_rows(conn: &Connection, query: &CompiledQuery) -> Result<i64> {
    debug!(sql = %query.sql, "count query");
    let mut stmt = conn
        .prepare(&query.sql)
        .context("failed to prepare count query")?;
    bind_params(&mut stmt, &query.params)?;
    let mut rows = stmt.raw_query();
    let row = rows
        .next()
        .context("failed to run count query")?
        .ok_or_else(|| anyhow!("count query returned no row"))?;
    let count: i64 = row.get(0).context("failed to read row count")?;
    Ok(count)
}

fn fetch_rows(conn: &Connection, query: &CompiledQuery, offset: i64, limit: Option<i64>) -> Result<Vec<Row>> {
    let sql = format!(
        "{} LIMIT {} OFFSET {}",
        query.sql,
        limit.unwrap_or(-1),
        offset.max(0)
    );
    debug!(sql = %sql, "page query");

    let mut stmt = conn.prepare(&sql).context("failed to prepare page query")?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    bind_params(&mut stmt, &query.params)?;

    let mut out = Vec::new();
    let mut rows = stmt.raw_query();
    while let Some(row) = rows.next().context("failed to read page row")? {
        let mut record = Row::new();
        for (idx, name) in names.iter().enumerate() {
            let value = row
                .get_ref(idx)
                .with_context(|| format!("failed to read column {name}"))?;
            record.insert(name.clone(), json_value(value));
        }
        out.push(record);
    }
    Ok(out)
}

fn execute(conn: &Connection, sql: &str, params: &Params) -> Result<u64> {
    debug!(sql = %sql, "execute");
    let mut stmt = conn.prepare(sql).context("failed to prepare statement")?;
    bind_params(&mut stmt, params)?;
    let changed = stmt.raw_execute().context("failed to execute statement")?;
    Ok(changed as u64)
}

fn column_metadata(conn: &Connection, table: &str) -> Result<Vec<ColumnMeta>> {
    let mut stmt = conn
        .prepare("SELECT name, type FROM pragma_table_info(?1)")
        .context("failed to prepare table info query")?;
    let columns = stmt
        .query_map([table], |row| {
            Ok(ColumnMeta {
                name: row.get(0)?,
                sql_type: row.get(1)?,
            })
        })
        .context("failed to query table info")?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("failed to collect table info")?;
    Ok(columns)
}

fn bind_params(stmt: &mut Statement<'_>, params: &Params) -> Result<()> {
    match params {
        Params::Positional(values) => {
            for (idx, value) in values.iter().enumerate() {
                stmt.raw_bind_parameter(idx + 1, sqlite_value(value))
                    .with_context(|| format!("failed to bind parameter {}", idx + 1))?;
            }
        }
        Params::Named(values) => {
            for (name, value) in values {
                let placeholder = format!(":{name}");
                let idx = stmt
                    .parameter_index(&placeholder)
                    .with_context(|| format!("failed to look up parameter {placeholder}"))?
                    .ok_or_else(|| anyhow!("statement has no parameter {placeholder}"))?;
                stmt.raw_bind_parameter(idx, sqlite_value(value))
                    .with_context(|| format!("failed to bind parameter {placeholder}"))?;
            }
        }
    }
    Ok(())
}

fn sqlite_value(value: &SqlValue) -> SqliteValue {
    match value {
        SqlValue::Null => SqliteValue::Null,
        SqlValue::Integer(number) => SqliteValue::Integer(*number),
        SqlValue::Real(number) => SqliteValue::Real(*number),
        SqlValue::Text(text) => SqliteValue::Text(text.clone()),
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::Number(number.into()),
        ValueRef::Real(number) => Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

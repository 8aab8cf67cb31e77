use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use crate::domain::entities::column::{ColumnDefinition, ColumnRegistry, DataType};
use crate::domain::entities::table::QuerySource;
use crate::usecase::ports::engine::{ColumnMeta, QueryEngine};
use crate::usecase::services::column_resolver::ColumnResolver;

pub type ColumnTypes = BTreeMap<String, DataType>;

/// Looks up undeclared column types through the engine's schema introspection.
///
/// Lookups never fail: a missing table, a missing column, an unmapped SQL type or an engine
/// error all give [`DataType::Unknown`]. Schemas are fetched once per table per instance.
pub struct TypeInference<'a> {
    engine: &'a dyn QueryEngine,
    source: &'a QuerySource,
    schemas: HashMap<String, Vec<ColumnMeta>>,
}

impl<'a> TypeInference<'a> {
    pub fn new(engine: &'a dyn QueryEngine, source: &'a QuerySource) -> Self {
        Self {
            engine,
            source,
            schemas: HashMap::new(),
        }
    }

    pub fn column_types(&mut self, columns: &ColumnRegistry) -> ColumnTypes {
        columns
            .iter()
            .map(|column| (column.key.clone(), self.data_type(column)))
            .collect()
    }

    pub fn data_type(&mut self, column: &ColumnDefinition) -> DataType {
        if let Some(declared) = column.data_type {
            return declared;
        }

        let Some((table, name)) = self.physical_column(column) else {
            return DataType::Unknown;
        };

        let Some(schema) = self.schema(&table) else {
            return DataType::Unknown;
        };
        match schema.iter().find(|meta| meta.name.eq_ignore_ascii_case(&name)) {
            Some(meta) => map_sql_type(&name, &meta.sql_type),
            None => {
                debug!(table = %table, column = %name, "column not found in schema");
                DataType::Unknown
            }
        }
    }

    fn physical_column(&self, column: &ColumnDefinition) -> Option<(String, String)> {
        let resolver = ColumnResolver::new(self.source);
        let expression = resolver.resolve(column);

        let parts: Vec<&str> = expression.split('.').collect();
        if parts.len() >= 2 {
            let table = resolver.table_for_qualifier(parts[0]);
            return Some((table, parts[1].to_string()));
        }

        let table = resolver
            .primary_table()
            .or_else(|| self.source.table.clone())?;
        Some((table, expression))
    }

    fn schema(&mut self, table: &str) -> Option<&Vec<ColumnMeta>> {
        if !self.schemas.contains_key(table) {
            let columns = match self.engine.column_metadata(table) {
                Ok(columns) => columns,
                Err(err) => {
                    warn!(table = %table, error = %err, "schema lookup failed");
                    Vec::new()
                }
            };
            self.schemas.insert(table.to_string(), columns);
        }
        self.schemas.get(table).filter(|columns| !columns.is_empty())
    }
}

/// Integer columns whose name starts with `time` hold unix timestamps.
pub fn map_sql_type(column_name: &str, sql_type: &str) -> DataType {
    let lowered = sql_type.to_ascii_lowercase();
    let base = lowered
        .split('(')
        .next()
        .map(str::trim)
        .unwrap_or_default();

    match base {
        "int" | "integer" | "bigint" | "tinyint" | "smallint" | "mediumint" => {
            if column_name.starts_with("time") {
                DataType::Timestamp
            } else {
                DataType::Number
            }
        }
        "real" | "float" | "double" | "double precision" | "numeric" | "decimal" => DataType::Number,
        "text" | "longtext" | "mediumtext" | "varchar" | "char" | "character"
        | "character varying" | "nvarchar" | "clob" => DataType::Text,
        _ => DataType::Unknown,
    }
}

use serde::Serialize;

use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    /// Row ids travel as text; decimal ids are bound as integers so they compare equal to
    /// integer key columns.
    pub fn row_id(id: &str) -> Self {
        match id.parse::<i64>() {
            Ok(number) => SqlValue::Integer(number),
            Err(_) => SqlValue::Text(id.to_string()),
        }
    }
}

impl From<&serde_json::Value> for SqlValue {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
            Value::Number(number) => match number.as_i64() {
                Some(integer) => SqlValue::Integer(integer),
                None => SqlValue::Real(number.as_f64().unwrap_or_default()),
            },
            Value::String(text) => SqlValue::Text(text.clone()),
            other => SqlValue::Text(other.to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamStyle {
    /// `?`
    Positional,
    /// `:name_N`
    Named,
}

/// Bound values of one statement. Positional and named values never mix.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<SqlValue>),
    Named(Vec<(String, SqlValue)>),
}

impl Default for Params {
    fn default() -> Self {
        Params::Positional(Vec::new())
    }
}

impl Params {
    pub fn empty(style: ParamStyle) -> Self {
        match style {
            ParamStyle::Positional => Params::Positional(Vec::new()),
            ParamStyle::Named => Params::Named(Vec::new()),
        }
    }

    pub fn style(&self) -> ParamStyle {
        match self {
            Params::Positional(_) => ParamStyle::Positional,
            Params::Named(values) if values.is_empty() => ParamStyle::Positional,
            Params::Named(_) => ParamStyle::Named,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn append(&mut self, other: Params) -> GridResult<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.is_empty() {
            *self = other;
            return Ok(());
        }
        match (self, other) {
            (Params::Positional(values), Params::Positional(more)) => values.extend(more),
            (Params::Named(values), Params::Named(more)) => values.extend(more),
            _ => {
                return Err(GridError::config(
                    "positional and named parameters cannot be mixed in one statement",
                ))
            }
        }
        Ok(())
    }
}

/// Hands out placeholders in one binding style and collects the bound values.
#[derive(Debug)]
pub struct ParamSink {
    style: ParamStyle,
    prefix: &'static str,
    params: Params,
}

impl ParamSink {
    pub fn new(style: ParamStyle, prefix: &'static str) -> Self {
        Self {
            style,
            prefix,
            params: Params::empty(style),
        }
    }

    pub fn bind(&mut self, value: impl Into<SqlValue>) -> String {
        let value = value.into();
        match &mut self.params {
            Params::Positional(values) => {
                values.push(value);
                "?".to_string()
            }
            Params::Named(values) => {
                let name = format!("{}_{}", self.prefix, values.len());
                let placeholder = format!(":{name}");
                values.push((name, value));
                placeholder
            }
        }
    }

    pub fn bind_list<I, V>(&mut self, values: I) -> Vec<String>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        values.into_iter().map(|value| self.bind(value)).collect()
    }

    pub fn style(&self) -> ParamStyle {
        self.style
    }

    pub fn into_params(self) -> Params {
        self.params
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Params,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl Dialect {
    /// Case-insensitive LIKE against a bound pattern, escaped with [`Dialect::like_escape`].
    pub fn like(&self, column: &str, placeholder: &str, negate: bool) -> String {
        let not = if negate { "NOT " } else { "" };
        match self {
            Dialect::Sqlite => {
                format!("LOWER({column}) {not}LIKE LOWER({placeholder}) ESCAPE '\\'")
            }
            Dialect::Postgres => format!("{column} {not}ILIKE {placeholder} ESCAPE '\\'"),
            Dialect::Mysql => {
                format!("LOWER({column}) {not}LIKE LOWER({placeholder}) ESCAPE '\\\\'")
            }
        }
    }

    pub fn like_escape(&self, value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for ch in value.chars() {
            if matches!(ch, '\\' | '%' | '_') {
                escaped.push('\\');
            }
            escaped.push(ch);
        }
        escaped
    }

    pub fn cast_to_char(&self, column: &str) -> String {
        match self {
            Dialect::Sqlite => format!("CAST({column} AS TEXT)"),
            Dialect::Postgres => format!("CAST({column} AS VARCHAR)"),
            Dialect::Mysql => format!("CAST({column} AS CHAR)"),
        }
    }

    /// Renders an integer unix timestamp column as text, so it can be searched like `08.02.2024`.
    ///
    /// `format` uses strftime-style specifiers (`%d.%m.%Y %H:%M`), `%M` meaning minutes.
    pub fn format_timestamp(&self, column: &str, format: &str, timezone: &str) -> GridResult<String> {
        let timezone = strip_quotes(timezone);
        match self {
            Dialect::Sqlite => {
                let format = translate_format(format, SQLITE_FORMAT)?;
                let modifier = if is_local(&timezone) {
                    ", 'localtime'"
                } else {
                    ""
                };
                Ok(format!(
                    "CASE WHEN {column} > 0 THEN strftime('{format}', {column}, 'unixepoch'{modifier}) ELSE '' END"
                ))
            }
            Dialect::Postgres => {
                let format = translate_format(format, POSTGRES_FORMAT)?;
                let timestamp = if is_local(&timezone) {
                    format!("TO_TIMESTAMP({column})")
                } else {
                    format!("TO_TIMESTAMP({column}) AT TIME ZONE '{}'", fixed_zone(&timezone))
                };
                Ok(format!("TO_CHAR({timestamp}, '{format}')"))
            }
            Dialect::Mysql => {
                let format = translate_format(format, MYSQL_FORMAT)?;
                // FROM_UNIXTIME yields session time. Named zones need the server's zone tables,
                // so only offsets are passed to CONVERT_TZ.
                let timestamp = if is_local(&timezone) {
                    format!("FROM_UNIXTIME({column})")
                } else {
                    format!(
                        "CONVERT_TZ(FROM_UNIXTIME({column}), @@session.time_zone, '{}')",
                        fixed_zone(&timezone)
                    )
                };
                Ok(format!(
                    "IF({column} > 0, DATE_FORMAT({timestamp}, '{format}'), '')"
                ))
            }
        }
    }
}

const SQLITE_FORMAT: &[(char, &str)] = &[
    ('Y', "%Y"),
    ('d', "%d"),
    ('m', "%m"),
    ('H', "%H"),
    ('M', "%M"),
    ('s', "%S"),
    ('S', "%S"),
    ('w', "%w"),
    ('%', "%%"),
];

const POSTGRES_FORMAT: &[(char, &str)] = &[
    ('Y', "YYYY"),
    ('d', "DD"),
    ('m', "MM"),
    ('H', "HH24"),
    ('M', "MI"),
    ('s', "SS"),
    ('S', "SS"),
    ('w', "D"),
];

const MYSQL_FORMAT: &[(char, &str)] = &[
    ('Y', "%Y"),
    ('d', "%d"),
    ('m', "%m"),
    ('H', "%H"),
    ('M', "%i"),
    ('s', "%s"),
    ('S', "%s"),
    ('w', "%w"),
    ('%', "%%"),
];

fn translate_format(format: &str, table: &[(char, &str)]) -> GridResult<String> {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars();
    while let Some(ch) = chars.next() {
        if ch == '\'' {
            continue;
        }
        if ch != '%' {
            out.push(ch);
            continue;
        }
        let spec = chars.next().ok_or_else(|| {
            GridError::config(format!("date format ends with a dangling '%': {format}"))
        })?;
        let (_, replacement) = table.iter().find(|(key, _)| *key == spec).ok_or_else(|| {
            GridError::config(format!("date format contains unknown identifiers: {format}"))
        })?;
        out.push_str(replacement);
    }
    Ok(out)
}

fn is_local(timezone: &str) -> bool {
    timezone.eq_ignore_ascii_case("localtime")
}

/// `UTC` as a numeric offset, which every engine accepts without zone tables.
fn fixed_zone(timezone: &str) -> &str {
    if timezone.eq_ignore_ascii_case("utc") {
        "+00:00"
    } else {
        timezone
    }
}

fn strip_quotes(value: &str) -> String {
    value.chars().filter(|ch| *ch != '\'' && *ch != '"').collect()
}

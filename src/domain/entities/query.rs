use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Wire encoding of `tdir`: 3 is descending, 4 is ascending.
    pub fn from_wire(code: i64) -> Option<Self> {
        match code {
            3 => Some(SortDirection::Desc),
            4 => Some(SortDirection::Asc),
            _ => None,
        }
    }

    pub fn wire_code(&self) -> i64 {
        match self {
            SortDirection::Desc => 3,
            SortDirection::Asc => 4,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpec {
    pub page_index: i64,
    pub page_size: i64,
}

impl PageSpec {
    pub fn new(page_index: i64, page_size: i64) -> GridResult<Self> {
        if page_index < 0 {
            return Err(GridError::protocol(format!(
                "page must not be negative: {page_index}"
            )));
        }
        if page_size <= 0 {
            return Err(GridError::protocol(format!(
                "page_size must be greater than zero: {page_size}"
            )));
        }
        Ok(Self {
            page_index,
            page_size,
        })
    }

    pub fn offset(&self) -> i64 {
        self.page_index.saturating_mul(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListMeta {
    pub total: i64,
    pub page_size: i64,
    pub current_page: i64,
    pub selected_rows_count: usize,
}

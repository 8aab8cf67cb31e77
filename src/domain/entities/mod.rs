pub mod action;
pub mod column;
pub mod filter;
pub mod form;
pub mod query;
pub mod row;
pub mod selection;
pub mod sql;
pub mod table;

pub mod action_differ;
pub mod column_resolver;
pub mod dispatcher;
pub mod filter_compiler;
pub mod form_service;
pub mod row_format;
pub mod selection_service;
pub mod sort_page;
pub mod table_config;
pub mod type_inference;

pub mod app;
pub mod dictionary;
pub mod domain;
pub mod error;
pub mod fs_util;
pub mod institutions;
pub mod merge;
pub mod nces;
pub mod output;
pub mod schema;
pub mod select;
pub mod store;
pub mod table;

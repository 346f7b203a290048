pub mod db_connect;
pub mod env_loader;
pub mod excel_writer;
pub mod field_groups;
pub mod legacy_sync;
pub mod matcher;
pub mod merger;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reports;
pub mod roster;
pub mod sheet_reader;
pub mod store;
pub mod uploader;

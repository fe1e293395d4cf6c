pub mod bulk_operations;
pub mod connections;
pub mod csv_import;
pub mod db;
pub mod jobs;
pub mod orders;
pub mod platform_data;
pub mod products;

pub mod address;
pub mod barcode;

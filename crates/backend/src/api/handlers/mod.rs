pub mod brands;
pub mod cache;
pub mod sales;
pub mod sku;

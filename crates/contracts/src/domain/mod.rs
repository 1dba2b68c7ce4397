pub mod brand;
pub mod sales;
pub mod sku;

pub use brand::{Brand, BrandDto, BrandTarget, DeleteBrandRequest};
pub use sales::SalesRecord;
pub use sku::SkuRecord;

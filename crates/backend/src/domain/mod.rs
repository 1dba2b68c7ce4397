pub mod brand;
pub mod sales_fact;
pub mod sku_fact;

pub mod batch;
pub mod cache;
pub mod domain;
pub mod queries;

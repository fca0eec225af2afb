//! Services: pool catalog, allocation and result export

pub mod allocator;
pub mod catalog;
pub mod export;

pub use allocator::Allocator;
pub use catalog::{CatalogError, PoolCatalog};
pub use export::{export_file_name, export_results};

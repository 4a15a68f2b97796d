//! Product catalog: categories, products and the category tree.

mod category;
mod product;
mod service;
mod tree;

pub use category::{Category, CategoryDraft, CategoryPatch};
pub use product::{Product, ProductDraft, ProductPatch};
pub use service::{CatalogService, CategorySummary, ProductDetails};
pub use tree::{CategoryNode, CategoryTree};

//! krb schema resolver: kind-form and collection-form mapping over a cached discovery catalog.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod resolver;

pub use catalog::{Catalog, CatalogEntry, FuzzyName, Resolution};
pub use resolver::{CatalogSource, SchemaResolver, StaticSource};

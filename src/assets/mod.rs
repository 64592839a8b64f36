// src/assets/mod.rs

pub mod catalog;
pub mod fetch;
pub mod resolver;
pub mod tiers;

pub use catalog::AssetCatalog;
pub use fetch::Fetcher;
pub use resolver::AssetResolver;

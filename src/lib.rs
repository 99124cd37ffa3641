#![deny(clippy::unwrap_used)]

pub mod brand_cache;
pub mod category_resolver;
pub mod characteristics;
pub mod config;
pub mod error;
pub mod field_map;
pub mod filter;
pub mod images;
pub mod import_service;
pub mod import_throttle;
pub mod notify;
pub mod price;
pub mod reconcile;
pub mod run;
pub mod status;
pub mod storage;
pub mod supplier_info;

#[cfg(test)]
mod fixtures;

// src/config/mod.rs
pub mod providers;
pub mod resolver;

pub use providers::ProvidersConfig;
pub use resolver::ResolverConfig;

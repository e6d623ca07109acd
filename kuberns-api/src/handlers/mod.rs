// Handlers module - Centralizes all request handlers
pub mod environments;
pub mod instances;
pub mod logs;
pub mod metadata;
pub mod webapps;

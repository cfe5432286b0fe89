// Business domains
pub mod stores;

pub mod client;
pub mod filters;

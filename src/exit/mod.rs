pub mod monitor;
pub mod panic;

pub mod dap;
pub mod error;
pub mod log;

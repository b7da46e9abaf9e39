pub mod system_log_adapter;

pub use system_log_adapter::{LogFormat, SystemLogAdapter, SystemLogAdapterConfig};

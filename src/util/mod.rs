pub mod macros;
pub mod system_info;
pub mod types;

pub mod branch;
pub mod log_parser;

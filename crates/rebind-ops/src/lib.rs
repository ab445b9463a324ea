pub mod inputs;
pub mod ops_generate;
pub mod ops_usage;

pub mod range_cache;
pub mod remote;

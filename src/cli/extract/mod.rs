mod extract_impl;
pub mod progress;
pub mod selection;

pub use extract_impl::cmd_extract;

pub mod cache;
pub mod filters;
pub mod source;
pub mod weekly;

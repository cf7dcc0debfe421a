pub mod filter;
pub mod value;

pub use filter::Filter;

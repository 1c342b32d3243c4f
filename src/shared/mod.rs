pub mod page;
pub mod tuple;

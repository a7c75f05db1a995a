pub mod embed;
pub mod notebook;
pub mod scan;
pub mod search;
pub mod sync;

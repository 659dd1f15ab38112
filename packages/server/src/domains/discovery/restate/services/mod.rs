pub mod discovery;

pub use discovery::*;

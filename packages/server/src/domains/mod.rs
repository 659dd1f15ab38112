// Business domains
pub mod companies;
pub mod contacts;
pub mod discovery;
pub mod leads;

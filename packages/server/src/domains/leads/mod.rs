//! Leads domain - sales opportunities pairing a company with a contact

pub mod models;

pub use models::{CreateLead, Lead, LeadStatus};

//! Typed id aliases for every persisted entity.

pub use super::id::Id;

/// Marker for company records.
pub struct Company;

/// Marker for contact records.
pub struct Contact;

/// Marker for lead records.
pub struct Lead;

/// Marker for discovery run audit records.
pub struct DiscoveryRun;

/// Marker for discovery intents.
pub struct DiscoveryIntent;

pub type CompanyId = Id<Company>;
pub type ContactId = Id<Contact>;
pub type LeadId = Id<Lead>;
pub type DiscoveryRunId = Id<DiscoveryRun>;
pub type IntentId = Id<DiscoveryIntent>;

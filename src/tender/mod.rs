//! Tender analysis domain: typed schema, procedure classification, profile
//! consolidation, prompts and canned answers.

pub mod answers;
pub mod classify;
pub mod profile;
pub mod prompts;
pub mod schema;

pub use classify::{Classification, EntityType, ProcedureType, classify_procedure, join_spaced_letters};
pub use profile::{CompanyData, PersonType, Profile};
pub use schema::{NOT_AVAILABLE, TenderAnalysis};

//! Bidder identity documents: tax registration (CIF) and corporate charter
//! (acta constitutiva).

pub mod legal;
pub mod normalize;
pub mod prompts;
pub mod validator;

pub use legal::LegalFields;
pub use normalize::{normalize_name, similarity};
pub use validator::{IdentityReport, Inconsistency, Severity, ValidationStatus, validate};

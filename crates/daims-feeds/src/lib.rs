//! Per-feed adapters for the reference loader pipeline.
//!
//! Each adapter turns one upstream product into dimension rows and applies
//! them through the store: SAM monthly/daily extracts, the USPS ZIP
//! products, GTAS SF-133 period files, the CFDA SOAP extract, DEFC, the
//! GENC country baseline, and the flat agency and calendar tables. The
//! fetch/fence/stamp mechanics live in `daims-reference`; adapters only
//! parse and apply.

pub mod agencies;
pub mod cfda;
pub mod country;
pub mod dates;
pub mod defc;
pub mod object_class;
pub mod program_activity;
pub mod sam;
pub mod sf133;
pub mod tas;
pub mod usps;
pub mod windows;

pub use agencies::AgencyLoader;
pub use cfda::AssistanceListingLoader;
pub use country::CountryLoader;
pub use defc::{DefcLoader, NoPublicLaws, PublicLawInfo, PublicLawSource};
pub use object_class::ObjectClassLoader;
pub use program_activity::ProgramActivityLoader;
pub use sam::{SamRecipientLoader, SamUnregisteredLoader};
pub use sf133::Sf133Loader;
pub use tas::TasLoader;
pub use usps::UspsZipLoader;
pub use windows::SubmissionWindowLoader;

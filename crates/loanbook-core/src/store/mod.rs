//! Storage collaborators: the transactional record store and the read-only
//! reference data lookup.

pub mod memory;
pub mod reference;

pub use memory::{Sequence, Store, UnitOfWork};
pub use reference::{Borrower, InMemoryReferenceData, ReferenceData};

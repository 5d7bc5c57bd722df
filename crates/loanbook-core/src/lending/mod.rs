//! Pure lending arithmetic: product rules, loan terms, penalties and the
//! repayment waterfall. Nothing here touches storage.

pub mod allocator;
pub mod calculator;
pub mod product;

pub use allocator::{allocate, Allocation, Outstanding, OutstandingSummary};
pub use calculator::{compute_penalty, compute_terms, LoanTerms};
pub use product::{InterestType, LoanProduct, PenaltyType};

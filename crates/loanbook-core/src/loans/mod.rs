//! Loan records and their lifecycle.

pub mod model;
pub mod state_machine;

pub use model::{Disbursement, Loan, LoanStatusChange, PaymentMethod, Penalty, Repayment};
pub use state_machine::{outstanding_from, LoanStateMachine, LoanStatus, OverdueEvaluation};

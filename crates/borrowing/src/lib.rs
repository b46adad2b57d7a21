//! Borrow-request domain module.
//!
//! The request status state machine, input validation and the due-date
//! advisory. Stock changes are only *planned* here (as a signed delta on the
//! referenced item); applying them together with the status write is the
//! store's job.

pub mod due;
pub mod request;

pub use due::{DueAlert, Urgency, due_alerts};
pub use request::{
    BorrowDraft, BorrowRequest, BorrowRequestView, BorrowStatus, NewBorrowRequest, RequestFilter,
    StatusChange, Transition,
};

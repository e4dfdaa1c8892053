//! Data models for the circulation engine

pub mod item;
pub mod loan;
pub mod policy;
pub mod reservation;
pub mod return_outcome;

// Re-export commonly used types
pub use item::{CatalogItem, NewItem};
pub use loan::{Loan, LoanStats, LoanStatus, NewLoan};
pub use policy::LendingPolicy;
pub use reservation::{NewReservation, Reservation, ReservationStats, ReservationStatus};
pub use return_outcome::{ConsistencyWarning, ReturnOutcome};

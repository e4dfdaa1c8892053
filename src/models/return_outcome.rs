//! Result of handing a returned copy back to the circulation engine

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{loan::Loan, reservation::Reservation};

/// The returned copy could not be re-resolved through the catalog's natural key.
/// The loan is still closed; availability is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ConsistencyWarning {
    pub item_id: i32,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReturnOutcome {
    pub loan: Loan,
    /// True when the copy went straight to the next waiting patron
    pub assigned_to_reservation: bool,
    pub reservation: Option<Reservation>,
    pub warning: Option<ConsistencyWarning>,
}

impl ReturnOutcome {
    pub fn released(loan: Loan) -> Self {
        Self {
            loan,
            assigned_to_reservation: false,
            reservation: None,
            warning: None,
        }
    }

    pub fn assigned(loan: Loan, reservation: Reservation) -> Self {
        Self {
            loan,
            assigned_to_reservation: true,
            reservation: Some(reservation),
            warning: None,
        }
    }

    pub fn orphaned(loan: Loan, warning: ConsistencyWarning) -> Self {
        Self {
            loan,
            assigned_to_reservation: false,
            reservation: None,
            warning: Some(warning),
        }
    }
}

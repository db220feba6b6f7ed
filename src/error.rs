// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::PlanStatus;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EmiError {
    #[error("Invalid plan terms: {0}")]
    InvalidTerms(String),

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(Decimal),

    #[error("Plan {id} is {status}; no further payments accepted")]
    PlanClosed { id: i64, status: PlanStatus },

    #[error("Insufficient wallet balance: needed {needed}, available {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Transaction reference '{0}' already recorded")]
    DuplicateReference(String),

    #[error("Invalid transaction reference '{0}'")]
    InvalidReference(String),

    #[error("Unknown {kind} '{value}'")]
    UnknownValue { kind: &'static str, value: String },

    #[error("Payment '{0}' is not pending")]
    NotPending(String),
}

impl EmiError {
    pub(crate) fn unknown(kind: &'static str, value: &str) -> Self {
        Self::UnknownValue {
            kind,
            value: value.to_string(),
        }
    }
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::EmiError;
use crate::models::{BalanceKind, Wallet};
use rust_decimal::Decimal;

/// How a debit was split across the two balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletDebit {
    pub from_purchase: Decimal,
    pub from_withdrawable: Decimal,
}

impl Wallet {
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            purchase_balance: Decimal::ZERO,
            withdrawable_balance: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.purchase_balance + self.withdrawable_balance
    }

    pub fn credit(&mut self, kind: BalanceKind, amount: Decimal) -> Result<(), EmiError> {
        if amount <= Decimal::ZERO {
            return Err(EmiError::InvalidAmount(amount));
        }
        match kind {
            BalanceKind::Purchase => self.purchase_balance += amount,
            BalanceKind::Withdrawable => self.withdrawable_balance += amount,
        }
        Ok(())
    }

    /// Spends purchase balance first, then withdrawable balance. Leaves the
    /// wallet untouched when the combined balance is short.
    pub fn debit(&mut self, amount: Decimal) -> Result<WalletDebit, EmiError> {
        if amount <= Decimal::ZERO {
            return Err(EmiError::InvalidAmount(amount));
        }
        if self.total() < amount {
            return Err(EmiError::InsufficientFunds {
                needed: amount,
                available: self.total(),
            });
        }
        let from_purchase = amount.min(self.purchase_balance);
        let from_withdrawable = amount - from_purchase;
        self.purchase_balance -= from_purchase;
        self.withdrawable_balance -= from_withdrawable;
        Ok(WalletDebit {
            from_purchase,
            from_withdrawable,
        })
    }

    pub fn withdraw(&mut self, amount: Decimal) -> Result<(), EmiError> {
        if amount <= Decimal::ZERO {
            return Err(EmiError::InvalidAmount(amount));
        }
        if self.withdrawable_balance < amount {
            return Err(EmiError::InsufficientFunds {
                needed: amount,
                available: self.withdrawable_balance,
            });
        }
        self.withdrawable_balance -= amount;
        Ok(())
    }
}

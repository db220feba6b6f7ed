// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::EmiError;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Ongoing,
    Completed,
    Defaulted,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Defaulted => "defaulted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Ongoing)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanStatus {
    type Err = EmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ongoing" => Ok(Self::Ongoing),
            "completed" => Ok(Self::Completed),
            "defaulted" => Ok(Self::Defaulted),
            other => Err(EmiError::unknown("plan status", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Paid,
    Failed,
    Pending,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = EmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "pending" => Ok(Self::Pending),
            other => Err(EmiError::unknown("payment status", other)),
        }
    }
}

/// Where the money for a payment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSource {
    Wallet,
    External,
}

impl PaymentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wallet => "wallet",
            Self::External => "external",
        }
    }
}

impl FromStr for PaymentSource {
    type Err = EmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wallet" => Ok(Self::Wallet),
            "external" => Ok(Self::External),
            other => Err(EmiError::unknown("payment source", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// One financed purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallmentPlan {
    pub id: i64,
    pub user: String,
    pub order_ref: String,
    pub total_amount: Decimal,
    pub down_payment: Decimal,
    pub processing_fee: Decimal,
    pub billing_cycle_days: u32,
    pub total_installments: u32,
    pub installment_amount: Decimal,
    pub paid_installments: u32,
    pub next_due_date: Option<NaiveDate>,
    pub status: PlanStatus,
    pub penalty: Decimal,
    /// Missed cycles (relative to `next_due_date`) already reflected in `penalty`.
    pub penalty_cycles: u32,
    pub start_date: NaiveDate,
    pub created_at: NaiveDateTime,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub plan_id: i64,
    pub txn_ref: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub penalty_paid: Decimal,
    pub status: PaymentStatus,
    pub source: PaymentSource,
    pub installment_no: Option<u32>,
    pub remark: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user: String,
    pub purchase_balance: Decimal,
    pub withdrawable_balance: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
    Purchase,
    Withdrawable,
}

impl BalanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Withdrawable => "withdrawable",
        }
    }
}

impl FromStr for BalanceKind {
    type Err = EmiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "purchase" => Ok(Self::Purchase),
            "withdrawable" => Ok(Self::Withdrawable),
            other => Err(EmiError::unknown("balance kind", other)),
        }
    }
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Installment plan lifecycle: terms, penalty accrual, payment application,
//! and schedule derivation. Nothing in here touches the database.

use crate::error::EmiError;
use crate::models::{InstallmentPlan, OrderItem, PaymentRecord, PaymentStatus, PlanStatus};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::fmt;

/// Longest billing cycle accepted, in days.
pub const MAX_CYCLE_DAYS: u32 = 366;
/// Most installments a single plan may be split into.
pub const MAX_INSTALLMENTS: u32 = 600;

/// Financing terms captured at order confirmation.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanTerms {
    pub total_amount: Decimal,
    pub down_payment: Decimal,
    pub processing_fee: Decimal,
    pub billing_cycle_days: u32,
    pub total_installments: u32,
}

impl PlanTerms {
    pub fn validate(&self) -> Result<(), EmiError> {
        if self.total_amount <= Decimal::ZERO {
            return Err(EmiError::InvalidTerms(format!(
                "total amount must be positive, got {}",
                self.total_amount
            )));
        }
        if self.down_payment < Decimal::ZERO {
            return Err(EmiError::InvalidTerms("down payment cannot be negative".into()));
        }
        if self.processing_fee < Decimal::ZERO {
            return Err(EmiError::InvalidTerms("processing fee cannot be negative".into()));
        }
        if self.down_payment >= self.total_amount {
            return Err(EmiError::InvalidTerms(format!(
                "down payment {} leaves nothing to finance on {}",
                self.down_payment, self.total_amount
            )));
        }
        check_schedule_shape(self.billing_cycle_days, self.total_installments)?;
        if self.installment_amount().is_zero() {
            return Err(EmiError::InvalidTerms(format!(
                "{} installments of {} round to zero",
                self.total_installments,
                self.financed_amount()
            )));
        }
        Ok(())
    }

    /// Due date of the final installment for a plan starting on `start`.
    pub fn final_due_date(&self, start: NaiveDate) -> Result<NaiveDate, EmiError> {
        self.validate()?;
        cycles(self.total_installments, self.billing_cycle_days)
            .and_then(|d| start.checked_add_signed(d))
            .ok_or_else(|| {
                EmiError::InvalidTerms(format!("schedule starting {} runs past the calendar", start))
            })
    }

    /// `total - down_payment + processing_fee`
    pub fn financed_amount(&self) -> Decimal {
        self.total_amount - self.down_payment + self.processing_fee
    }

    /// Rounded down to cents so that `n * installment` never exceeds the financed amount.
    pub fn installment_amount(&self) -> Decimal {
        (self.financed_amount() / Decimal::from(self.total_installments))
            .round_dp_with_strategy(2, RoundingStrategy::ToZero)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PenaltyPolicy {
    /// Flat fee charged once per missed billing cycle.
    pub fee_per_cycle: Decimal,
    /// Consecutive missed cycles that default the plan; 0 never defaults.
    pub default_after_cycles: u32,
}

impl Default for PenaltyPolicy {
    fn default() -> Self {
        Self {
            fee_per_cycle: Decimal::from(500),
            default_after_cycles: 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Accrual {
    pub charged_cycles: u32,
    pub charged: Decimal,
    pub defaulted: bool,
}

impl Accrual {
    pub fn is_noop(&self) -> bool {
        self.charged_cycles == 0 && !self.defaulted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedPayment {
    pub installment_no: u32,
    pub installment_portion: Decimal,
    pub penalty_portion: Decimal,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Rejection {
    Defaulted,
    BeforeWindow { opens: NaiveDate },
    AmountMismatch { expected: Decimal, tendered: Decimal },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Defaulted => f.write_str("plan defaulted on missed cycles"),
            Self::BeforeWindow { opens } => {
                write!(f, "payment window opens on {}", opens)
            }
            Self::AmountMismatch { expected, tendered } => {
                write!(f, "amount {} does not match amount due {}", tendered, expected)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PaymentDecision {
    Accepted(AppliedPayment),
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallmentState {
    Paid,
    Due,
    Overdue,
    Upcoming,
}

impl InstallmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Due => "due",
            Self::Overdue => "overdue",
            Self::Upcoming => "upcoming",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleRow {
    pub installment_no: u32,
    pub due_date: NaiveDate,
    pub amount: Decimal,
    pub state: InstallmentState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub plan_id: i64,
    pub rule: &'static str,
    pub detail: String,
}

/// Bounds shared by new terms and plans pulled from the platform.
pub fn check_schedule_shape(cycle_days: u32, installments: u32) -> Result<(), EmiError> {
    if cycle_days == 0 || cycle_days > MAX_CYCLE_DAYS {
        return Err(EmiError::InvalidTerms(format!(
            "billing cycle must be 1 to {} days, got {}",
            MAX_CYCLE_DAYS, cycle_days
        )));
    }
    if installments == 0 || installments > MAX_INSTALLMENTS {
        return Err(EmiError::InvalidTerms(format!(
            "installment count must be 1 to {}, got {}",
            MAX_INSTALLMENTS, installments
        )));
    }
    Ok(())
}

fn cycles(n: u32, cycle_days: u32) -> Option<Duration> {
    Duration::try_days(i64::from(n) * i64::from(cycle_days))
}

// Saturates at the calendar edge; validated terms never get there.
fn shift_forward(date: NaiveDate, n: u32, cycle_days: u32) -> NaiveDate {
    cycles(n, cycle_days)
        .and_then(|d| date.checked_add_signed(d))
        .unwrap_or(NaiveDate::MAX)
}

fn shift_back(date: NaiveDate, n: u32, cycle_days: u32) -> NaiveDate {
    cycles(n, cycle_days)
        .and_then(|d| date.checked_sub_signed(d))
        .unwrap_or(NaiveDate::MIN)
}

impl InstallmentPlan {
    /// A fresh plan with nothing paid. The id is assigned on insert.
    pub fn open(
        user: &str,
        order_ref: &str,
        terms: &PlanTerms,
        start_date: NaiveDate,
        created_at: NaiveDateTime,
        items: Vec<OrderItem>,
    ) -> Result<Self, EmiError> {
        terms.final_due_date(start_date)?;
        Ok(Self {
            id: 0,
            user: user.to_string(),
            order_ref: order_ref.to_string(),
            total_amount: terms.total_amount,
            down_payment: terms.down_payment,
            processing_fee: terms.processing_fee,
            billing_cycle_days: terms.billing_cycle_days,
            total_installments: terms.total_installments,
            installment_amount: terms.installment_amount(),
            paid_installments: 0,
            next_due_date: Some(shift_forward(start_date, 1, terms.billing_cycle_days)),
            status: PlanStatus::Ongoing,
            penalty: Decimal::ZERO,
            penalty_cycles: 0,
            start_date,
            created_at,
            items,
        })
    }

    pub fn financed_amount(&self) -> Decimal {
        self.total_amount - self.down_payment + self.processing_fee
    }

    /// Amount of installment `no` (1-based); the final one absorbs rounding.
    pub fn installment_amount_for(&self, no: u32) -> Decimal {
        if no == self.total_installments {
            self.financed_amount()
                - self.installment_amount * Decimal::from(self.total_installments - 1)
        } else {
            self.installment_amount
        }
    }

    pub fn due_date_for(&self, no: u32) -> NaiveDate {
        shift_forward(self.start_date, no, self.billing_cycle_days)
    }

    pub fn remaining_installments(&self) -> u32 {
        self.total_installments.saturating_sub(self.paid_installments)
    }

    pub fn amount_paid(&self) -> Decimal {
        if self.paid_installments >= self.total_installments {
            self.financed_amount()
        } else {
            self.installment_amount * Decimal::from(self.paid_installments)
        }
    }

    pub fn outstanding(&self) -> Decimal {
        self.financed_amount() - self.amount_paid()
    }

    /// First date a payment for the next installment is accepted.
    pub fn window_opens(&self) -> Option<NaiveDate> {
        self.next_due_date
            .map(|due| shift_back(due, 1, self.billing_cycle_days))
    }

    /// Billing cycles elapsed past `next_due_date` without payment.
    pub fn missed_cycles(&self, as_of: NaiveDate) -> u32 {
        let Some(due) = self.next_due_date else {
            return 0;
        };
        let late = (as_of - due).num_days();
        if late <= 0 {
            return 0;
        }
        let cycle = i64::from(self.billing_cycle_days.max(1));
        u32::try_from(1 + (late - 1) / cycle).unwrap_or(u32::MAX)
    }

    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        self.status == PlanStatus::Ongoing && self.missed_cycles(as_of) > 0
    }

    /// True when paying the next installment on `as_of` leaves nothing overdue.
    fn catches_up(&self, as_of: NaiveDate) -> bool {
        self.paid_installments + 1 >= self.total_installments || self.missed_cycles(as_of) <= 1
    }

    /// Amount the next payment must match, using the penalty as currently accrued.
    pub fn amount_due(&self, as_of: NaiveDate) -> Decimal {
        if self.status != PlanStatus::Ongoing {
            return Decimal::ZERO;
        }
        let installment = self.installment_amount_for(self.paid_installments + 1);
        if self.catches_up(as_of) {
            installment + self.penalty
        } else {
            installment
        }
    }

    /// Charges one flat fee per newly missed cycle and applies the default
    /// threshold. Calling it twice for the same date charges nothing more.
    pub fn accrue_penalty(&mut self, as_of: NaiveDate, policy: &PenaltyPolicy) -> Accrual {
        let mut out = Accrual::default();
        if self.status != PlanStatus::Ongoing {
            return out;
        }
        let missed = self.missed_cycles(as_of);
        if missed > self.penalty_cycles {
            let fresh = missed - self.penalty_cycles;
            let charge = policy.fee_per_cycle * Decimal::from(fresh);
            self.penalty += charge;
            self.penalty_cycles = missed;
            out.charged_cycles = fresh;
            out.charged = charge;
        }
        if policy.default_after_cycles > 0 && missed >= policy.default_after_cycles {
            self.status = PlanStatus::Defaulted;
            out.defaulted = true;
        }
        out
    }

    /// Applies a tendered amount dated `date`. Terminal plans are an error;
    /// anything else that cannot advance the schedule comes back as a rejection
    /// so the caller can record it as a failed payment.
    pub fn apply_payment(
        &mut self,
        amount: Decimal,
        date: NaiveDate,
        policy: &PenaltyPolicy,
    ) -> Result<PaymentDecision, EmiError> {
        if self.status.is_terminal() {
            return Err(EmiError::PlanClosed {
                id: self.id,
                status: self.status,
            });
        }
        if amount <= Decimal::ZERO {
            return Err(EmiError::InvalidAmount(amount));
        }

        self.accrue_penalty(date, policy);
        if self.status == PlanStatus::Defaulted {
            return Ok(PaymentDecision::Rejected(Rejection::Defaulted));
        }

        let Some(due) = self.next_due_date else {
            return Err(EmiError::PlanClosed {
                id: self.id,
                status: self.status,
            });
        };
        let opens = shift_back(due, 1, self.billing_cycle_days);
        if date < opens {
            return Ok(PaymentDecision::Rejected(Rejection::BeforeWindow { opens }));
        }

        let catch_up = self.catches_up(date);
        let installment_no = self.paid_installments + 1;
        let installment_portion = self.installment_amount_for(installment_no);
        let penalty_portion = if catch_up { self.penalty } else { Decimal::ZERO };
        let expected = installment_portion + penalty_portion;
        if amount != expected {
            return Ok(PaymentDecision::Rejected(Rejection::AmountMismatch {
                expected,
                tendered: amount,
            }));
        }

        self.paid_installments = installment_no;
        let completed = installment_no == self.total_installments;
        if completed {
            self.status = PlanStatus::Completed;
            self.next_due_date = None;
            self.penalty = Decimal::ZERO;
            self.penalty_cycles = 0;
        } else {
            self.next_due_date = Some(shift_forward(due, 1, self.billing_cycle_days));
            if catch_up {
                self.penalty = Decimal::ZERO;
                self.penalty_cycles = 0;
            } else {
                self.penalty_cycles = self.penalty_cycles.saturating_sub(1);
            }
        }

        Ok(PaymentDecision::Accepted(AppliedPayment {
            installment_no,
            installment_portion,
            penalty_portion,
            completed,
        }))
    }

    pub fn schedule(&self, as_of: NaiveDate) -> Vec<ScheduleRow> {
        (1..=self.total_installments)
            .map(|no| {
                let due_date = self.due_date_for(no);
                let state = if no <= self.paid_installments {
                    InstallmentState::Paid
                } else if due_date < as_of {
                    InstallmentState::Overdue
                } else if no == self.paid_installments + 1 {
                    InstallmentState::Due
                } else {
                    InstallmentState::Upcoming
                };
                ScheduleRow {
                    installment_no: no,
                    due_date,
                    amount: self.installment_amount_for(no),
                    state,
                }
            })
            .collect()
    }
}

/// Checks a plan and its payment history against the lifecycle invariants.
pub fn check_invariants(plan: &InstallmentPlan, payments: &[PaymentRecord]) -> Vec<Violation> {
    let mut out = Vec::new();
    let mut flag = |rule: &'static str, detail: String| {
        out.push(Violation {
            plan_id: plan.id,
            rule,
            detail,
        })
    };

    let financed = plan.financed_amount();
    if plan.paid_installments > plan.total_installments {
        flag(
            "paid_within_total",
            format!("{} of {}", plan.paid_installments, plan.total_installments),
        );
    }
    if plan.next_due_date.is_none() != (plan.status == PlanStatus::Completed) {
        flag(
            "due_date_iff_open",
            format!("status {} with next due {:?}", plan.status, plan.next_due_date),
        );
    }
    if (plan.status == PlanStatus::Completed) != (plan.paid_installments == plan.total_installments)
    {
        flag(
            "completed_iff_fully_paid",
            format!(
                "status {} with {} of {} paid",
                plan.status, plan.paid_installments, plan.total_installments
            ),
        );
    }
    if plan.penalty < Decimal::ZERO {
        flag("penalty_non_negative", plan.penalty.to_string());
    }
    if plan.installment_amount * Decimal::from(plan.paid_installments) > financed {
        flag(
            "paid_within_financed",
            format!(
                "{} x {} exceeds {}",
                plan.paid_installments, plan.installment_amount, financed
            ),
        );
    }

    let paid: Vec<&PaymentRecord> = payments
        .iter()
        .filter(|p| p.plan_id == plan.id && p.status == PaymentStatus::Paid)
        .collect();
    let paid_sum: Decimal = paid.iter().map(|p| p.amount).sum();
    if paid_sum + plan.outstanding() != financed {
        flag(
            "ledger_balances",
            format!(
                "paid {} + outstanding {} != financed {}",
                paid_sum,
                plan.outstanding(),
                financed
            ),
        );
    }
    if paid.len() != plan.paid_installments as usize {
        flag(
            "paid_records_match_count",
            format!(
                "{} paid records for {} paid installments",
                paid.len(),
                plan.paid_installments
            ),
        );
    }
    out
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use emiclip::emi::{
    InstallmentState, PaymentDecision, PenaltyPolicy, PlanTerms, Rejection, check_invariants,
};
use emiclip::error::EmiError;
use emiclip::models::{
    InstallmentPlan, PaymentRecord, PaymentSource, PaymentStatus, PlanStatus,
};
use rust_decimal::Decimal;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

fn terms(total: &str, down: &str, fee: &str, n: u32) -> PlanTerms {
    PlanTerms {
        total_amount: dec(total),
        down_payment: dec(down),
        processing_fee: dec(fee),
        billing_cycle_days: 30,
        total_installments: n,
    }
}

/// 45000 - 5000 + 2000 = 42000 over 12 installments of 3500, starting 2025-01-01.
fn twelve_month_plan() -> InstallmentPlan {
    let created = d(2025, 1, 1).and_hms_opt(10, 0, 0).unwrap();
    let mut plan = InstallmentPlan::open(
        "u1",
        "ORD-1",
        &terms("45000", "5000", "2000", 12),
        d(2025, 1, 1),
        created,
        Vec::new(),
    )
    .unwrap();
    plan.id = 1;
    plan
}

fn policy() -> PenaltyPolicy {
    PenaltyPolicy {
        fee_per_cycle: dec("500"),
        default_after_cycles: 3,
    }
}

fn pay(plan: &mut InstallmentPlan, amount: &str, date: NaiveDate) -> PaymentDecision {
    plan.apply_payment(dec(amount), date, &policy()).unwrap()
}

#[test]
fn installment_amount_rounds_down_and_final_absorbs_remainder() {
    let t = terms("1000", "0", "0", 3);
    assert_eq!(t.installment_amount(), dec("333.33"));

    let plan = InstallmentPlan::open(
        "u1",
        "ORD-R",
        &t,
        d(2025, 1, 1),
        d(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
        Vec::new(),
    )
    .unwrap();
    assert_eq!(plan.installment_amount_for(1), dec("333.33"));
    assert_eq!(plan.installment_amount_for(3), dec("333.34"));
    let total: Decimal = (1..=3).map(|n| plan.installment_amount_for(n)).sum();
    assert_eq!(total, dec("1000"));
}

#[test]
fn terms_reject_nothing_to_finance() {
    let err = terms("1000", "1000", "0", 3).validate().unwrap_err();
    assert!(matches!(err, EmiError::InvalidTerms(_)));
    let err = terms("1000", "0", "0", 0).validate().unwrap_err();
    assert!(matches!(err, EmiError::InvalidTerms(_)));
}

#[test]
fn terms_bound_cycle_length_and_installment_count() {
    let mut long_cycle = terms("1000", "0", "0", 1);
    long_cycle.billing_cycle_days = 4_000_000_000;
    let err = InstallmentPlan::open(
        "u1",
        "ORD-L",
        &long_cycle,
        d(2025, 1, 1),
        d(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
        Vec::new(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("billing cycle must be 1 to 366 days"));

    let mut many = terms("1000000", "0", "0", 50_000);
    many.billing_cycle_days = 100_000;
    assert!(matches!(many.validate(), Err(EmiError::InvalidTerms(_))));

    let mut widest = terms("1000000", "0", "0", emiclip::emi::MAX_INSTALLMENTS);
    widest.billing_cycle_days = emiclip::emi::MAX_CYCLE_DAYS;
    assert!(widest.final_due_date(d(2025, 1, 1)).is_ok());
    assert!(widest.final_due_date(NaiveDate::MAX).is_err());
}

#[test]
fn schedule_of_oversized_stored_plan_does_not_overflow() {
    let mut plan = twelve_month_plan();
    plan.total_installments = 50_000;
    plan.billing_cycle_days = 100_000;
    assert_eq!(plan.due_date_for(50_000), NaiveDate::MAX);
    assert_eq!(plan.due_date_for(0), d(2025, 1, 1));
}

#[test]
fn new_plan_first_due_one_cycle_after_start() {
    let plan = twelve_month_plan();
    assert_eq!(plan.financed_amount(), dec("42000"));
    assert_eq!(plan.installment_amount, dec("3500"));
    assert_eq!(plan.next_due_date, Some(d(2025, 1, 31)));
    assert_eq!(plan.window_opens(), Some(d(2025, 1, 1)));
    assert_eq!(plan.status, PlanStatus::Ongoing);
}

#[test]
fn four_payments_leave_eight_installments_outstanding() {
    let mut plan = twelve_month_plan();
    for date in [d(2025, 1, 31), d(2025, 3, 2), d(2025, 4, 1), d(2025, 5, 1)] {
        let before = plan.next_due_date.unwrap();
        assert!(matches!(
            pay(&mut plan, "3500", date),
            PaymentDecision::Accepted(_)
        ));
        assert_eq!(plan.next_due_date, Some(before + chrono::Duration::days(30)));
    }
    assert_eq!(plan.paid_installments, 4);
    assert_eq!(plan.outstanding(), dec("28000"));
    assert_eq!(plan.next_due_date, Some(d(2025, 5, 31)));
    assert!(plan.installment_amount * Decimal::from(plan.paid_installments) <= plan.financed_amount());
}

#[test]
fn final_payment_completes_plan() {
    let mut plan = InstallmentPlan::open(
        "u1",
        "ORD-2",
        &terms("1000", "0", "0", 2),
        d(2025, 1, 1),
        d(2025, 1, 1).and_hms_opt(0, 0, 0).unwrap(),
        Vec::new(),
    )
    .unwrap();
    pay(&mut plan, "500", d(2025, 1, 31));
    match pay(&mut plan, "500", d(2025, 3, 2)) {
        PaymentDecision::Accepted(applied) => {
            assert!(applied.completed);
            assert_eq!(applied.installment_no, 2);
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(plan.status, PlanStatus::Completed);
    assert_eq!(plan.next_due_date, None);
    assert!(plan.outstanding().is_zero());

    let err = plan
        .apply_payment(dec("500"), d(2025, 4, 1), &policy())
        .unwrap_err();
    assert!(matches!(err, EmiError::PlanClosed { .. }));
}

#[test]
fn wrong_amount_is_rejected_without_advancing() {
    let mut plan = twelve_month_plan();
    match pay(&mut plan, "3000", d(2025, 1, 31)) {
        PaymentDecision::Rejected(Rejection::AmountMismatch { expected, tendered }) => {
            assert_eq!(expected, dec("3500"));
            assert_eq!(tendered, dec("3000"));
        }
        other => panic!("expected mismatch, got {:?}", other),
    }
    assert_eq!(plan.paid_installments, 0);
    assert_eq!(plan.next_due_date, Some(d(2025, 1, 31)));
}

#[test]
fn payment_before_window_is_rejected() {
    let mut plan = twelve_month_plan();
    assert_eq!(
        pay(&mut plan, "3500", d(2024, 12, 31)),
        PaymentDecision::Rejected(Rejection::BeforeWindow {
            opens: d(2025, 1, 1)
        })
    );
    pay(&mut plan, "3500", d(2025, 1, 31));
    assert_eq!(
        pay(&mut plan, "3500", d(2025, 1, 20)),
        PaymentDecision::Rejected(Rejection::BeforeWindow {
            opens: d(2025, 1, 31)
        })
    );
    assert_eq!(plan.paid_installments, 1);
}

#[test]
fn non_positive_amount_is_an_error() {
    let mut plan = twelve_month_plan();
    let err = plan
        .apply_payment(Decimal::ZERO, d(2025, 1, 31), &policy())
        .unwrap_err();
    assert_eq!(err, EmiError::InvalidAmount(Decimal::ZERO));
}

#[test]
fn penalty_accrues_once_per_missed_cycle() {
    let mut plan = twelve_month_plan();
    assert_eq!(plan.missed_cycles(d(2025, 1, 31)), 0);
    assert!(plan.accrue_penalty(d(2025, 1, 31), &policy()).is_noop());

    let first = plan.accrue_penalty(d(2025, 2, 10), &policy());
    assert_eq!(first.charged_cycles, 1);
    assert_eq!(plan.penalty, dec("500"));

    // same date again charges nothing
    assert!(plan.accrue_penalty(d(2025, 2, 10), &policy()).is_noop());
    assert_eq!(plan.penalty, dec("500"));

    let mut last = plan.penalty;
    for day in [d(2025, 2, 20), d(2025, 3, 1), d(2025, 3, 5), d(2025, 3, 20)] {
        plan.accrue_penalty(day, &policy());
        assert!(plan.penalty >= last);
        last = plan.penalty;
    }
    assert_eq!(plan.missed_cycles(d(2025, 3, 20)), 2);
    assert_eq!(plan.penalty, dec("1000"));
    assert_eq!(plan.status, PlanStatus::Ongoing);
}

#[test]
fn penalty_carries_until_plan_catches_up() {
    let mut plan = twelve_month_plan();
    // two cycles behind on 2025-03-05
    plan.accrue_penalty(d(2025, 3, 5), &policy());
    assert_eq!(plan.penalty, dec("1000"));
    assert_eq!(plan.amount_due(d(2025, 3, 5)), dec("3500"));

    match pay(&mut plan, "3500", d(2025, 3, 5)) {
        PaymentDecision::Accepted(applied) => assert!(applied.penalty_portion.is_zero()),
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert_eq!(plan.penalty, dec("1000"));
    assert_eq!(plan.next_due_date, Some(d(2025, 3, 2)));

    // still one cycle late: the next payment must clear the penalty too
    assert_eq!(plan.amount_due(d(2025, 3, 5)), dec("4500"));
    assert!(matches!(
        pay(&mut plan, "3500", d(2025, 3, 5)),
        PaymentDecision::Rejected(Rejection::AmountMismatch { .. })
    ));
    match pay(&mut plan, "4500", d(2025, 3, 5)) {
        PaymentDecision::Accepted(applied) => {
            assert_eq!(applied.installment_portion, dec("3500"));
            assert_eq!(applied.penalty_portion, dec("1000"));
        }
        other => panic!("expected acceptance, got {:?}", other),
    }
    assert!(plan.penalty.is_zero());
    assert_eq!(plan.penalty_cycles, 0);
    assert_eq!(plan.next_due_date, Some(d(2025, 4, 1)));

    // no double charge for cycles already paid for
    assert!(plan.accrue_penalty(d(2025, 3, 20), &policy()).is_noop());
}

#[test]
fn missed_cycles_past_threshold_default_the_plan() {
    let mut plan = twelve_month_plan();
    // 61 days past 2025-01-31
    assert_eq!(
        pay(&mut plan, "3500", d(2025, 4, 2)),
        PaymentDecision::Rejected(Rejection::Defaulted)
    );
    assert_eq!(plan.status, PlanStatus::Defaulted);
    assert_eq!(plan.penalty, dec("1500"));
    assert!(plan.next_due_date.is_some());

    let err = plan
        .apply_payment(dec("3500"), d(2025, 4, 2), &policy())
        .unwrap_err();
    assert!(matches!(
        err,
        EmiError::PlanClosed {
            status: PlanStatus::Defaulted,
            ..
        }
    ));
    // terminal plans no longer accrue
    assert!(plan.accrue_penalty(d(2025, 6, 1), &policy()).is_noop());
}

#[test]
fn zero_threshold_never_defaults() {
    let mut plan = twelve_month_plan();
    let lenient = PenaltyPolicy {
        fee_per_cycle: dec("100"),
        default_after_cycles: 0,
    };
    plan.accrue_penalty(d(2025, 12, 31), &lenient);
    assert_eq!(plan.status, PlanStatus::Ongoing);
    assert_eq!(plan.penalty, dec("1200"));
}

#[test]
fn schedule_marks_each_installment_state() {
    let mut plan = twelve_month_plan();
    pay(&mut plan, "3500", d(2025, 1, 31));

    let rows = plan.schedule(d(2025, 2, 1));
    assert_eq!(rows.len(), 12);
    assert_eq!(rows[0].state, InstallmentState::Paid);
    assert_eq!(rows[1].state, InstallmentState::Due);
    assert_eq!(rows[1].due_date, d(2025, 3, 2));
    assert_eq!(rows[2].state, InstallmentState::Upcoming);
    assert_eq!(rows[11].amount, dec("3500"));

    let late = plan.schedule(d(2025, 3, 10));
    assert_eq!(late[1].state, InstallmentState::Overdue);
    assert_eq!(late[2].state, InstallmentState::Upcoming);
}

fn paid_record(plan_id: i64, n: u32, amount: &str) -> PaymentRecord {
    PaymentRecord {
        id: i64::from(n),
        plan_id,
        txn_ref: format!("TXN-{}", n),
        date: d(2025, 1, 31),
        amount: dec(amount),
        penalty_paid: Decimal::ZERO,
        status: PaymentStatus::Paid,
        source: PaymentSource::Wallet,
        installment_no: Some(n),
        remark: None,
    }
}

#[test]
fn invariants_hold_for_consistent_history() {
    let mut plan = twelve_month_plan();
    pay(&mut plan, "3500", d(2025, 1, 31));
    let mut failed = paid_record(1, 9, "100");
    failed.status = PaymentStatus::Failed;
    let history = vec![paid_record(1, 1, "3500"), failed];
    assert!(check_invariants(&plan, &history).is_empty());
}

#[test]
fn invariants_flag_tampered_plan() {
    let mut plan = twelve_month_plan();
    plan.paid_installments = 2;
    plan.next_due_date = None;
    let history = vec![paid_record(1, 1, "3500")];
    let rules: Vec<&str> = check_invariants(&plan, &history)
        .iter()
        .map(|v| v.rule)
        .collect();
    assert!(rules.contains(&"due_date_iff_open"));
    assert!(rules.contains(&"ledger_balances"));
    assert!(rules.contains(&"paid_records_match_count"));
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::emi::{PaymentDecision, PenaltyPolicy, Rejection};
use crate::error::EmiError;
use crate::models::{
    BalanceKind, InstallmentPlan, PaymentRecord, PaymentSource, PaymentStatus, PlanStatus, Wallet,
};
use crate::store;
use crate::utils::{
    date_or_today, get_currency, is_valid_txn_ref, maybe_print_json, parse_decimal,
    penalty_policy, pretty_table,
};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("post", sub)) => post(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("settle", sub)) => settle(conn, sub)?,
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PaymentRequest {
    pub plan_id: i64,
    pub amount: Decimal,
    pub date: NaiveDate,
    pub txn_ref: Option<String>,
    pub source: PaymentSource,
    pub pending: bool,
    pub remark: Option<String>,
}

fn post(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let plan_id = sub
        .get_one::<String>("plan")
        .unwrap()
        .trim()
        .parse::<i64>()
        .context("Invalid plan id")?;
    let req = PaymentRequest {
        plan_id,
        amount: parse_decimal(sub.get_one::<String>("amount").unwrap())?,
        date: date_or_today(sub.get_one::<String>("date"))?,
        txn_ref: sub.get_one::<String>("ref").map(|s| s.trim().to_string()),
        source: sub
            .get_one::<String>("source")
            .map(|s| s.parse::<PaymentSource>())
            .transpose()?
            .unwrap_or(PaymentSource::Wallet),
        pending: sub.get_flag("pending"),
        remark: sub
            .get_one::<String>("remark")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };
    let rec = post_payment(conn, &req)?;
    let ccy = get_currency(conn)?;
    match rec.status {
        PaymentStatus::Paid => println!(
            "Payment {} applied to plan {}: installment #{} ({} {:.2}, penalty {:.2})",
            rec.txn_ref,
            rec.plan_id,
            rec.installment_no.unwrap_or_default(),
            ccy,
            rec.amount,
            rec.penalty_paid
        ),
        PaymentStatus::Pending => println!(
            "Payment {} recorded as pending for plan {} ({} {:.2})",
            rec.txn_ref, rec.plan_id, ccy, rec.amount
        ),
        PaymentStatus::Failed => println!(
            "Payment {} failed for plan {}: {}",
            rec.txn_ref,
            rec.plan_id,
            rec.remark.as_deref().unwrap_or("rejected")
        ),
    }
    Ok(())
}

/// Records one payment against a plan in a single transaction.
pub fn post_payment(conn: &mut Connection, req: &PaymentRequest) -> Result<PaymentRecord> {
    let tx = conn.transaction()?;
    let rec = post_payment_in(&tx, req)?;
    tx.commit()?;
    Ok(rec)
}

/// Same as [`post_payment`] but runs on a caller-owned transaction.
pub fn post_payment_in(conn: &Connection, req: &PaymentRequest) -> Result<PaymentRecord> {
    let policy = penalty_policy(conn)?;
    let mut plan = store::load_plan(conn, req.plan_id)?;
    if plan.status.is_terminal() {
        return Err(EmiError::PlanClosed {
            id: plan.id,
            status: plan.status,
        }
        .into());
    }
    if req.pending && req.source == PaymentSource::Wallet {
        return Err(anyhow!("Wallet payments settle immediately; use --source external"));
    }
    let mut record = new_record(conn, &plan, req)?;
    if !req.pending {
        apply_to_plan(conn, &mut plan, &mut record, &policy)?;
    }
    insert_record(conn, record)
}

/// Records a payment the gateway already reported as failed. The plan is
/// left untouched.
pub fn record_failed_in(
    conn: &Connection,
    req: &PaymentRequest,
    reason: &str,
) -> Result<PaymentRecord> {
    let plan = store::load_plan(conn, req.plan_id)?;
    let mut record = new_record(conn, &plan, req)?;
    record.status = PaymentStatus::Failed;
    record.remark = with_reason(record.remark.take(), reason);
    insert_record(conn, record)
}

/// Checks amount and reference and builds a `pending` record for `plan`.
fn new_record(
    conn: &Connection,
    plan: &InstallmentPlan,
    req: &PaymentRequest,
) -> Result<PaymentRecord> {
    if req.amount <= Decimal::ZERO {
        return Err(EmiError::InvalidAmount(req.amount).into());
    }
    let txn_ref = match req.txn_ref.as_deref() {
        Some(r) if !r.is_empty() => {
            if !is_valid_txn_ref(r) {
                return Err(EmiError::InvalidReference(r.to_string()).into());
            }
            r.to_string()
        }
        _ => generate_ref(conn, plan, req.date)?,
    };
    if store::txn_ref_exists(conn, &txn_ref)? {
        return Err(EmiError::DuplicateReference(txn_ref).into());
    }
    Ok(PaymentRecord {
        id: 0,
        plan_id: plan.id,
        txn_ref,
        date: req.date,
        amount: req.amount,
        penalty_paid: Decimal::ZERO,
        status: PaymentStatus::Pending,
        source: req.source,
        installment_no: None,
        remark: req.remark.clone(),
    })
}

fn insert_record(conn: &Connection, mut record: PaymentRecord) -> Result<PaymentRecord> {
    record.id = store::insert_payment(conn, &record)?;
    info!(
        plan_id = record.plan_id,
        txn_ref = record.txn_ref.as_str(),
        status = record.status.as_str(),
        amount = %record.amount,
        "payment recorded"
    );
    Ok(record)
}

fn generate_ref(conn: &Connection, plan: &InstallmentPlan, date: NaiveDate) -> Result<String> {
    let seq = store::count_payments(conn, plan.id)? + 1;
    Ok(format!("EMI{}-{}-{}", plan.id, date.format("%Y%m%d"), seq))
}

fn with_reason(remark: Option<String>, reason: &str) -> Option<String> {
    match remark {
        Some(r) => Some(format!("{} | {}", reason, r)),
        None => Some(reason.to_string()),
    }
}

/// Runs the payment algorithm for `record` against `plan`, debiting the
/// wallet for wallet-sourced payments. Persists the plan and wallet; the
/// caller persists the record.
fn apply_to_plan(
    conn: &Connection,
    plan: &mut InstallmentPlan,
    record: &mut PaymentRecord,
    policy: &PenaltyPolicy,
) -> Result<()> {
    let accrual = plan.accrue_penalty(record.date, policy);
    if !accrual.is_noop() {
        debug!(
            plan_id = plan.id,
            cycles = accrual.charged_cycles,
            charged = %accrual.charged,
            "penalty accrued before payment"
        );
    }
    if plan.status == PlanStatus::Defaulted {
        warn!(plan_id = plan.id, "plan defaulted; payment rejected");
        record.status = PaymentStatus::Failed;
        record.remark = with_reason(record.remark.take(), &Rejection::Defaulted.to_string());
        store::save_plan_state(conn, plan)?;
        return Ok(());
    }

    let mut working = plan.clone();
    match working.apply_payment(record.amount, record.date, policy)? {
        PaymentDecision::Accepted(applied) => {
            if record.source == PaymentSource::Wallet {
                let mut wallet = store::find_wallet(conn, &plan.user)?
                    .unwrap_or_else(|| Wallet::new(&plan.user));
                match wallet.debit(record.amount) {
                    Ok(split) => {
                        store::save_wallet(conn, &wallet)?;
                        let note = format!("EMI plan {} #{}", plan.id, applied.installment_no);
                        store::record_wallet_entry(
                            conn,
                            &plan.user,
                            BalanceKind::Purchase,
                            -split.from_purchase,
                            Some(&note),
                        )?;
                        store::record_wallet_entry(
                            conn,
                            &plan.user,
                            BalanceKind::Withdrawable,
                            -split.from_withdrawable,
                            Some(&note),
                        )?;
                    }
                    Err(EmiError::InsufficientFunds { needed, available }) => {
                        warn!(plan_id = plan.id, %needed, %available, "wallet short");
                        record.status = PaymentStatus::Failed;
                        record.remark =
                            with_reason(record.remark.take(), "insufficient wallet balance");
                        store::save_plan_state(conn, plan)?;
                        return Ok(());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            *plan = working;
            record.status = PaymentStatus::Paid;
            record.amount = applied.installment_portion;
            record.penalty_paid = applied.penalty_portion;
            record.installment_no = Some(applied.installment_no);
            if applied.completed {
                info!(plan_id = plan.id, "plan completed");
            }
        }
        PaymentDecision::Rejected(reason) => {
            *plan = working;
            debug!(plan_id = plan.id, reason = %reason, "payment rejected");
            record.status = PaymentStatus::Failed;
            record.remark = with_reason(record.remark.take(), &reason.to_string());
        }
    }
    store::save_plan_state(conn, plan)?;
    Ok(())
}

/// Resolves a pending payment to `paid` (running the payment algorithm with
/// its recorded date and amount) or `failed`.
pub fn settle_payment(
    conn: &mut Connection,
    txn_ref: &str,
    outcome: PaymentStatus,
    remark: Option<&str>,
) -> Result<PaymentRecord> {
    let tx = conn.transaction()?;
    let mut rec = store::find_payment_by_ref(&tx, txn_ref)?
        .with_context(|| format!("Payment '{}' not found", txn_ref))?;
    if rec.status != PaymentStatus::Pending {
        return Err(EmiError::NotPending(txn_ref.to_string()).into());
    }
    if let Some(r) = remark {
        rec.remark = with_reason(rec.remark.take(), r);
    }
    match outcome {
        PaymentStatus::Failed => rec.status = PaymentStatus::Failed,
        PaymentStatus::Paid => {
            let policy = penalty_policy(&tx)?;
            let mut plan = store::load_plan(&tx, rec.plan_id)?;
            if plan.status.is_terminal() {
                rec.status = PaymentStatus::Failed;
                rec.remark = with_reason(rec.remark.take(), &format!("plan is {}", plan.status));
            } else {
                apply_to_plan(&tx, &mut plan, &mut rec, &policy)?;
            }
        }
        PaymentStatus::Pending => return Err(anyhow!("Settle outcome must be paid or failed")),
    }
    store::update_payment(&tx, &rec)?;
    tx.commit()?;
    info!(
        txn_ref = rec.txn_ref.as_str(),
        status = rec.status.as_str(),
        "pending payment settled"
    );
    Ok(rec)
}

fn settle(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let txn_ref = sub.get_one::<String>("ref").unwrap().trim().to_string();
    let outcome = sub.get_one::<String>("outcome").unwrap().parse::<PaymentStatus>()?;
    let remark = sub.get_one::<String>("remark").map(|s| s.trim());
    let rec = settle_payment(conn, &txn_ref, outcome, remark)?;
    println!("Payment {} settled as {}", rec.txn_ref, rec.status);
    Ok(())
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let plan_id = sub
        .get_one::<String>("plan")
        .map(|s| s.trim().parse::<i64>())
        .transpose()
        .context("Invalid plan id")?;
    let status = sub
        .get_one::<String>("status")
        .map(|s| s.parse::<PaymentStatus>())
        .transpose()?;
    let data = store::list_payments(conn, plan_id, status)?;
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows = data
            .iter()
            .map(|p| {
                vec![
                    p.txn_ref.clone(),
                    p.plan_id.to_string(),
                    p.date.to_string(),
                    format!("{:.2}", p.amount),
                    format!("{:.2}", p.penalty_paid),
                    p.status.to_string(),
                    p.source.as_str().to_string(),
                    p.installment_no.map(|n| n.to_string()).unwrap_or_default(),
                    p.remark.clone().unwrap_or_default(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &[
                    "Ref", "Plan", "Date", "Amount", "Penalty", "Status", "Source", "#",
                    "Remark"
                ],
                rows
            )
        );
    }
    Ok(())
}

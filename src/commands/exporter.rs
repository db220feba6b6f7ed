// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::plans::PlanSummary;
use crate::store;
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use serde_json::json;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("plans", sub)) => export_plans(conn, sub),
        Some(("payments", sub)) => export_payments(conn, sub),
        _ => Ok(()),
    }
}

fn format_arg(sub: &clap::ArgMatches) -> Result<String> {
    let fmt = sub.get_one::<String>("format").unwrap().trim().to_lowercase();
    match fmt.as_str() {
        "csv" | "json" => Ok(fmt),
        _ => Err(anyhow!("Unknown format: {} (use csv|json)", fmt)),
    }
}

fn export_plans(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = format_arg(sub)?;
    let out = sub.get_one::<String>("out").unwrap().trim();
    let plans = store::list_plans(conn, None, None)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "id",
                "user",
                "order_ref",
                "financed",
                "installment_amount",
                "paid_installments",
                "total_installments",
                "next_due_date",
                "status",
                "penalty",
                "outstanding",
            ])?;
            for p in &plans {
                let s = PlanSummary::from(p);
                wtr.write_record([
                    s.id.to_string(),
                    s.user,
                    s.order_ref,
                    s.financed.to_string(),
                    s.installment_amount.to_string(),
                    s.paid_installments.to_string(),
                    s.total_installments.to_string(),
                    s.next_due_date.map(|d| d.to_string()).unwrap_or_default(),
                    s.status.to_string(),
                    s.penalty.to_string(),
                    s.outstanding.to_string(),
                ])?;
            }
            wtr.flush()?;
        }
        _ => {
            let items: Vec<_> = plans
                .iter()
                .map(|p| {
                    json!({
                        "id": p.id,
                        "user": p.user,
                        "orderRef": p.order_ref,
                        "totalAmount": p.total_amount,
                        "downPayment": p.down_payment,
                        "processingFee": p.processing_fee,
                        "billingCycleInDays": p.billing_cycle_days,
                        "totalInstallments": p.total_installments,
                        "installmentAmount": p.installment_amount,
                        "paidInstallments": p.paid_installments,
                        "nextDueDate": p.next_due_date,
                        "status": p.status,
                        "penalty": p.penalty,
                        "outstanding": p.outstanding(),
                        "startDate": p.start_date,
                        "items": p.items,
                    })
                })
                .collect();
            std::fs::write(out, serde_json::to_string_pretty(&items)?)?;
        }
    }
    println!("Exported {} plans to {}", plans.len(), out);
    Ok(())
}

fn export_payments(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let fmt = format_arg(sub)?;
    let out = sub.get_one::<String>("out").unwrap().trim();
    let payments = store::list_payments(conn, None, None)?;

    match fmt.as_str() {
        "csv" => {
            let mut wtr = csv::Writer::from_path(out)?;
            wtr.write_record([
                "txn_ref",
                "plan_id",
                "date",
                "amount",
                "penalty_paid",
                "status",
                "source",
                "installment_no",
                "remark",
            ])?;
            for p in &payments {
                wtr.write_record([
                    p.txn_ref.clone(),
                    p.plan_id.to_string(),
                    p.date.to_string(),
                    p.amount.to_string(),
                    p.penalty_paid.to_string(),
                    p.status.to_string(),
                    p.source.as_str().to_string(),
                    p.installment_no.map(|n| n.to_string()).unwrap_or_default(),
                    p.remark.clone().unwrap_or_default(),
                ])?;
            }
            wtr.flush()?;
        }
        _ => {
            std::fs::write(out, serde_json::to_string_pretty(&payments)?)?;
        }
    }
    println!("Exported {} payments to {}", payments.len(), out);
    Ok(())
}

// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::PlanStatus;
use crate::store;
use crate::utils::{date_or_today, maybe_print_json, penalty_policy, pretty_table};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("sweep", sub)) => {
            let as_of = date_or_today(sub.get_one::<String>("as_of"))?;
            let rows = sweep(conn, as_of)?;
            if !maybe_print_json(sub.get_flag("json"), false, &rows)? {
                if rows.is_empty() {
                    println!("No penalties accrued as of {}", as_of);
                } else {
                    let table = rows
                        .iter()
                        .map(|r| {
                            vec![
                                r.plan_id.to_string(),
                                r.user.clone(),
                                r.missed_cycles.to_string(),
                                format!("{:.2}", r.charged),
                                format!("{:.2}", r.penalty),
                                r.status.to_string(),
                            ]
                        })
                        .collect();
                    println!(
                        "{}",
                        pretty_table(
                            &["Plan", "User", "Missed", "Charged", "Penalty", "Status"],
                            table
                        )
                    );
                }
            }
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct SweepRow {
    pub plan_id: i64,
    pub user: String,
    pub missed_cycles: u32,
    pub charged: Decimal,
    pub penalty: Decimal,
    pub status: PlanStatus,
}

/// Accrues penalties on every ongoing plan as of `as_of`. Only plans whose
/// penalty or status changed are returned.
pub fn sweep(conn: &mut Connection, as_of: NaiveDate) -> Result<Vec<SweepRow>> {
    let tx = conn.transaction()?;
    let policy = penalty_policy(&tx)?;
    let mut out = Vec::new();
    for mut plan in store::list_plans(&tx, None, Some(PlanStatus::Ongoing))? {
        let accrual = plan.accrue_penalty(as_of, &policy);
        if accrual.is_noop() {
            continue;
        }
        store::save_plan_state(&tx, &plan)?;
        if accrual.defaulted {
            warn!(plan_id = plan.id, user = plan.user.as_str(), "plan defaulted");
        } else {
            info!(plan_id = plan.id, charged = %accrual.charged, "penalty accrued");
        }
        out.push(SweepRow {
            plan_id: plan.id,
            user: plan.user.clone(),
            missed_cycles: plan.missed_cycles(as_of),
            charged: accrual.charged,
            penalty: plan.penalty,
            status: plan.status,
        });
    }
    tx.commit()?;
    Ok(out)
}

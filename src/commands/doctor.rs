// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::emi::{Violation, check_invariants};
use crate::store;
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::Connection;
use rust_decimal::Decimal;

pub fn handle(conn: &Connection) -> Result<()> {
    let issues = diagnose(conn)?;
    if issues.is_empty() {
        println!("✅ doctor: no issues found");
    } else {
        let rows = issues
            .into_iter()
            .map(|v| vec![v.plan_id.to_string(), v.rule.to_string(), v.detail])
            .collect();
        println!("{}", pretty_table(&["Plan", "Issue", "Detail"], rows));
    }
    Ok(())
}

pub fn diagnose(conn: &Connection) -> Result<Vec<Violation>> {
    let mut out = Vec::new();
    for plan in store::list_plans(conn, None, None)? {
        let payments = store::list_payments(conn, Some(plan.id), None)?;
        out.extend(check_invariants(&plan, &payments));
    }

    for w in store::list_wallets(conn)? {
        if w.purchase_balance < Decimal::ZERO || w.withdrawable_balance < Decimal::ZERO {
            out.push(Violation {
                plan_id: 0,
                rule: "wallet_non_negative",
                detail: format!(
                    "{}: purchase {}, withdrawable {}",
                    w.user, w.purchase_balance, w.withdrawable_balance
                ),
            });
        }
    }
    Ok(out)
}

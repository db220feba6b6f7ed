// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::commands::payments::{PaymentRequest, post_payment_in, record_failed_in};
use crate::models::{PaymentSource, PaymentStatus};
use crate::store;
use crate::utils::{parse_date, parse_decimal};
use anyhow::{Context, Result, anyhow};
use csv::ReaderBuilder;
use rusqlite::Connection;
use serde::Serialize;
use std::collections::{HashMap, hash_map::Entry};
use tracing::debug;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("payments", sub)) => {
            let path = sub.get_one::<String>("path").unwrap().trim();
            let summary = import_payments(conn, path)?;
            println!(
                "Imported payments from {}: {} paid, {} pending, {} failed, {} duplicate",
                path, summary.paid, summary.pending, summary.failed, summary.duplicates
            );
            Ok(())
        }
        _ => Ok(()),
    }
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub paid: usize,
    pub pending: usize,
    pub failed: usize,
    pub duplicates: usize,
}

/// Gateway settlement CSV: `order_ref,date,amount,txn_ref,status,remark`.
/// Rows post in file order inside one transaction; a reference that is
/// already recorded is skipped so the same file can be imported twice.
/// Rows the gateway marked `failed` are kept as failed payments and never
/// applied to the plan.
pub fn import_payments(conn: &mut Connection, path: &str) -> Result<ImportSummary> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;

    let tx = conn.transaction()?;
    let mut plan_cache: HashMap<String, i64> = HashMap::new();
    let mut summary = ImportSummary::default();

    for (line, result) in rdr.records().enumerate() {
        let rec = result?;
        let order_ref = rec.get(0).context("order_ref missing")?.trim().to_string();
        let date_raw = rec.get(1).context("date missing")?.trim();
        let amount_raw = rec.get(2).context("amount missing")?.trim();
        let txn_ref = rec.get(3).context("txn_ref missing")?.trim().to_string();
        let status_raw = rec.get(4).unwrap_or("").trim();
        let remark = rec
            .get(5)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        if txn_ref.is_empty() {
            return Err(anyhow!("Row {}: txn_ref is required", line + 2));
        }
        let date = parse_date(date_raw)
            .with_context(|| format!("Invalid payment date '{}' for {}", date_raw, txn_ref))?;
        let amount = parse_decimal(amount_raw)
            .with_context(|| format!("Invalid amount '{}' for {}", amount_raw, txn_ref))?;
        let reported = match status_raw {
            "" => PaymentStatus::Paid,
            s => s.parse::<PaymentStatus>()?,
        };

        if store::txn_ref_exists(&tx, &txn_ref)? {
            debug!(txn_ref = txn_ref.as_str(), "duplicate reference skipped");
            summary.duplicates += 1;
            continue;
        }

        let plan_id = match plan_cache.entry(order_ref.clone()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let plan = store::find_plan_by_order(&tx, &order_ref)?
                    .with_context(|| format!("No plan for order '{}'", order_ref))?;
                *entry.insert(plan.id)
            }
        };

        let req = PaymentRequest {
            plan_id,
            amount,
            date,
            txn_ref: Some(txn_ref),
            source: PaymentSource::External,
            pending: reported == PaymentStatus::Pending,
            remark,
        };
        let posted = match reported {
            PaymentStatus::Failed => record_failed_in(&tx, &req, "failed at gateway")?,
            _ => post_payment_in(&tx, &req)?,
        };
        match posted.status {
            PaymentStatus::Paid => summary.paid += 1,
            PaymentStatus::Pending => summary.pending += 1,
            PaymentStatus::Failed => summary.failed += 1,
        }
    }
    tx.commit()?;
    Ok(summary)
}

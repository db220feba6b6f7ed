// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::remote::{ApiClient, RemotePlan};
use crate::store;
use crate::utils::{get_setting, today};
use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("plans", sub)) => {
            let user = sub.get_one::<String>("user").unwrap().trim().to_string();
            let base_url = match sub.get_one::<String>("base_url") {
                Some(u) => u.trim().to_string(),
                None => get_setting(conn, "api_base_url")?
                    .ok_or_else(|| anyhow!("No --base-url given and api_base_url is not set"))?,
            };
            let token = sub.get_one::<String>("token").map(|s| s.trim().to_string());
            let client = ApiClient::new(&base_url, token)?;
            let plans = client
                .fetch_plans(&user)
                .with_context(|| format!("Fetch plans from {}", client.url("emi/plans")))?;
            let summary = merge_remote_plans(conn, &user, plans, today())?;
            println!(
                "Synced {} plans for {}: {} new, {} updated, {} payments added, {} skipped",
                summary.new + summary.updated + summary.skipped,
                user,
                summary.new,
                summary.updated,
                summary.payments,
                summary.skipped
            );
        }
        _ => {}
    }
    Ok(())
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct SyncSummary {
    pub new: usize,
    pub updated: usize,
    pub payments: usize,
    pub skipped: usize,
}

/// Upserts server plans by order reference. Plans that break the lifecycle
/// invariants are skipped with a warning; payment history is added by
/// transaction reference.
pub fn merge_remote_plans(
    conn: &mut Connection,
    user: &str,
    plans: Vec<RemotePlan>,
    as_of: NaiveDate,
) -> Result<SyncSummary> {
    let tx = conn.transaction()?;
    let mut summary = SyncSummary::default();
    for remote in plans {
        let order_id = remote.order_id.clone();
        let (mut plan, history) = match remote.into_local(user, as_of) {
            Ok(v) => v,
            Err(e) => {
                warn!(order = order_id.as_str(), error = %e, "remote plan skipped");
                summary.skipped += 1;
                continue;
            }
        };

        match store::find_plan_by_order(&tx, &plan.order_ref)? {
            Some(existing) => {
                plan.id = existing.id;
                store::save_synced_plan(&tx, &plan)?;
                summary.updated += 1;
            }
            None => {
                plan.id = store::insert_plan(&tx, &plan)?;
                summary.new += 1;
            }
        }

        for mut p in history {
            if store::txn_ref_exists(&tx, &p.txn_ref)? {
                continue;
            }
            p.plan_id = plan.id;
            store::insert_payment(&tx, &p)?;
            summary.payments += 1;
        }
    }
    tx.commit()?;
    info!(
        user,
        new = summary.new,
        updated = summary.updated,
        skipped = summary.skipped,
        "remote plans merged"
    );
    Ok(summary)
}

// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{BalanceKind, Wallet};
use crate::store;
use crate::utils::{fmt_money, get_currency, maybe_print_json, parse_decimal, pretty_table};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use rust_decimal::Decimal;
use tracing::info;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("open", sub)) => {
            let user = user_arg(sub)?;
            if store::find_wallet(conn, &user)?.is_some() {
                println!("Wallet for '{}' already exists", user);
            } else {
                store::save_wallet(conn, &Wallet::new(&user))?;
                println!("Opened wallet for '{}'", user);
            }
        }
        Some(("credit", sub)) => {
            let user = user_arg(sub)?;
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let kind = sub
                .get_one::<String>("kind")
                .map(|s| s.parse::<BalanceKind>())
                .transpose()?
                .unwrap_or(BalanceKind::Purchase);
            let note = sub.get_one::<String>("note").map(|s| s.trim());
            let w = credit(conn, &user, kind, amount, note)?;
            println!(
                "Credited {} to {} ({}); balance {}",
                amount,
                user,
                kind.as_str(),
                fmt_money(&w.total(), &get_currency(conn)?)
            );
        }
        Some(("withdraw", sub)) => {
            let user = user_arg(sub)?;
            let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
            let w = withdraw(conn, &user, amount)?;
            println!(
                "Withdrew {} from {}; withdrawable balance {}",
                amount,
                user,
                fmt_money(&w.withdrawable_balance, &get_currency(conn)?)
            );
        }
        Some(("show", sub)) => {
            let user = user_arg(sub)?;
            let w = store::load_wallet(conn, &user)?;
            if !maybe_print_json(sub.get_flag("json"), false, &w)? {
                println!(
                    "{}",
                    pretty_table(
                        &["User", "Purchase", "Withdrawable", "Total"],
                        vec![vec![
                            w.user.clone(),
                            format!("{:.2}", w.purchase_balance),
                            format!("{:.2}", w.withdrawable_balance),
                            format!("{:.2}", w.total()),
                        ]],
                    )
                );
            }
        }
        Some(("ledger", sub)) => {
            let user = user_arg(sub)?;
            let entries = store::list_wallet_entries(conn, &user)?;
            if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &entries)? {
                let rows = entries
                    .into_iter()
                    .map(|e| vec![e.created_at, e.kind, e.amount, e.note])
                    .collect();
                println!(
                    "{}",
                    pretty_table(&["When", "Balance", "Amount", "Note"], rows)
                );
            }
        }
        _ => {}
    }
    Ok(())
}

fn user_arg(sub: &clap::ArgMatches) -> Result<String> {
    let user = sub.get_one::<String>("user").unwrap().trim().to_string();
    if user.is_empty() {
        return Err(anyhow!("User is required"));
    }
    Ok(user)
}

pub fn credit(
    conn: &mut Connection,
    user: &str,
    kind: BalanceKind,
    amount: Decimal,
    note: Option<&str>,
) -> Result<Wallet> {
    let tx = conn.transaction()?;
    let mut w = store::find_wallet(&tx, user)?.unwrap_or_else(|| Wallet::new(user));
    w.credit(kind, amount)?;
    store::save_wallet(&tx, &w)?;
    store::record_wallet_entry(&tx, user, kind, amount, note.or(Some("credit")))?;
    tx.commit()?;
    info!(user, kind = kind.as_str(), %amount, "wallet credited");
    Ok(w)
}

pub fn withdraw(conn: &mut Connection, user: &str, amount: Decimal) -> Result<Wallet> {
    let tx = conn.transaction()?;
    let mut w = store::load_wallet(&tx, user)?;
    w.withdraw(amount)?;
    store::save_wallet(&tx, &w)?;
    store::record_wallet_entry(&tx, user, BalanceKind::Withdrawable, -amount, Some("withdrawal"))?;
    tx.commit()?;
    info!(user, %amount, "wallet withdrawal");
    Ok(w)
}

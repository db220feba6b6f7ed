// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::utils::{
    DEFAULT_CURRENCY, get_setting, parse_decimal, penalty_policy, pretty_table, set_setting,
};
use anyhow::{Context, Result, anyhow};
use rusqlite::Connection;
use rust_decimal::Decimal;

pub const KEYS: [&str; 4] = [
    "currency",
    "penalty_fee",
    "default_after_cycles",
    "api_base_url",
];

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("show", _)) => show(conn)?,
        Some(("set", sub)) => {
            let key = sub.get_one::<String>("key").unwrap().trim();
            let value = sub.get_one::<String>("value").unwrap().trim();
            let stored = set(conn, key, value)?;
            println!("{} = {}", key, stored);
        }
        _ => {}
    }
    Ok(())
}

/// Validates and stores one setting, returning the normalized value.
pub fn set(conn: &Connection, key: &str, value: &str) -> Result<String> {
    let normalized = match key {
        "currency" => {
            if value.len() != 3 || !value.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(anyhow!("Currency must be a 3-letter code, got '{}'", value));
            }
            value.to_uppercase()
        }
        "penalty_fee" => {
            let fee = parse_decimal(value)?;
            if fee < Decimal::ZERO {
                return Err(anyhow!("penalty_fee cannot be negative"));
            }
            fee.to_string()
        }
        "default_after_cycles" => value
            .parse::<u32>()
            .with_context(|| format!("Invalid cycle count '{}'", value))?
            .to_string(),
        "api_base_url" => {
            if !(value.starts_with("http://") || value.starts_with("https://")) {
                return Err(anyhow!("api_base_url must start with http:// or https://"));
            }
            value.trim_end_matches('/').to_string()
        }
        _ => {
            return Err(anyhow!(
                "Unknown setting '{}' (known: {})",
                key,
                KEYS.join(", ")
            ));
        }
    };
    set_setting(conn, key, &normalized)?;
    Ok(normalized)
}

fn show(conn: &Connection) -> Result<()> {
    let policy = penalty_policy(conn)?;
    let rows = vec![
        vec![
            "currency".to_string(),
            get_setting(conn, "currency")?.unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        ],
        vec!["penalty_fee".to_string(), policy.fee_per_cycle.to_string()],
        vec![
            "default_after_cycles".to_string(),
            policy.default_after_cycles.to_string(),
        ],
        vec![
            "api_base_url".to_string(),
            get_setting(conn, "api_base_url")?.unwrap_or_default(),
        ],
    ];
    println!("{}", pretty_table(&["Key", "Value"], rows));
    Ok(())
}

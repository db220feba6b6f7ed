// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

static APP: Lazy<(&str, &str, &str)> = Lazy::new(|| ("com.alphavelocity", "Emiclip", "emiclip"));

pub const DB_ENV: &str = "EMICLIP_DB";

pub fn db_path() -> Result<PathBuf> {
    if let Ok(p) = std::env::var(DB_ENV) {
        let p = p.trim();
        if !p.is_empty() {
            return Ok(PathBuf::from(p));
        }
    }
    let proj = ProjectDirs::from(APP.0, APP.1, APP.2)
        .context("Could not determine platform-specific data dir")?;
    let data_dir = proj.data_dir();
    fs::create_dir_all(data_dir).context("Failed to create data dir")?;
    Ok(data_dir.join("emiclip.sqlite"))
}

pub fn open_or_init() -> Result<Connection> {
    let path = db_path()?;
    let mut conn =
        Connection::open(&path).with_context(|| format!("Open DB at {}", path.display()))?;
    init_schema(&mut conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS plans(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user TEXT NOT NULL,
        order_ref TEXT NOT NULL UNIQUE,
        total_amount TEXT NOT NULL,
        down_payment TEXT NOT NULL DEFAULT '0',
        processing_fee TEXT NOT NULL DEFAULT '0',
        billing_cycle_days INTEGER NOT NULL CHECK(billing_cycle_days > 0),
        total_installments INTEGER NOT NULL CHECK(total_installments > 0),
        installment_amount TEXT NOT NULL,
        paid_installments INTEGER NOT NULL DEFAULT 0,
        next_due_date TEXT,
        status TEXT NOT NULL CHECK(status IN ('ongoing','completed','defaulted')),
        penalty TEXT NOT NULL DEFAULT '0',
        penalty_cycles INTEGER NOT NULL DEFAULT 0,
        start_date TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        CHECK(paid_installments <= total_installments),
        CHECK((next_due_date IS NULL) = (status = 'completed'))
    );
    CREATE INDEX IF NOT EXISTS idx_plans_user ON plans(user);

    CREATE TABLE IF NOT EXISTS order_items(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id INTEGER NOT NULL,
        name TEXT NOT NULL,
        quantity INTEGER NOT NULL,
        unit_price TEXT NOT NULL,
        FOREIGN KEY(plan_id) REFERENCES plans(id) ON DELETE CASCADE
    );

    CREATE TABLE IF NOT EXISTS payments(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        plan_id INTEGER NOT NULL,
        txn_ref TEXT NOT NULL UNIQUE,
        date TEXT NOT NULL,
        amount TEXT NOT NULL,
        penalty_paid TEXT NOT NULL DEFAULT '0',
        status TEXT NOT NULL CHECK(status IN ('paid','failed','pending')),
        source TEXT NOT NULL CHECK(source IN ('wallet','external')),
        installment_no INTEGER,
        remark TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(plan_id) REFERENCES plans(id) ON DELETE CASCADE
    );
    CREATE INDEX IF NOT EXISTS idx_payments_plan ON payments(plan_id, date);

    CREATE TABLE IF NOT EXISTS wallets(
        user TEXT PRIMARY KEY,
        purchase_balance TEXT NOT NULL DEFAULT '0',
        withdrawable_balance TEXT NOT NULL DEFAULT '0'
    );

    -- one row per balance movement; amount is signed
    CREATE TABLE IF NOT EXISTS wallet_entries(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user TEXT NOT NULL,
        kind TEXT NOT NULL CHECK(kind IN ('purchase','withdrawable')),
        amount TEXT NOT NULL,
        note TEXT,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(user) REFERENCES wallets(user) ON DELETE CASCADE
    );
    "#,
    )?;
    Ok(())
}

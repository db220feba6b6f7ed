// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::{
    BalanceKind, InstallmentPlan, OrderItem, PaymentRecord, PaymentStatus, PlanStatus, Wallet,
};
use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use rust_decimal::Decimal;
use std::str::FromStr;

const PLAN_COLUMNS: &str = "id, user, order_ref, total_amount, down_payment, processing_fee, \
     billing_cycle_days, total_installments, installment_amount, paid_installments, \
     next_due_date, status, penalty, penalty_cycles, start_date, created_at";

const PAYMENT_COLUMNS: &str =
    "id, plan_id, txn_ref, date, amount, penalty_paid, status, source, installment_no, remark";

/// Reads a TEXT column through `FromStr` (decimals and status enums).
fn text_col<T>(r: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = r.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn plan_from_row(r: &Row) -> rusqlite::Result<InstallmentPlan> {
    Ok(InstallmentPlan {
        id: r.get(0)?,
        user: r.get(1)?,
        order_ref: r.get(2)?,
        total_amount: text_col(r, 3)?,
        down_payment: text_col(r, 4)?,
        processing_fee: text_col(r, 5)?,
        billing_cycle_days: r.get(6)?,
        total_installments: r.get(7)?,
        installment_amount: text_col(r, 8)?,
        paid_installments: r.get(9)?,
        next_due_date: r.get(10)?,
        status: text_col::<PlanStatus>(r, 11)?,
        penalty: text_col(r, 12)?,
        penalty_cycles: r.get(13)?,
        start_date: r.get(14)?,
        created_at: r.get(15)?,
        items: Vec::new(),
    })
}

fn payment_from_row(r: &Row) -> rusqlite::Result<PaymentRecord> {
    Ok(PaymentRecord {
        id: r.get(0)?,
        plan_id: r.get(1)?,
        txn_ref: r.get(2)?,
        date: r.get(3)?,
        amount: text_col(r, 4)?,
        penalty_paid: text_col(r, 5)?,
        status: text_col(r, 6)?,
        source: text_col(r, 7)?,
        installment_no: r.get(8)?,
        remark: r.get(9)?,
    })
}

pub fn insert_plan(conn: &Connection, plan: &InstallmentPlan) -> Result<i64> {
    conn.execute(
        "INSERT INTO plans(user, order_ref, total_amount, down_payment, processing_fee,
             billing_cycle_days, total_installments, installment_amount, paid_installments,
             next_due_date, status, penalty, penalty_cycles, start_date, created_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15)",
        params![
            plan.user,
            plan.order_ref,
            plan.total_amount.to_string(),
            plan.down_payment.to_string(),
            plan.processing_fee.to_string(),
            plan.billing_cycle_days,
            plan.total_installments,
            plan.installment_amount.to_string(),
            plan.paid_installments,
            plan.next_due_date,
            plan.status.as_str(),
            plan.penalty.to_string(),
            plan.penalty_cycles,
            plan.start_date,
            plan.created_at,
        ],
    )
    .with_context(|| format!("Insert plan for order '{}'", plan.order_ref))?;
    let id = conn.last_insert_rowid();
    for item in &plan.items {
        conn.execute(
            "INSERT INTO order_items(plan_id, name, quantity, unit_price) VALUES (?1,?2,?3,?4)",
            params![id, item.name, item.quantity, item.unit_price.to_string()],
        )?;
    }
    Ok(id)
}

/// Persists the lifecycle fields that payments and accrual mutate.
pub fn save_plan_state(conn: &Connection, plan: &InstallmentPlan) -> Result<()> {
    conn.execute(
        "UPDATE plans SET paid_installments=?1, next_due_date=?2, status=?3, penalty=?4,
             penalty_cycles=?5
         WHERE id=?6",
        params![
            plan.paid_installments,
            plan.next_due_date,
            plan.status.as_str(),
            plan.penalty.to_string(),
            plan.penalty_cycles,
            plan.id,
        ],
    )?;
    Ok(())
}

/// Overwrites terms, schedule anchor and lifecycle fields with a server copy.
pub fn save_synced_plan(conn: &Connection, plan: &InstallmentPlan) -> Result<()> {
    conn.execute(
        "UPDATE plans SET user=?1, total_amount=?2, down_payment=?3, processing_fee=?4,
             billing_cycle_days=?5, total_installments=?6, installment_amount=?7,
             paid_installments=?8, next_due_date=?9, status=?10, penalty=?11,
             penalty_cycles=?12, start_date=?13
         WHERE id=?14",
        params![
            plan.user,
            plan.total_amount.to_string(),
            plan.down_payment.to_string(),
            plan.processing_fee.to_string(),
            plan.billing_cycle_days,
            plan.total_installments,
            plan.installment_amount.to_string(),
            plan.paid_installments,
            plan.next_due_date,
            plan.status.as_str(),
            plan.penalty.to_string(),
            plan.penalty_cycles,
            plan.start_date,
            plan.id,
        ],
    )
    .with_context(|| format!("Update plan for order '{}'", plan.order_ref))?;
    Ok(())
}

fn load_items(conn: &Connection, plan_id: i64) -> Result<Vec<OrderItem>> {
    let mut stmt = conn.prepare_cached(
        "SELECT name, quantity, unit_price FROM order_items WHERE plan_id=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![plan_id], |r| {
        Ok(OrderItem {
            name: r.get(0)?,
            quantity: r.get(1)?,
            unit_price: text_col(r, 2)?,
        })
    })?;
    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}

pub fn find_plan(conn: &Connection, id: i64) -> Result<Option<InstallmentPlan>> {
    let sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id=?1");
    let plan = conn
        .query_row(&sql, params![id], plan_from_row)
        .optional()?;
    match plan {
        Some(mut p) => {
            p.items = load_items(conn, p.id)?;
            Ok(Some(p))
        }
        None => Ok(None),
    }
}

pub fn load_plan(conn: &Connection, id: i64) -> Result<InstallmentPlan> {
    find_plan(conn, id)?.with_context(|| format!("Plan {} not found", id))
}

pub fn find_plan_by_order(conn: &Connection, order_ref: &str) -> Result<Option<InstallmentPlan>> {
    let id: Option<i64> = conn
        .query_row(
            "SELECT id FROM plans WHERE order_ref=?1",
            params![order_ref],
            |r| r.get(0),
        )
        .optional()?;
    match id {
        Some(id) => find_plan(conn, id),
        None => Ok(None),
    }
}

pub fn list_plans(
    conn: &Connection,
    user: Option<&str>,
    status: Option<PlanStatus>,
) -> Result<Vec<InstallmentPlan>> {
    let mut sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE 1=1");
    let mut params_vec: Vec<String> = Vec::new();
    if let Some(u) = user {
        sql.push_str(" AND user=?");
        params_vec.push(u.to_string());
    }
    if let Some(s) = status {
        sql.push_str(" AND status=?");
        params_vec.push(s.as_str().to_string());
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), plan_from_row)?;
    let mut plans = Vec::new();
    for row in rows {
        let mut p = row?;
        p.items = load_items(conn, p.id)?;
        plans.push(p);
    }
    Ok(plans)
}

pub fn insert_payment(conn: &Connection, p: &PaymentRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO payments(plan_id, txn_ref, date, amount, penalty_paid, status, source,
             installment_no, remark)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
        params![
            p.plan_id,
            p.txn_ref,
            p.date,
            p.amount.to_string(),
            p.penalty_paid.to_string(),
            p.status.as_str(),
            p.source.as_str(),
            p.installment_no,
            p.remark,
        ],
    )
    .with_context(|| format!("Insert payment '{}'", p.txn_ref))?;
    Ok(conn.last_insert_rowid())
}

pub fn update_payment(conn: &Connection, p: &PaymentRecord) -> Result<()> {
    conn.execute(
        "UPDATE payments SET amount=?1, penalty_paid=?2, status=?3, installment_no=?4, remark=?5
         WHERE id=?6",
        params![
            p.amount.to_string(),
            p.penalty_paid.to_string(),
            p.status.as_str(),
            p.installment_no,
            p.remark,
            p.id,
        ],
    )?;
    Ok(())
}

pub fn txn_ref_exists(conn: &Connection, txn_ref: &str) -> Result<bool> {
    let hit: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM payments WHERE txn_ref=?1",
            params![txn_ref],
            |r| r.get(0),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn find_payment_by_ref(conn: &Connection, txn_ref: &str) -> Result<Option<PaymentRecord>> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE txn_ref=?1");
    Ok(conn
        .query_row(&sql, params![txn_ref], payment_from_row)
        .optional()?)
}

pub fn count_payments(conn: &Connection, plan_id: i64) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM payments WHERE plan_id=?1",
        params![plan_id],
        |r| r.get(0),
    )?)
}

pub fn list_payments(
    conn: &Connection,
    plan_id: Option<i64>,
    status: Option<PaymentStatus>,
) -> Result<Vec<PaymentRecord>> {
    let mut sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE 1=1");
    let mut params_vec: Vec<String> = Vec::new();
    if let Some(id) = plan_id {
        sql.push_str(" AND plan_id=?");
        params_vec.push(id.to_string());
    }
    if let Some(s) = status {
        sql.push_str(" AND status=?");
        params_vec.push(s.as_str().to_string());
    }
    sql.push_str(" ORDER BY date, id");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec.iter()), payment_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn list_wallets(conn: &Connection) -> Result<Vec<Wallet>> {
    let mut stmt = conn.prepare(
        "SELECT user, purchase_balance, withdrawable_balance FROM wallets ORDER BY user",
    )?;
    let rows = stmt.query_map([], wallet_from_row)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

fn wallet_from_row(r: &Row) -> rusqlite::Result<Wallet> {
    Ok(Wallet {
        user: r.get(0)?,
        purchase_balance: text_col(r, 1)?,
        withdrawable_balance: text_col(r, 2)?,
    })
}

pub fn find_wallet(conn: &Connection, user: &str) -> Result<Option<Wallet>> {
    Ok(conn
        .query_row(
            "SELECT user, purchase_balance, withdrawable_balance FROM wallets WHERE user=?1",
            params![user],
            wallet_from_row,
        )
        .optional()?)
}

pub fn load_wallet(conn: &Connection, user: &str) -> Result<Wallet> {
    find_wallet(conn, user)?.with_context(|| format!("Wallet for '{}' not found", user))
}

pub fn save_wallet(conn: &Connection, w: &Wallet) -> Result<()> {
    conn.execute(
        "INSERT INTO wallets(user, purchase_balance, withdrawable_balance) VALUES (?1,?2,?3)
         ON CONFLICT(user) DO UPDATE SET purchase_balance=excluded.purchase_balance,
             withdrawable_balance=excluded.withdrawable_balance",
        params![
            w.user,
            w.purchase_balance.to_string(),
            w.withdrawable_balance.to_string()
        ],
    )?;
    Ok(())
}

pub fn record_wallet_entry(
    conn: &Connection,
    user: &str,
    kind: BalanceKind,
    amount: Decimal,
    note: Option<&str>,
) -> Result<()> {
    if amount.is_zero() {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO wallet_entries(user, kind, amount, note) VALUES (?1,?2,?3,?4)",
        params![user, kind.as_str(), amount.to_string(), note],
    )?;
    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WalletEntry {
    pub kind: String,
    pub amount: String,
    pub note: String,
    pub created_at: String,
}

pub fn list_wallet_entries(conn: &Connection, user: &str) -> Result<Vec<WalletEntry>> {
    let mut stmt = conn.prepare(
        "SELECT kind, amount, COALESCE(note,''), created_at FROM wallet_entries
         WHERE user=?1 ORDER BY id",
    )?;
    let rows = stmt.query_map(params![user], |r| {
        Ok(WalletEntry {
            kind: r.get(0)?,
            amount: r.get(1)?,
            note: r.get(2)?,
            created_at: r.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

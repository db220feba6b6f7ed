// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::emi::{PlanTerms, ScheduleRow};
use crate::models::{InstallmentPlan, OrderItem, PlanStatus};
use crate::store;
use crate::utils::{
    date_or_today, fmt_money, get_currency, maybe_print_json, parse_decimal, penalty_policy,
    pretty_table,
};
use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("create", sub)) => create(conn, sub)?,
        Some(("list", sub)) => list(conn, sub)?,
        Some(("show", sub)) => show(conn, sub)?,
        Some(("schedule", sub)) => schedule(conn, sub)?,
        _ => {}
    }
    Ok(())
}

/// Parses `name:qty:unit_price`; the name itself may contain colons.
pub fn parse_item(raw: &str) -> Result<OrderItem> {
    let mut parts = raw.trim().rsplitn(3, ':');
    let price = parts.next();
    let qty = parts.next();
    let name = parts.next();
    let (Some(name), Some(qty), Some(price)) = (name, qty, price) else {
        return Err(anyhow!("Invalid item '{}', expected name:qty:price", raw));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("Item name missing in '{}'", raw));
    }
    let quantity = qty
        .trim()
        .parse::<u32>()
        .with_context(|| format!("Invalid quantity '{}' in item '{}'", qty, raw))?;
    Ok(OrderItem {
        name: name.to_string(),
        quantity,
        unit_price: parse_decimal(price)?,
    })
}

fn parse_id(sub: &clap::ArgMatches) -> Result<i64> {
    sub.get_one::<String>("id")
        .unwrap()
        .trim()
        .parse::<i64>()
        .context("Invalid plan id")
}

fn create(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let user = sub.get_one::<String>("user").unwrap().trim().to_string();
    let order_ref = sub.get_one::<String>("order").unwrap().trim().to_string();
    let terms = PlanTerms {
        total_amount: parse_decimal(sub.get_one::<String>("total").unwrap())?,
        down_payment: match sub.get_one::<String>("down") {
            Some(s) => parse_decimal(s)?,
            None => Decimal::ZERO,
        },
        processing_fee: match sub.get_one::<String>("fee") {
            Some(s) => parse_decimal(s)?,
            None => Decimal::ZERO,
        },
        billing_cycle_days: *sub.get_one::<u32>("cycle_days").unwrap_or(&30),
        total_installments: *sub.get_one::<u32>("installments").unwrap(),
    };
    let start = date_or_today(sub.get_one::<String>("start"))?;
    let items = sub
        .get_many::<String>("item")
        .map(|vals| vals.map(|v| parse_item(v)).collect::<Result<Vec<_>>>())
        .transpose()?
        .unwrap_or_default();

    let id = create_plan(conn, &user, &order_ref, &terms, start, items)?;
    let plan = store::load_plan(conn, id)?;
    let ccy = get_currency(conn)?;
    println!(
        "Created plan {} for {} (order {}): {} x {} every {} days, first due {}",
        plan.id,
        plan.user,
        plan.order_ref,
        plan.total_installments,
        fmt_money(&plan.installment_amount, &ccy),
        plan.billing_cycle_days,
        plan.next_due_date
            .map(|d| d.to_string())
            .unwrap_or_default()
    );
    Ok(())
}

pub fn create_plan(
    conn: &Connection,
    user: &str,
    order_ref: &str,
    terms: &PlanTerms,
    start: NaiveDate,
    items: Vec<OrderItem>,
) -> Result<i64> {
    if user.is_empty() || order_ref.is_empty() {
        return Err(anyhow!("User and order reference are required"));
    }
    if store::find_plan_by_order(conn, order_ref)?.is_some() {
        return Err(anyhow!("Order '{}' already has a plan", order_ref));
    }
    let plan = InstallmentPlan::open(
        user,
        order_ref,
        terms,
        start,
        Utc::now().naive_utc(),
        items,
    )?;
    let id = store::insert_plan(conn, &plan)?;
    info!(plan_id = id, user, order_ref, "plan created");
    Ok(id)
}

#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub id: i64,
    pub user: String,
    pub order_ref: String,
    pub financed: Decimal,
    pub installment_amount: Decimal,
    pub paid_installments: u32,
    pub total_installments: u32,
    pub next_due_date: Option<NaiveDate>,
    pub status: PlanStatus,
    pub penalty: Decimal,
    pub outstanding: Decimal,
}

impl From<&InstallmentPlan> for PlanSummary {
    fn from(p: &InstallmentPlan) -> Self {
        Self {
            id: p.id,
            user: p.user.clone(),
            order_ref: p.order_ref.clone(),
            financed: p.financed_amount(),
            installment_amount: p.installment_amount,
            paid_installments: p.paid_installments,
            total_installments: p.total_installments,
            next_due_date: p.next_due_date,
            status: p.status,
            penalty: p.penalty,
            outstanding: p.outstanding(),
        }
    }
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let json_flag = sub.get_flag("json");
    let jsonl_flag = sub.get_flag("jsonl");
    let user = sub.get_one::<String>("user").map(|s| s.trim());
    let status = sub
        .get_one::<String>("status")
        .map(|s| s.parse::<PlanStatus>())
        .transpose()?;
    let data: Vec<PlanSummary> = store::list_plans(conn, user, status)?
        .iter()
        .map(PlanSummary::from)
        .collect();
    if !maybe_print_json(json_flag, jsonl_flag, &data)? {
        let rows = data
            .iter()
            .map(|p| {
                vec![
                    p.id.to_string(),
                    p.user.clone(),
                    p.order_ref.clone(),
                    format!("{:.2}", p.financed),
                    format!("{:.2}", p.installment_amount),
                    format!("{}/{}", p.paid_installments, p.total_installments),
                    p.next_due_date.map(|d| d.to_string()).unwrap_or_default(),
                    p.status.to_string(),
                    format!("{:.2}", p.penalty),
                    format!("{:.2}", p.outstanding),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(
                &[
                    "ID", "User", "Order", "Financed", "EMI", "Paid", "Next Due", "Status",
                    "Penalty", "Outstanding"
                ],
                rows
            )
        );
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct PlanDetail<'a> {
    #[serde(flatten)]
    summary: PlanSummary,
    total_amount: Decimal,
    down_payment: Decimal,
    processing_fee: Decimal,
    billing_cycle_days: u32,
    start_date: NaiveDate,
    created_at: String,
    as_of: NaiveDate,
    projected_penalty: Decimal,
    amount_due: Decimal,
    items: &'a [OrderItem],
}

fn show(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let plan = store::load_plan(conn, parse_id(sub)?)?;
    let as_of = date_or_today(sub.get_one::<String>("as_of"))?;
    let policy = penalty_policy(conn)?;

    // accrual is projected here, the sweep command persists it
    let mut projected = plan.clone();
    projected.accrue_penalty(as_of, &policy);

    let detail = PlanDetail {
        summary: PlanSummary::from(&plan),
        total_amount: plan.total_amount,
        down_payment: plan.down_payment,
        processing_fee: plan.processing_fee,
        billing_cycle_days: plan.billing_cycle_days,
        start_date: plan.start_date,
        created_at: plan.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        as_of,
        projected_penalty: projected.penalty,
        amount_due: projected.amount_due(as_of),
        items: &plan.items,
    };
    if maybe_print_json(sub.get_flag("json"), false, &detail)? {
        return Ok(());
    }

    let ccy = get_currency(conn)?;
    let money = |d: &Decimal| fmt_money(d, &ccy);
    let rows = vec![
        vec!["Plan".into(), plan.id.to_string()],
        vec!["User".into(), plan.user.clone()],
        vec!["Order".into(), plan.order_ref.clone()],
        vec!["Status".into(), plan.status.to_string()],
        vec!["Total".into(), money(&plan.total_amount)],
        vec!["Down payment".into(), money(&plan.down_payment)],
        vec!["Processing fee".into(), money(&plan.processing_fee)],
        vec!["Financed".into(), money(&plan.financed_amount())],
        vec!["EMI".into(), money(&plan.installment_amount)],
        vec![
            "Installments".into(),
            format!("{}/{}", plan.paid_installments, plan.total_installments),
        ],
        vec!["Cycle (days)".into(), plan.billing_cycle_days.to_string()],
        vec![
            "Next due".into(),
            plan.next_due_date.map(|d| d.to_string()).unwrap_or_default(),
        ],
        vec!["Penalty".into(), money(&plan.penalty)],
        vec![
            format!("Penalty as of {}", as_of),
            money(&detail.projected_penalty),
        ],
        vec!["Amount due".into(), money(&detail.amount_due)],
        vec!["Outstanding".into(), money(&plan.outstanding())],
        vec!["Created".into(), detail.created_at.clone()],
    ];
    println!("{}", pretty_table(&["Field", "Value"], rows));

    if !plan.items.is_empty() {
        let items = plan
            .items
            .iter()
            .map(|i| {
                vec![
                    i.name.clone(),
                    i.quantity.to_string(),
                    format!("{:.2}", i.unit_price),
                    format!("{:.2}", i.line_total()),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["Item", "Qty", "Unit Price", "Line Total"], items)
        );
    }
    Ok(())
}

pub fn schedule_rows(conn: &Connection, plan_id: i64, as_of: NaiveDate) -> Result<Vec<ScheduleRow>> {
    let plan = store::load_plan(conn, plan_id)?;
    Ok(plan.schedule(as_of))
}

fn schedule(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let as_of = date_or_today(sub.get_one::<String>("as_of"))?;
    let rows = schedule_rows(conn, parse_id(sub)?, as_of)?;
    if !maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        let table = rows
            .iter()
            .map(|r| {
                vec![
                    r.installment_no.to_string(),
                    r.due_date.to_string(),
                    format!("{:.2}", r.amount),
                    r.state.as_str().to_string(),
                ]
            })
            .collect();
        println!(
            "{}",
            pretty_table(&["#", "Due Date", "Amount", "State"], table)
        );
    }
    Ok(())
}

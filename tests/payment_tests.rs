// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use emiclip::commands::{payments, plans, wallets};
use emiclip::models::{BalanceKind, PaymentStatus, PlanStatus};
use emiclip::{cli, db, store};
use rusqlite::Connection;
use rust_decimal::Decimal;

fn setup() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&mut conn).unwrap();
    conn
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str_exact(s).unwrap()
}

fn run(conn: &mut Connection, args: &[&str]) -> anyhow::Result<()> {
    let matches = cli::build_cli().get_matches_from(args);
    match matches.subcommand() {
        Some(("plan", m)) => plans::handle(conn, m),
        Some(("payment", m)) => payments::handle(conn, m),
        Some(("wallet", m)) => wallets::handle(conn, m),
        other => panic!("unexpected command {:?}", other.map(|(n, _)| n)),
    }
}

/// Plan 1: 42000 financed over 12 x 3500, first due 2025-01-31.
fn create_plan(conn: &mut Connection, order: &str, installments: &str, total: &str) {
    run(
        conn,
        &[
            "emiclip",
            "plan",
            "create",
            "--user",
            " u1 ",
            "--order",
            order,
            "--total",
            total,
            "--down",
            "5000",
            "--fee",
            "2000",
            "--installments",
            installments,
            "--start",
            "2025-01-01",
            "--item",
            "Phone:1:40000",
            "--item",
            "Case: black:2:2500",
        ],
    )
    .unwrap();
}

#[test]
fn plan_create_persists_terms_and_items() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    let plan = store::load_plan(&conn, 1).unwrap();
    assert_eq!(plan.user, "u1");
    assert_eq!(plan.installment_amount, dec("3500"));
    assert_eq!(plan.billing_cycle_days, 30);
    assert_eq!(plan.next_due_date, NaiveDate::from_ymd_opt(2025, 1, 31));
    assert_eq!(plan.items.len(), 2);
    assert_eq!(plan.items[1].name, "Case: black");
    assert_eq!(plan.items[1].line_total(), dec("5000"));

    let dup = run(
        &mut conn,
        &[
            "emiclip", "plan", "create", "--user", "u2", "--order", "ORD-1", "--total", "100",
            "--installments", "2",
        ],
    );
    assert!(dup.unwrap_err().to_string().contains("already has a plan"));
}

#[test]
fn wallet_payment_advances_plan_and_debits_purchase_first() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    wallets::credit(&mut conn, "u1", BalanceKind::Purchase, dec("2000"), None).unwrap();
    wallets::credit(&mut conn, "u1", BalanceKind::Withdrawable, dec("5000"), None).unwrap();

    run(
        &mut conn,
        &[
            "emiclip", "payment", "post", "--plan", "1", "--amount", "3500", "--date",
            "2025-01-31", "--ref", "TXN-0001",
        ],
    )
    .unwrap();

    let plan = store::load_plan(&conn, 1).unwrap();
    assert_eq!(plan.paid_installments, 1);
    assert_eq!(plan.next_due_date, NaiveDate::from_ymd_opt(2025, 3, 2));
    assert_eq!(plan.outstanding(), dec("38500"));

    let wallet = store::load_wallet(&conn, "u1").unwrap();
    assert!(wallet.purchase_balance.is_zero());
    assert_eq!(wallet.withdrawable_balance, dec("3500"));
    // two credits and a debit split across both balances
    assert_eq!(store::list_wallet_entries(&conn, "u1").unwrap().len(), 4);

    let rec = store::find_payment_by_ref(&conn, "TXN-0001")
        .unwrap()
        .unwrap();
    assert_eq!(rec.status, PaymentStatus::Paid);
    assert_eq!(rec.installment_no, Some(1));
}

#[test]
fn short_wallet_records_failed_payment() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    wallets::credit(&mut conn, "u1", BalanceKind::Purchase, dec("1000"), None).unwrap();

    let req = payments::PaymentRequest {
        plan_id: 1,
        amount: dec("3500"),
        date: NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
        txn_ref: None,
        source: emiclip::models::PaymentSource::Wallet,
        pending: false,
        remark: None,
    };
    let rec = payments::post_payment(&mut conn, &req).unwrap();
    assert_eq!(rec.status, PaymentStatus::Failed);
    assert!(rec.remark.unwrap().contains("insufficient wallet balance"));
    assert_eq!(rec.txn_ref, "EMI1-20250131-1");

    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 0);
    assert_eq!(
        store::load_wallet(&conn, "u1").unwrap().purchase_balance,
        dec("1000")
    );
}

#[test]
fn mismatched_amount_is_recorded_failed() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    run(
        &mut conn,
        &[
            "emiclip", "payment", "post", "--plan", "1", "--amount", "1200", "--date",
            "2025-01-31", "--ref", "GW-9", "--source", "external", "--remark", "partial",
        ],
    )
    .unwrap();
    let rec = store::find_payment_by_ref(&conn, "GW-9").unwrap().unwrap();
    assert_eq!(rec.status, PaymentStatus::Failed);
    let remark = rec.remark.unwrap();
    assert!(remark.contains("does not match amount due"));
    assert!(remark.contains("partial"));
    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 0);
}

#[test]
fn duplicate_reference_is_rejected() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    let args = [
        "emiclip", "payment", "post", "--plan", "1", "--amount", "3500", "--date", "2025-01-31",
        "--ref", "GW-1", "--source", "external",
    ];
    run(&mut conn, &args).unwrap();
    let err = run(&mut conn, &args).unwrap_err();
    assert!(err.to_string().contains("already recorded"));
    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 1);
}

#[test]
fn pending_payment_settles_into_schedule() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    run(
        &mut conn,
        &[
            "emiclip", "payment", "post", "--plan", "1", "--amount", "3500", "--date",
            "2025-01-30", "--ref", "GW-7", "--source", "external", "--pending",
        ],
    )
    .unwrap();
    let pending = store::list_payments(&conn, Some(1), Some(PaymentStatus::Pending)).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 0);

    run(
        &mut conn,
        &["emiclip", "payment", "settle", "--ref", " GW-7 ", "--outcome", "paid"],
    )
    .unwrap();
    let rec = store::find_payment_by_ref(&conn, "GW-7").unwrap().unwrap();
    assert_eq!(rec.status, PaymentStatus::Paid);
    assert_eq!(rec.installment_no, Some(1));
    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 1);

    let again = payments::settle_payment(&mut conn, "GW-7", PaymentStatus::Failed, None);
    assert!(again.unwrap_err().to_string().contains("not pending"));
}

#[test]
fn pending_wallet_payment_is_refused() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    let err = run(
        &mut conn,
        &[
            "emiclip", "payment", "post", "--plan", "1", "--amount", "3500", "--pending",
        ],
    )
    .unwrap_err();
    assert!(err.to_string().contains("settle immediately"));
    assert!(store::list_payments(&conn, None, None).unwrap().is_empty());
}

#[test]
fn completed_plan_refuses_further_payments() {
    let mut conn = setup();
    // 7000 - 5000 + 2000 = 4000 in a single installment
    create_plan(&mut conn, "ORD-1", "1", "7000");
    let post = |conn: &mut Connection, r: &str| {
        run(
            conn,
            &[
                "emiclip", "payment", "post", "--plan", "1", "--amount", "4000", "--date",
                "2025-01-31", "--ref", r, "--source", "external",
            ],
        )
    };
    post(&mut conn, "GW-1").unwrap();
    let plan = store::load_plan(&conn, 1).unwrap();
    assert_eq!(plan.status, PlanStatus::Completed);
    assert_eq!(plan.next_due_date, None);

    let err = post(&mut conn, "GW-2").unwrap_err();
    assert!(err.to_string().contains("no further payments"));
}

#[test]
fn invalid_reference_is_rejected() {
    let mut conn = setup();
    create_plan(&mut conn, "ORD-1", "12", "45000");
    let err = run(
        &mut conn,
        &[
            "emiclip", "payment", "post", "--plan", "1", "--amount", "3500", "--ref", "a b",
            "--source", "external",
        ],
    )
    .unwrap_err();
    assert!(err.to_string().contains("Invalid transaction reference"));
}

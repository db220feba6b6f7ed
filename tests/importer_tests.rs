// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDate;
use emiclip::commands::{importer, plans};
use emiclip::emi::PlanTerms;
use emiclip::models::PaymentStatus;
use emiclip::{cli, db, store};
use rusqlite::Connection;
use rust_decimal::Decimal;
use std::io::Write;
use tempfile::NamedTempFile;

fn base_conn() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    db::init_schema(&mut conn).unwrap();
    let terms = PlanTerms {
        total_amount: Decimal::from(45000),
        down_payment: Decimal::from(5000),
        processing_fee: Decimal::from(2000),
        billing_cycle_days: 30,
        total_installments: 12,
    };
    plans::create_plan(
        &conn,
        "u1",
        "ORD-1",
        &terms,
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        vec![],
    )
    .unwrap();
    conn
}

fn settlement_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "order_ref,date,amount,txn_ref,status,remark\n\
         ORD-1,2025-01-31,3500,GW-100,paid,\n\
         ORD-1,2025-03-02,3500.00,GW-101,,upi\n\
         ORD-1,2025-03-03,100,GW-102,paid,short\n\
         ORD-1,2025-03-04,3500,GW-103,pending,\n\
         ORD-1,2025-03-05,3500,GW-104,failed,card declined"
    )
    .unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn importer_trims_cli_path_argument() {
    let mut conn = base_conn();
    let file = settlement_file();

    let path = file.path().to_str().unwrap().to_string();
    let padded = format!("  {}  ", path);
    let matches =
        cli::build_cli().get_matches_from(["emiclip", "import", "payments", "--path", &padded]);
    if let Some(("import", import_m)) = matches.subcommand() {
        importer::handle(&mut conn, import_m).unwrap();
    } else {
        panic!("import command not parsed");
    }

    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 2);
}

#[test]
fn import_classifies_rows_and_skips_duplicates() {
    let mut conn = base_conn();
    let file = settlement_file();
    let path = file.path().to_str().unwrap();

    let summary = importer::import_payments(&mut conn, path).unwrap();
    assert_eq!(summary.paid, 2);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.duplicates, 0);

    let failed = store::find_payment_by_ref(&conn, "GW-102").unwrap().unwrap();
    assert_eq!(failed.status, PaymentStatus::Failed);
    assert!(failed.remark.unwrap().contains("short"));
    let declined = store::find_payment_by_ref(&conn, "GW-104").unwrap().unwrap();
    assert_eq!(declined.status, PaymentStatus::Failed);
    assert_eq!(declined.installment_no, None);
    let remark = declined.remark.unwrap();
    assert!(remark.contains("failed at gateway"));
    assert!(remark.contains("card declined"));
    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 2);

    let second = store::find_payment_by_ref(&conn, "GW-101").unwrap().unwrap();
    assert_eq!(second.installment_no, Some(2));

    let again = importer::import_payments(&mut conn, path).unwrap();
    assert_eq!(again.duplicates, 5);
    assert_eq!(again.paid + again.pending + again.failed, 0);
    assert_eq!(store::list_payments(&conn, None, None).unwrap().len(), 5);
}

#[test]
fn import_rolls_back_on_unknown_order() {
    let mut conn = base_conn();
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "order_ref,date,amount,txn_ref,status,remark\n\
         ORD-1,2025-01-31,3500,GW-1,,\n\
         ORD-404,2025-01-31,3500,GW-2,,"
    )
    .unwrap();
    file.flush().unwrap();

    let err = importer::import_payments(&mut conn, file.path().to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("ORD-404"));
    assert!(store::list_payments(&conn, None, None).unwrap().is_empty());
    assert_eq!(store::load_plan(&conn, 1).unwrap().paid_installments, 0);
}

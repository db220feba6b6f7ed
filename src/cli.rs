// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command, crate_version, value_parser};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .conflicts_with("jsonl")
            .help("Print as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print as JSON lines"),
    )
}

fn user_arg() -> Arg {
    Arg::new("user").long("user").required(true).help("Customer id")
}

fn as_of_arg() -> Arg {
    Arg::new("as_of")
        .long("as-of")
        .help("Evaluate as of YYYY-MM-DD (default: today)")
}

fn plan_cmd() -> Command {
    Command::new("plan")
        .about("Installment plans")
        .subcommand_required(true)
        .subcommand(
            Command::new("create")
                .about("Open a plan at order confirmation")
                .arg(user_arg())
                .arg(Arg::new("order").long("order").required(true).help("Order reference"))
                .arg(Arg::new("total").long("total").required(true).help("Order total"))
                .arg(Arg::new("down").long("down").help("Down payment (default 0)"))
                .arg(Arg::new("fee").long("fee").help("Processing fee (default 0)"))
                .arg(
                    Arg::new("cycle_days")
                        .long("cycle-days")
                        .value_parser(value_parser!(u32))
                        .default_value("30")
                        .help("Billing cycle length in days"),
                )
                .arg(
                    Arg::new("installments")
                        .long("installments")
                        .required(true)
                        .value_parser(value_parser!(u32)),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .help("Purchase date YYYY-MM-DD (default: today)"),
                )
                .arg(
                    Arg::new("item")
                        .long("item")
                        .action(ArgAction::Append)
                        .help("Line item name:qty:unit_price (repeatable)"),
                ),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("List plans")
                .arg(Arg::new("user").long("user"))
                .arg(
                    Arg::new("status")
                        .long("status")
                        .value_parser(["ongoing", "completed", "defaulted"]),
                ),
        ))
        .subcommand(
            Command::new("show")
                .about("Plan detail with amount due")
                .arg(Arg::new("id").long("id").required(true))
                .arg(as_of_arg())
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
        )
        .subcommand(json_flags(
            Command::new("schedule")
                .about("Installment schedule")
                .arg(Arg::new("id").long("id").required(true))
                .arg(as_of_arg()),
        ))
}

fn payment_cmd() -> Command {
    Command::new("payment")
        .about("Installment payments")
        .subcommand_required(true)
        .subcommand(
            Command::new("post")
                .about("Pay the next installment")
                .arg(Arg::new("plan").long("plan").required(true))
                .arg(Arg::new("amount").long("amount").required(true))
                .arg(Arg::new("date").long("date").help("Payment date (default: today)"))
                .arg(Arg::new("ref").long("ref").help("Transaction reference"))
                .arg(
                    Arg::new("source")
                        .long("source")
                        .value_parser(["wallet", "external"])
                        .default_value("wallet"),
                )
                .arg(
                    Arg::new("pending")
                        .long("pending")
                        .action(ArgAction::SetTrue)
                        .help("Record an unsettled gateway payment"),
                )
                .arg(Arg::new("remark").long("remark")),
        )
        .subcommand(json_flags(
            Command::new("list")
                .about("Payment history")
                .arg(Arg::new("plan").long("plan"))
                .arg(
                    Arg::new("status")
                        .long("status")
                        .value_parser(["paid", "failed", "pending"]),
                ),
        ))
        .subcommand(
            Command::new("settle")
                .about("Resolve a pending payment")
                .arg(Arg::new("ref").long("ref").required(true))
                .arg(
                    Arg::new("outcome")
                        .long("outcome")
                        .required(true)
                        .value_parser(["paid", "failed"]),
                )
                .arg(Arg::new("remark").long("remark")),
        )
}

fn wallet_cmd() -> Command {
    Command::new("wallet")
        .about("Customer wallets")
        .subcommand_required(true)
        .subcommand(Command::new("open").arg(user_arg()))
        .subcommand(
            Command::new("credit")
                .arg(user_arg())
                .arg(Arg::new("amount").long("amount").required(true))
                .arg(
                    Arg::new("kind")
                        .long("kind")
                        .value_parser(["purchase", "withdrawable"])
                        .default_value("purchase"),
                )
                .arg(Arg::new("note").long("note")),
        )
        .subcommand(
            Command::new("withdraw")
                .arg(user_arg())
                .arg(Arg::new("amount").long("amount").required(true)),
        )
        .subcommand(
            Command::new("show")
                .arg(user_arg())
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
        )
        .subcommand(json_flags(Command::new("ledger").arg(user_arg())))
}

fn export_target(name: &'static str) -> Command {
    Command::new(name)
        .arg(
            Arg::new("format")
                .long("format")
                .default_value("csv")
                .help("csv|json"),
        )
        .arg(Arg::new("out").long("out").required(true))
}

pub fn build_cli() -> Command {
    Command::new("emiclip")
        .version(crate_version!())
        .about("Installment plan (EMI) ledger")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("More log output on stderr"),
        )
        .subcommand(Command::new("init").about("Create the database"))
        .subcommand(plan_cmd())
        .subcommand(payment_cmd())
        .subcommand(
            Command::new("penalty")
                .about("Late penalties")
                .subcommand_required(true)
                .subcommand(
                    Command::new("sweep")
                        .about("Accrue penalties on every ongoing plan")
                        .arg(as_of_arg())
                        .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
                ),
        )
        .subcommand(wallet_cmd())
        .subcommand(
            Command::new("import")
                .about("Import gateway settlement files")
                .subcommand_required(true)
                .subcommand(
                    Command::new("payments")
                        .arg(Arg::new("path").long("path").required(true)),
                ),
        )
        .subcommand(
            Command::new("export")
                .about("Export plans or payments")
                .subcommand_required(true)
                .subcommand(export_target("plans"))
                .subcommand(export_target("payments")),
        )
        .subcommand(
            Command::new("config")
                .about("Penalty policy and other settings")
                .subcommand_required(true)
                .subcommand(Command::new("show"))
                .subcommand(
                    Command::new("set")
                        .arg(Arg::new("key").long("key").required(true))
                        .arg(Arg::new("value").long("value").required(true)),
                ),
        )
        .subcommand(Command::new("doctor").about("Check plan invariants"))
        .subcommand(
            Command::new("sync")
                .about("Pull plans from the platform API")
                .subcommand_required(true)
                .subcommand(
                    Command::new("plans")
                        .arg(user_arg())
                        .arg(Arg::new("base_url").long("base-url"))
                        .arg(
                            Arg::new("token")
                                .long("token")
                                .env("EMICLIP_TOKEN")
                                .hide_env_values(true)
                                .help("Bearer token"),
                        ),
                ),
        )
}

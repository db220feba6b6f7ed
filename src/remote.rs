// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Client for the platform's EMI REST endpoints. Bodies use the storefront's
//! camelCase shapes.

use crate::emi::check_schedule_shape;
use crate::error::EmiError;
use crate::models::{
    InstallmentPlan, OrderItem, PaymentRecord, PaymentSource, PaymentStatus, PlanStatus,
};
use crate::utils::http_client;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::debug;

pub const GENERIC_MESSAGE: &str = "Something went wrong";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message} (HTTP {status})")]
    Remote { status: u16, message: String },

    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Pulls `message` out of an error body, falling back to a generic message.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GENERIC_MESSAGE.to_string())
}

/// Accepts `2025-03-01` as well as `2025-03-01T00:00:00.000Z`.
fn lenient_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => {
            let day = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(day, "%Y-%m-%d")
                .map(Some)
                .map_err(serde::de::Error::custom)
        }
    }
}

fn lenient_datetime<'de, D>(d: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(d)?;
    let Some(s) = raw.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(Some(dt.naive_utc()));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(Some)
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub name: String,
    #[serde(default = "one")]
    pub quantity: u32,
    pub price: Decimal,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePayment {
    pub transaction_id: String,
    #[serde(default, deserialize_with = "lenient_date")]
    pub payment_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub status: PaymentStatus,
    #[serde(default)]
    pub remark: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemotePlan {
    pub order_id: String,
    #[serde(default)]
    pub user: Option<String>,
    pub total_amount: Decimal,
    #[serde(default)]
    pub down_payment: Decimal,
    #[serde(default)]
    pub processing_fee: Decimal,
    pub billing_cycle_in_days: u32,
    pub total_installments: u32,
    pub installment_amount: Decimal,
    #[serde(default)]
    pub paid_installments: u32,
    #[serde(default, deserialize_with = "lenient_date")]
    pub next_due_date: Option<NaiveDate>,
    pub status: PlanStatus,
    #[serde(default)]
    pub penalty: Decimal,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub items: Vec<RemoteItem>,
    #[serde(default)]
    pub payment_history: Vec<RemotePayment>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlansBody {
    Bare(Vec<RemotePlan>),
    Wrapped { data: Vec<RemotePlan> },
}

impl RemotePlan {
    /// Converts to a local plan plus its payment history, rejecting plans
    /// that break the lifecycle invariants. `as_of` marks the penalty cycles
    /// the server has already charged.
    pub fn into_local(
        self,
        fallback_user: &str,
        as_of: NaiveDate,
    ) -> Result<(InstallmentPlan, Vec<PaymentRecord>), EmiError> {
        let bad = |msg: String| EmiError::InvalidTerms(format!("order {}: {}", self.order_id, msg));
        if let Err(EmiError::InvalidTerms(msg)) =
            check_schedule_shape(self.billing_cycle_in_days, self.total_installments)
        {
            return Err(bad(msg));
        }
        if self.paid_installments > self.total_installments {
            return Err(bad(format!(
                "{} of {} installments paid",
                self.paid_installments, self.total_installments
            )));
        }
        if self.next_due_date.is_none() != (self.status == PlanStatus::Completed) {
            return Err(bad(format!(
                "status {} with next due {:?}",
                self.status, self.next_due_date
            )));
        }
        if (self.status == PlanStatus::Completed)
            != (self.paid_installments == self.total_installments)
        {
            return Err(bad(format!(
                "status {} with {} of {} installments paid",
                self.status, self.paid_installments, self.total_installments
            )));
        }
        if self.penalty < Decimal::ZERO {
            return Err(bad("negative penalty".into()));
        }
        if self.installment_amount <= Decimal::ZERO {
            return Err(bad(format!("installment amount {}", self.installment_amount)));
        }
        let financed = self.total_amount - self.down_payment + self.processing_fee;
        if self.installment_amount * Decimal::from(self.paid_installments) > financed {
            return Err(bad(format!(
                "{} x {} paid exceeds financed {}",
                self.paid_installments, self.installment_amount, financed
            )));
        }

        let created_at = self
            .created_at
            .unwrap_or_else(|| as_of.and_hms_opt(0, 0, 0).unwrap_or_default());
        let cycle = i64::from(self.billing_cycle_in_days);
        let start_date = match self.next_due_date {
            Some(due) => Duration::try_days(cycle * i64::from(self.paid_installments + 1))
                .and_then(|back| due.checked_sub_signed(back))
                .ok_or_else(|| bad(format!("next due {} is out of range", due)))?,
            None => created_at.date(),
        };

        let mut plan = InstallmentPlan {
            id: 0,
            user: self.user.unwrap_or_else(|| fallback_user.to_string()),
            order_ref: self.order_id,
            total_amount: self.total_amount,
            down_payment: self.down_payment,
            processing_fee: self.processing_fee,
            billing_cycle_days: self.billing_cycle_in_days,
            total_installments: self.total_installments,
            installment_amount: self.installment_amount,
            paid_installments: self.paid_installments,
            next_due_date: self.next_due_date,
            status: self.status,
            penalty: self.penalty,
            penalty_cycles: 0,
            start_date,
            created_at,
            items: self
                .items
                .into_iter()
                .map(|i| OrderItem {
                    name: i.name,
                    quantity: i.quantity,
                    unit_price: i.price,
                })
                .collect(),
        };
        if plan.status == PlanStatus::Ongoing {
            plan.penalty_cycles = plan.missed_cycles(as_of);
        }

        let payments = self
            .payment_history
            .into_iter()
            .map(|p| PaymentRecord {
                id: 0,
                plan_id: 0,
                txn_ref: p.transaction_id,
                date: p.payment_date.unwrap_or(as_of),
                amount: p.amount,
                penalty_paid: Decimal::ZERO,
                status: p.status,
                source: PaymentSource::External,
                installment_no: None,
                remark: p.remark,
            })
            .collect();
        Ok((plan, payments))
    }
}

pub struct ApiClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::blocking::Client,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.trim().is_empty()),
            http: http_client()?,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        let url = self.url(path);
        debug!(url = url.as_str(), "GET");
        let mut req = self.http.get(&url).query(query);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ApiError::Remote {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(resp.json::<T>()?)
    }

    pub fn fetch_plans(&self, user: &str) -> Result<Vec<RemotePlan>, ApiError> {
        let body: PlansBody = self.get("emi/plans", &[("user", user)])?;
        Ok(parse_plans_body(body))
    }
}

fn parse_plans_body(body: PlansBody) -> Vec<RemotePlan> {
    match body {
        PlansBody::Bare(plans) => plans,
        PlansBody::Wrapped { data } => data,
    }
}

/// Decodes a plans response, bare array or `{ "data": [...] }`.
pub fn decode_plans(json: &str) -> Result<Vec<RemotePlan>, serde_json::Error> {
    serde_json::from_str::<PlansBody>(json).map(parse_plans_body)
}

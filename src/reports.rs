// src/reports.rs
//! 仪表盘的只读汇总。每次请求重新计算, 不做缓存。

use std::collections::HashMap;

use chrono::Month;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::attendance::round2;
use crate::models::{
    ClassFeeRow, ClassRollupRow, ClassWiseStats, FeeRollupRow, FeeStatus, FeeTotals,
    MonthlyTrendPoint, PaymentMode, PaymentModeStats, PaymentModeSummary, StatusBreakdown,
};

const MONTHS: [Month; 12] = [
    Month::January,
    Month::February,
    Month::March,
    Month::April,
    Month::May,
    Month::June,
    Month::July,
    Month::August,
    Month::September,
    Month::October,
    Month::November,
    Month::December,
];

/// collected / expected * 100, expected 为 0 时返回 0
pub fn collection_rate(collected: Decimal, expected: Decimal) -> f64 {
    if expected <= Decimal::ZERO {
        return 0.0;
    }
    let ratio = (collected / expected * Decimal::ONE_HUNDRED)
        .to_f64()
        .unwrap_or(0.0);
    round2(ratio)
}

fn sum_by<'a, I, F>(rows: I, field: F) -> Decimal
where
    I: IntoIterator<Item = &'a FeeRollupRow>,
    F: Fn(&FeeRollupRow) -> Decimal,
{
    rows.into_iter().map(field).sum()
}

pub fn fee_totals(rows: &[FeeRollupRow]) -> FeeTotals {
    let total_collected = sum_by(rows, |r| r.amount_paid);
    let total_expected = sum_by(rows, |r| r.total_fee);
    let pending_fees = sum_by(rows.iter().filter(|r| r.status == FeeStatus::Pending), |r| r.balance);
    let overdue_fees = sum_by(rows.iter().filter(|r| r.status == FeeStatus::Overdue), |r| r.balance);

    let mut breakdown = StatusBreakdown::default();
    for row in rows {
        match row.status {
            FeeStatus::Paid => breakdown.paid += 1,
            FeeStatus::Pending => breakdown.pending += 1,
            FeeStatus::Overdue => breakdown.overdue += 1,
        }
    }

    FeeTotals {
        total_collected,
        total_expected,
        pending_fees,
        overdue_fees,
        payment_status_breakdown: breakdown,
        collection_rate: collection_rate(total_collected, total_expected),
    }
}

/// 按自然月展开一年的收费趋势, 没有记录的月份为 0
pub fn monthly_trend(rows: &[FeeRollupRow]) -> Vec<MonthlyTrendPoint> {
    MONTHS
        .iter()
        .map(|month| {
            let name = month.name();
            let in_month: Vec<&FeeRollupRow> = rows.iter().filter(|r| r.month == name).collect();
            let expected = sum_by(in_month.iter().copied(), |r| r.total_fee);
            let collected = sum_by(in_month.iter().copied(), |r| r.amount_paid);
            let pending = sum_by(
                in_month.iter().copied().filter(|r| r.status == FeeStatus::Pending),
                |r| r.balance,
            );
            let overdue = sum_by(
                in_month.iter().copied().filter(|r| r.status == FeeStatus::Overdue),
                |r| r.balance,
            );
            MonthlyTrendPoint {
                month: name,
                expected,
                collected,
                pending,
                overdue,
                collection_rate: collection_rate(collected, expected),
            }
        })
        .collect()
}

pub fn class_wise(classes: &[ClassRollupRow], fees: &[ClassFeeRow]) -> Vec<ClassWiseStats> {
    let mut per_class: HashMap<i32, (Decimal, Decimal)> = HashMap::new();
    for row in fees {
        let entry = per_class.entry(row.class_id).or_default();
        entry.0 += row.total_fee;
        entry.1 += row.amount_paid;
    }

    classes
        .iter()
        .map(|c| {
            let (expected, collected) = per_class.get(&c.class_id).copied().unwrap_or_default();
            ClassWiseStats {
                class_name: c.class_name.clone(),
                total_students: c.total_students,
                total_collected: collected,
                total_expected: expected,
                total_pending: expected - collected,
                monthly_fee: c.monthly_fee.unwrap_or_default(),
            }
        })
        .collect()
}

/// 只统计已缴清且有缴费方式的记录
pub fn payment_modes(rows: &[FeeRollupRow]) -> (Vec<PaymentModeStats>, PaymentModeSummary) {
    let paid: Vec<&FeeRollupRow> = rows
        .iter()
        .filter(|r| r.status == FeeStatus::Paid && r.payment_mode.is_some())
        .collect();

    let per_mode = PaymentMode::ALL
        .iter()
        .map(|mode| {
            let matching: Vec<&FeeRollupRow> = paid
                .iter()
                .copied()
                .filter(|r| r.payment_mode == Some(*mode))
                .collect();
            PaymentModeStats {
                mode: *mode,
                count: matching.len() as i64,
                total_amount: sum_by(matching, |r| r.amount_paid),
            }
        })
        .collect();

    let summary = PaymentModeSummary {
        total_transactions: paid.len() as i64,
        total_amount: sum_by(paid.iter().copied(), |r| r.amount_paid),
    };
    (per_mode, summary)
}

// src/fees.rs
//! 费用计算规则: 分项求和、月度账单生成、缴费与追加费用。
//!
//! 这里只做纯计算, 持久化由 handlers 负责。

use chrono::{DateTime, Month, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::FeeStatus;

/// 账单默认在当月 10 号到期
pub const DEFAULT_DUE_DAY: u32 = 10;

/// 金额列为 NUMERIC(12, 2), 上限 9,999,999,999.99
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

/// 金额必须在 [0, max_amount()] 之间, 超出范围的输入在做任何运算之前拒绝
pub fn check_amount(name: &str, value: Decimal) -> Result<Decimal, AppError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(AppError::BadRequest(format!("{} cannot be negative", name)));
    }
    if value > max_amount() {
        return Err(AppError::BadRequest(format!("{} exceeds the maximum amount", name)));
    }
    Ok(value)
}

fn checked_sum(name: &str, values: &[Decimal]) -> Result<Decimal, AppError> {
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| AppError::BadRequest(format!("{} exceeds the maximum amount", name)))?;
    check_amount(name, sum)
}

/// 六个费用分项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct FeeComponents {
    pub tuition_fee: Decimal,
    pub lab_fee: Decimal,
    pub library_fee: Decimal,
    pub sports_fee: Decimal,
    pub exam_fee: Decimal,
    pub other_fee: Decimal,
}

impl FeeComponents {
    pub fn total(&self) -> Decimal {
        self.tuition_fee
            + self.lab_fee
            + self.library_fee
            + self.sports_fee
            + self.exam_fee
            + self.other_fee
    }

    /// 每个分项非负且不超上限, 总额也不超上限; 通过后 total() 不会溢出
    pub fn ensure_valid(&self) -> Result<(), AppError> {
        let fields = [
            ("tuitionFee", self.tuition_fee),
            ("labFee", self.lab_fee),
            ("libraryFee", self.library_fee),
            ("sportsFee", self.sports_fee),
            ("examFee", self.exam_fee),
            ("otherFee", self.other_fee),
        ];
        for (name, value) in fields {
            check_amount(name, value)?;
        }
        checked_sum("totalMonthlyFee", &fields.map(|(_, v)| v))?;
        Ok(())
    }
}

/// 请求体中的分项, 未提供的字段为 None
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeComponentsInput {
    pub tuition_fee: Option<Decimal>,
    pub lab_fee: Option<Decimal>,
    pub library_fee: Option<Decimal>,
    pub sports_fee: Option<Decimal>,
    pub exam_fee: Option<Decimal>,
    pub other_fee: Option<Decimal>,
}

impl FeeComponentsInput {
    /// 新建时: 缺省分项按 0 计
    pub fn or_zero(&self) -> FeeComponents {
        self.merged_onto(&FeeComponents::default())
    }

    /// 更新时: 缺省分项沿用已有值, 之后必须重新求和
    pub fn merged_onto(&self, base: &FeeComponents) -> FeeComponents {
        FeeComponents {
            tuition_fee: self.tuition_fee.unwrap_or(base.tuition_fee),
            lab_fee: self.lab_fee.unwrap_or(base.lab_fee),
            library_fee: self.library_fee.unwrap_or(base.library_fee),
            sports_fee: self.sports_fee.unwrap_or(base.sports_fee),
            exam_fee: self.exam_fee.unwrap_or(base.exam_fee),
            other_fee: self.other_fee.unwrap_or(base.other_fee),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tuition_fee.is_none()
            && self.lab_fee.is_none()
            && self.library_fee.is_none()
            && self.sports_fee.is_none()
            && self.exam_fee.is_none()
            && self.other_fee.is_none()
    }
}

/// 接受 "March" / "march" / "Mar", 统一为英文全称
pub fn parse_month(raw: &str) -> Result<Month, AppError> {
    raw.trim()
        .parse::<Month>()
        .map_err(|_| AppError::BadRequest(format!("Invalid month: {}", raw)))
}

/// 月份在一年中的序号 (1..=12), 用于排序
pub fn month_ordinal(name: &str) -> u32 {
    name.parse::<Month>()
        .map(|m| m.number_from_month())
        .unwrap_or(0)
}

pub fn default_due_date(month: Month, year: i32) -> Result<DateTime<Utc>, AppError> {
    NaiveDate::from_ymd_opt(year, month.number_from_month(), DEFAULT_DUE_DAY)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::BadRequest(format!("Invalid period: {} {}", month.name(), year)))
}

/// dueDate 接受 RFC 3339 时间或 YYYY-MM-DD 日期 (按 UTC 零点)
pub fn deserialize_due_date<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    let raw: Option<String> = Deserialize::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(dt.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(dt.and_utc()))
        .ok_or_else(|| D::Error::custom(format!("invalid due date: {}", raw)))
}

/// 一条待写入的月度账单
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeeRecord {
    pub components: FeeComponents,
    pub total_fee: Decimal,
    pub balance: Decimal,
    pub status: FeeStatus,
    pub due_date: DateTime<Utc>,
}

/// 由学生的分项加上本期额外的考试费/杂费生成账单
pub fn plan_fee_record(
    student: &FeeComponents,
    extra_exam_fee: Decimal,
    extra_other_fee: Decimal,
    due_date: DateTime<Utc>,
) -> Result<NewFeeRecord, AppError> {
    let components = FeeComponents {
        exam_fee: checked_sum("examFee", &[student.exam_fee, extra_exam_fee])?,
        other_fee: checked_sum("otherFee", &[student.other_fee, extra_other_fee])?,
        ..*student
    };
    components.ensure_valid()?;
    let total_fee = components.total();
    Ok(NewFeeRecord {
        components,
        total_fee,
        balance: total_fee,
        status: FeeStatus::Pending,
        due_date,
    })
}

/// 账单的可变部分: 分项、已缴金额、状态、缴清时间
#[derive(Debug, Clone, PartialEq)]
pub struct Ledger {
    pub components: FeeComponents,
    pub amount_paid: Decimal,
    pub status: FeeStatus,
    pub payment_date: Option<DateTime<Utc>>,
}

impl Ledger {
    pub fn total_fee(&self) -> Decimal {
        self.components.total()
    }

    pub fn balance(&self) -> Decimal {
        self.total_fee() - self.amount_paid
    }

    /// 累加缴费。余额 <= 0 时转为 Paid 并记录时间, 否则状态不变
    /// (Overdue 不会因部分缴费退回 Pending)。超额缴费不拒绝, 余额可为负。
    pub fn record_payment(&mut self, amount: Decimal, now: DateTime<Utc>) -> Result<(), AppError> {
        let amount = check_amount("amountPaid", amount)?;
        self.amount_paid = checked_sum("amountPaid", &[self.amount_paid, amount])?;
        if self.balance() <= Decimal::ZERO {
            self.status = FeeStatus::Paid;
            self.payment_date = Some(now);
        }
        Ok(())
    }

    /// 追加考试费/杂费, 从已存的六个分项重新计算总额; 不改变状态
    pub fn add_charges(&mut self, exam_fee: Decimal, other_fee: Decimal) -> Result<(), AppError> {
        let components = FeeComponents {
            exam_fee: checked_sum("examFee", &[self.components.exam_fee, check_amount("examFee", exam_fee)?])?,
            other_fee: checked_sum("otherFee", &[self.components.other_fee, check_amount("otherFee", other_fee)?])?,
            ..self.components
        };
        components.ensure_valid()?;
        self.components = components;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn components(tuition: Decimal, lab: Decimal) -> FeeComponents {
        FeeComponents {
            tuition_fee: tuition,
            lab_fee: lab,
            ..Default::default()
        }
    }

    #[test]
    fn total_is_sum_of_all_six_components() {
        let c = FeeComponents {
            tuition_fee: dec!(5000),
            lab_fee: dec!(500),
            library_fee: dec!(300),
            sports_fee: dec!(200),
            exam_fee: dec!(1000),
            other_fee: dec!(0.50),
        };
        assert_eq!(c.total(), dec!(7000.50));
    }

    #[test]
    fn missing_components_default_to_zero_on_create() {
        let input = FeeComponentsInput {
            tuition_fee: Some(dec!(5000)),
            lab_fee: Some(dec!(500)),
            ..Default::default()
        };
        let c = input.or_zero();
        assert_eq!(c.total(), dec!(5500));
        assert_eq!(c.sports_fee, Decimal::ZERO);
    }

    #[test]
    fn partial_update_keeps_existing_components_and_recomputes_total() {
        let existing = components(dec!(5000), dec!(500));
        let patch = FeeComponentsInput {
            lab_fee: Some(dec!(700)),
            sports_fee: Some(dec!(100)),
            ..Default::default()
        };
        let merged = patch.merged_onto(&existing);
        assert_eq!(merged.tuition_fee, dec!(5000));
        assert_eq!(merged.total(), dec!(5800));
    }

    #[test]
    fn negative_component_is_rejected() {
        let c = components(dec!(-1), dec!(0));
        assert!(matches!(c.ensure_valid(), Err(AppError::BadRequest(msg)) if msg.contains("tuitionFee")));
        assert!(components(dec!(0), dec!(0)).ensure_valid().is_ok());
    }

    #[test]
    fn oversized_amounts_are_rejected_instead_of_overflowing() {
        let huge = Decimal::from_scientific("5e28").unwrap();
        let c = components(huge, huge);
        assert!(matches!(c.ensure_valid(), Err(AppError::BadRequest(msg)) if msg.contains("tuitionFee")));

        // 单项合法但总额超出列宽
        let c = components(max_amount(), dec!(1));
        assert!(matches!(c.ensure_valid(), Err(AppError::BadRequest(msg)) if msg.contains("totalMonthlyFee")));

        let mut l = ledger(dec!(1000), FeeStatus::Pending);
        assert!(l.record_payment(huge, Utc::now()).is_err());
        assert_eq!(l.amount_paid, Decimal::ZERO);
        assert!(l.add_charges(huge, Decimal::ZERO).is_err());
        assert_eq!(l.total_fee(), dec!(1000));

        let due = default_due_date(Month::March, 2025).unwrap();
        assert!(plan_fee_record(&components(max_amount(), dec!(0)), dec!(1), dec!(0), due).is_err());
    }

    #[derive(Deserialize)]
    struct DueDateBody {
        #[serde(default, deserialize_with = "deserialize_due_date")]
        due_date: Option<DateTime<Utc>>,
    }

    fn parse_due(json: serde_json::Value) -> Result<Option<DateTime<Utc>>, serde_json::Error> {
        serde_json::from_value::<DueDateBody>(json).map(|b| b.due_date)
    }

    #[test]
    fn due_date_accepts_calendar_dates_and_timestamps() {
        let midnight = Utc.with_ymd_and_hms(2025, 3, 15, 0, 0, 0).unwrap();
        assert_eq!(parse_due(serde_json::json!({ "due_date": "2025-03-15" })).unwrap(), Some(midnight));
        assert_eq!(
            parse_due(serde_json::json!({ "due_date": "2025-03-15T05:30:00+05:30" })).unwrap(),
            Some(midnight)
        );
        assert_eq!(parse_due(serde_json::json!({})).unwrap(), None);
        assert_eq!(parse_due(serde_json::json!({ "due_date": null })).unwrap(), None);
        assert!(parse_due(serde_json::json!({ "due_date": "15/03/2025" })).is_err());
    }

    #[test]
    fn month_names_are_canonicalised() {
        assert_eq!(parse_month("march").unwrap().name(), "March");
        assert_eq!(parse_month("Sep").unwrap().name(), "September");
        assert!(parse_month("Marchember").is_err());
        assert_eq!(month_ordinal("December"), 12);
        assert_eq!(month_ordinal("nonsense"), 0);
    }

    #[test]
    fn default_due_date_is_tenth_of_period() {
        let due = default_due_date(Month::March, 2025).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap());
    }

    #[test]
    fn generated_record_adds_extra_fees_and_starts_pending() {
        let student = FeeComponents {
            exam_fee: dec!(100),
            other_fee: dec!(50),
            ..components(dec!(5000), dec!(500))
        };
        let due = default_due_date(Month::March, 2025).unwrap();
        let record = plan_fee_record(&student, dec!(200), dec!(25), due).unwrap();

        assert_eq!(record.components.exam_fee, dec!(300));
        assert_eq!(record.components.other_fee, dec!(75));
        assert_eq!(record.total_fee, dec!(5875));
        assert_eq!(record.balance, record.total_fee);
        assert_eq!(record.status, FeeStatus::Pending);
        assert_eq!(record.due_date, due);
    }

    fn ledger(total: Decimal, status: FeeStatus) -> Ledger {
        Ledger {
            components: components(total, Decimal::ZERO),
            amount_paid: Decimal::ZERO,
            status,
            payment_date: None,
        }
    }

    #[test]
    fn installments_settle_to_paid() {
        let now = Utc.with_ymd_and_hms(2025, 3, 5, 12, 0, 0).unwrap();
        let mut l = ledger(dec!(5500), FeeStatus::Pending);

        l.record_payment(dec!(2000), now).unwrap();
        assert_eq!(l.amount_paid, dec!(2000));
        assert_eq!(l.balance(), dec!(3500));
        assert_eq!(l.status, FeeStatus::Pending);
        assert!(l.payment_date.is_none());

        l.record_payment(dec!(3500), now).unwrap();
        assert_eq!(l.amount_paid, dec!(5500));
        assert_eq!(l.balance(), Decimal::ZERO);
        assert_eq!(l.status, FeeStatus::Paid);
        assert_eq!(l.payment_date, Some(now));
    }

    #[test]
    fn partial_payment_never_downgrades_overdue() {
        let mut l = ledger(dec!(1000), FeeStatus::Overdue);
        l.record_payment(dec!(400), Utc::now()).unwrap();
        assert_eq!(l.status, FeeStatus::Overdue);
        assert_eq!(l.balance(), dec!(600));
    }

    #[test]
    fn overpayment_leaves_negative_balance() {
        let mut l = ledger(dec!(1000), FeeStatus::Pending);
        l.record_payment(dec!(1200), Utc::now()).unwrap();
        assert_eq!(l.balance(), dec!(-200));
        assert_eq!(l.status, FeeStatus::Paid);
    }

    #[test]
    fn adding_charges_recomputes_from_stored_components() {
        let mut l = ledger(dec!(1000), FeeStatus::Paid);
        l.amount_paid = dec!(1000);
        l.add_charges(dec!(150), dec!(50)).unwrap();

        assert_eq!(l.components.exam_fee, dec!(150));
        assert_eq!(l.total_fee(), dec!(1200));
        assert_eq!(l.balance(), dec!(200));
        assert_eq!(l.status, FeeStatus::Paid);
    }
}

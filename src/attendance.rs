// src/attendance.rs
//! 考勤汇总与批量标记的输入筛选

use serde::{Deserialize, Serialize};

use crate::models::AttendanceStatus;

/// 学生或班级的出勤统计
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    pub total_days: i64,
    pub present_days: i64,
    pub absent_days: i64,
    pub attendance_percentage: f64,
}

impl AttendanceSummary {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = AttendanceStatus>,
    {
        let (mut present, mut absent) = (0i64, 0i64);
        for status in statuses {
            match status {
                AttendanceStatus::Present => present += 1,
                AttendanceStatus::Absent => absent += 1,
            }
        }
        let total = present + absent;
        Self {
            total_days: total,
            present_days: present,
            absent_days: absent,
            attendance_percentage: percentage(present, total),
        }
    }
}

/// part / whole * 100, 保留两位小数; whole 为 0 时返回 0
pub fn percentage(part: i64, whole: i64) -> f64 {
    if whole <= 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// 批量标记中的单条记录; 字段都可能缺失
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkEntry {
    pub student_id: Option<i32>,
    pub status: Option<String>,
    pub remarks: Option<String>,
}

/// 通过校验的批量条目
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedEntry {
    pub student_id: i32,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
}

impl BulkEntry {
    /// 逐条解析原始 JSON; 字段类型不对的条目与缺字段的一样跳过
    pub fn screen(raw: serde_json::Value) -> Option<AcceptedEntry> {
        serde_json::from_value::<BulkEntry>(raw).ok()?.accept()
    }

    /// 缺少 studentId / status 或 status 非法时返回 None, 由调用方跳过
    pub fn accept(self) -> Option<AcceptedEntry> {
        let student_id = self.student_id.filter(|id| *id > 0)?;
        let status = self.status?.parse::<AttendanceStatus>().ok()?;
        Some(AcceptedEntry {
            student_id,
            status,
            remarks: self.remarks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_has_zero_percentage() {
        let summary = AttendanceSummary::from_statuses(Vec::new());
        assert_eq!(summary.total_days, 0);
        assert_eq!(summary.attendance_percentage, 0.0);
        assert!(!summary.attendance_percentage.is_nan());
    }

    #[test]
    fn percentage_is_rounded_to_two_decimals() {
        use AttendanceStatus::*;
        let summary = AttendanceSummary::from_statuses(vec![Present, Present, Absent]);
        assert_eq!(summary.total_days, 3);
        assert_eq!(summary.present_days, 2);
        assert_eq!(summary.absent_days, 1);
        assert_eq!(summary.attendance_percentage, 66.67);
    }

    #[test]
    fn full_attendance_is_one_hundred() {
        let summary = AttendanceSummary::from_statuses(vec![AttendanceStatus::Present; 20]);
        assert_eq!(summary.attendance_percentage, 100.0);
    }

    #[test]
    fn bulk_entries_missing_fields_are_skipped() {
        let entries: Vec<BulkEntry> = serde_json::from_value(serde_json::json!([
            { "studentId": 1, "status": "PRESENT" },
            { "status": "ABSENT" },
            { "studentId": 3 },
            { "studentId": 4, "status": "LATE" },
            { "studentId": 5, "status": "ABSENT", "remarks": "sick" }
        ]))
        .unwrap();

        let accepted: Vec<AcceptedEntry> = entries.into_iter().filter_map(BulkEntry::accept).collect();
        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[0].student_id, 1);
        assert_eq!(accepted[0].status, AttendanceStatus::Present);
        assert_eq!(accepted[1].remarks.as_deref(), Some("sick"));
    }

    #[test]
    fn wrongly_typed_bulk_entries_are_skipped_individually() {
        let raw = vec![
            serde_json::json!({ "studentId": 7, "status": "PRESENT" }),
            serde_json::json!({ "studentId": "abc", "status": "PRESENT" }),
            serde_json::json!({ "studentId": 7, "status": 1 }),
            serde_json::json!("not an object"),
            serde_json::json!({ "studentId": -3, "status": "ABSENT" }),
        ];

        let accepted: Vec<AcceptedEntry> = raw.into_iter().filter_map(BulkEntry::screen).collect();
        assert_eq!(
            accepted,
            vec![AcceptedEntry {
                student_id: 7,
                status: AttendanceStatus::Present,
                remarks: None,
            }]
        );
    }
}

//! Record types, serialized with the Spanish keys the data files use.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{RecordError, RecordResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Employee {
    pub id: String,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "cargo", default)]
    pub position: String,
    #[serde(rename = "vacaciones_totales")]
    pub vacation_days_total: i64,
    #[serde(rename = "vacaciones_usadas")]
    pub vacation_days_used: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VacationStatus {
    Pendiente,
    Aprobada,
    Rechazada,
}

impl VacationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VacationStatus::Pendiente => "pendiente",
            VacationStatus::Aprobada => "aprobada",
            VacationStatus::Rechazada => "rechazada",
        }
    }
}

impl fmt::Display for VacationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VacationRequest {
    #[serde(rename = "id_solicitud")]
    pub id: String,
    #[serde(rename = "id_empleado")]
    pub employee_id: String,
    #[serde(rename = "nombre_empleado")]
    pub employee_name: String,
    #[serde(rename = "fecha_inicio")]
    pub start: NaiveDate,
    #[serde(rename = "fecha_fin")]
    pub end: NaiveDate,
    #[serde(rename = "dias_solicitados")]
    pub days: i64,
    #[serde(rename = "comentarios", default)]
    pub comments: String,
    #[serde(rename = "estado")]
    pub status: VacationStatus,
    #[serde(rename = "fecha_solicitud")]
    pub requested_at: String,
}

impl VacationRequest {
    pub fn range(&self) -> DateRange {
        DateRange::closed(self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LeaveStatus {
    Activa,
    Finalizada,
}

impl LeaveStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaveStatus::Activa => "activa",
            LeaveStatus::Finalizada => "finalizada",
        }
    }
}

impl fmt::Display for LeaveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SickLeave {
    #[serde(rename = "id_baja")]
    pub id: String,
    #[serde(rename = "id_empleado")]
    pub employee_id: String,
    #[serde(rename = "nombre_empleado")]
    pub employee_name: String,
    #[serde(rename = "fecha_inicio")]
    pub start: NaiveDate,
    /// `None` for an open-ended leave.
    #[serde(rename = "fecha_fin_estimada", default)]
    pub estimated_end: Option<NaiveDate>,
    #[serde(rename = "motivo")]
    pub reason: String,
    #[serde(rename = "tiene_justificante", default)]
    pub has_certificate: bool,
    #[serde(rename = "estado")]
    pub status: LeaveStatus,
    #[serde(rename = "fecha_reporte")]
    pub reported_at: String,
    #[serde(rename = "notas", default)]
    pub notes: String,
}

impl SickLeave {
    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start,
            end: self.estimated_end,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PayConcepts {
    pub base: f64,
    #[serde(rename = "complementos")]
    pub supplements: f64,
    pub irpf: f64,
    pub seguridad_social: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payslip {
    #[serde(rename = "id_nomina")]
    pub id: String,
    #[serde(rename = "id_empleado")]
    pub employee_id: String,
    #[serde(rename = "nombre_empleado")]
    pub employee_name: String,
    /// `YYYY-MM`.
    #[serde(rename = "mes")]
    pub month: String,
    #[serde(rename = "fecha_pago")]
    pub payment_date: String,
    #[serde(rename = "salario_bruto")]
    pub gross: f64,
    #[serde(rename = "deducciones")]
    pub deductions: f64,
    #[serde(rename = "salario_neto")]
    pub net: f64,
    #[serde(rename = "conceptos")]
    pub concepts: PayConcepts,
}

/// Inclusive date interval; `end: None` extends indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn closed(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        let starts_before_other_ends = other.end.is_none_or(|e| self.start <= e);
        let other_starts_before_end = self.end.is_none_or(|e| other.start <= e);
        starts_before_other_ends && other_starts_before_end
    }
}

/// Calendar days from `start` to `end`, both included.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days() + 1
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> RecordResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| RecordError::InvalidDate {
        value: value.to_string(),
        expected: "YYYY-MM-DD",
    })
}

/// Validate a `YYYY-MM` month and return it normalised.
pub fn parse_month(value: &str) -> RecordResult<String> {
    let trimmed = value.trim();
    let valid = trimmed.len() == 7
        && NaiveDate::parse_from_str(&format!("{trimmed}-01"), DATE_FORMAT).is_ok();
    if !valid {
        return Err(RecordError::InvalidDate {
            value: value.to_string(),
            expected: "YYYY-MM",
        });
    }
    Ok(trimmed.to_string())
}

/// Optional filters shared by the list operations.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Compared case-insensitively with the record status.
    pub status: Option<String>,
    /// Keep records starting on or after this date.
    pub from: Option<NaiveDate>,
    /// Keep records ending on or before this date.
    pub to: Option<NaiveDate>,
}

impl RecordFilter {
    /// Build from raw strings; empty strings count as absent.
    pub fn parse(
        status: Option<&str>,
        from: Option<&str>,
        to: Option<&str>,
    ) -> RecordResult<Self> {
        Ok(Self {
            status: non_empty(status).map(str::to_lowercase),
            from: non_empty(from).map(parse_date).transpose()?,
            to: non_empty(to).map(parse_date).transpose()?,
        })
    }

    pub(crate) fn status_matches(&self, status: &str) -> bool {
        self.status.as_deref().is_none_or(|s| s == status)
    }
}

pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Next id after the highest numeric suffix in use, e.g. `SOL004`.
pub(crate) fn next_id<'a>(prefix: &str, existing: impl Iterator<Item = &'a str>) -> String {
    let max = existing
        .filter_map(|id| id.strip_prefix(prefix))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:03}", max + 1)
}

#[derive(Debug, Clone, Serialize)]
pub struct VacationBalance {
    pub employee_id: String,
    pub employee_name: String,
    pub total_days: i64,
    pub used_days: i64,
    /// Days held by requests still `pendiente`.
    pub pending_days: i64,
    pub remaining_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct VacationRequestOutcome {
    pub request: VacationRequest,
    /// Days left once this request is counted.
    pub remaining_days: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SickLeaveReport {
    pub leave: SickLeave,
    pub reminder: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SickLeaveUpdate {
    pub leave: SickLeave,
    pub changes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).unwrap()
    }

    #[test]
    fn test_overlap_is_inclusive() {
        let a = DateRange::closed(d("2025-08-01"), d("2025-08-10"));
        let touching = DateRange::closed(d("2025-08-10"), d("2025-08-12"));
        let after = DateRange::closed(d("2025-08-11"), d("2025-08-12"));
        assert!(a.overlaps(&touching));
        assert!(touching.overlaps(&a));
        assert!(!a.overlaps(&after));
    }

    #[test]
    fn test_open_range_overlaps_everything_after_start() {
        let open = DateRange {
            start: d("2025-03-01"),
            end: None,
        };
        assert!(open.overlaps(&DateRange::closed(d("2030-01-01"), d("2030-01-02"))));
        assert!(!open.overlaps(&DateRange::closed(d("2025-01-01"), d("2025-02-28"))));
    }

    #[test]
    fn test_days_inclusive() {
        assert_eq!(inclusive_days(d("2025-12-15"), d("2025-12-22")), 8);
        assert_eq!(inclusive_days(d("2025-12-15"), d("2025-12-15")), 1);
        assert_eq!(inclusive_days(d("2025-12-29"), d("2026-01-02")), 5);
    }

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2025-11").unwrap(), "2025-11");
        assert!(parse_month("2025-13").is_err());
        assert!(parse_month("2025-1").is_err());
        assert!(parse_month("noviembre").is_err());
    }

    #[test]
    fn test_next_id_uses_max_suffix() {
        let ids = ["SOL001", "SOL007", "SOL003", "otro"];
        assert_eq!(next_id("SOL", ids.iter().copied()), "SOL008");
        assert_eq!(next_id("BM", std::iter::empty()), "BM001");
    }

    #[test]
    fn test_filter_treats_empty_as_absent() {
        let f = RecordFilter::parse(Some("PENDIENTE"), Some(""), None).unwrap();
        assert_eq!(f.status.as_deref(), Some("pendiente"));
        assert!(f.from.is_none());
        assert!(RecordFilter::parse(None, Some("15/12/2025"), None).is_err());
    }

    #[test]
    fn test_sick_leave_null_end_round_trips_as_null() {
        let json = r#"{
            "id_baja": "BM001", "id_empleado": "E001", "nombre_empleado": "Ana",
            "fecha_inicio": "2025-03-01", "fecha_fin_estimada": null,
            "motivo": "Gripe", "tiene_justificante": false, "estado": "activa",
            "fecha_reporte": "2025-03-01 09:00:00", "notas": ""
        }"#;
        let leave: SickLeave = serde_json::from_str(json).unwrap();
        assert!(leave.estimated_end.is_none());
        let back = serde_json::to_value(&leave).unwrap();
        assert!(back["fecha_fin_estimada"].is_null());
    }
}

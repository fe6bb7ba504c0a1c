//! JSON-file HR records: vacation balances and requests, sick leave, payroll.
//!
//! Each collection is a flat JSON array in `[records] data_dir`:
//!
//! | File | Type | Access |
//! |------|------|--------|
//! | `empleados.json` | [`Employee`] | read, required |
//! | `solicitudes_vacaciones.json` | [`VacationRequest`] | read/write |
//! | `bajas_medicas.json` | [`SickLeave`] | read/write |
//! | `nominas.json` | [`Payslip`] | read |
//!
//! Optional files that do not exist read as empty. Mutations hold a single
//! async lock across their read-modify-write cycle and replace files by
//! writing a sibling temp file and renaming it over the original, so a
//! crash never leaves a half-written array behind.

mod error;
mod model;

pub use error::{RecordError, RecordResult};
pub use model::{
    parse_date, parse_month, DateRange, Employee, LeaveStatus, PayConcepts, Payslip,
    RecordFilter, SickLeave, SickLeaveReport, SickLeaveUpdate, VacationBalance, VacationRequest,
    VacationRequestOutcome, VacationStatus, DATE_FORMAT, TIMESTAMP_FORMAT,
};

use chrono::Local;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::config::RecordsConfig;
use model::{inclusive_days, next_id, non_empty};

/// Reminder attached to every sick-leave report.
pub const CERTIFICATE_REMINDER: &str =
    "Recuerda: debes presentar el justificante médico en un plazo máximo de 3 días.";

const DEFAULT_REASON: &str = "No especificado";

pub struct RecordStore {
    config: RecordsConfig,
    write_lock: Mutex<()>,
}

impl RecordStore {
    pub fn new(config: RecordsConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    pub async fn employee(&self, employee_id: &str) -> RecordResult<Employee> {
        let employees: Vec<Employee> = load_array(&self.config.employees_path(), true).await?;
        employees
            .into_iter()
            .find(|e| e.id == employee_id)
            .ok_or_else(|| RecordError::EmployeeNotFound(employee_id.to_string()))
    }

    /// Vacation days left, counting pending requests as already taken.
    pub async fn vacation_balance(&self, employee_id: &str) -> RecordResult<VacationBalance> {
        let employee = self.employee(employee_id).await?;
        let requests: Vec<VacationRequest> =
            load_array(&self.config.vacation_requests_path(), false).await?;
        Ok(balance(&employee, &requests))
    }

    pub async fn request_vacation(
        &self,
        employee_id: &str,
        start: &str,
        end: &str,
        comments: Option<&str>,
    ) -> RecordResult<VacationRequestOutcome> {
        let _guard = self.write_lock.lock().await;

        let employee = self.employee(employee_id).await?;
        let start = parse_date(start)?;
        let end = parse_date(end)?;
        if end < start {
            return Err(RecordError::EndBeforeStart { start, end });
        }
        let range = DateRange::closed(start, end);
        let days = inclusive_days(start, end);

        let path = self.config.vacation_requests_path();
        let mut requests: Vec<VacationRequest> = load_array(&path, false).await?;

        if let Some(clash) = requests.iter().find(|r| {
            r.employee_id == employee_id
                && r.status != VacationStatus::Rechazada
                && r.range().overlaps(&range)
        }) {
            return Err(RecordError::OverlappingVacation {
                existing: clash.id.clone(),
                start: clash.start,
                end: clash.end,
            });
        }

        let current = balance(&employee, &requests);
        if days > current.remaining_days {
            return Err(RecordError::InsufficientDays {
                requested: days,
                available: current.remaining_days,
                total: current.total_days,
            });
        }

        let request = VacationRequest {
            id: next_id("SOL", requests.iter().map(|r| r.id.as_str())),
            employee_id: employee.id.clone(),
            employee_name: employee.name.clone(),
            start,
            end,
            days,
            comments: non_empty(comments).unwrap_or_default().to_string(),
            status: VacationStatus::Pendiente,
            requested_at: now_timestamp(),
        };
        requests.push(request.clone());
        write_array(&path, &requests).await?;

        tracing::info!(
            request_id = %request.id,
            employee_id,
            days,
            "vacation request created"
        );
        Ok(VacationRequestOutcome {
            request,
            remaining_days: current.remaining_days - days,
        })
    }

    pub async fn list_vacation_requests(
        &self,
        employee_id: &str,
        filter: &RecordFilter,
    ) -> RecordResult<Vec<VacationRequest>> {
        let requests: Vec<VacationRequest> =
            load_array(&self.config.vacation_requests_path(), false).await?;
        Ok(requests
            .into_iter()
            .filter(|r| r.employee_id == employee_id)
            .filter(|r| filter.status_matches(r.status.as_str()))
            .filter(|r| filter.from.is_none_or(|from| r.start >= from))
            .filter(|r| filter.to.is_none_or(|to| r.end <= to))
            .collect())
    }

    pub async fn report_sick_leave(
        &self,
        employee_id: &str,
        start: &str,
        estimated_end: Option<&str>,
        reason: Option<&str>,
        notes: Option<&str>,
    ) -> RecordResult<SickLeaveReport> {
        let _guard = self.write_lock.lock().await;

        let employee = self.employee(employee_id).await?;
        let start = parse_date(start)?;
        let estimated_end = non_empty(estimated_end).map(parse_date).transpose()?;
        if let Some(end) = estimated_end {
            if end < start {
                return Err(RecordError::EndBeforeStart { start, end });
            }
        }
        let range = DateRange {
            start,
            end: estimated_end,
        };

        let path = self.config.sick_leaves_path();
        let mut leaves: Vec<SickLeave> = load_array(&path, false).await?;

        let active = leaves
            .iter()
            .filter(|l| l.employee_id == employee_id && l.status == LeaveStatus::Activa);
        for leave in active {
            match leave.estimated_end {
                None => {
                    return Err(RecordError::OpenSickLeave {
                        existing: leave.id.clone(),
                        start: leave.start,
                    })
                }
                Some(end) if leave.range().overlaps(&range) => {
                    return Err(RecordError::OverlappingSickLeave {
                        existing: leave.id.clone(),
                        start: leave.start,
                        end,
                    })
                }
                Some(_) => {}
            }
        }

        let leave = SickLeave {
            id: next_id("BM", leaves.iter().map(|l| l.id.as_str())),
            employee_id: employee.id.clone(),
            employee_name: employee.name.clone(),
            start,
            estimated_end,
            reason: non_empty(reason).unwrap_or(DEFAULT_REASON).to_string(),
            has_certificate: false,
            status: LeaveStatus::Activa,
            reported_at: now_timestamp(),
            notes: non_empty(notes).unwrap_or_default().to_string(),
        };
        leaves.push(leave.clone());
        write_array(&path, &leaves).await?;

        tracing::info!(leave_id = %leave.id, employee_id, "sick leave reported");
        Ok(SickLeaveReport {
            leave,
            reminder: CERTIFICATE_REMINDER.to_string(),
        })
    }

    /// Close or edit the leave of `employee_id` that began on `start`.
    ///
    /// Setting `end` marks the leave `finalizada`.
    pub async fn update_sick_leave(
        &self,
        employee_id: &str,
        start: &str,
        end: Option<&str>,
        reason: Option<&str>,
        notes: Option<&str>,
    ) -> RecordResult<SickLeaveUpdate> {
        let _guard = self.write_lock.lock().await;

        let start = parse_date(start)?;
        let end = non_empty(end).map(parse_date).transpose()?;
        let reason = non_empty(reason);
        let notes = non_empty(notes);

        let path = self.config.sick_leaves_path();
        let mut leaves: Vec<SickLeave> = load_array(&path, false).await?;
        let leave = leaves
            .iter_mut()
            .find(|l| l.employee_id == employee_id && l.start == start)
            .ok_or_else(|| RecordError::SickLeaveNotFound {
                employee_id: employee_id.to_string(),
                start,
            })?;

        let mut changes = Vec::new();
        if let Some(end) = end {
            if end < start {
                return Err(RecordError::EndBeforeStart { start, end });
            }
            leave.estimated_end = Some(end);
            leave.status = LeaveStatus::Finalizada;
            changes.push(format!("Fecha fin establecida a {end} (baja finalizada)"));
        }
        if let Some(reason) = reason {
            leave.reason = reason.to_string();
            changes.push(format!("Motivo actualizado a '{reason}'"));
        }
        if let Some(notes) = notes {
            leave.notes = notes.to_string();
            changes.push("Notas actualizadas".to_string());
        }
        if changes.is_empty() {
            return Err(RecordError::NoChanges);
        }

        let updated = leave.clone();
        write_array(&path, &leaves).await?;

        tracing::info!(leave_id = %updated.id, employee_id, "sick leave updated");
        Ok(SickLeaveUpdate {
            leave: updated,
            changes,
        })
    }

    pub async fn list_sick_leaves(
        &self,
        employee_id: &str,
        filter: &RecordFilter,
    ) -> RecordResult<Vec<SickLeave>> {
        let leaves: Vec<SickLeave> = load_array(&self.config.sick_leaves_path(), false).await?;
        Ok(leaves
            .into_iter()
            .filter(|l| l.employee_id == employee_id)
            .filter(|l| filter.status_matches(l.status.as_str()))
            .filter(|l| filter.from.is_none_or(|from| l.start >= from))
            // an open leave has no end to compare, so `to` excludes it
            .filter(|l| match filter.to {
                Some(to) => l.estimated_end.is_some_and(|end| end <= to),
                None => true,
            })
            .collect())
    }

    /// The payslip for `month` (`YYYY-MM`), or the latest one.
    pub async fn payslip(&self, employee_id: &str, month: Option<&str>) -> RecordResult<Payslip> {
        let month = non_empty(month).map(parse_month).transpose()?;
        let employee = self.employee(employee_id).await?;

        let payroll: Vec<Payslip> = load_array(&self.config.payroll_path(), false).await?;
        let mut own: Vec<Payslip> = payroll
            .into_iter()
            .filter(|p| p.employee_id == employee_id)
            .collect();
        if own.is_empty() {
            return Err(RecordError::PayrollNotFound(format!(
                "{} ({})",
                employee.name, employee.id
            )));
        }
        own.sort_by(|a, b| a.month.cmp(&b.month));

        match month {
            Some(month) => {
                let available: Vec<String> = own.iter().map(|p| p.month.clone()).collect();
                own.into_iter()
                    .find(|p| p.month == month)
                    .ok_or(RecordError::MonthNotFound { month, available })
            }
            None => own
                .pop()
                .ok_or_else(|| RecordError::PayrollNotFound(employee.id.clone())),
        }
    }
}

fn balance(employee: &Employee, requests: &[VacationRequest]) -> VacationBalance {
    let pending: i64 = requests
        .iter()
        .filter(|r| r.employee_id == employee.id && r.status == VacationStatus::Pendiente)
        .map(|r| r.days)
        .sum();
    let remaining =
        (employee.vacation_days_total - employee.vacation_days_used - pending).max(0);

    VacationBalance {
        employee_id: employee.id.clone(),
        employee_name: employee.name.clone(),
        total_days: employee.vacation_days_total,
        used_days: employee.vacation_days_used,
        pending_days: pending,
        remaining_days: remaining,
    }
}

fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

async fn load_array<T: DeserializeOwned>(path: &Path, required: bool) -> RecordResult<Vec<T>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            if required {
                return Err(RecordError::MissingFile(path.to_path_buf()));
            }
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(RecordError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content).map_err(|source| RecordError::Json {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_array<T: Serialize>(path: &Path, items: &[T]) -> RecordResult<()> {
    let io_err = |source| RecordError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut json = serde_json::to_string_pretty(items).map_err(|source| RecordError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    json.push('\n');

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let tmp = tmp_path(path);
    tokio::fs::write(&tmp, json).await.map_err(io_err)?;
    tokio::fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

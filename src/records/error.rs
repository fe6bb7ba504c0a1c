//! Record store errors.
//!
//! Messages are written for the employee reading the assistant's answer,
//! hence in Spanish; [`RecordError::code`] gives clients a stable key.

use chrono::NaiveDate;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("No se encontró ningún empleado con el ID {0}")]
    EmployeeNotFound(String),

    #[error("Fecha inválida '{value}': use el formato {expected}")]
    InvalidDate {
        value: String,
        expected: &'static str,
    },

    #[error("La fecha de fin ({end}) no puede ser anterior a la fecha de inicio ({start})")]
    EndBeforeStart { start: NaiveDate, end: NaiveDate },

    #[error(
        "Solicitud rechazada: no tienes días suficientes. Días solicitados: {requested}, \
         días disponibles: {available} (de {total} totales)"
    )]
    InsufficientDays {
        requested: i64,
        available: i64,
        total: i64,
    },

    #[error("La solicitud {existing} ({start} a {end}) se solapa con estas fechas")]
    OverlappingVacation {
        existing: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error(
        "Ya tienes una baja médica activa que se solapa con estas fechas: {existing} \
         del {start} al {end}. Contacta con RRHH si necesitas modificarla"
    )]
    OverlappingSickLeave {
        existing: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    #[error(
        "Ya tienes una baja médica abierta (sin fecha fin): {existing} desde {start}. \
         Debes finalizarla antes de reportar una nueva"
    )]
    OpenSickLeave { existing: String, start: NaiveDate },

    #[error("No se encontró ninguna baja del empleado {employee_id} que haya comenzado el {start}")]
    SickLeaveNotFound {
        employee_id: String,
        start: NaiveDate,
    },

    #[error("No se proporcionaron cambios para realizar")]
    NoChanges,

    #[error("No se encontraron nóminas para el empleado {0}")]
    PayrollNotFound(String),

    #[error("No se encontró nómina para el mes {month}. Meses disponibles: {}", .available.join(", "))]
    MonthNotFound {
        month: String,
        available: Vec<String>,
    },

    #[error("Required data file not found: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type RecordResult<T> = Result<T, RecordError>;

impl RecordError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            RecordError::EmployeeNotFound(_) => "employee_not_found",
            RecordError::InvalidDate { .. } => "invalid_date",
            RecordError::EndBeforeStart { .. } => "end_before_start",
            RecordError::InsufficientDays { .. } => "insufficient_days",
            RecordError::OverlappingVacation { .. } => "overlapping_vacation",
            RecordError::OverlappingSickLeave { .. } => "overlapping_sick_leave",
            RecordError::OpenSickLeave { .. } => "open_sick_leave",
            RecordError::SickLeaveNotFound { .. } => "sick_leave_not_found",
            RecordError::NoChanges => "no_changes",
            RecordError::PayrollNotFound(_) => "payroll_not_found",
            RecordError::MonthNotFound { .. } => "month_not_found",
            RecordError::MissingFile(_) => "missing_data_file",
            RecordError::Io { .. } => "io_error",
            RecordError::Json { .. } => "invalid_data_file",
        }
    }

    /// HTTP status the server answers with.
    pub fn http_status(&self) -> u16 {
        match self {
            RecordError::EmployeeNotFound(_)
            | RecordError::SickLeaveNotFound { .. }
            | RecordError::PayrollNotFound(_)
            | RecordError::MonthNotFound { .. } => 404,
            RecordError::InvalidDate { .. }
            | RecordError::EndBeforeStart { .. }
            | RecordError::NoChanges => 400,
            RecordError::InsufficientDays { .. }
            | RecordError::OverlappingVacation { .. }
            | RecordError::OverlappingSickLeave { .. }
            | RecordError::OpenSickLeave { .. } => 409,
            RecordError::MissingFile(_) | RecordError::Io { .. } | RecordError::Json { .. } => {
                500
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_month_not_found_lists_months() {
        let err = RecordError::MonthNotFound {
            month: "2025-01".into(),
            available: vec!["2025-10".into(), "2025-11".into()],
        };
        assert!(err.to_string().ends_with("2025-10, 2025-11"));
        assert_eq!(err.code(), "month_not_found");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_conflicts_map_to_409() {
        let err = RecordError::InsufficientDays {
            requested: 10,
            available: 3,
            total: 22,
        };
        assert_eq!(err.http_status(), 409);
        assert!(err.to_string().contains("10"));
    }
}

//! Mapping of SeaORM errors into tenancy errors.

use pgtenancy::TenancyError;
use sea_orm::{DbErr, SqlErr};

/// Convert a [`DbErr`] into the matching [`TenancyError`].
///
/// Pool and connection failures become `Connection`; everything else is a
/// `Storage` error. Messages come from the database driver and never include
/// the statement text.
pub fn map_db_err(err: DbErr) -> TenancyError {
    match err {
        DbErr::Conn(e) => TenancyError::Connection(e.to_string()),
        DbErr::ConnectionAcquire(e) => TenancyError::Connection(e.to_string()),
        DbErr::RecordNotFound(what) => TenancyError::NotFound(what),
        other => match other.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => {
                TenancyError::Storage(format!("duplicate value: {}", message))
            }
            _ => TenancyError::Storage(other.to_string()),
        },
    }
}

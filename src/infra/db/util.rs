use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Duplicate {
            constraint: db.constraint().unwrap_or("unknown").to_string(),
        },
        sqlx::Error::Database(db)
            if db.is_foreign_key_violation() || db.message().contains("invalid input syntax") =>
        {
            RepoError::InvalidInput {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db) if db.is_check_violation() || db.message().contains("violates") => {
            RepoError::Integrity {
                message: db.message().to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        other => RepoError::from_persistence(other),
    }
}

/// Status codes are stored as `SMALLINT`.
pub(super) fn status_to_db(status: u16) -> Result<i16, RepoError> {
    i16::try_from(status).map_err(|_| RepoError::InvalidInput {
        message: format!("status {status} is out of range"),
    })
}

pub(super) fn status_from_db(status: i16) -> Result<u16, RepoError> {
    u16::try_from(status)
        .map_err(|_| RepoError::from_persistence(format!("stored status {status} is negative")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            RepoError::NotFound
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }

    #[test]
    fn status_codes_fit_smallint() {
        assert_eq!(status_to_db(404).expect("fits"), 404);
        assert_eq!(status_from_db(503).expect("fits"), 503);
        assert!(status_to_db(u16::MAX).is_err());
        assert!(status_from_db(-1).is_err());
    }
}

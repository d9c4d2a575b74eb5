#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Coordinator lock '{path}' not acquired within {timeout_ms} ms")]
    LockTimeout { path: String, timeout_ms: u64 },

    #[error("Rotation already in progress")]
    RotationInProgress,

    #[error("No IDE state handler configured (set paths.handler_command)")]
    HandlerNotConfigured,

    #[error("State handler command '{command}' failed: {message}")]
    HandlerFailed { command: String, message: String },

    #[error("Account pool is full (max {max} accounts)")]
    PoolFull { max: usize },

    #[error("Account '{0}' already exists")]
    AccountExists(String),

    #[error("Account '{0}' not found")]
    AccountNotFound(String),

    #[error("Cannot rotate: {0}")]
    PoolRotation(String),

    #[error("Unsupported export format '{0}' (expected json or csv)")]
    UnsupportedExportFormat(String),

    #[error("State directory could not be determined")]
    StateDirUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_lock_timeout() {
        let err = AppError::LockTimeout {
            path: "/tmp/service_state.lock".into(),
            timeout_ms: 5000,
        };
        assert_eq!(
            err.to_string(),
            "Coordinator lock '/tmp/service_state.lock' not acquired within 5000 ms"
        );
    }

    #[test]
    fn test_display_handler_failed() {
        let err = AppError::HandlerFailed {
            command: "ide-handler".into(),
            message: "exit status 2".into(),
        };
        assert_eq!(
            err.to_string(),
            "State handler command 'ide-handler' failed: exit status 2"
        );
    }

    #[test]
    fn test_display_pool_errors() {
        assert_eq!(
            AppError::PoolFull { max: 2 }.to_string(),
            "Account pool is full (max 2 accounts)"
        );
        assert_eq!(
            AppError::AccountNotFound("a1".into()).to_string(),
            "Account 'a1' not found"
        );
        assert_eq!(
            AppError::PoolRotation("only one account in pool".into()).to_string(),
            "Cannot rotate: only one account in pool"
        );
    }

    #[test]
    fn test_display_export_format() {
        assert_eq!(
            AppError::UnsupportedExportFormat("xml".into()).to_string(),
            "Unsupported export format 'xml' (expected json or csv)"
        );
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AppError>();
    }
}

//! Exit codes following sysexits.h conventions.

use keyward_core::{DecodeError, WebAuthnError};

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Invalid arguments. EX_USAGE.
pub const USAGE_ERROR: i32 = 64;

/// Malformed or invalid WebAuthn data. EX_DATAERR.
pub const DATA_ERROR: i32 = 65;

/// Cannot open input file. EX_NOINPUT.
pub const INPUT_ERROR: i32 = 66;

/// Cannot write output. EX_IOERR.
pub const IO_ERROR: i32 = 74;

/// Exit code plus the message to print.
#[derive(Debug)]
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let is_data_error = err.chain().any(|cause| {
            cause.downcast_ref::<WebAuthnError>().is_some()
                || cause.downcast_ref::<DecodeError>().is_some()
        });

        let code = if message.starts_with("Failed to read") {
            INPUT_ERROR
        } else if message.starts_with("Invalid argument") {
            USAGE_ERROR
        } else if is_data_error || message.starts_with("Malformed") {
            DATA_ERROR
        } else if message.starts_with("Failed to write") {
            IO_ERROR
        } else {
            GENERAL_ERROR
        };

        Self {
            code,
            message: Some(message),
        }
    }
}

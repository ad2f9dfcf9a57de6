use super::proto::{Status, CODE_OK};
use crate::error::{Error, Result};

/// Only `code == OK` is success. Anything else is retryable.
pub fn check(status: &Status) -> Result<()> {
    if status.code == CODE_OK {
        Ok(())
    } else {
        Err(Error::DatahubStatus {
            code: status.code,
            message: status.message.clone(),
        })
    }
}

/// Like [`check`] for list responses, where the envelope may be absent.
pub fn check_envelope(status: Option<&Status>) -> Result<()> {
    status.ok_or(Error::MissingStatus).and_then(check)
}

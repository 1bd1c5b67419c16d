use crate::model::Segment;

/// Rejections from the host configuration service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("content is {len} bytes, the limit is {max}")]
    ContentTooLarge { len: usize, max: usize },
    #[error("segment `{0}` is not writable from the extension")]
    InvalidSegment(Segment),
    #[error("version must not be empty")]
    InvalidVersion,
    #[error("configuration service is not enabled for this extension")]
    Unavailable,
}

/// Everything that can end a save attempt. The Display text is the status
/// line shown to the broadcaster; none of these end the session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaveError {
    #[error("Please select a date and time")]
    MissingDate,
    #[error("Could not read the selected date and time")]
    InvalidDate,
    #[error("Please select a FUTURE date")]
    PastDate,
    #[error("Only the broadcaster can save configuration")]
    Unauthorized,
    #[error("A save is already in progress")]
    SaveInProgress,
    #[error("Save failed: {0}")]
    WriteRejected(#[from] StoreError),
    #[error("Configuration content is empty after save")]
    EmptyAfterWrite,
    #[error("Could not parse saved configuration: {0}")]
    ParseError(String),
    #[error("Data verification failed - please try saving again")]
    VerificationMismatch,
}

impl SaveError {
    /// Rejected before anything was sent to the store.
    pub fn is_rejected_locally(&self) -> bool {
        matches!(
            self,
            SaveError::MissingDate
                | SaveError::InvalidDate
                | SaveError::PastDate
                | SaveError::Unauthorized
                | SaveError::SaveInProgress
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_wrap_into_write_rejected() {
        let err: SaveError = StoreError::ContentTooLarge {
            len: 6000,
            max: 5120,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Save failed: content is 6000 bytes, the limit is 5120"
        );
        assert!(!err.is_rejected_locally());
    }

    #[test]
    fn local_rejections() {
        assert!(SaveError::PastDate.is_rejected_locally());
        assert!(!SaveError::VerificationMismatch.is_rejected_locally());
    }
}

//! Error types for the RenderStream native boundary

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for native boundary operations
pub type Result<T> = std::result::Result<T, RenderStreamError>;

/// Raw result codes returned by every plugin entry point.
///
/// Values are read from native calls as `u32` and converted with
/// [`RsErrorCode::from_raw`], so an unknown code can never produce an
/// invalid enum value.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RsErrorCode {
    Success = 0,
    NotInitialised,
    AlreadyInitialised,
    InvalidHandle,
    MaxSendersReached,
    BadStreamType,
    NotFound,
    IncorrectSchema,
    InvalidParameters,
    BufferOverflow,
    Timeout,
    StreamsChanged,
    IncompatibleVersion,
    FailedToGetDxDeviceFromResource,
    FailedToInitialiseGpGpu,
    Quit,
    Unspecified,
}

impl RsErrorCode {
    /// Convert a raw code, mapping anything unknown to `Unspecified`
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Success,
            1 => Self::NotInitialised,
            2 => Self::AlreadyInitialised,
            3 => Self::InvalidHandle,
            4 => Self::MaxSendersReached,
            5 => Self::BadStreamType,
            6 => Self::NotFound,
            7 => Self::IncorrectSchema,
            8 => Self::InvalidParameters,
            9 => Self::BufferOverflow,
            10 => Self::Timeout,
            11 => Self::StreamsChanged,
            12 => Self::IncompatibleVersion,
            13 => Self::FailedToGetDxDeviceFromResource,
            14 => Self::FailedToInitialiseGpGpu,
            15 => Self::Quit,
            _ => Self::Unspecified,
        }
    }

    /// Raw ABI value
    pub fn to_raw(self) -> u32 {
        self as u32
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Counted fetches retry on this code
    pub fn is_retryable(self) -> bool {
        self == Self::BufferOverflow
    }

    /// Codes that are part of normal frame flow and never a failure
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Timeout | Self::StreamsChanged)
    }

    /// Codes after which the session cannot continue
    pub fn is_session_ending(self) -> bool {
        matches!(
            self,
            Self::IncompatibleVersion
                | Self::FailedToGetDxDeviceFromResource
                | Self::FailedToInitialiseGpGpu
                | Self::Quit
        )
    }

    /// Convert into a `Result`, keeping `Success` as `Ok`
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Success => Ok(()),
            code => Err(RenderStreamError::from(code)),
        }
    }
}

impl fmt::Display for RsErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Success => "RS_ERROR_SUCCESS",
            Self::NotInitialised => "RS_NOT_INITIALISED",
            Self::AlreadyInitialised => "RS_ERROR_ALREADYINITIALISED",
            Self::InvalidHandle => "RS_ERROR_INVALIDHANDLE",
            Self::MaxSendersReached => "RS_MAXSENDERSREACHED",
            Self::BadStreamType => "RS_ERROR_BADSTREAMTYPE",
            Self::NotFound => "RS_ERROR_NOTFOUND",
            Self::IncorrectSchema => "RS_ERROR_INCORRECTSCHEMA",
            Self::InvalidParameters => "RS_ERROR_INVALID_PARAMETERS",
            Self::BufferOverflow => "RS_ERROR_BUFFER_OVERFLOW",
            Self::Timeout => "RS_ERROR_TIMEOUT",
            Self::StreamsChanged => "RS_ERROR_STREAMS_CHANGED",
            Self::IncompatibleVersion => "RS_ERROR_INCOMPATIBLE_VERSION",
            Self::FailedToGetDxDeviceFromResource => "RS_ERROR_FAILED_TO_GET_DXDEVICE_FROM_RESOURCE",
            Self::FailedToInitialiseGpGpu => "RS_ERROR_FAILED_TO_INITIALISE_GPGPU",
            Self::Quit => "RS_ERROR_QUIT",
            Self::Unspecified => "RS_ERROR_UNSPECIFIED",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by the native boundary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderStreamError {
    /// The function table is not loaded, or has been shut down
    #[error("RenderStream is not initialised")]
    NotInitialized,

    #[error("RenderStream is already initialised")]
    AlreadyInitialized,

    #[error("Invalid stream or image handle")]
    InvalidHandle,

    /// Maximum number of frame senders reached
    #[error("Maximum number of frame senders reached")]
    ResourceExhausted,

    #[error("Bad stream type")]
    BadStreamType,

    #[error("Not found")]
    NotFound,

    #[error("Incorrect schema: {0}")]
    IncorrectSchema(String),

    #[error("Invalid parameters")]
    InvalidParameters,

    /// The supplied buffer was too small; counted fetches retry on this
    #[error("Buffer overflow")]
    BufferOverflow,

    #[error("Timed out waiting for frame data")]
    Timeout,

    #[error("Streams changed")]
    StreamsChanged,

    #[error("Incompatible RenderStream version, expected {expected_major}.{expected_minor}")]
    IncompatibleVersion {
        expected_major: i32,
        expected_minor: i32,
    },

    #[error("Failed to initialise GPU interop ({0})")]
    FailedGpuInterop(RsErrorCode),

    #[error("Quit requested by host")]
    Quit,

    #[error("Unspecified RenderStream error")]
    Unspecified,

    /// No plugin library could be located on this machine
    #[error("Failed to find {library}: {reason}")]
    LibraryNotFound {
        library: String,
        reason: String,
    },

    /// The plugin library exists but could not be loaded
    #[error("Failed to load library '{path}': {message}")]
    LoadFailed {
        path: PathBuf,
        message: String,
    },

    /// One or more entry points failed to resolve
    #[error("Missing entry points: {}", .0.join(", "))]
    MissingSymbols(Vec<String>),

    /// A string could not be passed across the boundary (interior NUL)
    #[error("String cannot cross the native boundary: {0:?}")]
    InvalidString(String),
}

impl RenderStreamError {
    /// Create a load error
    pub fn load_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        RenderStreamError::LoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Whether the error ends the session rather than a single frame
    pub fn is_session_ending(&self) -> bool {
        matches!(
            self,
            RenderStreamError::IncompatibleVersion { .. }
                | RenderStreamError::FailedGpuInterop(_)
                | RenderStreamError::Quit
                | RenderStreamError::MissingSymbols(_)
        )
    }
}

impl From<RsErrorCode> for RenderStreamError {
    fn from(code: RsErrorCode) -> Self {
        match code {
            // Success never reaches here through into_result
            RsErrorCode::Success | RsErrorCode::Unspecified => RenderStreamError::Unspecified,
            RsErrorCode::NotInitialised => RenderStreamError::NotInitialized,
            RsErrorCode::AlreadyInitialised => RenderStreamError::AlreadyInitialized,
            RsErrorCode::InvalidHandle => RenderStreamError::InvalidHandle,
            RsErrorCode::MaxSendersReached => RenderStreamError::ResourceExhausted,
            RsErrorCode::BadStreamType => RenderStreamError::BadStreamType,
            RsErrorCode::NotFound => RenderStreamError::NotFound,
            RsErrorCode::IncorrectSchema => {
                RenderStreamError::IncorrectSchema("rejected by plugin".into())
            }
            RsErrorCode::InvalidParameters => RenderStreamError::InvalidParameters,
            RsErrorCode::BufferOverflow => RenderStreamError::BufferOverflow,
            RsErrorCode::Timeout => RenderStreamError::Timeout,
            RsErrorCode::StreamsChanged => RenderStreamError::StreamsChanged,
            RsErrorCode::IncompatibleVersion => RenderStreamError::IncompatibleVersion {
                expected_major: crate::ffi::RENDER_STREAM_VERSION_MAJOR,
                expected_minor: crate::ffi::RENDER_STREAM_VERSION_MINOR,
            },
            RsErrorCode::FailedToGetDxDeviceFromResource | RsErrorCode::FailedToInitialiseGpGpu => {
                RenderStreamError::FailedGpuInterop(code)
            }
            RsErrorCode::Quit => RenderStreamError::Quit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_round_trip_and_unknown() {
        for raw in 0..=16 {
            assert_eq!(RsErrorCode::from_raw(raw).to_raw(), raw);
        }
        assert_eq!(RsErrorCode::from_raw(999), RsErrorCode::Unspecified);
    }

    #[test]
    fn test_classification() {
        assert!(RsErrorCode::BufferOverflow.is_retryable());
        assert!(!RsErrorCode::Timeout.is_retryable());
        assert!(RsErrorCode::Timeout.is_transient());
        assert!(RsErrorCode::StreamsChanged.is_transient());
        assert!(RsErrorCode::Quit.is_session_ending());
        assert!(RsErrorCode::IncompatibleVersion.is_session_ending());
        assert!(!RsErrorCode::NotFound.is_session_ending());
    }

    #[test]
    fn test_gpu_codes_map_to_interop_failure() {
        let err = RenderStreamError::from(RsErrorCode::FailedToInitialiseGpGpu);
        assert!(matches!(err, RenderStreamError::FailedGpuInterop(_)));
        assert!(err.is_session_ending());

        let err = RenderStreamError::from(RsErrorCode::FailedToGetDxDeviceFromResource);
        assert!(matches!(err, RenderStreamError::FailedGpuInterop(_)));
    }

    #[test]
    fn test_into_result() {
        assert!(RsErrorCode::Success.into_result().is_ok());
        assert_eq!(
            RsErrorCode::MaxSendersReached.into_result(),
            Err(RenderStreamError::ResourceExhausted)
        );
    }

    #[test]
    fn test_missing_symbols_message_lists_all() {
        let err = RenderStreamError::MissingSymbols(vec!["rs_a".into(), "rs_b".into()]);
        assert_eq!(err.to_string(), "Missing entry points: rs_a, rs_b");
    }
}

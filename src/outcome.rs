// Result of one update check, with the stable integer codes callers log and compare

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A profile qualified but the policy said not to install it
    UpdateAvailable,
    /// No manifest entry targets this board/device/config
    NoUpdateProfileFound,
    /// An entry targets this device but its version does not qualify
    NoUpdateAvailable,
    /// Image installed and committed, still running the old one
    UpdateOk,
    /// Image committed and the policy wants a restart now
    RestartRequested,
    /// Server answered with a non-2xx status
    HttpStatus(u16),
    /// Transport failed before any status was known
    HttpFailed,
    WriteError,
    JsonProblem,
    /// No update partition could be opened
    OtaUpdateFail,
}

impl UpdateOutcome {
    pub const UPDATE_AVAILABLE: i32 = -3;
    pub const NO_UPDATE_PROFILE_FOUND: i32 = -2;
    pub const NO_UPDATE_AVAILABLE: i32 = -1;
    pub const UPDATE_OK: i32 = 0;
    pub const HTTP_FAILED: i32 = 1;
    pub const WRITE_ERROR: i32 = 2;
    pub const JSON_PROBLEM: i32 = 3;
    pub const OTA_UPDATE_FAIL: i32 = 4;

    /// Stable numeric code; HTTP statuses are passed through as-is
    pub fn code(&self) -> i32 {
        match self {
            Self::UpdateAvailable => Self::UPDATE_AVAILABLE,
            Self::NoUpdateProfileFound => Self::NO_UPDATE_PROFILE_FOUND,
            Self::NoUpdateAvailable => Self::NO_UPDATE_AVAILABLE,
            Self::UpdateOk | Self::RestartRequested => Self::UPDATE_OK,
            Self::HttpStatus(status) => i32::from(*status),
            Self::HttpFailed => Self::HTTP_FAILED,
            Self::WriteError => Self::WRITE_ERROR,
            Self::JsonProblem => Self::JSON_PROBLEM,
            Self::OtaUpdateFail => Self::OTA_UPDATE_FAIL,
        }
    }

    /// Classify a transport status that was not a success.
    ///
    /// Anything that is not a plausible HTTP status collapses to `HttpFailed`.
    pub fn from_http_status(status: i32) -> Self {
        match u16::try_from(status) {
            Ok(code) if code > 0 => Self::HttpStatus(code),
            _ => Self::HttpFailed,
        }
    }

    /// Nothing went wrong, whether or not anything was installed
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::UpdateAvailable
                | Self::NoUpdateProfileFound
                | Self::NoUpdateAvailable
                | Self::UpdateOk
                | Self::RestartRequested
        )
    }
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpdateAvailable => write!(f, "update available"),
            Self::NoUpdateProfileFound => write!(f, "no update profile found"),
            Self::NoUpdateAvailable => write!(f, "no update available"),
            Self::UpdateOk => write!(f, "update ok"),
            Self::RestartRequested => write!(f, "update ok, restart requested"),
            Self::HttpStatus(status) => write!(f, "HTTP {}", status),
            Self::HttpFailed => write!(f, "HTTP request failed"),
            Self::WriteError => write!(f, "write error"),
            Self::JsonProblem => write!(f, "manifest problem"),
            Self::OtaUpdateFail => write!(f, "could not begin OTA update"),
        }
    }
}

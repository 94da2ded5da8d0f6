// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Share status codes and the error value that carries them.

use std::fmt;

use crate::obex::{ObexError, ResponseCode};

/// Status of one share, persisted as its numeric code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareStatus {
    Pending,
    Running,
    Success,
    Forbidden,
    NotAcceptable,
    Canceled,
    UnknownError,
    FileError,
    UnhandledObexCode,
    ObexDataError,
    ConnectionError,
}

impl ShareStatus {
    pub fn code(&self) -> i32 {
        match self {
            ShareStatus::Pending => 190,
            ShareStatus::Running => 192,
            ShareStatus::Success => 200,
            ShareStatus::Forbidden => 403,
            ShareStatus::NotAcceptable => 406,
            ShareStatus::Canceled => 490,
            ShareStatus::UnknownError => 491,
            ShareStatus::FileError => 492,
            ShareStatus::UnhandledObexCode => 495,
            ShareStatus::ObexDataError => 496,
            ShareStatus::ConnectionError => 497,
        }
    }

    /// Unknown codes map to `UnknownError`.
    pub fn from_code(code: i32) -> Self {
        match code {
            190 => ShareStatus::Pending,
            192 => ShareStatus::Running,
            200 => ShareStatus::Success,
            403 => ShareStatus::Forbidden,
            406 => ShareStatus::NotAcceptable,
            490 => ShareStatus::Canceled,
            492 => ShareStatus::FileError,
            495 => ShareStatus::UnhandledObexCode,
            496 => ShareStatus::ObexDataError,
            497 => ShareStatus::ConnectionError,
            _ => ShareStatus::UnknownError,
        }
    }

    pub fn is_error(&self) -> bool {
        (400..600).contains(&self.code())
    }

    pub fn is_completed(&self) -> bool {
        self.code() >= 200
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareStatus::Pending => "pending",
            ShareStatus::Running => "running",
            ShareStatus::Success => "success",
            ShareStatus::Forbidden => "forbidden",
            ShareStatus::NotAcceptable => "not acceptable",
            ShareStatus::Canceled => "canceled",
            ShareStatus::UnknownError => "unknown error",
            ShareStatus::FileError => "file error",
            ShareStatus::UnhandledObexCode => "unhandled OBEX code",
            ShareStatus::ObexDataError => "OBEX data error",
            ShareStatus::ConnectionError => "connection error",
        }
    }

    /// Status for a refused OBEX response.
    pub fn from_refusal(code: ResponseCode) -> Self {
        match code {
            ResponseCode::FORBIDDEN | ResponseCode::NOT_ACCEPTABLE => ShareStatus::Forbidden,
            ResponseCode::UNSUPPORTED_TYPE => ShareStatus::NotAcceptable,
            _ => ShareStatus::UnknownError,
        }
    }
}

impl fmt::Display for ShareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.as_str(), self.code())
    }
}

/// A failed step: the status reported upward plus what caused it.
#[derive(Debug, thiserror::Error)]
#[error("{status}")]
pub struct StatusError {
    pub status: ShareStatus,
    #[source]
    pub cause: Option<ObexError>,
}

impl StatusError {
    pub fn new(status: ShareStatus) -> Self {
        Self { status, cause: None }
    }

    pub fn with_cause(status: ShareStatus, cause: ObexError) -> Self {
        Self {
            status,
            cause: Some(cause),
        }
    }
}

impl From<ObexError> for StatusError {
    /// Transport and framing failures collapse to `UnknownError`.
    fn from(e: ObexError) -> Self {
        Self::with_cause(ShareStatus::UnknownError, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for status in [
            ShareStatus::Pending,
            ShareStatus::Success,
            ShareStatus::Forbidden,
            ShareStatus::ConnectionError,
        ] {
            assert_eq!(ShareStatus::from_code(status.code()), status);
        }
        assert_eq!(ShareStatus::from_code(12345), ShareStatus::UnknownError);
    }

    #[test]
    fn test_error_ranges() {
        assert!(!ShareStatus::Running.is_error());
        assert!(!ShareStatus::Running.is_completed());
        assert!(ShareStatus::Success.is_completed());
        assert!(!ShareStatus::Success.is_error());
        assert!(ShareStatus::Canceled.is_error());
    }

    #[test]
    fn test_refusal_translation() {
        assert_eq!(
            ShareStatus::from_refusal(ResponseCode::NOT_ACCEPTABLE),
            ShareStatus::Forbidden
        );
        assert_eq!(
            ShareStatus::from_refusal(ResponseCode::UNSUPPORTED_TYPE),
            ShareStatus::NotAcceptable
        );
        assert_eq!(
            ShareStatus::from_refusal(ResponseCode::INTERNAL_ERROR),
            ShareStatus::UnknownError
        );
    }

    #[test]
    fn test_status_error_keeps_cause() {
        let err = StatusError::from(ObexError::Disconnected);
        assert_eq!(err.status, ShareStatus::UnknownError);
        assert!(matches!(err.cause, Some(ObexError::Disconnected)));
        assert_eq!(err.to_string(), "unknown error (491)");
    }
}

// This file is part of Abr360.
//
// Abr360 is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Abr360 is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with Abr360.  If not, see <http://www.gnu.org/licenses/>.
//! The error enumeration component contracts return across the simulation
//! core (§7): configuration errors, input-shape mismatches, and numeric
//! failures. Concrete enum with hand-written `Display`/`source`, matching
//! this lineage's preference over a derive-macro error crate.
use std::fmt;

mod config;

pub use config::{FieldOfView, StreamingConfig};

/// Which of the three error families in §7 a failure belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AbrErrorKind {
    /// Empty ladder, non-increasing ladder, `TilingCount <= 0`, segment
    /// seconds `<= 0`, max buffer `<= 0`, unknown option variant tag.
    Configuration,
    /// Network-trace duration shorter than viewport-trace duration by more
    /// than one segment; mismatched session counts.
    InputShape,
    /// NaN/Inf survives the trace-ingestion clamping path.
    Numeric,
}

impl fmt::Display for AbrErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            AbrErrorKind::Configuration => "configuration",
            AbrErrorKind::InputShape => "input shape",
            AbrErrorKind::Numeric => "numeric",
        };
        write!(f, "{label}")
    }
}

/// A single component-boundary failure.
#[derive(Clone, Debug)]
pub struct AbrError {
    kind: AbrErrorKind,
    message: String,
}

impl AbrError {
    pub fn new(kind: AbrErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AbrErrorKind::Configuration, message)
    }

    pub fn input_shape(message: impl Into<String>) -> Self {
        Self::new(AbrErrorKind::InputShape, message)
    }

    pub fn numeric(message: impl Into<String>) -> Self {
        Self::new(AbrErrorKind::Numeric, message)
    }

    pub fn kind(&self) -> AbrErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AbrError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for AbrError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

/// Result alias component contracts return.
pub type AbrResult<T> = Result<T, AbrError>;

/// The `(session index, segment index, kind)` tuple §7 asks the simulator
/// to report when it aborts a session. `segment_index` is `None` when the
/// failure happened before the per-segment loop started (e.g. at
/// construction time, validating options against `StreamingConfig`).
#[derive(Clone, Debug)]
pub struct SessionFailure {
    pub session_index: usize,
    pub segment_index: Option<usize>,
    pub error: AbrError,
}

impl SessionFailure {
    pub fn new(session_index: usize, segment_index: Option<usize>, error: AbrError) -> Self {
        Self {
            session_index,
            segment_index,
            error,
        }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.segment_index {
            Some(segment) => write!(
                f,
                "session {} failed at segment {} ({}): {}",
                self.session_index,
                segment,
                self.error.kind(),
                self.error.message()
            ),
            None => write!(
                f,
                "session {} failed before simulation started ({}): {}",
                self.session_index,
                self.error.kind(),
                self.error.message()
            ),
        }
    }
}

impl std::error::Error for SessionFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = AbrError::configuration("empty bitrate ladder");
        assert_eq!(err.kind(), AbrErrorKind::Configuration);
        assert_eq!(format!("{err}"), "configuration: empty bitrate ladder");
    }

    #[test]
    fn session_failure_without_segment_reports_construction_time_failure() {
        let failure = SessionFailure::new(3, None, AbrError::numeric("NaN throughput sample"));
        assert!(format!("{failure}").contains("before simulation started"));
    }

    #[test]
    fn session_failure_with_segment_reports_both_indices() {
        let failure = SessionFailure::new(2, Some(7), AbrError::input_shape("trace too short"));
        let rendered = format!("{failure}");
        assert!(rendered.contains("session 2"));
        assert!(rendered.contains("segment 7"));
    }
}

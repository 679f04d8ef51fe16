//! Error kinds of the selection pipeline
//!
//! Only [`ConfigurationError`] is fatal, and it can only occur before the
//! first event is processed. All other kinds are scoped to one candidate or one
//! event, and are counted in [`Diagnostics`](crate::aggregator::Diagnostics)
//! rather than aborting the run.

use crate::event::EventId;

/// Invalid, missing or inconsistent configuration
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigurationError {
    /// A line could not be decoded
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// A key that this program does not know about
    #[error("line {line}: unrecognized configuration key \"{key}\"")]
    UnknownKey { line: usize, key: String },

    /// A required parameter was never provided
    #[error("missing configuration of {0}")]
    Missing(&'static str),

    /// A parameter or named entity was declared twice
    #[error("duplicate {kind} \"{name}\"")]
    Duplicate { kind: &'static str, name: String },

    /// The cut list is empty
    #[error("at least one cut must be configured")]
    NoCuts,

    /// The cut list does not fit in a cut vector
    #[error("{0} cuts were configured, but at most {max} are supported", max = crate::cuts::MAX_CUTS)]
    TooManyCuts(usize),

    /// A parameter was parsed, but its value makes no sense
    #[error("invalid {name}: {reason}")]
    Invalid { name: String, reason: String },

    /// Something refers to a site or cut which was not declared
    #[error("unknown {kind} \"{name}\"")]
    UnknownReference { kind: &'static str, name: String },
}

/// The trajectory never crosses the target plane
#[derive(Clone, Copy, Debug, thiserror::Error, PartialEq, Eq)]
#[error("trajectory is parallel to the target plane")]
pub struct ParallelTrajectory;

/// A cut or histogram needed a feature that the candidate does not carry
#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
#[error("candidate lacks the {0} feature")]
pub struct MissingFeature(pub &'static str);

/// An event record which cannot be processed at all
#[derive(Clone, Debug, thiserror::Error, PartialEq)]
pub enum MalformedEvent {
    /// The raw record could not be decoded
    #[error("record {record}: {reason}")]
    Unparseable { record: usize, reason: String },

    /// The event source failed while reading the record
    #[error("record {record}: read failure: {reason}")]
    Unreadable { record: usize, reason: String },

    /// A candidate carries a NaN or infinite quantity
    #[error("event {event}, candidate {candidate}: non-finite {field}")]
    NonFinite {
        event: EventId,
        candidate: usize,
        field: &'static str,
    },

    /// A candidate carries a negative energy or weight
    #[error("event {event}, candidate {candidate}: negative {field}")]
    Negative {
        event: EventId,
        candidate: usize,
        field: &'static str,
    },
}

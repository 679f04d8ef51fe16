//! This module defines the properties and storage of input events

use crate::{
    error::MalformedEvent,
    linalg::{self, Vector3},
    numeric::Float,
};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Event-level metadata identifying an interaction
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct EventId {
    /// Run number
    pub run: u32,

    /// Sub-run number
    pub subrun: u32,

    /// Event number within the sub-run
    pub event: u32,
}

impl Display for EventId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}:{}:{}", self.run, self.subrun, self.event)
    }
}

/// Decay parent of a flux candidate
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Parent {
    /// PDG code of the parent particle
    pub pdg: i32,

    /// Parent momentum at the decay point (GeV)
    pub momentum: Vector3,
}

/// A true or reconstructed particle to be selected
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Candidate {
    /// PDG code of the particle
    pub pdg: i32,

    /// Energy (GeV)
    pub energy: Float,

    /// Production vertex (cm)
    pub position: Vector3,

    /// Momentum, which also gives the direction of flight (GeV)
    pub momentum: Vector3,

    /// Decay parent, if known
    #[serde(default)]
    pub parent: Option<Parent>,

    /// Statistical weight of this candidate in histograms
    #[serde(default = "unit_weight")]
    pub weight: Float,
}

fn unit_weight() -> Float {
    1.
}

impl Candidate {
    /// Build an unweighted candidate without parent information
    pub fn new(pdg: i32, energy: Float, position: Vector3, momentum: Vector3) -> Self {
        Self {
            pdg,
            energy,
            position,
            momentum,
            parent: None,
            weight: 1.,
        }
    }

    /// Attach decay parent information
    pub fn with_parent(mut self, pdg: i32, momentum: Vector3) -> Self {
        self.parent = Some(Parent { pdg, momentum });
        self
    }

    /// Set the statistical weight
    pub fn with_weight(mut self, weight: Float) -> Self {
        self.weight = weight;
        self
    }

    /// Check that every quantity of the candidate can be used for selection
    fn validate(&self, event: EventId, candidate: usize) -> Result<(), MalformedEvent> {
        let non_finite = |field| MalformedEvent::NonFinite {
            event,
            candidate,
            field,
        };
        let negative = |field| MalformedEvent::Negative {
            event,
            candidate,
            field,
        };
        if !self.energy.is_finite() {
            return Err(non_finite("energy"));
        }
        if !linalg::is_finite(&self.position) {
            return Err(non_finite("position"));
        }
        if !linalg::is_finite(&self.momentum) {
            return Err(non_finite("momentum"));
        }
        if let Some(parent) = &self.parent {
            if !linalg::is_finite(&parent.momentum) {
                return Err(non_finite("parent momentum"));
            }
        }
        if !self.weight.is_finite() {
            return Err(non_finite("weight"));
        }
        if self.energy < 0. {
            return Err(negative("energy"));
        }
        if self.weight < 0. {
            return Err(negative("weight"));
        }
        Ok(())
    }
}

/// Storage for one interaction and its candidates
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Event {
    /// Event-level metadata
    #[serde(flatten)]
    pub id: EventId,

    /// Candidates produced by this interaction, possibly none
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl Event {
    /// Build an event from its identifier and candidates
    pub fn new(id: EventId, candidates: Vec<Candidate>) -> Self {
        Self { id, candidates }
    }

    /// Check that the whole event can be processed
    ///
    /// A single bad candidate spoils the whole record, since we cannot tell
    /// which other fields of the record were affected by the same corruption.
    ///
    pub fn validate(&self) -> Result<(), MalformedEvent> {
        self.candidates
            .iter()
            .enumerate()
            .try_for_each(|(idx, candidate)| candidate.validate(self.id, idx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nu_mu() -> Candidate {
        Candidate::new(
            14,
            1.5,
            Vector3::new(0., 0., -100.),
            Vector3::new(0., 0., 1.5),
        )
    }

    #[test]
    fn valid_event_passes_validation() {
        let event = Event::new(EventId::default(), vec![nu_mu(), nu_mu()]);
        assert_eq!(event.validate(), Ok(()));
    }

    #[test]
    fn empty_event_is_valid() {
        assert_eq!(Event::default().validate(), Ok(()));
    }

    #[test]
    fn nan_momentum_is_reported_with_its_location() {
        let mut bad = nu_mu();
        bad.momentum[linalg::Y] = Float::NAN;
        let id = EventId {
            run: 1,
            subrun: 2,
            event: 3,
        };
        let event = Event::new(id, vec![nu_mu(), bad]);
        assert_eq!(
            event.validate(),
            Err(MalformedEvent::NonFinite {
                event: id,
                candidate: 1,
                field: "momentum",
            })
        );
    }

    #[test]
    fn negative_weight_is_rejected() {
        let event = Event::new(EventId::default(), vec![nu_mu().with_weight(-1.)]);
        assert!(matches!(
            event.validate(),
            Err(MalformedEvent::Negative {
                field: "weight",
                ..
            })
        ));
    }

    #[test]
    fn json_records_default_weight_and_parent() {
        let json = r#"{"run":1,"subrun":0,"event":7,"candidates":[
            {"pdg":-12,"energy":0.8,"position":[1.0,2.0,-50.0],"momentum":[0.0,0.1,0.8]}
        ]}"#;
        let event: Event = serde_json::from_str(json).expect("record should parse");
        assert_eq!(event.id.event, 7);
        assert_eq!(event.candidates.len(), 1);
        assert_eq!(event.candidates[0].weight, 1.);
        assert!(event.candidates[0].parent.is_none());
        assert_eq!(event.candidates[0].position[linalg::Z], -50.);
    }
}

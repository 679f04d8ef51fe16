//! Quantities derived from a candidate before it is selected and histogrammed

use crate::{
    category::Category,
    error::{ConfigurationError, MissingFeature, ParallelTrajectory},
    event::{Candidate, Event},
    linalg::{X, Y, Z},
    numeric::Float,
    projection::{self, DetectorSite, SiteProjection},
};
use std::fmt;

/// What to do with candidates whose trajectory never crosses a site's plane
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParallelPolicy {
    /// Drop the candidate from the selection
    Skip,

    /// Keep the candidate, with every observable of that site set to a value
    Sentinel(Float),
}

/// A candidate, its enclosing event, and everything derived from them
///
/// Cuts and histograms only ever see candidates through this view, so that
/// the geometric projection is done once per candidate and site.
///
#[derive(Clone, Debug)]
pub struct CandidateView<'ev> {
    /// Enclosing event
    pub event: &'ev Event,

    /// The candidate itself
    pub candidate: &'ev Candidate,

    /// Physical category of the candidate
    pub category: Category,

    /// Projections onto each detector site, in configuration order
    projections: Vec<SiteProjection>,

    /// Number of projections that were replaced by sentinels
    sentinels: usize,
}
//
impl<'ev> CandidateView<'ev> {
    /// Derive the features of a candidate
    ///
    /// Fails if the candidate's trajectory is parallel to a site's plane and
    /// the policy says that such candidates should be skipped.
    ///
    pub fn derive(
        event: &'ev Event,
        candidate: &'ev Candidate,
        sites: &[DetectorSite],
        center_shift: &[Float; 2],
        policy: ParallelPolicy,
    ) -> Result<Self, ParallelTrajectory> {
        let mut sentinels = 0;
        let projections = sites
            .iter()
            .map(|site| {
                match projection::project(
                    &candidate.position,
                    &candidate.momentum,
                    site,
                    center_shift,
                ) {
                    Ok(proj) => Ok(proj),
                    Err(ParallelTrajectory) => match policy {
                        ParallelPolicy::Skip => Err(ParallelTrajectory),
                        ParallelPolicy::Sentinel(value) => {
                            sentinels += 1;
                            Ok(SiteProjection::sentinel(value))
                        }
                    },
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            event,
            candidate,
            category: Category::from_pdg(candidate.pdg),
            projections,
            sentinels,
        })
    }

    /// Projection onto the site with a given configuration index
    pub fn projection(&self, site: SiteIndex) -> &SiteProjection {
        &self.projections[site.0]
    }

    /// Number of site projections that were replaced by sentinel values
    pub fn sentinel_count(&self) -> usize {
        self.sentinels
    }

    /// Angle between the candidate and its decay parent
    pub fn parent_angle(&self) -> Result<Float, MissingFeature> {
        let parent = self.parent()?;
        Ok(projection::parent_angle(
            &self.candidate.momentum,
            &parent.momentum,
        ))
    }

    /// PDG code of the decay parent
    pub fn parent_pdg(&self) -> Result<i32, MissingFeature> {
        Ok(self.parent()?.pdg)
    }

    fn parent(&self) -> Result<&'ev crate::event::Parent, MissingFeature> {
        self.candidate
            .parent
            .as_ref()
            .ok_or(MissingFeature("parent"))
    }

    /// Evaluate an observable on this candidate
    pub fn observe(&self, observable: Observable) -> Result<Float, MissingFeature> {
        let c = self.candidate;
        Ok(match observable {
            Observable::Energy => c.energy,
            Observable::Px => c.momentum[X],
            Observable::Py => c.momentum[Y],
            Observable::Pz => c.momentum[Z],
            Observable::Momentum => c.momentum.norm(),
            Observable::Weight => c.weight,
            Observable::X(site) => self.projection(site).intersection[X],
            Observable::Y(site) => self.projection(site).intersection[Y],
            Observable::Z(site) => projection::longitudinal(&self.projection(site).intersection),
            Observable::Radius(site) => self.projection(site).observables.radial_offset,
            Observable::OffAxisAngle(site) => self.projection(site).observables.off_axis_angle,
            Observable::ParentAngle => self.parent_angle()?,
        })
    }
}

/// Index of a detector site in the configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SiteIndex(pub usize);
//
impl SiteIndex {
    /// Look up a site by name
    pub fn resolve(name: &str, sites: &[DetectorSite]) -> Result<Self, ConfigurationError> {
        sites
            .iter()
            .position(|s| s.name() == name)
            .map(SiteIndex)
            .ok_or_else(|| ConfigurationError::UnknownReference {
                kind: "site",
                name: name.to_owned(),
            })
    }
}

/// A scalar quantity which can be put on a histogram axis
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Observable {
    /// Candidate energy
    Energy,
    /// Momentum components
    Px,
    #[allow(missing_docs)]
    Py,
    #[allow(missing_docs)]
    Pz,
    /// Momentum norm
    Momentum,
    /// Statistical weight
    Weight,
    /// Coordinates of the intersection with a site's plane
    X(SiteIndex),
    #[allow(missing_docs)]
    Y(SiteIndex),
    #[allow(missing_docs)]
    Z(SiteIndex),
    /// Transverse distance to the shifted beam axis at a site
    Radius(SiteIndex),
    /// Off-axis angle at a site
    OffAxisAngle(SiteIndex),
    /// Angle to the decay parent's momentum
    ParentAngle,
}
//
impl Observable {
    /// Parse an observable name such as "energy" or "oaa@near"
    pub fn parse(s: &str, sites: &[DetectorSite]) -> Result<Self, ConfigurationError> {
        let unknown = || ConfigurationError::UnknownReference {
            kind: "observable",
            name: s.to_owned(),
        };
        if let Some((quantity, site)) = s.split_once('@') {
            let site = SiteIndex::resolve(site, sites)?;
            return Ok(match quantity {
                "x" => Observable::X(site),
                "y" => Observable::Y(site),
                "z" => Observable::Z(site),
                "r" => Observable::Radius(site),
                "oaa" => Observable::OffAxisAngle(site),
                _ => return Err(unknown()),
            });
        }
        Ok(match s {
            "energy" => Observable::Energy,
            "px" => Observable::Px,
            "py" => Observable::Py,
            "pz" => Observable::Pz,
            "p" => Observable::Momentum,
            "weight" => Observable::Weight,
            "parent_angle" => Observable::ParentAngle,
            _ => return Err(unknown()),
        })
    }

    /// Name of the observable, as written in configuration files
    pub fn describe(self, sites: &[DetectorSite]) -> String {
        let at = |quantity: &str, site: SiteIndex| format!("{quantity}@{}", sites[site.0].name());
        match self {
            Observable::Energy => "energy".to_owned(),
            Observable::Px => "px".to_owned(),
            Observable::Py => "py".to_owned(),
            Observable::Pz => "pz".to_owned(),
            Observable::Momentum => "p".to_owned(),
            Observable::Weight => "weight".to_owned(),
            Observable::X(site) => at("x", site),
            Observable::Y(site) => at("y", site),
            Observable::Z(site) => at("z", site),
            Observable::Radius(site) => at("r", site),
            Observable::OffAxisAngle(site) => at("oaa", site),
            Observable::ParentAngle => "parent_angle".to_owned(),
        }
    }
}

impl fmt::Display for SiteIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "site #{}", self.0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{event::EventId, linalg::Vector3, projection::Plane};

    pub(crate) fn sites() -> Vec<DetectorSite> {
        vec![
            DetectorSite::new("near", Plane::transverse(0.), 11000.).unwrap(),
            DetectorSite::new("far", Plane::transverse(49000.), 60000.).unwrap(),
        ]
    }

    fn sideways_event() -> Event {
        Event::new(
            EventId::default(),
            vec![Candidate::new(
                14,
                1.,
                Vector3::new(0., 0., -100.),
                Vector3::new(1., 0., 0.),
            )],
        )
    }

    #[test]
    fn parallel_candidates_follow_the_policy() {
        let event = sideways_event();
        let sites = sites();
        let skipped = CandidateView::derive(
            &event,
            &event.candidates[0],
            &sites,
            &[0., 0.],
            ParallelPolicy::Skip,
        );
        assert_eq!(skipped.err(), Some(ParallelTrajectory));

        let kept = CandidateView::derive(
            &event,
            &event.candidates[0],
            &sites,
            &[0., 0.],
            ParallelPolicy::Sentinel(-9999.),
        )
        .unwrap();
        assert_eq!(kept.sentinel_count(), 2);
        assert_eq!(kept.observe(Observable::Radius(SiteIndex(1))), Ok(-9999.));
        assert_eq!(kept.observe(Observable::Energy), Ok(1.));
    }

    #[test]
    fn parent_angle_needs_a_parent() {
        let mut event = sideways_event();
        event.candidates[0].momentum = Vector3::new(0., 0., 1.);
        let sites = sites();
        let view = CandidateView::derive(
            &event,
            &event.candidates[0],
            &sites,
            &[0., 0.],
            ParallelPolicy::Skip,
        )
        .unwrap();
        assert_eq!(
            view.observe(Observable::ParentAngle),
            Err(MissingFeature("parent"))
        );
        assert_eq!(view.category, Category::NuMu);
    }

    #[test]
    fn observables_parse_with_site_references() {
        let sites = sites();
        assert_eq!(
            Observable::parse("oaa@far", &sites),
            Ok(Observable::OffAxisAngle(SiteIndex(1)))
        );
        assert_eq!(Observable::parse("p", &sites), Ok(Observable::Momentum));
        assert!(Observable::parse("r@icarus", &sites).is_err());
        assert!(Observable::parse("theta", &sites).is_err());
        assert_eq!(Observable::X(SiteIndex(0)).describe(&sites), "x@near");
    }
}

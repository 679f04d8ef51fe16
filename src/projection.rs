//! Straight-line projection of trajectories onto detector planes
//!
//! A flux particle is described by a point on its trajectory and a direction
//! of flight (usually its momentum, which need not be normalized). Projecting
//! it onto the front face of a detector tells where it enters the detector,
//! from which we derive its transverse distance to the beam axis and the
//! corresponding off-axis angle at the detector's baseline.

use crate::{
    error::{ConfigurationError, ParallelTrajectory},
    linalg::{Vector3, X, Y, Z},
    numeric::Float,
};
use prefix_num_ops::real::*;

/// Reference plane, described by one of its points and its normal
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    point: Vector3,
    normal: Vector3,
}
//
impl Plane {
    /// Set up a plane, rejecting degenerate normals
    pub fn new(point: Vector3, normal: Vector3) -> Result<Self, ConfigurationError> {
        let norm = normal.norm();
        if !(norm.is_finite() && norm > 0.) {
            return Err(ConfigurationError::Invalid {
                name: "plane normal".to_owned(),
                reason: format!("{:?} is not a usable normal vector", normal.as_slice()),
            });
        }
        if !point.iter().all(|x| x.is_finite()) {
            return Err(ConfigurationError::Invalid {
                name: "plane point".to_owned(),
                reason: "coordinates must be finite".to_owned(),
            });
        }
        Ok(Self { point, normal })
    }

    /// Transverse plane located at longitudinal position z
    pub fn transverse(z: Float) -> Self {
        Self {
            point: Vector3::new(0., 0., z),
            normal: Vector3::z(),
        }
    }

    /// A point on the plane
    pub fn point(&self) -> &Vector3 {
        &self.point
    }

    /// Normal vector of the plane (not normalized)
    pub fn normal(&self) -> &Vector3 {
        &self.normal
    }

    /// Signed distance-like quantity, zero for points on the plane
    pub fn offset_of(&self, p: &Vector3) -> Float {
        (p - self.point).dot(&self.normal)
    }
}

/// Detector site: a reference plane and the baseline used to compute angles
#[derive(Clone, Debug, PartialEq)]
pub struct DetectorSite {
    name: String,
    plane: Plane,
    baseline: Float,
}
//
impl DetectorSite {
    /// Describe a detector site, checking that its baseline is usable
    pub fn new(
        name: impl Into<String>,
        plane: Plane,
        baseline: Float,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if !(baseline.is_finite() && baseline > 0.) {
            return Err(ConfigurationError::Invalid {
                name: format!("baseline of site {name}"),
                reason: format!("{baseline} is not a positive distance"),
            });
        }
        Ok(Self {
            name,
            plane,
            baseline,
        })
    }

    /// Name of the site
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reference plane of the site
    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    /// Distance from the beam origin to the site
    pub fn baseline(&self) -> Float {
        self.baseline
    }
}

/// Positional and angular observables at one detector site
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffAxisObservables {
    /// Transverse distance to the beam axis, after center shift correction
    pub radial_offset: Float,

    /// Off-axis angle at the site's baseline
    pub off_axis_angle: Float,
}

/// Full projection of a trajectory onto one detector site
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SiteProjection {
    /// Point where the trajectory crosses the site's plane
    pub intersection: Vector3,

    /// Observables derived from that point
    pub observables: OffAxisObservables,
}
//
impl SiteProjection {
    /// Placeholder projection in which every observable is set to a fixed
    /// value, for hosts which prefer sentinels over dropping candidates
    pub fn sentinel(value: Float) -> Self {
        Self {
            intersection: Vector3::repeat(value),
            observables: OffAxisObservables {
                radial_offset: value,
                off_axis_angle: value,
            },
        }
    }
}

/// Intersect a straight trajectory with a plane
///
/// Fails without side effects if the trajectory is exactly parallel to the
/// plane. Nearly parallel trajectories yield far-away intersection points,
/// which downstream cuts are expected to reject.
///
pub fn intersect(
    position: &Vector3,
    direction: &Vector3,
    plane: &Plane,
) -> Result<Vector3, ParallelTrajectory> {
    let denom = direction.dot(plane.normal());
    if denom == 0. {
        return Err(ParallelTrajectory);
    }
    let t = plane.offset_of(position) / denom;
    Ok(position - direction * t)
}

/// Derive off-axis observables from a plane intersection point
///
/// The angle is computed as atan(r² / baseline). This is not the geometrical
/// atan(r / baseline), but downstream comparisons rely on these exact numbers.
///
pub fn off_axis_observables(
    intersection: &Vector3,
    baseline: Float,
    center_shift: &[Float; 2],
) -> OffAxisObservables {
    let dx = intersection[X] - center_shift[0];
    let dy = intersection[Y] - center_shift[1];
    let radial_offset = sqrt(dx * dx + dy * dy);
    OffAxisObservables {
        radial_offset,
        off_axis_angle: atan(radial_offset * radial_offset / baseline),
    }
}

/// Project a trajectory onto a detector site
pub fn project(
    position: &Vector3,
    direction: &Vector3,
    site: &DetectorSite,
    center_shift: &[Float; 2],
) -> Result<SiteProjection, ParallelTrajectory> {
    let intersection = intersect(position, direction, site.plane())?;
    Ok(SiteProjection {
        intersection,
        observables: off_axis_observables(&intersection, site.baseline(), center_shift),
    })
}

/// Angle between a particle's momentum and its parent's momentum
pub fn parent_angle(momentum: &Vector3, parent_momentum: &Vector3) -> Float {
    momentum.angle(parent_momentum)
}

/// Longitudinal coordinate of a point, for callers that only need z
pub fn longitudinal(point: &Vector3) -> Float {
    point[Z]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numeric::TEST_EPSILON;
    use rand::{Rng, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn head_on_trajectory_hits_plane_origin() {
        let p = intersect(
            &Vector3::new(0., 0., -100.),
            &Vector3::new(0., 0., 1.),
            &Plane::transverse(0.),
        )
        .expect("trajectory is not parallel");
        assert_eq!(p, Vector3::zeros());
    }

    #[test]
    fn reference_off_axis_numbers() {
        let site = DetectorSite::new("near", Plane::transverse(0.), 11000.).unwrap();
        let proj = project(
            &Vector3::new(0., 0., -100.),
            &Vector3::new(0., 0., 1.),
            &site,
            &[45.7, 0.],
        )
        .unwrap();
        let r: Float = 45.7;
        assert!(abs(proj.observables.radial_offset - r) < TEST_EPSILON);
        let expected = atan(r * r / 11000.);
        assert!(abs(proj.observables.off_axis_angle - expected) < TEST_EPSILON);
    }

    #[test]
    fn parallel_trajectory_is_a_soft_failure() {
        let plane = Plane::transverse(100.);
        let res = intersect(&Vector3::new(1., 2., 3.), &Vector3::new(1., 1., 0.), &plane);
        assert_eq!(res, Err(ParallelTrajectory));
    }

    #[test]
    fn unnormalized_directions_give_the_same_point() {
        let plane = Plane::transverse(49000.);
        let pos = Vector3::new(3., -4., 10.);
        let dir = Vector3::new(0.01, 0.02, 1.);
        let a = intersect(&pos, &dir, &plane).unwrap();
        let b = intersect(&pos, &(dir * 250.), &plane).unwrap();
        assert!((a - b).norm() < TEST_EPSILON * 1e3);
    }

    #[test]
    fn random_intersections_lie_on_tilted_planes() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        for _ in 0..1000 {
            let mut vec = || {
                Vector3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                )
            };
            let (point, normal, pos, dir) = (vec(), vec(), vec(), vec());
            let Ok(plane) = Plane::new(point, normal) else {
                continue;
            };
            let Ok(p) = intersect(&pos, &dir, &plane) else {
                continue;
            };
            // Ill-conditioned (nearly parallel) draws amplify rounding errors
            if abs(dir.normalize().dot(&normal.normalize())) < 1e-3 {
                continue;
            }
            let scale = 1. + p.norm() * normal.norm();
            assert!(
                abs(plane.offset_of(&p)) < TEST_EPSILON * scale * 1e3,
                "point {p:?} is off plane by {}",
                plane.offset_of(&p)
            );
        }
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        assert!(Plane::new(Vector3::zeros(), Vector3::zeros()).is_err());
        assert!(DetectorSite::new("far", Plane::transverse(0.), 0.).is_err());
        assert!(DetectorSite::new("far", Plane::transverse(0.), Float::NAN).is_err());
    }

    #[test]
    fn each_site_is_evaluated_independently() {
        let near = DetectorSite::new("near", Plane::transverse(0.), 11000.).unwrap();
        let far = DetectorSite::new("far", Plane::transverse(49000.), 60000.).unwrap();
        let pos = Vector3::new(0., 0., -100.);
        let dir = Vector3::new(0.001, 0., 1.);
        let shift = [45.7, 0.];
        let near_alone = project(&pos, &dir, &near, &shift).unwrap();
        let far_first = project(&pos, &dir, &far, &shift).unwrap();
        let near_after = project(&pos, &dir, &near, &shift).unwrap();
        assert_eq!(near_alone, near_after);
        assert!(longitudinal(&far_first.intersection) > longitudinal(&near_alone.intersection));
    }

    #[test]
    fn parent_angle_of_collinear_momenta_is_zero() {
        let p = Vector3::new(0.1, 0.2, 3.);
        assert!(parent_angle(&p, &(p * 7.)) < 1e-3);
    }
}

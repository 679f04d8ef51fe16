//! Toy neutrino flux generator
//!
//! Usage: `generate_events <number of events> [seed]`
//!
//! Writes JSON-lines events on the standard output, in the format read by the
//! selection driver. Each event holds a few neutrinos from pion and kaon
//! decays in a decay pipe upstream of the origin, with a beam slightly shifted
//! along x. The kinematics are a crude two-body approximation, good enough to
//! populate off-axis histograms with something realistic-looking.

use eyre::{bail, WrapErr};
use offaxis_selection::{
    event::{Candidate, Event, EventId},
    linalg::Vector3,
    numeric::{reals::consts::PI, Float},
    Result,
};
use prefix_num_ops::real::*;
use rand::{Rng, SeedableRng};
use std::io::{self, BufWriter, Write};

// Select random number generation engine in use
#[cfg(feature = "f32")]
type Engine = rand_xoshiro::Xoshiro128Plus;
#[cfg(not(feature = "f32"))]
type Engine = rand_xoshiro::Xoshiro256Plus;

/// Transverse position of the beam center
const BEAM_CENTER: [Float; 2] = [45.7, 0.];

/// Transverse spread of decay vertices
const BEAM_SIGMA: Float = 20.;

/// Longitudinal extent of the decay pipe
const DECAY_PIPE: (Float, Float) = (-10800., -10000.);

/// Angular spread of parent mesons around the beam axis
const PARENT_DIVERGENCE: Float = 2e-3;

/// Pion and kaon masses (GeV)
const PION_MASS: Float = 0.1396;
const KAON_MASS: Float = 0.4937;

/// Energy of the neutrino in the parent rest frame, for decays to a muon (GeV)
const PION_NU_ENERGY: Float = 0.0298;
const KAON_NU_ENERGY: Float = 0.2355;

/// Gaussian random number (Box-Muller transform)
fn gauss(rng: &mut Engine, mean: Float, sigma: Float) -> Float {
    let u1 = rng.gen::<Float>().max(1e-12);
    let u2 = rng.gen::<Float>();
    mean + sigma * sqrt(-2. * ln(u1)) * cos(2. * PI * u2)
}

/// Unit vector at polar angle `theta` around `axis`, with a random azimuth
fn tilt(rng: &mut Engine, axis: &Vector3, theta: Float) -> Vector3 {
    let axis = axis.normalize();
    let helper = if abs(axis.x) < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let u = axis.cross(&helper).normalize();
    let v = axis.cross(&u);
    let phi = 2. * PI * rng.gen::<Float>();
    axis * cos(theta) + (u * cos(phi) + v * sin(phi)) * sin(theta)
}

/// Generate one neutrino and its parent meson
fn generate_candidate(rng: &mut Engine) -> Candidate {
    // Parent meson, mostly pions, with a positive charge excess
    let is_kaon = rng.gen::<Float>() < 0.15;
    let positive = rng.gen::<Float>() < 0.8;
    let (mass, rest_energy, parent_pdg) = if is_kaon {
        (KAON_MASS, KAON_NU_ENERGY, if positive { 321 } else { -321 })
    } else {
        (PION_MASS, PION_NU_ENERGY, if positive { 211 } else { -211 })
    };
    let parent_p = 2. + 18. * rng.gen::<Float>();
    let parent_dir = Vector3::new(
        gauss(rng, 0., PARENT_DIVERGENCE),
        gauss(rng, 0., PARENT_DIVERGENCE),
        1.,
    )
    .normalize();
    let parent_momentum = parent_dir * parent_p;

    // Neutrino flavor, with a small electron neutrino component from kaons
    let electron = is_kaon && rng.gen::<Float>() < 0.05;
    let pdg = match (electron, positive) {
        (false, true) => 14,
        (false, false) => -14,
        (true, true) => 12,
        (true, false) => -12,
    };

    // Boosted two-body decay: lab energy falls with the angle to the parent
    let gamma = sqrt(parent_p * parent_p + mass * mass) / mass;
    let theta = abs(gauss(rng, 0., 1. / gamma));
    let energy = 2. * gamma * rest_energy / (1. + gamma * gamma * theta * theta);
    let direction = tilt(rng, &parent_dir, theta);

    let position = Vector3::new(
        gauss(rng, BEAM_CENTER[0], BEAM_SIGMA),
        gauss(rng, BEAM_CENTER[1], BEAM_SIGMA),
        DECAY_PIPE.0 + (DECAY_PIPE.1 - DECAY_PIPE.0) * rng.gen::<Float>(),
    );
    Candidate::new(pdg, energy, position, direction * energy)
        .with_parent(parent_pdg, parent_momentum)
}

fn main() -> Result<()> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let (num_events, seed) = match &args[..] {
        [num_events] => (num_events, "12345"),
        [num_events, seed] => (num_events, &seed[..]),
        _ => bail!("Usage: generate_events <number of events> [seed]"),
    };
    let num_events: u32 = num_events.parse().wrap_err("Invalid number of events")?;
    let seed: u64 = seed.parse().wrap_err("Invalid seed")?;

    let mut rng = Engine::seed_from_u64(seed);
    let mut out = BufWriter::new(io::stdout().lock());
    for event in 0..num_events {
        let num_candidates = rng.gen_range(0..4);
        let candidates = (0..num_candidates)
            .map(|_| generate_candidate(&mut rng))
            .collect();
        let id = EventId {
            run: 1,
            subrun: event / 1000,
            event,
        };
        serde_json::to_writer(&mut out, &Event::new(id, candidates))?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

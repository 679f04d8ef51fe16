//! End-to-end checks of the selection pipeline, from configuration text and
//! JSON-lines input to final results

use offaxis_selection::{
    aggregator::SelectionAggregator,
    category::Category,
    config::Configuration,
    cuts::{Cut, CutSpec, CutState},
    event::{Candidate, Event, EventId},
    features::{CandidateView, ParallelPolicy, SiteIndex},
    histset::{CutFlow, HistogramSet},
    input::EventReader,
    linalg::Vector3,
    numeric::Float,
    projection::{DetectorSite, Plane},
    scheduling::{run_selection, StopFlag},
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use std::io::Cursor;

const CONFIG: &str = "
    # Two sites along the beam, shifted beam center
    center_shift 45.7 0
    on_parallel  skip
    site near 0     11000
    site far  49000 60000

    cut energy   energy     0.3 6
    cut fiducial fiducial   near -200 200 -200 200
    cut narrow   max_off_axis far 0.01
    cut pion     parent_pdg 211 -211

    hist oaa_near  all  always         oaa@near:50:0:0.02
    hist e_numu    numu all            energy:30:0:6
    hist e_vs_r    numu through:fiducial energy:10:0:6 r@far:10:0:1000
    hist nm1_narrow all nminus1:narrow  oaa@far:20:0:0.05
";

fn random_event(rng: &mut Xoshiro256Plus, id: u32) -> Event {
    let num_candidates = rng.gen_range(0..4);
    let candidates = (0..num_candidates)
        .map(|_| {
            let pdg = [14, -14, 12, -12, 16, 22][rng.gen_range(0..6)];
            let position = Vector3::new(
                rng.gen_range(-300.0..300.0),
                rng.gen_range(-300.0..300.0),
                rng.gen_range(-10500.0..-10000.0),
            );
            let direction = Vector3::new(
                rng.gen_range(-0.01..0.01),
                rng.gen_range(-0.01..0.01),
                1.,
            );
            let energy: Float = rng.gen_range(0.0..8.0);
            let candidate = Candidate::new(pdg, energy, position, direction * energy);
            if rng.gen::<Float>() < 0.9 {
                let parent_pdg = [211, -211, 321][rng.gen_range(0..3)];
                candidate.with_parent(parent_pdg, Vector3::new(0., 0., 10.))
            } else {
                candidate
            }
        })
        .collect();
    Event::new(
        EventId {
            run: 1,
            subrun: 0,
            event: id,
        },
        candidates,
    )
}

fn random_events(seed: u64, count: u32) -> Vec<Event> {
    let mut rng = Xoshiro256Plus::seed_from_u64(seed);
    (0..count).map(|id| random_event(&mut rng, id)).collect()
}

fn to_json_lines(events: &[Event]) -> String {
    events
        .iter()
        .map(|event| serde_json::to_string(event).unwrap() + "\n")
        .collect()
}

#[test]
fn json_input_runs_through_the_whole_pipeline() {
    let cfg = Configuration::parse(CONFIG).unwrap();
    let events = random_events(1, 2_000);
    let mut input = to_json_lines(&events);
    input.push_str("{\"run\": 1, \"subrun\": 0, \"event\": \"oops\"}\n");

    let reader = EventReader::new(Cursor::new(input));
    let results = run_selection(&cfg, reader, &StopFlag::new()).unwrap();
    let diag = results.diagnostics;

    let num_candidates: usize = events.iter().map(|e| e.candidates.len()).sum();
    assert_eq!(diag.processed_events, 2_000);
    assert_eq!(diag.malformed_events, 1);
    assert_eq!(
        diag.filled_candidates + diag.skipped_candidates(),
        num_candidates as u64
    );
    // Only the parent PDG cut needs the parent, and it is always evaluated
    assert!(diag.missing_features > 0);
    assert_eq!(diag.parallel_trajectories, 0);

    let flow = results.histograms.cut_flow();
    assert_eq!(flow.total(), diag.filled_candidates);
    let oaa = results.histograms.get("oaa_near").unwrap();
    assert_eq!(oaa.entries(), diag.filled_candidates);
    assert_eq!(
        results.histograms.get("e_numu").unwrap().entries(),
        flow.cumulative_count(Category::NuMu, cfg.cuts.len())
    );
}

#[test]
fn partitioned_runs_merge_into_the_single_run() {
    let cfg = Configuration::parse(CONFIG).unwrap();
    let events = random_events(2, 3_000);

    let mut single = SelectionAggregator::new(&cfg).unwrap();
    for event in &events {
        single.process(event).unwrap();
    }
    let single = single.finalize();

    let mut merged = SelectionAggregator::new(&cfg).unwrap();
    for chunk in events.chunks(701) {
        let mut part = SelectionAggregator::new(&cfg).unwrap();
        for event in chunk {
            part.process(event).unwrap();
        }
        merged.merge(part);
    }
    let merged = merged.finalize();

    assert_eq!(merged.diagnostics, single.diagnostics);
    assert_eq!(merged.histograms.cut_flow(), single.histograms.cut_flow());
    for ((decl_m, hist_m), (decl_s, hist_s)) in
        merged.histograms.iter().zip(single.histograms.iter())
    {
        assert_eq!(decl_m.name, decl_s.name);
        assert_eq!(hist_m.entries(), hist_s.entries());
        let (w_m, w_s) = (hist_m.total_weight(), hist_s.total_weight());
        assert!((w_m - w_s).abs() <= 1e-6 * w_s.abs().max(1.));
    }
}

#[test]
fn zero_candidate_events_only_bump_the_event_count() {
    let cfg = Configuration::parse(CONFIG).unwrap();
    let empty = vec![Ok(Event::new(EventId::default(), vec![])); 10];
    let results = run_selection(&cfg, empty.into_iter(), &StopFlag::new()).unwrap();
    assert_eq!(results.diagnostics.processed_events, 10);
    assert_eq!(results.diagnostics.filled_candidates, 0);
    assert_eq!(results.histograms.cut_flow().total(), 0);
    for (_, hist) in results.histograms.iter() {
        assert_eq!(hist.entries(), 0);
        assert_eq!(hist.total_weight(), 0.);
    }
}

#[test]
fn reference_candidate_lands_where_expected() {
    let cfg = Configuration::parse(CONFIG).unwrap();
    let event = Event::new(
        EventId::default(),
        vec![Candidate::new(
            14,
            1.,
            Vector3::new(0., 0., -100.),
            Vector3::new(0., 0., 1.),
        )
        .with_parent(211, Vector3::new(0., 0., 5.))],
    );
    let agg = SelectionAggregator::new(&cfg).unwrap();
    let evaluated = agg.evaluate(&event, &event.candidates[0]).unwrap();
    let near = &evaluated.view.projection(SiteIndex(0)).observables;
    assert!((near.radial_offset - 45.7).abs() < 1e-4);
    let expected = (45.7 as Float * 45.7 / 11000.).atan();
    assert!((near.off_axis_angle - expected).abs() < 1e-6);
    // Passes energy and fiducial, and its off-axis angle at the far site is
    // ~0.035 rad, above the 0.01 limit
    assert_eq!(evaluated.cuts.passed_through(), 2);
    assert!(evaluated.cuts.passed(3));
    assert!(CutState::NMinusOne(2).is_satisfied_by(&evaluated.cuts));
}

#[test]
fn custom_predicates_plug_into_the_cut_list() {
    let sites = vec![DetectorSite::new("near", Plane::transverse(0.), 11000.).unwrap()];
    let cuts = CutSpec::new(vec![
        Cut::custom("forward", |view: &CandidateView<'_>| {
            Ok(view.candidate.momentum.z > 0.)
        }),
        Cut::custom("even_event", |view: &CandidateView<'_>| {
            Ok(view.event.id.event % 2 == 0)
        }),
    ])
    .unwrap();
    let cfg = Configuration::new([0., 0.], ParallelPolicy::Sentinel(-1.), sites, cuts, vec![])
        .unwrap();
    let mut agg = SelectionAggregator::new(&cfg).unwrap();
    for id in 0..4 {
        let event = Event::new(
            EventId {
                run: 0,
                subrun: 0,
                event: id,
            },
            vec![Candidate::new(
                14,
                1.,
                Vector3::zeros(),
                Vector3::new(0., 0., if id < 3 { 1. } else { -1. }),
            )],
        );
        agg.process(&event).unwrap();
    }
    let results = agg.finalize();
    let flow: &CutFlow = results.histograms.cut_flow();
    assert_eq!(flow.count(Category::NuMu, 2), 2);
    assert_eq!(flow.count(Category::NuMu, 1), 1);
    assert_eq!(flow.count(Category::NuMu, 0), 1);
    let _: &HistogramSet<'_> = &results.histograms;
}

#[test]
fn undecodable_bytes_do_not_end_the_run() {
    let cfg = Configuration::parse(CONFIG).unwrap();
    let events = random_events(3, 5);
    let mut input = to_json_lines(&events[..1]).into_bytes();
    input.extend_from_slice(b"\xff\xfe garbage\n");
    input.extend_from_slice(to_json_lines(&events[1..]).as_bytes());

    let reader = EventReader::new(Cursor::new(input));
    let results = run_selection(&cfg, reader, &StopFlag::new()).unwrap();
    assert_eq!(results.diagnostics.processed_events, 5);
    assert_eq!(results.diagnostics.malformed_events, 1);
}

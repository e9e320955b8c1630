use std::path::PathBuf;

use approx::assert_relative_eq;
use ps_core::{Kind, Plottable};
use ps_viz::{PlotEvaluation, PlotRequest, StackedPlotArtifact};

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().expect("repo root")
}

fn load_request() -> PlotRequest {
    let path = repo_root().join("tests/fixtures/plot_request.json");
    let text = std::fs::read_to_string(path).expect("read fixture");
    PlotRequest::from_json(&text).expect("parse request")
}

#[test]
fn fixture_request_end_to_end() {
    let request = load_request();
    let processes = request.processes().expect("build processes");
    let evaluation = PlotEvaluation::new(&request.name, request.policy.clone()).unwrap();
    let outcome = evaluation.evaluate(processes).expect("evaluate");

    assert_eq!(outcome.stacks.len(), 1);
    let stack = &outcome.stacks[0];

    // ttbar is rescaled by 800 / 1000 * 10 and its overflow folded into the last bin.
    let labels: Vec<&str> = stack.entries.iter().map(|e| e.label.as_str()).collect();
    assert_eq!(labels, vec!["Drell-Yan", "ttbar"]);
    assert_eq!(stack.entries[0].histogram.contents(), &[42.0, 124.0, 29.0, 3.0]);
    assert_eq!(stack.entries[0].process_ids, vec![1, 2]);
    assert_eq!(stack.entries[1].histogram.contents(), &[32.0, 96.0, 72.0, 32.0]);
    assert_relative_eq!(stack.integral(), 430.0);

    // Systematic band invariant.
    let syst = stack.syst_only.as_ref().expect("systematics combined");
    for i in 0..stack.n_bins() {
        let lhs = stack.stat_and_syst.error(i).powi(2);
        let rhs = stack.stat_only.error(i).powi(2) + syst.error(i).powi(2);
        assert_relative_eq!(lhs, rhs, max_relative = 1e-9);
    }
    let names: Vec<&str> = outcome.breakdown[0].sources.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["jes", "lumi", "xs_dy"]);

    // Data and ratio: no zero bins, so every bin has a point.
    let data = outcome.data.as_ref().expect("data");
    assert_eq!(data.contents(), &[75.0, 250.0, 110.0, 35.0]);
    assert_eq!(outcome.ratio.len(), 4);
    assert_relative_eq!(outcome.ratio[3].y, 1.0);
    assert!(outcome.ratio_syst_band.is_some());

    // Summary: one nominal item per process, systematic items per (kind, process).
    assert_eq!(outcome.summary.get(Kind::Background).len(), 3);
    assert_eq!(outcome.summary.get(Kind::Signal).len(), 1);
    let ttbar_syst = outcome.summary.get_systematics(Kind::Background, 0);
    let ttbar_names: Vec<&str> = ttbar_syst.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(ttbar_names, vec!["Luminosity", "Jet energy scale"]);
    // No jes shapes for the signal: only the luminosity is reported.
    assert_eq!(outcome.summary.get_systematics(Kind::Signal, 3).len(), 1);
    assert!(outcome.summary.get_systematics(Kind::Observed, 4).is_empty());

    let totals = outcome.summary.totals(Kind::Background).unwrap();
    assert_relative_eq!(totals.events, 430.0);
    assert!(totals.total_uncertainty > totals.stat_uncertainty);

    let artifact = StackedPlotArtifact::from_outcome(&outcome, 1).unwrap();
    let json = serde_json::to_value(&artifact).unwrap();
    assert_eq!(json["plot"], "m_ll");
    assert_eq!(json["stacks"][0]["entries"][0]["name"], "Drell-Yan");
    assert_eq!(json["bin_edges"].as_array().unwrap().len(), 5);
}

#[test]
fn fixture_without_systematics_is_stat_only() {
    let mut request = load_request();
    request.policy.combine_systematics = false;
    let processes = request.processes().unwrap();
    let outcome = PlotEvaluation::new("m_ll", request.policy).unwrap().evaluate(processes).unwrap();
    let stack = &outcome.stacks[0];
    assert!(stack.syst_only.is_none());
    assert!(outcome.ratio_syst_band.is_none());
    for i in 0..stack.n_bins() {
        assert_relative_eq!(stack.stat_and_syst.error(i), stack.stat_only.error(i));
    }
    assert!(outcome.summary.get_systematics(Kind::Background, 0).is_empty());
}

use std::sync::Arc;

use proptest::prelude::*;
use ps_core::{Histogram, Kind};
use ps_viz::{
    Process, ShapeCatalog, SystematicKind, SystematicSource, Variation, build_stack,
    combine_systematics,
};

const N_BINS: usize = 4;

fn hist(contents: &[f64]) -> Histogram {
    let edges = (0..=contents.len()).map(|i| i as f64).collect();
    Histogram::from_contents("h", edges, contents.to_vec(), None).unwrap()
}

fn contents() -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(0.1f64..1e3, N_BINS)
}

proptest! {
    #[test]
    fn prop_group_merge_is_order_independent(
        a in contents(),
        b in contents(),
        c in contents(),
    ) {
        let orders = [[0usize, 1, 2], [2, 0, 1], [1, 2, 0], [2, 1, 0]];
        let inputs = [a, b, c];
        let mut totals: Vec<Vec<f64>> = Vec::new();
        for order in orders {
            let processes: Vec<Process> = order
                .iter()
                .map(|&i| {
                    Process::new(i, format!("p{i}"), Kind::Background, hist(&inputs[i]))
                        .with_group("merged")
                })
                .collect();
            let stack = build_stack(&processes, 0, false).unwrap().unwrap();
            prop_assert_eq!(stack.entries.len(), 1);
            totals.push(stack.entries[0].histogram.contents().to_vec());
        }
        for t in &totals[1..] {
            for (x, y) in t.iter().zip(&totals[0]) {
                prop_assert!((x - y).abs() <= 1e-9 * y.abs().max(1.0));
            }
        }
    }

    #[test]
    fn prop_sort_by_yields_is_ascending(
        inputs in proptest::collection::vec(contents(), 2..8),
    ) {
        let processes: Vec<Process> = inputs
            .iter()
            .enumerate()
            .map(|(i, c)| Process::new(i, format!("p{i}"), Kind::Background, hist(c)))
            .collect();
        let stack = build_stack(&processes, 0, true).unwrap().unwrap();
        prop_assert_eq!(stack.entries.len(), inputs.len());
        for pair in stack.entries.windows(2) {
            prop_assert!(pair[0].histogram.integral() <= pair[1].histogram.integral());
        }
    }

    #[test]
    fn prop_stat_and_syst_is_quadrature_sum(
        nominal in contents(),
        shifts in proptest::collection::vec(
            (proptest::collection::vec(-50.0f64..50.0, N_BINS),
             proptest::collection::vec(-50.0f64..50.0, N_BINS)),
            1..4,
        ),
    ) {
        let mut catalog = ShapeCatalog::new();
        let mut sources = Vec::new();
        for (k, (up, down)) in shifts.iter().enumerate() {
            let name = format!("s{k}");
            let shifted = |d: &[f64]| {
                let v: Vec<f64> = nominal.iter().zip(d).map(|(n, x)| n + x).collect();
                hist(&v)
            };
            catalog.insert(name.clone(), Variation::Up, shifted(up.as_slice()));
            catalog.insert(name.clone(), Variation::Down, shifted(down.as_slice()));
            sources.push(Arc::new(SystematicSource::new(name, SystematicKind::Shape)));
        }
        let mut p = Process::new(0, "bkg", Kind::Background, hist(&nominal));
        p.attach_systematics(&sources, &catalog);
        let processes = vec![p];

        let mut stack = build_stack(&processes, 0, false).unwrap().unwrap();
        combine_systematics(&mut stack, &processes).unwrap();
        let syst = stack.syst_only.as_ref().unwrap();
        for i in 0..N_BINS {
            let lhs = stack.stat_and_syst.error(i).powi(2);
            let rhs = stack.stat_only.error(i).powi(2) + syst.error(i).powi(2);
            prop_assert!((lhs - rhs).abs() <= 1e-5 * rhs.max(1.0));
        }
    }
}

#[test]
fn quadrature_of_two_sources() {
    let nominal = [10.0; N_BINS];
    let a: Vec<f64> = nominal.iter().map(|n| n + 3.0).collect();
    let a_down: Vec<f64> = nominal.iter().map(|n| n - 3.0).collect();
    let b: Vec<f64> = nominal.iter().map(|n| n + 4.0).collect();
    let b_down: Vec<f64> = nominal.iter().map(|n| n - 4.0).collect();
    let catalog = ShapeCatalog::new()
        .with("a", Variation::Up, hist(&a))
        .with("a", Variation::Down, hist(&a_down))
        .with("b", Variation::Up, hist(&b))
        .with("b", Variation::Down, hist(&b_down));
    let sources = [
        Arc::new(SystematicSource::new("a", SystematicKind::Shape)),
        Arc::new(SystematicSource::new("b", SystematicKind::Shape)),
    ];
    let mut p = Process::new(0, "bkg", Kind::Background, hist(&nominal));
    p.attach_systematics(&sources, &catalog);
    let processes = vec![p];

    let mut stack = build_stack(&processes, 0, false).unwrap().unwrap();
    let combined = combine_systematics(&mut stack, &processes).unwrap();
    assert_eq!(combined.sources.len(), 2);
    let syst = stack.syst_only.as_ref().unwrap();
    let asym = stack.syst_only_asym.as_ref().unwrap();
    for i in 0..N_BINS {
        assert!((syst.error(i) - 5.0).abs() < 1e-12);
        assert!((asym.err_up[i] - 5.0).abs() < 1e-12);
        assert!((asym.err_low[i] - 5.0).abs() < 1e-12);
    }
}

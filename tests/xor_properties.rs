//! End-to-end properties of both comparison engines.

use xorscope::prelude::*;
use xorscope::{
    db::{Orientation, RecursiveShapeIterator},
    xor::{MissingSide, PendingResult},
};

const DBU: f64 = 0.001;

fn single_box(rect: Rect) -> Layout {
    let mut layout = Layout::new(DBU);
    let layer = layout.insert_layer(LayerInfo::new(1, 0));
    let top = layout.add_cell("TOP").unwrap();
    layout.insert(top, layer, rect).unwrap();
    layout
}

/// A chip-like hierarchy: a standard cell arrayed in rows, two blocks of rows placed with
/// different orientations and a routing layer with long wires crossing everything.
fn chip(revision: u32) -> Layout {
    let mut layout = Layout::new(DBU);
    let active = layout.insert_layer(LayerInfo::named(1, 0, "ACTIVE"));
    let metal = layout.insert_layer(LayerInfo::named(2, 0, "METAL1"));
    let top = layout.add_cell("CHIP").unwrap();
    let block = layout.add_cell("BLOCK").unwrap();
    let inv = layout.add_cell("INV").unwrap();

    layout.insert(inv, active, Rect::new(0, 0, 30, 80)).unwrap();
    layout.insert(inv, active, Rect::new(30, 30, 60, 50)).unwrap();
    if revision > 0 {
        // a notch that only exists in the revised standard cell
        layout.insert(inv, active, Rect::new(60, 30, 64, 34)).unwrap();
    }
    layout
        .insert_instance(
            block,
            Instance::array(inv, Trans::default(), 8, 4, Point::new(100, 0), Point::new(0, 120)),
        )
        .unwrap();

    for trans in [
        Trans::displacement(0, 0),
        Trans::new(Orientation::R180, Point::new(2000, 1200)),
        Trans::new(Orientation::M90, Point::new(1200, 1300)),
    ] {
        layout
            .insert_instance(top, Instance::new(block, trans))
            .unwrap();
    }

    for i in 0..6 {
        let y = 100 + i * 300;
        let end = if revision > 1 && i == 3 { 2210 } else { 2200 };
        layout.insert(top, metal, Rect::new(-50, y, end, y + 40)).unwrap();
    }
    layout
}

fn flattened(outcome: &XorOutcome, key: &ResultKey) -> Region {
    outcome
        .results
        .get(key)
        .and_then(|d| d.pending_region)
        .map(|p| p.to_region())
        .unwrap_or_default()
}

fn key(index: usize, layer: i32) -> ResultKey {
    ResultKey::new(index, LayerIdentity::new(layer, 0))
}

#[test]
fn shifted_square_reports_two_slivers() {
    let a = single_box(Rect::new(0, 0, 10, 10));
    let b = single_box(Rect::new(1, 0, 11, 10));

    for mode in [XorMode::Tiled, XorMode::Deep] {
        let exact = compare(&a, &b, XorConfig::default().with_mode(mode)).unwrap();
        assert!(!exact.layouts_match());
        let descriptor = exact.results.get(&key(0, 1)).unwrap();
        assert_eq!(descriptor.shape_count, 2, "{mode}");
        assert!(!flattened(&exact, &key(0, 1)).is_empty());

        let config = XorConfig::default()
            .with_mode(mode)
            .with_tolerances(vec![0.0, 0.002]);
        let tolerant = compare(&a, &b, config).unwrap();
        assert_eq!(tolerant.results.get(&key(0, 1)).unwrap().shape_count, 2);
        assert_eq!(tolerant.results.get(&key(1, 1)).unwrap().shape_count, 0);
    }
}

#[test]
fn identical_layouts_match() {
    let a = chip(1);
    let b = chip(1);
    for config in [XorConfig::tiled(0.35), XorConfig::deep()] {
        let outcome = compare(&a, &b, config).unwrap();
        assert!(outcome.layouts_match());
        assert!(outcome.results.all_empty());
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.report.to_string(), "No differences found\n");
    }
}

#[test]
fn missing_layer_policy() {
    let a = chip(0);
    let mut b = Layout::new(DBU);
    b.insert_layer(LayerInfo::new(2, 0));
    b.add_cell("CHIP").unwrap();

    let outcome = compare(&a, &b, XorConfig::deep()).unwrap();
    let marker = outcome.results.get(&key(0, 1)).unwrap();
    assert_eq!(marker.missing, Some(MissingSide::B));
    assert!(marker.pending_region.is_none());
    assert_eq!(outcome.report.missing_layers(), 1);
    assert!(!outcome.layouts_match());
    assert!(outcome.report.to_string().contains("layer missing in B"));

    let config = XorConfig::tiled(0.5).missing_as_empty(true);
    let outcome = compare(&a, &b, config).unwrap();
    let copy = outcome.results.get(&key(0, 1)).unwrap();
    assert_eq!(copy.missing, None);

    let top = a.cell_by_name("CHIP").unwrap();
    let active = a.find_layer(1, 0).unwrap();
    let expected = RecursiveShapeIterator::new(&a, top, active)
        .into_region()
        .merged();
    assert_eq!(flattened(&outcome, &key(0, 1)), expected);
}

#[test]
fn tile_size_does_not_change_result() {
    let a = chip(0);
    let b = chip(2);
    let tolerances = vec![0.0, 0.004, 0.03];

    let reference = compare(&a, &b, XorConfig::default().with_tolerances(tolerances.clone())).unwrap();
    for tile_size in [0.09, 0.25, 0.7] {
        let config = XorConfig::tiled(tile_size).with_tolerances(tolerances.clone());
        let outcome = compare(&a, &b, config).unwrap();
        assert_eq!(outcome.layouts_match(), reference.layouts_match());
        for (key, expected) in reference.results.to_vec() {
            let actual = outcome.results.get(&key).unwrap();
            assert_eq!(actual.shape_count, expected.shape_count, "{key} at {tile_size}");
            assert_eq!(flattened(&outcome, &key), flattened(&reference, &key));
        }
    }
}

#[test]
fn healed_tiles_match_deep_engine() {
    let a = chip(0);
    let b = chip(2);
    let tolerances = vec![0.0, 0.004];

    let tiled = compare(&a, &b, XorConfig::tiled(0.15).with_tolerances(tolerances.clone())).unwrap();
    let deep = compare(&a, &b, XorConfig::deep().with_tolerances(tolerances)).unwrap();

    for (key, d) in deep.results.to_vec() {
        let t = tiled.results.get(&key).unwrap();
        assert_eq!(t.shape_count, d.flat_shape_count, "{key}");
        assert!(matches!(d.pending_region, Some(PendingResult::Deep(_))));
        assert_eq!(flattened(&tiled, &key), flattened(&deep, &key), "{key}");
    }

    // the notch of the standard cell is stored once and placed 96 times
    let notch = deep.results.get(&key(0, 1)).unwrap();
    assert_eq!(notch.shape_count, 1);
    assert_eq!(notch.flat_shape_count, 96);
}

#[test]
fn thread_count_does_not_change_results() {
    let a = chip(0);
    let b = chip(2);
    let config = XorConfig::deep().with_tolerances(vec![0.0, 0.004]);

    let reference = compare(&a, &b, config.clone().with_threads(1)).unwrap();
    for threads in [2, 8] {
        let outcome = compare(&a, &b, config.clone().with_threads(threads)).unwrap();
        assert_eq!(outcome.results.to_vec(), reference.results.to_vec());
        assert_eq!(outcome.report, reference.report);
    }
}

#[test]
fn larger_tolerances_never_report_more() {
    let a = chip(0);
    let b = chip(2);
    let config = XorConfig::tiled(0.4).with_tolerances(vec![0.0, 0.002, 0.004, 0.01, 0.05]);
    let outcome = compare(&a, &b, config).unwrap();

    for layer in [1, 2] {
        let counts: Vec<u64> = (0..5)
            .map(|i| outcome.results.get(&key(i, layer)).unwrap().shape_count)
            .collect();
        assert!(counts.windows(2).all(|w| w[1] <= w[0]), "{counts:?}");
    }
}

#[test]
fn output_layout_holds_one_layer_per_tolerance() {
    let a = chip(0);
    let b = chip(2);

    for config in [XorConfig::tiled(0.3), XorConfig::deep()] {
        let config = config
            .with_tolerances(vec![0.0, 0.004])
            .with_layer_bump(1000)
            .with_output("XOR");
        let outcome = compare(&a, &b, config).unwrap();
        let output = outcome.output.as_ref().unwrap();

        let top = output.cell_by_name("XOR").unwrap();
        assert_eq!(output.top_cells(), vec![top]);
        for info in [(1, 0), (2, 0), (1001, 0), (1002, 0)] {
            assert!(output.find_layer(info.0, info.1).is_some(), "{info:?}");
        }

        for (key, descriptor) in outcome.results.to_vec() {
            let layer = descriptor.layer_output.unwrap();
            let written = RecursiveShapeIterator::new(output, top, layer)
                .into_region()
                .merged();
            assert_eq!(written.count(), descriptor.flat_shape_count, "{key}");
        }
    }
}

//! End-to-end checks of the overlay operations through their public API.
//!
//! Squares are built in degrees near the equator; a 0.01° side is roughly
//! 1.1 km.

use approx::assert_relative_eq;
use geo::{line_string, point, polygon, Geometry, Polygon};
use geoverlay_algorithms::manager::LayerManager;
use geoverlay_algorithms::vector::{
    area_m2, buffer, count_points_in_polygons, difference, execute, intersection, spatial_join,
    union, OperationResult,
};
use geoverlay_core::{Feature, Layer, LayerSource, OperationOptions};

fn square(x0: f64, y0: f64, size: f64) -> Polygon<f64> {
    polygon![
        (x: x0, y: y0),
        (x: x0 + size, y: y0),
        (x: x0 + size, y: y0 + size),
        (x: x0, y: y0 + size),
        (x: x0, y: y0),
    ]
}

fn output_area(r: &OperationResult) -> f64 {
    r.result
        .iter()
        .filter_map(|f| f.geometry.as_ref())
        .map(area_m2)
        .sum()
}

fn part_areas(r: &OperationResult) -> Vec<f64> {
    let mut areas: Vec<f64> = match r.result.features[0].geometry.as_ref() {
        Some(Geometry::MultiPolygon(mp)) => mp
            .0
            .iter()
            .map(|p| area_m2(&Geometry::Polygon(p.clone())))
            .collect(),
        Some(g) => vec![area_m2(g)],
        None => Vec::new(),
    };
    areas.sort_by(|a, b| a.total_cmp(b));
    areas
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn union_of_single_feature_is_identity() {
    let f = Feature::new(square(0.0, 0.0, 0.01)).with_property("name", "plot");
    let r = union(&[f.clone()], &OperationOptions::default()).unwrap();

    assert!(r.success);
    assert_eq!(r.result.len(), 1);
    assert_eq!(r.result.features[0].geometry, f.geometry);
    assert_eq!(r.result.features[0].name(), Some("plot"));
    assert_eq!(r.metadata.as_union().unwrap().input_feature_count, 1);
}

#[test]
fn union_is_commutative_in_geometry() {
    let a = Feature::new(square(0.0, 0.0, 0.01)).with_property("name", "a");
    let b = Feature::new(square(0.1, 0.0, 0.02)).with_property("name", "b");
    let options = OperationOptions::default();

    let ab = union(&[a.clone(), b.clone()], &options).unwrap();
    let ba = union(&[b, a], &options).unwrap();

    assert_relative_eq!(output_area(&ab), output_area(&ba), max_relative = 1e-9);
    let (pa, pb) = (part_areas(&ab), part_areas(&ba));
    assert_eq!(pa.len(), pb.len());
    for (x, y) in pa.iter().zip(&pb) {
        assert_relative_eq!(*x, *y, max_relative = 1e-9);
    }
    assert_ne!(ab.result.features[0].name(), ba.result.features[0].name());
}

#[test]
fn union_conserves_area_of_disjoint_polygons() {
    let a = Feature::new(square(0.0, 0.0, 0.01));
    let b = Feature::new(square(0.05, 0.05, 0.01));
    let expected = area_m2(a.geometry.as_ref().unwrap()) + area_m2(b.geometry.as_ref().unwrap());

    let r = union(&[a, b], &OperationOptions::default()).unwrap();
    assert_relative_eq!(output_area(&r), expected, max_relative = 1e-6);
}

#[test]
fn disjoint_intersection_is_empty_success() {
    let a = Feature::new(square(0.0, 0.0, 0.01));
    let b = Feature::new(square(1.0, 1.0, 0.01));
    let r = intersection(&a, &b, &OperationOptions::default()).unwrap();

    assert!(r.success);
    assert!(r.result.is_empty());
    assert!(!r.metadata.as_intersection().unwrap().intersects);
}

#[test]
fn difference_and_intersection_partition_the_primary() {
    let a = Feature::new(square(0.0, 0.0, 0.02));
    let b = Feature::new(square(0.01, 0.005, 0.02));
    let options = OperationOptions::default();

    let diff = difference(&[a.clone(), b.clone()], &options).unwrap();
    let inter = intersection(&a, &b, &options).unwrap();

    assert_relative_eq!(
        output_area(&diff) + output_area(&inter),
        area_m2(a.geometry.as_ref().unwrap()),
        max_relative = 1e-6
    );
}

#[test]
fn buffer_is_monotonic_in_distance_sign() {
    let f = Feature::new(square(0.0, 0.0, 0.02));
    let original = area_m2(f.geometry.as_ref().unwrap());
    let options = OperationOptions::default();

    let grown = buffer(&[f.clone()], 200.0, &options).unwrap();
    let shrunk = buffer(&[f], -200.0, &options).unwrap();

    assert!(output_area(&grown) >= original);
    assert!(output_area(&shrunk) <= original);
    assert!(output_area(&shrunk) > 0.0);
}

#[test]
fn spatial_join_accounts_for_every_point() {
    let points: Vec<Feature> = (0..20)
        .map(|i| {
            let x = (i % 5) as f64 * 0.01;
            let y = (i / 5) as f64 * 0.01;
            Feature::new(point!(x: x, y: y))
        })
        .collect();
    let polygons = vec![
        Feature::new(square(0.0, 0.0, 0.015)),
        Feature::new(square(0.025, 0.025, 0.01)),
    ];
    let options = OperationOptions::default().with_multiple_matches(true);
    let r = spatial_join(&points, &polygons, &options).unwrap();
    let m = r.metadata.as_spatial_join().unwrap();

    assert_eq!(m.total_points, 20);
    assert_eq!(m.matched_points + m.unmatched_count, m.total_points);
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn two_squares_ten_km_apart_union_to_two_parts() {
    let a = Feature::new(square(0.0, 0.0, 0.01));
    let b = Feature::new(square(0.1, 0.0, 0.01));
    let single = area_m2(a.geometry.as_ref().unwrap());

    let r = union(&[a, b], &OperationOptions::default()).unwrap();

    match r.result.features[0].geometry.as_ref() {
        Some(Geometry::MultiPolygon(mp)) => assert_eq!(mp.0.len(), 2),
        other => panic!("expected MultiPolygon, got {:?}", other),
    }
    assert_relative_eq!(output_area(&r), 2.0 * single, max_relative = 1e-6);
}

#[test]
fn line_outside_polygon_has_no_intersection() {
    let poly = Feature::new(square(0.0, 0.0, 0.01));
    let line = Feature::new(line_string![(x: 0.5, y: 0.5), (x: 0.6, y: 0.7)]);
    let r = intersection(&poly, &line, &OperationOptions::default()).unwrap();

    assert!(r.result.is_empty());
    assert!(!r.metadata.as_intersection().unwrap().intersects);
}

#[test]
fn contained_polygon_difference_both_ways() {
    let outer = Feature::new(square(0.0, 0.0, 0.04));
    let inner = Feature::new(square(0.01, 0.01, 0.01));
    let options = OperationOptions::default();

    let holed = difference(&[outer.clone(), inner.clone()], &options).unwrap();
    assert_eq!(holed.result.len(), 1);
    assert_relative_eq!(
        output_area(&holed),
        area_m2(outer.geometry.as_ref().unwrap()) - area_m2(inner.geometry.as_ref().unwrap()),
        max_relative = 1e-6
    );

    let emptied = difference(&[inner, outer], &options).unwrap();
    assert!(emptied.success);
    assert!(emptied.result.is_empty());
}

#[test]
fn point_buffer_approximates_circle() {
    let f = Feature::new(point!(x: 10.0, y: 45.0));
    let r = buffer(&[f], 1000.0, &OperationOptions::default()).unwrap();

    let Some(Geometry::Polygon(p)) = r.result.features[0].geometry.as_ref() else {
        panic!("expected a polygon");
    };
    assert_eq!(p.exterior().0.len(), 9);
    let circle = std::f64::consts::PI * 1000.0 * 1000.0;
    assert_relative_eq!(output_area(&r), circle, max_relative = 0.1);
}

#[test]
fn three_of_ten_points_join_and_count() {
    let inside = [(0.002, 0.002), (0.005, 0.005), (0.008, 0.001)];
    let outside = [
        (0.02, 0.02),
        (0.03, 0.0),
        (-0.01, -0.01),
        (0.05, 0.05),
        (0.015, 0.005),
        (0.005, -0.005),
        (-0.005, 0.005),
    ];
    let points: Vec<Feature> = inside
        .iter()
        .chain(&outside)
        .map(|&(x, y)| Feature::new(point!(x: x, y: y)))
        .collect();
    let polygons = vec![
        Feature::new(square(0.0, 0.0, 0.01)),
        Feature::new(square(1.0, 1.0, 0.01)),
    ];
    let options = OperationOptions::default();

    let joined = spatial_join(&points, &polygons, &options).unwrap();
    assert_eq!(joined.result.len(), 3);

    let counted = count_points_in_polygons(&points, &polygons, &options).unwrap();
    let counts: Vec<f64> = counted
        .result
        .iter()
        .filter_map(|f| f.get_property("pointCount").and_then(|v| v.as_f64()))
        .collect();
    assert_eq!(counts, vec![3.0, 0.0]);
}

// ---------------------------------------------------------------------------
// Dispatcher and layers
// ---------------------------------------------------------------------------

#[test]
fn dispatcher_flattens_layers_in_order() {
    let layers = [
        Layer::new("a", vec![Feature::new(square(0.0, 0.0, 0.02))].into(), LayerSource::Drawn),
        Layer::new("b", vec![Feature::new(square(0.01, 0.0, 0.02))].into(), LayerSource::Drawn),
    ];
    let r = execute("difference", &layers, &OperationOptions::default());

    assert!(r.success);
    assert_eq!(r.metadata.as_difference().unwrap().primary_index, Some(0));
}

#[test]
fn layer_manager_never_mutates_inputs() {
    let mut manager = LayerManager::new();
    let data = vec![Feature::new(point!(x: 0.0, y: 0.0))];
    let id = manager.add("wells", data.clone().into(), LayerSource::Uploaded);
    manager.set_selected_for_operation(id, true).unwrap();

    let options = OperationOptions::default().with_distance(500.0);
    let (result, out) = manager.run_operation("buffer", &options);

    assert!(result.success);
    assert!(out.is_some());
    assert_eq!(manager.get(id).unwrap().data.features, data);
}

mod common;

use std::collections::HashSet;

use ltv_pipeline::encoding::one_hot_encode;
use ltv_pipeline::inference::BatchPredictor;
use ltv_pipeline::loader::parse_table;
use ltv_pipeline::splits::{SplitLabel, SplitRatios, split_indices, split_table};
use ltv_pipeline::writer::split_csv;
use ltv_pipeline::{PipelineError, Value, rmse};

use common::{FakeMlService, customer_schema, customers_csv};

#[test]
fn every_row_sets_exactly_one_indicator_per_group() {
    let table = parse_table(&customers_csv(37), &customer_schema()).unwrap();
    let encoded = one_hot_encode(&table, &["tier"]).unwrap();
    let group = &encoded.groups[0];
    assert_eq!(group.values, vec!["bronze", "gold", "silver"]);

    let positions: Vec<usize> = group
        .indicator_names()
        .iter()
        .map(|name| encoded.table.schema().position(name).unwrap())
        .collect();
    for row in encoded.table.rows() {
        let set = positions
            .iter()
            .filter(|&&idx| row[idx] == Value::Flag(true))
            .count();
        assert_eq!(set, 1);
    }
}

#[test]
fn split_sizes_follow_floor_cut_points() {
    for total in [0usize, 1, 7, 9, 10, 11, 99, 100, 101, 1234] {
        let split = split_indices(total, 1729, SplitRatios::default()).unwrap();
        let train = total * 7 / 10;
        let validation = total * 9 / 10 - train;
        assert_eq!(
            split.sizes(),
            (train, validation, total - train - validation),
            "total={total}"
        );

        let mut seen = HashSet::new();
        for label in [SplitLabel::Train, SplitLabel::Validation, SplitLabel::Test] {
            for &idx in split.indices(label) {
                assert!(seen.insert(idx), "index {idx} assigned twice");
            }
        }
        assert_eq!(seen.len(), total);
    }
}

#[test]
fn same_seed_same_partition() {
    let first = split_indices(500, 42, SplitRatios::default()).unwrap();
    let second = split_indices(500, 42, SplitRatios::default()).unwrap();
    let other = split_indices(500, 43, SplitRatios::default()).unwrap();
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn hundred_customers_split_seventy_twenty_ten() {
    let table = parse_table(&customers_csv(100), &customer_schema()).unwrap();
    let encoded = one_hot_encode(&table, &["tier"]).unwrap();
    let tables = split_table(&encoded.table, 1729, SplitRatios::default()).unwrap();
    assert_eq!(tables.train.height(), 70);
    assert_eq!(tables.validation.height(), 20);
    assert_eq!(tables.test.height(), 10);

    // visits is unique per row, so it identifies the source row
    let mut seen = HashSet::new();
    for (_, split) in tables.iter() {
        for visits in split.numeric_column("visits").unwrap() {
            assert!(seen.insert(visits as u64));
        }
    }
    assert_eq!(seen.len(), 100);
}

#[test]
fn written_splits_place_or_drop_the_target() {
    let table = parse_table(&customers_csv(50), &customer_schema()).unwrap();
    let encoded = one_hot_encode(&table, &["tier"]).unwrap();
    let tables = split_table(&encoded.table, 1729, SplitRatios::default()).unwrap();

    for label in [SplitLabel::Train, SplitLabel::Validation] {
        let split = tables.get(label);
        let csv = split_csv(split, label).unwrap();
        let targets = split.target_values().unwrap();
        for (line, target) in csv.lines().zip(targets) {
            let first: f64 = line.split(',').next().unwrap().parse().unwrap();
            assert_eq!(first, target);
            assert_eq!(line.split(',').count(), 5);
        }
    }

    let csv = split_csv(&tables.test, SplitLabel::Test).unwrap();
    assert_eq!(csv.lines().count(), tables.test.height());
    for line in csv.lines() {
        assert_eq!(line.split(',').count(), 4);
    }
}

#[test]
fn chunked_prediction_matches_a_single_request() {
    let store = ltv_pipeline::InMemoryObjectStore::new();
    let table = parse_table(&customers_csv(10), &customer_schema()).unwrap();
    let encoded = one_hot_encode(&table, &["tier"]).unwrap();
    let features = encoded.table.without_target().unwrap();

    let chunked_service = FakeMlService::new(&store, 3.5);
    let chunked = BatchPredictor::new(&chunked_service, 3)
        .unwrap()
        .predict_table(&features)
        .unwrap();
    let single_service = FakeMlService::new(&store, 3.5);
    let single = BatchPredictor::new(&single_service, 10)
        .unwrap()
        .predict_table(&features)
        .unwrap();

    assert_eq!(chunked, single);
    let in_row_order: Vec<f64> = features
        .numeric_column("visits")
        .unwrap()
        .into_iter()
        .map(|visits| 3.5 + visits)
        .collect();
    assert_eq!(chunked, in_row_order);
    assert_eq!(
        chunked_service
            .endpoint_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        4
    );
}

#[test]
fn rmse_reference_values() {
    assert_eq!(rmse(&[0.0, 0.0, 0.0], &[0.0, 0.0, 0.0]).unwrap(), 0.0);
    assert_eq!(rmse(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap(), 0.0);
    assert_eq!(rmse(&[0.0, 10.0], &[10.0, 0.0]).unwrap(), 10.0);
    assert!(matches!(
        rmse(&[1.0, 2.0], &[1.0]),
        Err(PipelineError::Data(_))
    ));
}

//! Integration tests for hybrid factors and graph-tree assembly
//!
//! Covers the public surface end to end:
//! - key-set merging
//! - factor classification and its serialized record
//! - enumeration, lookup and compaction of graph trees
//! - combining graph trees and assembling them from a hybrid factor graph

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use apex_hybrid::core::key::{
    DiscreteKey, Key, collect_discrete_keys, collect_keys, collect_keys_with_discrete, symbol,
};
use apex_hybrid::core::values::{DiscreteValues, HybridValues, VectorValues};
use apex_hybrid::factors::{
    DecisionTreeFactor, FactorAndConstant, FactorKeys, GaussianFactorGraphTree, GaussianMixtureFactor,
    GraphAndConstant, HybridFactor, HybridFactorRecord, HybridGaussianFactor, add_graph_trees,
};
use apex_hybrid::linalg::{GaussianFactorGraph, JacobianFactor};
use apex_hybrid::{ApproxEq, HybridError, HybridGaussianFactorGraph, try_init_logger};
use nalgebra::{dmatrix, dvector};
use tracing::{Level, info};

const TOLERANCE: f64 = 1e-12;

fn x(i: u64) -> Key {
    symbol('x', i)
}

fn d(i: u64) -> DiscreteKey {
    DiscreteKey::new(symbol('d', i), 2)
}

/// Single-prior subproblem, distinguishable by `mean`
fn subproblem(key: Key, mean: f64, constant: f64) -> GraphAndConstant {
    let factor = JacobianFactor::unary(key, dmatrix![1.0], dvector![mean]).unwrap();
    GraphAndConstant::from_factor(factor, constant)
}

fn assignment(d0: usize, d1: usize) -> DiscreteValues {
    DiscreteValues::from([(d(0).key, d0), (d(1).key, d1)])
}

#[test]
fn test_merge_continuous_keys_first_occurrence() {
    let merged = collect_keys(&[3, 1, 4], &[1, 5, 9, 3]);
    assert_eq!(merged, vec![3, 1, 4, 5, 9]);
    for key in [3, 1, 4, 5, 9] {
        assert_eq!(merged.iter().filter(|&&k| k == key).count(), 1);
    }
    assert_eq!(collect_keys(&[], &[]), Vec::<Key>::new());
}

#[test]
fn test_merge_discrete_keys_preserves_order() -> Result<(), Box<dyn std::error::Error>> {
    let a = vec![d(2), d(0)];
    let b = vec![d(0), d(1)];
    let merged = collect_discrete_keys(&a, &b)?;
    assert_eq!(merged, vec![d(2), d(0), d(1)]);

    let conflicting = vec![DiscreteKey::new(d(0).key, 3)];
    assert_eq!(
        collect_discrete_keys(&a, &conflicting),
        Err(HybridError::CardinalityMismatch {
            key: d(0).key,
            expected: 2,
            actual: 3
        })
    );

    assert_eq!(collect_keys_with_discrete(&[x(0)], &[d(0)]), vec![x(0), d(0).key]);
    Ok(())
}

#[test]
fn test_factor_classification() -> Result<(), Box<dyn std::error::Error>> {
    let continuous = HybridGaussianFactor::new(JacobianFactor::unary(x(0), dmatrix![1.0], dvector![0.0])?)?;
    assert!(continuous.is_continuous() && !continuous.is_discrete() && !continuous.is_hybrid());

    let discrete = DecisionTreeFactor::new(vec![d(0)], vec![0.5, 0.5])?;
    assert!(discrete.is_discrete() && !discrete.is_continuous() && !discrete.is_hybrid());

    let mixture = GaussianMixtureFactor::from_factors(
        vec![x(0)],
        vec![d(0)],
        vec![
            JacobianFactor::unary(x(0), dmatrix![1.0], dvector![0.0])?,
            JacobianFactor::unary(x(0), dmatrix![1.0], dvector![1.0])?,
        ],
    )?;
    assert!(mixture.is_hybrid() && !mixture.is_continuous() && !mixture.is_discrete());

    assert_eq!(FactorKeys::new(vec![], vec![]), Err(HybridError::EmptyKeys));
    Ok(())
}

#[test]
fn test_factor_record_serializes_field_list() -> Result<(), Box<dyn std::error::Error>> {
    let mixture = GaussianMixtureFactor::from_factors(
        vec![x(0), x(1)],
        vec![d(0)],
        vec![
            JacobianFactor::binary(x(0), dmatrix![-1.0], x(1), dmatrix![1.0], dvector![0.0])?,
            JacobianFactor::binary(x(0), dmatrix![-1.0], x(1), dmatrix![1.0], dvector![1.0])?,
        ],
    )?;
    let record = HybridFactorRecord::from(mixture.factor_keys());
    let json = serde_json::to_value(&record)?;

    assert_eq!(json["is_hybrid"], serde_json::json!(true));
    assert_eq!(json["is_discrete"], serde_json::json!(false));
    assert_eq!(json["is_continuous"], serde_json::json!(false));
    assert_eq!(json["continuous_keys"], serde_json::json!([x(0), x(1)]));
    assert_eq!(
        json["discrete_keys"],
        serde_json::json!([{ "key": d(0).key, "cardinality": 2 }])
    );

    let parsed: HybridFactorRecord = serde_json::from_value(json)?;
    assert_eq!(&FactorKeys::try_from(parsed)?, mixture.factor_keys());
    Ok(())
}

#[test]
fn test_graph_and_constant_equality_properties() {
    let a = subproblem(x(0), 1.0, 0.25);
    let b = subproblem(x(0), 1.0, 0.25 + 1e-6);

    // reflexive at zero tolerance
    assert!(a.approx_eq(&a, 0.0));
    // symmetric
    assert_eq!(a.approx_eq(&b, 1e-5), b.approx_eq(&a, 1e-5));
    // monotonic in the tolerance
    let tolerances = [1e-9, 1e-7, 1e-5, 1e-3];
    let results: Vec<bool> = tolerances.iter().map(|&tol| a.approx_eq(&b, tol)).collect();
    assert_eq!(results, vec![false, false, true, true]);
    // graphs must match as well
    assert!(!a.approx_eq(&subproblem(x(0), 2.0, 0.25), 1.0 - 1e-3));
}

#[test]
fn test_enumerated_graph_tree_lookup() -> Result<(), Box<dyn std::error::Error>> {
    let leaves = vec![
        subproblem(x(0), 0.0, 0.0),
        subproblem(x(0), 1.0, 0.1),
        subproblem(x(0), 10.0, 1.0),
        subproblem(x(0), 11.0, 1.1),
    ];
    let tree = GaussianFactorGraphTree::from_enumeration(&[d(0), d(1)], leaves.clone())?;
    for (i, (d0, d1)) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
        assert_eq!(tree.get(&assignment(d0, d1))?, &leaves[i]);
    }
    assert_eq!(tree.num_leaves(), 4);
    Ok(())
}

#[test]
fn test_compaction_is_transparent_to_lookup() -> Result<(), Box<dyn std::error::Error>> {
    let s0 = subproblem(x(0), 0.0, 0.0);
    let s1 = subproblem(x(0), 5.0, 0.5);
    let compact = GaussianFactorGraphTree::from_enumeration(
        &[d(0), d(1)],
        vec![s0.clone(), s0.clone(), s1.clone(), s1.clone()],
    )?;
    let distinct = GaussianFactorGraphTree::from_enumeration(
        &[d(0), d(1)],
        vec![
            s0.clone(),
            subproblem(x(0), 0.5, 0.0),
            s1.clone(),
            subproblem(x(0), 5.5, 0.5),
        ],
    )?;

    assert!(compact.num_nodes() < distinct.num_nodes());
    assert_eq!(compact.num_leaves(), 2);
    for (d0, d1) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let expected = if d0 == 0 { &s0 } else { &s1 };
        assert_eq!(compact.get(&assignment(d0, d1))?, expected);
    }
    // d1 no longer matters, so it does not have to be assigned
    let only_d0 = DiscreteValues::from([(d(0).key, 1)]);
    assert_eq!(compact.get(&only_d0)?, &s1);
    // but an assigned d1 is still range-checked
    let out_of_range = DiscreteValues::from([(d(0).key, 1), (d(1).key, 5)]);
    assert!(matches!(
        compact.get(&out_of_range),
        Err(HybridError::InvalidAssignment { value: 5, .. })
    ));
    Ok(())
}

#[test]
fn test_combining_graph_trees_sums_constants() -> Result<(), Box<dyn std::error::Error>> {
    let a = GaussianFactorGraphTree::from_choice(
        d(0),
        vec![subproblem(x(0), 0.0, 1.0), subproblem(x(0), 1.0, 2.0)],
    )?;
    let b = GaussianFactorGraphTree::from_choice(
        d(1),
        vec![subproblem(x(1), 0.0, 10.0), subproblem(x(1), 1.0, 20.0)],
    )?;
    let sum = add_graph_trees(&a, &b)?;
    assert_eq!(sum.num_leaves(), 4);

    for (d0, d1) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let values = assignment(d0, d1);
        let leaf = sum.get(&values)?;
        let (left, right) = (a.get(&values)?, b.get(&values)?);
        assert!((leaf.constant - (left.constant + right.constant)).abs() < TOLERANCE);
        assert_eq!(leaf.graph, left.graph.concat(&right.graph));
    }

    let mismatched = GaussianFactorGraphTree::from_choice(
        DiscreteKey::new(d(0).key, 3),
        vec![
            subproblem(x(0), 0.0, 0.0),
            subproblem(x(0), 1.0, 0.0),
            subproblem(x(0), 2.0, 0.0),
        ],
    )?;
    assert!(matches!(
        add_graph_trees(&a, &mismatched),
        Err(HybridError::CardinalityMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_switching_chain_assembly() -> Result<(), Box<dyn std::error::Error>> {
    try_init_logger(Level::DEBUG);

    let mut graph = HybridGaussianFactorGraph::new();
    let prior = Arc::new(JacobianFactor::unary(x(0), dmatrix![1.0], dvector![0.0])?);
    graph.push(HybridGaussianFactor::new(prior.clone())?);
    for i in 1..3 {
        let mode = DiscreteKey::new(symbol('d', i - 1), 2);
        let components = (0..2)
            .map(|k| {
                JacobianFactor::binary(x(i - 1), dmatrix![-1.0], x(i), dmatrix![1.0], dvector![k as f64])
                    .map(|factor| FactorAndConstant::new(factor, -0.5 * k as f64))
            })
            .collect::<Result<Vec<_>, _>>()?;
        graph.push(GaussianMixtureFactor::from_components(
            vec![x(i - 1), x(i)],
            vec![mode],
            components,
        )?);
        graph.push(DecisionTreeFactor::new(vec![mode], vec![0.8, 0.2])?);
    }
    info!("{}", graph.statistics());

    let tree = graph.assemble_graph_tree()?;
    assert_eq!(tree.num_leaves(), 4);
    assert_eq!(tree.depth(), 2);

    for (d0, d1) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
        let leaf = tree.get(&assignment(d0, d1))?;
        // prior plus one component per transition; discrete priors are skipped
        assert_eq!(leaf.graph.len(), 3);
        assert!(Arc::ptr_eq(&leaf.graph.factors()[0], &prior));
        assert!((leaf.constant + 0.5 * (d0 + d1) as f64).abs() < TOLERANCE);
    }

    // The joint error agrees with the assembled subproblem plus the discrete priors
    let continuous = VectorValues::new()
        .with(x(0), dvector![0.0])
        .with(x(1), dvector![1.0])
        .with(x(2), dvector![1.0]);
    let discrete = assignment(1, 0);
    let values = HybridValues::new(continuous.clone(), discrete.clone());
    let leaf = tree.get(&discrete)?;
    let expected = leaf.graph.error(&continuous)? - leaf.constant - 0.2f64.ln() - 0.8f64.ln();
    assert!((graph.error(&values)? - expected).abs() < TOLERANCE);

    let error_tree = graph.error_tree(&continuous)?;
    assert!((error_tree.get(&discrete)? - (leaf.graph.error(&continuous)? - leaf.constant)).abs() < TOLERANCE);
    Ok(())
}

#[test]
fn test_missing_values_propagate_from_graph() -> Result<(), Box<dyn std::error::Error>> {
    let mut graph = HybridGaussianFactorGraph::new();
    graph.push(GaussianMixtureFactor::from_factors(
        vec![x(0)],
        vec![d(0)],
        vec![
            JacobianFactor::unary(x(0), dmatrix![1.0], dvector![0.0])?,
            JacobianFactor::unary(x(0), dmatrix![1.0], dvector![1.0])?,
        ],
    )?);

    let no_discrete = HybridValues::new(VectorValues::new().with(x(0), dvector![0.0]), DiscreteValues::new());
    assert_eq!(graph.error(&no_discrete), Err(HybridError::MissingDiscreteKey(d(0).key)));

    assert_eq!(
        graph.error_tree(&VectorValues::new()),
        Err(HybridError::MissingContinuousKey(x(0)))
    );

    let empty = GaussianFactorGraph::new();
    assert!(GraphAndConstant::new(empty, 0.0).graph.is_empty());
    Ok(())
}

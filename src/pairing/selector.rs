//! Turns distance matrices into ranked query/map pairs.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use nalgebra::DMatrix;
use tracing::{debug, warn};

use super::config::PairingConfig;
use super::distance::PairwiseDistances;
use super::{ImagePair, NamedPose};

/// Similarity in [0, 2] for positive thresholds; higher is closer.
///
/// ```text
/// score = 2 - (min(d, max_distance) / max_distance + min(a, max_angle) / max_angle)
/// ```
///
/// Rejected pairs get a score too; see [`rejection_mask`].
pub fn score_matrix(distances: &PairwiseDistances, config: &PairingConfig) -> DMatrix<f64> {
    let d = &distances.translation;
    let a = &distances.rotation_deg;
    DMatrix::from_fn(d.nrows(), d.ncols(), |i, j| {
        2.0 - (d[(i, j)].min(config.max_distance) / config.max_distance
            + a[(i, j)].min(config.max_angle) / config.max_angle)
    })
}

/// `true` where a pair is too close, too far, or rotated too much.
///
/// NaN distances compare false against every threshold and are not
/// rejected.
pub fn rejection_mask(distances: &PairwiseDistances, config: &PairingConfig) -> DMatrix<bool> {
    let d = &distances.translation;
    let a = &distances.rotation_deg;
    DMatrix::from_fn(d.nrows(), d.ncols(), |i, j| {
        d[(i, j)] < config.min_distance
            || d[(i, j)] > config.max_distance
            || a[(i, j)] > config.max_angle
    })
}

/// Column indices ordered by descending score.
///
/// The sort is stable, so equal scores keep their column order. NaN
/// scores go last.
pub fn rank_by_score(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| descending_nan_last(scores[a], scores[b]));
    order
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

/// Picks up to `top_k` candidates per query row and flattens them,
/// queries in ascending name order.
///
/// Within a row, candidates are walked in [`rank_by_score`] order. A map
/// image with the query's own name is skipped and not counted. Rejected
/// pairs are skipped unless `keep_rejected` is set.
///
/// `distances` must have one row per `query` pose and one column per `map`
/// pose.
pub fn select_pairs(
    query: &[NamedPose],
    map: &[NamedPose],
    distances: &PairwiseDistances,
    config: &PairingConfig,
) -> Vec<ImagePair> {
    debug_assert_eq!(distances.n_query(), query.len(), "distance rows vs query poses");
    debug_assert_eq!(distances.n_map(), map.len(), "distance columns vs map poses");

    let scores = score_matrix(distances, config);
    let rejected = rejection_mask(distances, config);

    let mut per_query: BTreeMap<&str, Vec<(usize, f64)>> = BTreeMap::new();
    for (i, query_pose) in query.iter().enumerate() {
        let row: Vec<f64> = scores.row(i).iter().copied().collect();
        let mut accepted = Vec::new();

        for j in rank_by_score(&row) {
            if config.top_k.is_some_and(|k| accepted.len() >= k) {
                break;
            }
            if !config.keep_rejected && rejected[(i, j)] {
                continue;
            }
            if map[j].name == query_pose.name {
                continue;
            }
            accepted.push((j, row[j]));
        }

        debug!(
            "Query {}: {} of {} candidates kept",
            query_pose.name,
            accepted.len(),
            map.len()
        );
        if per_query.insert(query_pose.name.as_str(), accepted).is_some() {
            warn!(
                "Duplicate query image {}: keeping candidates of the last occurrence",
                query_pose.name
            );
        }
    }

    per_query
        .into_iter()
        .flat_map(|(query_name, accepted)| {
            accepted.into_iter().map(move |(j, score)| ImagePair {
                query: query_name.to_string(),
                map: map[j].name.clone(),
                score,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn named(names: &[&str]) -> Vec<NamedPose> {
        names
            .iter()
            .map(|n| NamedPose::new(*n, SE3::identity()))
            .collect()
    }

    fn distances(translation: &[&[f64]], rotation_deg: &[&[f64]]) -> PairwiseDistances {
        let rows = translation.len();
        let cols = translation.first().map_or(0, |r| r.len());
        let flat = |m: &[&[f64]]| m.iter().flat_map(|r| r.iter().copied()).collect::<Vec<_>>();
        PairwiseDistances {
            translation: DMatrix::from_row_slice(rows, cols, &flat(translation)),
            rotation_deg: DMatrix::from_row_slice(rows, cols, &flat(rotation_deg)),
        }
    }

    fn config(top_k: Option<usize>) -> PairingConfig {
        PairingConfig {
            top_k,
            min_distance: 0.0,
            max_distance: 5.0,
            max_angle: 90.0,
            keep_rejected: false,
        }
    }

    #[test]
    fn test_score_formula() {
        let d = distances(&[&[0.0, 1.0, 10.0]], &[&[0.0, 45.0, 180.0]]);
        let s = score_matrix(&d, &config(None));

        assert_relative_eq!(s[(0, 0)], 2.0);
        assert_relative_eq!(s[(0, 1)], 2.0 - (0.2 + 0.5), epsilon = 1e-12);
        // both terms clamp to 1
        assert_relative_eq!(s[(0, 2)], 0.0);
    }

    #[test]
    fn test_rejection_mask_thresholds() {
        let d = distances(&[&[0.5, 3.0, 6.0, 3.0]], &[&[0.0, 0.0, 0.0, 95.0]]);
        let cfg = PairingConfig {
            min_distance: 1.0,
            ..config(None)
        };
        let mask = rejection_mask(&d, &cfg);

        assert!(mask[(0, 0)]);
        assert!(!mask[(0, 1)]);
        assert!(mask[(0, 2)]);
        assert!(mask[(0, 3)]);
    }

    #[test]
    fn test_rank_by_score_stable_on_ties() {
        let order = rank_by_score(&[1.0, 1.5, 1.0, 1.5, 0.2]);
        assert_eq!(order, vec![1, 3, 0, 2, 4]);
    }

    #[test]
    fn test_rank_by_score_nan_last() {
        let order = rank_by_score(&[f64::NAN, 0.5, 1.0]);
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn test_select_top_k_and_order() {
        let query = named(&["q"]);
        let map = named(&["a", "b", "c", "d"]);
        let d = distances(&[&[2.0, 0.5, 1.0, 4.0]], &[&[0.0, 0.0, 0.0, 0.0]]);

        let pairs = select_pairs(&query, &map, &d, &config(Some(2)));
        let names: Vec<&str> = pairs.iter().map(|p| p.map.as_str()).collect();

        assert_eq!(names, vec!["b", "c"]);
        assert_relative_eq!(pairs[0].score, 1.9, epsilon = 1e-12);
        assert_relative_eq!(pairs[1].score, 1.8, epsilon = 1e-12);
    }

    #[test]
    fn test_self_pair_not_counted_against_top_k() {
        let query = named(&["x"]);
        let map = named(&["x", "y", "z"]);
        let d = distances(&[&[0.0, 1.0, 2.0]], &[&[0.0, 0.0, 0.0]]);

        let pairs = select_pairs(&query, &map, &d, &config(Some(2)));
        let names: Vec<&str> = pairs.iter().map(|p| p.map.as_str()).collect();

        assert_eq!(names, vec!["y", "z"]);
    }

    #[test]
    fn test_keep_rejected_includes_invalid_pairs() {
        let query = named(&["q"]);
        let map = named(&["near", "far"]);
        let d = distances(&[&[1.0, 50.0]], &[&[0.0, 0.0]]);

        let strict = select_pairs(&query, &map, &d, &config(None));
        assert_eq!(strict.len(), 1);

        let cfg = PairingConfig {
            keep_rejected: true,
            ..config(None)
        };
        let loose = select_pairs(&query, &map, &d, &cfg);
        assert_eq!(loose.len(), 2);
        assert_eq!(loose[1].map, "far");
        assert_relative_eq!(loose[1].score, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_top_k_zero_gives_nothing() {
        let query = named(&["q"]);
        let map = named(&["a"]);
        let d = distances(&[&[0.0]], &[&[0.0]]);

        assert!(select_pairs(&query, &map, &d, &config(Some(0))).is_empty());
    }

    #[test]
    fn test_queries_sorted_by_name() {
        let query = named(&["q2", "q1"]);
        let map = named(&["m"]);
        let d = distances(&[&[1.0], &[2.0]], &[&[0.0], &[0.0]]);

        let pairs = select_pairs(&query, &map, &d, &config(None));
        let queries: Vec<&str> = pairs.iter().map(|p| p.query.as_str()).collect();

        assert_eq!(queries, vec!["q1", "q2"]);
        assert_relative_eq!(pairs[0].score, 1.6, epsilon = 1e-12);
    }

    #[test]
    fn test_duplicate_query_keeps_last_row() {
        let query = named(&["q", "q"]);
        let map = named(&["a", "b"]);
        let d = distances(&[&[1.0, 2.0], &[2.0, 1.0]], &[&[0.0, 0.0], &[0.0, 0.0]]);

        let pairs = select_pairs(&query, &map, &d, &config(Some(1)));

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].map, "b");
    }

    #[test]
    fn test_degenerate_config_rejects_everything() {
        let query = named(&["q"]);
        let map = named(&["a", "b"]);
        let d = distances(&[&[1.0, 2.0]], &[&[0.0, 0.0]]);
        let cfg = PairingConfig {
            min_distance: 10.0,
            max_distance: 5.0,
            ..config(None)
        };

        assert!(select_pairs(&query, &map, &d, &cfg).is_empty());
    }

    #[test]
    fn test_negative_max_angle_rejects_everything() {
        let query = named(&["q"]);
        let map = named(&["a", "b"]);
        let d = distances(&[&[0.0, 1.0]], &[&[0.0, 0.0]]);
        let cfg = PairingConfig {
            max_angle: -1.0,
            ..config(None)
        };

        assert!(rejection_mask(&d, &cfg).iter().all(|&r| r));
        assert!(select_pairs(&query, &map, &d, &cfg).is_empty());
    }

    #[test]
    #[should_panic(expected = "distance columns vs map poses")]
    fn test_mismatched_distance_shape_panics() {
        let query = named(&["q"]);
        let map = named(&["a", "b", "c"]);
        let d = distances(&[&[0.0, 1.0]], &[&[0.0, 0.0]]);

        select_pairs(&query, &map, &d, &config(None));
    }

    #[test]
    fn test_nan_translation_is_kept_and_ranked_last() {
        let query = named(&["q"]);
        let mut map = named(&["bad", "good"]);
        map[0].pose.translation = Vector3::new(f64::NAN, 0.0, 0.0);
        let d = distances(&[&[f64::NAN, 1.0]], &[&[0.0, 0.0]]);

        let pairs = select_pairs(&query, &map, &d, &config(None));

        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].map, "good");
        assert!(pairs[1].score.is_nan());
    }
}

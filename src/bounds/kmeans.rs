use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

const MAX_SWEEPS: usize = 100;

/// Two-way Lloyd clustering, used by the recursive ellipsoid split.
///
/// Centers are seeded with the farthest-point heuristic instead of a random
/// choice, so a seeded sampler run stays bit-reproducible. Returns the index
/// sets of the two clusters; the second may be empty for pathological inputs.
pub fn split2(points: ArrayView2<f64>) -> (Vec<usize>, Vec<usize>) {
    let n = points.nrows();
    if n < 2 {
        return ((0..n).collect(), Vec::new());
    }
    let centroid = match points.mean_axis(Axis(0)) {
        Some(c) => c,
        None => return ((0..n).collect(), Vec::new()),
    };
    let first = farthest_from(points, centroid.view());
    let second = farthest_from(points, points.row(first));
    let mut centers = [points.row(first).to_owned(), points.row(second).to_owned()];
    let mut labels = vec![0usize; n];

    for _ in 0..MAX_SWEEPS {
        let mut changed = false;
        for (i, row) in points.axis_iter(Axis(0)).enumerate() {
            let d0 = sqdist(row, centers[0].view());
            let d1 = sqdist(row, centers[1].view());
            let label = usize::from(d1 < d0);
            if label != labels[i] {
                labels[i] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }
        for side in 0..2 {
            let mut acc = Array1::<f64>::zeros(points.ncols());
            let mut count = 0usize;
            for (i, row) in points.axis_iter(Axis(0)).enumerate() {
                if labels[i] == side {
                    acc += &row;
                    count += 1;
                }
            }
            // an emptied side keeps its previous center
            if count > 0 {
                centers[side] = acc / count as f64;
            }
        }
    }

    let left = (0..n).filter(|&i| labels[i] == 0).collect();
    let right = (0..n).filter(|&i| labels[i] == 1).collect();
    (left, right)
}

fn farthest_from(points: ArrayView2<f64>, target: ArrayView1<f64>) -> usize {
    points
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| (i, sqdist(row, target)))
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn sqdist(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn two_blobs(n_each: usize, sep: f64) -> Array2<f64> {
        Array2::from_shape_fn((2 * n_each, 2), |(i, j)| {
            let jitter = ((i * 7 + j * 3) % 13) as f64 / 13.0 * 0.1;
            if i < n_each {
                jitter
            } else {
                sep + jitter
            }
        })
    }

    #[test]
    fn separated_blobs_split_cleanly() {
        let points = two_blobs(20, 5.0);
        let (left, right) = split2(points.view());
        assert_eq!(left.len() + right.len(), 40);
        assert_eq!(left.len(), 20);
        assert_eq!(right.len(), 20);
        // labels are consistent within a blob
        let side_of = |i: usize| usize::from(right.contains(&i));
        for i in 1..20 {
            assert_eq!(side_of(i), side_of(0));
        }
        for i in 21..40 {
            assert_eq!(side_of(i), side_of(20));
        }
        assert_ne!(side_of(0), side_of(20));
    }

    #[test]
    fn partition_covers_all_indices() {
        let points = two_blobs(9, 0.0);
        let (left, right) = split2(points.view());
        let mut all: Vec<usize> = left.into_iter().chain(right).collect();
        all.sort_unstable();
        assert_eq!(all, (0..18).collect::<Vec<_>>());
    }

    #[test]
    fn tiny_inputs_do_not_panic() {
        let points = Array2::<f64>::zeros((1, 2));
        let (left, right) = split2(points.view());
        assert_eq!(left, vec![0]);
        assert!(right.is_empty());
    }
}

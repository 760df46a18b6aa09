use accurate::{sum::Klein, traits::*};
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Useful enumerations for sample and column bookkeeping
pub mod enums;
/// Kinematic four-vectors in collider coordinates
pub mod vectors;

/// A helper method to get evenly spaced bin edges for `bins` bins over a given `range`
pub fn get_bin_edges(bins: usize, range: (f64, f64)) -> Vec<f64> {
    let bin_width = (range.1 - range.0) / (bins as f64);
    (0..=bins)
        .map(|i| range.0 + (i as f64 * bin_width))
        .collect()
}

/// A helper method to obtain the index of a bin where a value should go in a histogram with evenly
/// spaced `bins` over a given `range`
///
/// # See Also
/// [`get_bin_edges`]
pub fn get_bin_index(value: f64, bins: usize, limits: (f64, f64)) -> Option<usize> {
    if value >= limits.0 && value < limits.1 {
        let bin_width = (limits.1 - limits.0) / bins as f64;
        let bin_index = ((value - limits.0) / bin_width).floor() as usize;
        Some(bin_index.min(bins - 1))
    } else {
        None
    }
}

/// Compensated (Kahan-Babuska-Klein) sum of a slice of weights.
pub fn weighted_sum(weights: &[f64]) -> f64 {
    #[cfg(feature = "rayon")]
    return weights
        .par_iter()
        .copied()
        .parallel_sum_with_accumulator::<Klein<f64>>();
    #[cfg(not(feature = "rayon"))]
    return weights
        .iter()
        .copied()
        .sum_with_accumulator::<Klein<f64>>();
}

/// The Cartesian product of index ranges `0..extents[i]`, in row-major order.
pub fn index_product(extents: &[usize]) -> Vec<Vec<usize>> {
    let mut out: Vec<Vec<usize>> = vec![Vec::with_capacity(extents.len())];
    for &extent in extents {
        out = out
            .into_iter()
            .flat_map(|prefix| {
                (0..extent).map(move |i| {
                    let mut next = prefix.clone();
                    next.push(i);
                    next
                })
            })
            .collect();
    }
    out
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_bin_edges() {
        let edges = get_bin_edges(4, (0.0, 2.0));
        assert_eq!(edges.len(), 5);
        assert_relative_eq!(edges[1], 0.5);
        assert_relative_eq!(edges[4], 2.0);
    }

    #[test]
    fn test_bin_index() {
        assert_eq!(get_bin_index(-0.1, 4, (0.0, 2.0)), None);
        assert_eq!(get_bin_index(0.0, 4, (0.0, 2.0)), Some(0));
        assert_eq!(get_bin_index(1.99, 4, (0.0, 2.0)), Some(3));
        assert_eq!(get_bin_index(2.0, 4, (0.0, 2.0)), None);
    }

    #[test]
    fn test_weighted_sum() {
        let weights = vec![0.1; 10];
        assert_relative_eq!(weighted_sum(&weights), 1.0, epsilon = 1e-15);
        assert_relative_eq!(weighted_sum(&[]), 0.0);
    }

    #[test]
    fn test_index_product() {
        let combos = index_product(&[2, 3]);
        assert_eq!(combos.len(), 6);
        assert_eq!(combos[0], vec![0, 0]);
        assert_eq!(combos[1], vec![0, 1]);
        assert_eq!(combos[5], vec![1, 2]);
        assert_eq!(index_product(&[]), vec![Vec::<usize>::new()]);
    }
}

//! Small numeric helpers shared by the detectors

/// Least-squares slope of `values` against their index (0, 1, 2, ...)
///
/// Fewer than two points have no trend and yield 0.0.
pub fn linear_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }

    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = values.iter().sum::<f64>() / n as f64;

    let (mut cov, mut var) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        cov += dx * (y - y_mean);
        var += dx * dx;
    }

    cov / var
}

/// Indices of strict local maxima
///
/// A point qualifies when it is greater than every neighbour within `order`
/// positions on both sides. The first and last points never qualify.
pub fn local_maxima(values: &[f64], order: usize) -> Vec<usize> {
    let n = values.len();
    if n < 3 || order == 0 {
        return Vec::new();
    }

    (1..n - 1)
        .filter(|&i| {
            let lo = i.saturating_sub(order);
            let hi = (i + order).min(n - 1);
            (lo..=hi).filter(|&j| j != i).all(|j| values[i] > values[j])
        })
        .collect()
}

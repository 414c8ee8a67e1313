//! Least-squares line fit over a series, for the convergence trend test.

/// A fitted line `y = slope * x + intercept` plus the sample standard
/// deviation of the input values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    pub std_dev: f64,
}

/// Fit a line to `values` taken at x = 0, 1, 2, ...
///
/// Fewer than two values yield a flat line with zero deviation.
pub fn fit_line(values: &[f64]) -> LineFit {
    let n = values.len();
    if n < 2 {
        return LineFit {
            slope: 0.0,
            intercept: values.first().copied().unwrap_or(0.0),
            std_dev: 0.0,
        };
    }

    let nf = n as f64;
    let mut sx = 0.0;
    let mut sxx = 0.0;
    let mut sy = 0.0;
    let mut sxy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let x = i as f64;
        sx += x;
        sxx += x * x;
        sy += y;
        sxy += x * y;
    }
    let denom = nf * sxx - sx * sx;
    let slope = (nf * sxy - sx * sy) / denom;
    let intercept = (sy - slope * sx) / nf;

    let mean = sy / nf;
    let variance = values.iter().map(|&v| (v - mean) * (v - mean)).sum::<f64>() / (nf - 1.0);

    LineFit {
        slope,
        intercept,
        std_dev: variance.sqrt(),
    }
}

//! Multivariate Gaussian emission with a deterministic fallback ladder.
//!
//! Real event logs routinely produce covariance matrices that are not
//! positive definite: single-support activities, constant columns, or
//! perfectly correlated features. Construction therefore walks a fixed
//! ladder of repairs and tags the result with how far it had to go:
//!
//! 1. direct Cholesky on the raw covariance,
//! 2. epsilon added to zero-variance diagonal entries only,
//! 3. epsilon added to the full diagonal,
//! 4. epsilon added everywhere,
//! 5. diagonal-only covariance with floored variances (never fails).
//!
//! Columns whose covariance row is entirely zero are treated as constants:
//! they are excluded from the density and checked against the mean instead.

use std::fmt;

use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// Default ladder epsilon.
pub const DEFAULT_EPSILON: f64 = 1e-6;

/// Cholesky pivots at or below this are treated as failure.
const MIN_PIVOT: f64 = 1e-12;

const LN_2PI: f64 = 1.837_877_066_409_345_5;

/// Log-probability added for a row that deviates from a constant column.
pub(crate) const LOG_FLOOR: f64 = -23.025_850_929_940_457; // ln(1e-10)

/// Whether epsilon was mixed into the covariance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpsilonMode {
    /// Raw covariance was used.
    NoEpsilon,
    /// Epsilon was added somewhere.
    Epsilon,
    /// No covariance repair applies (degenerate or unseen).
    NotApplicable,
}

/// How far down the fallback ladder construction went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApproxMode {
    /// Raw covariance factorized directly.
    Direct,
    /// Epsilon on zero-variance diagonal entries only.
    FillZeroVariance,
    /// Epsilon on the full diagonal.
    FullDiagonal,
    /// Epsilon on every entry.
    Everywhere,
    /// Diagonal-only covariance with floored variances.
    LastResort,
    /// No variable columns; the density is a pure mean indicator.
    Degenerate,
    /// Event id never seen in training.
    Unseen,
}

/// Diagnostic tag recording how a per-activity Gaussian was constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproximationLevel {
    pub epsilon: EpsilonMode,
    pub approximation: ApproxMode,
}

impl ApproximationLevel {
    /// Tag for event ids with no fitted model.
    pub const UNSEEN: ApproximationLevel = ApproximationLevel {
        epsilon: EpsilonMode::NotApplicable,
        approximation: ApproxMode::Unseen,
    };

    /// True when construction needed any repair at all.
    pub fn is_fallback(&self) -> bool {
        self.approximation != ApproxMode::Direct
    }
}

impl fmt::Display for ApproximationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let eps = match self.epsilon {
            EpsilonMode::NoEpsilon => "no-eps",
            EpsilonMode::Epsilon => "eps",
            EpsilonMode::NotApplicable => "n/a",
        };
        let approx = match self.approximation {
            ApproxMode::Direct => "direct",
            ApproxMode::FillZeroVariance => "fill-zero-variance",
            ApproxMode::FullDiagonal => "full-diagonal",
            ApproxMode::Everywhere => "everywhere",
            ApproxMode::LastResort => "last-resort",
            ApproxMode::Degenerate => "degenerate",
            ApproxMode::Unseen => "unseen",
        };
        write!(f, "{eps}/{approx}")
    }
}

/// Mean, covariance, and support of one activity's continuous block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaussianParams {
    /// Per-dimension mean.
    pub mean: Vec<f64>,
    /// Row-major `dim * dim` covariance.
    pub cov: Vec<f64>,
    /// Number of training rows behind the estimate.
    pub support: usize,
}

impl GaussianParams {
    /// Estimate mean and sample covariance from rows. A single row yields a
    /// zero covariance matrix rather than NaNs.
    pub fn from_rows(rows: &[&[f64]], dim: usize) -> GaussianParams {
        let n = rows.len();
        let mut mean = vec![0.0; dim];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.iter()) {
                *m += v;
            }
        }
        if n > 0 {
            for m in &mut mean {
                *m /= n as f64;
            }
        }

        let mut cov = vec![0.0; dim * dim];
        if n > 1 {
            for row in rows {
                for i in 0..dim {
                    let di = row[i] - mean[i];
                    for j in 0..dim {
                        cov[i * dim + j] += di * (row[j] - mean[j]);
                    }
                }
            }
            let denom = (n - 1) as f64;
            for c in &mut cov {
                *c /= denom;
            }
        }

        GaussianParams {
            mean,
            cov,
            support: n,
        }
    }

    /// Dimensionality of the block.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Columns whose covariance row carries any signal. The rest are
    /// constants pinned to their mean.
    pub fn variable_columns(&self) -> Vec<usize> {
        let dim = self.dim();
        (0..dim)
            .filter(|&i| self.cov[i * dim..(i + 1) * dim].iter().any(|v| *v != 0.0))
            .collect()
    }
}

/// A fitted Gaussian over the variable columns of one activity, with
/// constant columns handled as mean indicators.
#[derive(Debug, Clone)]
pub struct MultivariateGaussian {
    mean: Vec<f64>,
    dim: usize,
    variable: Vec<usize>,
    /// Lower-triangular Cholesky factor over the variable columns.
    chol: Option<Vec<f64>>,
    /// Per-column standard deviations for the diagonal fallback.
    diag_sd: Option<Vec<f64>>,
    log_norm: f64,
    level: ApproximationLevel,
    support: usize,
}

impl MultivariateGaussian {
    /// Construct through the fallback ladder. Never fails.
    pub fn fit(params: &GaussianParams, epsilon: f64) -> MultivariateGaussian {
        let dim = params.dim();
        let variable = params.variable_columns();
        let k = variable.len();

        if k == 0 {
            return MultivariateGaussian {
                mean: params.mean.clone(),
                dim,
                variable,
                chol: None,
                diag_sd: None,
                log_norm: 0.0,
                level: ApproximationLevel {
                    epsilon: EpsilonMode::NotApplicable,
                    approximation: ApproxMode::Degenerate,
                },
                support: params.support,
            };
        }

        let mut sub = vec![0.0; k * k];
        for (si, &ci) in variable.iter().enumerate() {
            for (sj, &cj) in variable.iter().enumerate() {
                sub[si * k + sj] = params.cov[ci * dim + cj];
            }
        }

        let ladder: [(EpsilonMode, ApproxMode); 4] = [
            (EpsilonMode::NoEpsilon, ApproxMode::Direct),
            (EpsilonMode::Epsilon, ApproxMode::FillZeroVariance),
            (EpsilonMode::Epsilon, ApproxMode::FullDiagonal),
            (EpsilonMode::Epsilon, ApproxMode::Everywhere),
        ];
        for (epsilon_mode, approx) in ladder {
            let mut attempt = sub.clone();
            match approx {
                ApproxMode::FillZeroVariance => {
                    for i in 0..k {
                        if attempt[i * k + i] == 0.0 {
                            attempt[i * k + i] = epsilon;
                        }
                    }
                }
                ApproxMode::FullDiagonal => {
                    for i in 0..k {
                        attempt[i * k + i] += epsilon;
                    }
                }
                ApproxMode::Everywhere => {
                    for v in &mut attempt {
                        *v += epsilon;
                    }
                }
                _ => {}
            }
            if let Some(chol) = cholesky(&attempt, k) {
                let log_det: f64 = (0..k).map(|i| 2.0 * chol[i * k + i].ln()).sum();
                return MultivariateGaussian {
                    mean: params.mean.clone(),
                    dim,
                    variable,
                    chol: Some(chol),
                    diag_sd: None,
                    log_norm: -0.5 * (k as f64 * LN_2PI + log_det),
                    level: ApproximationLevel {
                        epsilon: epsilon_mode,
                        approximation: approx,
                    },
                    support: params.support,
                };
            }
        }

        // Every repair failed; fall back to independent per-column Gaussians
        // with floored variances.
        let sd: Vec<f64> = variable
            .iter()
            .map(|&c| params.cov[c * dim + c].max(epsilon).sqrt())
            .collect();
        let log_norm = sd.iter().map(|s| -0.5 * LN_2PI - s.ln()).sum::<f64>();
        MultivariateGaussian {
            mean: params.mean.clone(),
            dim,
            variable,
            chol: None,
            diag_sd: Some(sd),
            log_norm,
            level: ApproximationLevel {
                epsilon: EpsilonMode::NotApplicable,
                approximation: ApproxMode::LastResort,
            },
            support: params.support,
        }
    }

    /// How construction went.
    pub fn level(&self) -> ApproximationLevel {
        self.level
    }

    /// Training rows behind the fit.
    pub fn support(&self) -> usize {
        self.support
    }

    /// Log density of a full-width row slice (the block's columns).
    ///
    /// Constant columns contribute 0 when the row sits on the mean and the
    /// floor penalty when it deviates.
    pub fn log_pdf(&self, x: &[f64]) -> f64 {
        let k = self.variable.len();
        let mut log_p = 0.0;

        // Constant columns: indicator against the mean.
        let mut deviating = false;
        let mut vi = 0;
        for i in 0..self.dim {
            if vi < k && self.variable[vi] == i {
                vi += 1;
                continue;
            }
            if !close(x[i], self.mean[i]) {
                deviating = true;
            }
        }
        if deviating {
            log_p += LOG_FLOOR;
        }

        if k == 0 {
            return log_p;
        }

        if let Some(chol) = &self.chol {
            let diff: Vec<f64> = self
                .variable
                .iter()
                .map(|&c| x[c] - self.mean[c])
                .collect();
            let y = forward_substitute(chol, k, &diff);
            let quad: f64 = y.iter().map(|v| v * v).sum();
            log_p + self.log_norm - 0.5 * quad
        } else if let Some(sd) = &self.diag_sd {
            let quad: f64 = self
                .variable
                .iter()
                .zip(sd)
                .map(|(&c, s)| {
                    let z = (x[c] - self.mean[c]) / s;
                    z * z
                })
                .sum();
            log_p + self.log_norm - 0.5 * quad
        } else {
            log_p
        }
    }

    /// Draw one row for the block's columns. Constant columns reproduce
    /// their mean exactly.
    pub fn sample_into<R: rand::Rng>(&self, rng: &mut R, out: &mut [f64]) {
        for (i, m) in self.mean.iter().enumerate() {
            out[i] = *m;
        }
        let k = self.variable.len();
        if k == 0 {
            return;
        }
        let z: Vec<f64> = (0..k).map(|_| rng.sample(StandardNormal)).collect();
        if let Some(chol) = &self.chol {
            for (si, &c) in self.variable.iter().enumerate() {
                let mut v = 0.0;
                for (sj, zj) in z.iter().enumerate().take(si + 1) {
                    v += chol[si * k + sj] * zj;
                }
                out[c] += v;
            }
        } else if let Some(sd) = &self.diag_sd {
            for ((&c, s), zj) in self.variable.iter().zip(sd).zip(&z) {
                out[c] += s * zj;
            }
        }
    }
}

#[inline]
fn close(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-8 + 1e-5 * b.abs()
}

/// Lower-triangular Cholesky factorization. `None` when the matrix is not
/// positive definite.
pub(crate) fn cholesky(matrix: &[f64], dim: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0; dim * dim];
    for i in 0..dim {
        for j in 0..=i {
            let mut sum = matrix[i * dim + j];
            for k in 0..j {
                sum -= l[i * dim + k] * l[j * dim + k];
            }
            if i == j {
                if !sum.is_finite() || sum <= MIN_PIVOT {
                    return None;
                }
                l[i * dim + i] = sum.sqrt();
            } else {
                l[i * dim + j] = sum / l[j * dim + j];
            }
        }
    }
    Some(l)
}

/// Solve `L y = b` for lower-triangular `L`.
fn forward_substitute(l: &[f64], dim: usize, b: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; dim];
    for i in 0..dim {
        let mut sum = b[i];
        for j in 0..i {
            sum -= l[i * dim + j] * y[j];
        }
        y[i] = sum / l[i * dim + i];
    }
    y
}

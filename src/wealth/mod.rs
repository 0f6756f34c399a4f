// src/wealth/mod.rs

//! Wealth index: standardised household features projected onto their first
//! principal component.
//!
//! The fit depends on the whole batch. Index values from two independent fits
//! are not comparable; refit on the combined batch instead.

pub mod eigen;

use anyhow::{bail, Result};
use tracing::{debug, info, instrument};

use crate::households::{Household, IndexedHousehold, FEATURE_COLS, N_FEATURES};

/// Scales below this are treated as zero variance.
const MIN_SCALE: f64 = 1e-12;

/// Fitted scaler + first principal component.
#[derive(Debug, Clone, PartialEq)]
pub struct WealthIndexModel {
    /// Column means, also used to impute missing values.
    pub means: Vec<f64>,
    /// Population standard deviations (1 for constant columns).
    pub scales: Vec<f64>,
    /// Unit-length loadings of the first component.
    pub component: Vec<f64>,
    pub explained_variance: f64,
    pub explained_variance_ratio: f64,
}

impl WealthIndexModel {
    #[instrument(level = "info", skip(households), fields(n = households.len()))]
    pub fn fit(households: &[Household]) -> Result<Self> {
        let n = households.len();
        if n < 2 {
            bail!("need at least 2 households to fit the wealth index, got {}", n);
        }
        let rows: Vec<[Option<f64>; N_FEATURES]> =
            households.iter().map(Household::features).collect();

        // 1) column means over reported values
        let mut means = vec![0.0; N_FEATURES];
        for (j, mean) in means.iter_mut().enumerate() {
            let (sum, count) = rows
                .iter()
                .filter_map(|r| r[j])
                .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
            if count > 0 {
                *mean = sum / count as f64;
            }
        }

        // 2) population std after mean imputation
        let scales: Vec<f64> = (0..N_FEATURES)
            .map(|j| {
                let var = rows
                    .iter()
                    .map(|r| (r[j].unwrap_or(means[j]) - means[j]).powi(2))
                    .sum::<f64>()
                    / n as f64;
                let sd = var.sqrt();
                if sd < MIN_SCALE {
                    1.0
                } else {
                    sd
                }
            })
            .collect();

        // 3) covariance of the standardised matrix
        let z: Vec<[f64; N_FEATURES]> = rows
            .iter()
            .map(|r| standardise(r, &means, &scales))
            .collect();
        let mut cov = vec![0.0; N_FEATURES * N_FEATURES];
        for row in &z {
            for i in 0..N_FEATURES {
                if row[i] == 0.0 {
                    continue;
                }
                for j in i..N_FEATURES {
                    cov[i * N_FEATURES + j] += row[i] * row[j];
                }
            }
        }
        let denom = (n - 1) as f64;
        for i in 0..N_FEATURES {
            for j in i..N_FEATURES {
                let c = cov[i * N_FEATURES + j] / denom;
                cov[i * N_FEATURES + j] = c;
                cov[j * N_FEATURES + i] = c;
            }
        }

        // 4) leading eigenvector, oriented so its largest loading is positive
        let (vals, vecs) = eigen::symmetric_eigen(cov, N_FEATURES);
        let mut component: Vec<f64> = (0..N_FEATURES).map(|r| vecs[r * N_FEATURES]).collect();
        let pivot = component
            .iter()
            .enumerate()
            .fold(0, |best, (i, v)| {
                if v.abs() > component[best].abs() {
                    i
                } else {
                    best
                }
            });
        if component[pivot] < 0.0 {
            component.iter_mut().for_each(|v| *v = -*v);
        }

        let total: f64 = vals.iter().map(|v| v.max(0.0)).sum();
        let explained_variance = vals[0].max(0.0);
        let explained_variance_ratio = if total > 0.0 {
            explained_variance / total
        } else {
            0.0
        };

        for (name, w) in FEATURE_COLS.iter().zip(&component) {
            debug!(feature = name, loading = w, "component loading");
        }
        info!(explained_variance, explained_variance_ratio, "fitted wealth index");

        Ok(Self {
            means,
            scales,
            component,
            explained_variance,
            explained_variance_ratio,
        })
    }

    /// Project one household onto the fitted component.
    pub fn score(&self, household: &Household) -> f64 {
        standardise(&household.features(), &self.means, &self.scales)
            .iter()
            .zip(&self.component)
            .map(|(z, w)| z * w)
            .sum()
    }

    pub fn transform(&self, households: &[Household]) -> Vec<f64> {
        households.iter().map(|h| self.score(h)).collect()
    }
}

fn standardise(
    row: &[Option<f64>; N_FEATURES],
    means: &[f64],
    scales: &[f64],
) -> [f64; N_FEATURES] {
    let mut out = [0.0; N_FEATURES];
    for (j, o) in out.iter_mut().enumerate() {
        *o = (row[j].unwrap_or(means[j]) - means[j]) / scales[j];
    }
    out
}

/// Fit on the batch and attach each household's index.
pub fn calculate_wealth_index(households: Vec<Household>) -> Result<Vec<IndexedHousehold>> {
    let model = WealthIndexModel::fit(&households)?;
    Ok(households
        .into_iter()
        .map(|household| {
            let wealth_index = model.score(&household);
            IndexedHousehold {
                household,
                wealth_index,
            }
        })
        .collect())
}

//! Gaussian multivariate transfer-entropy network inference.
//!
//! For every target process the estimator greedily builds a conditioning set,
//! first from the target's own past, then from lagged values of the other
//! processes. A candidate is added when its conditional mutual information
//! with the target's present passes the maximum-statistic test. Selected
//! sources are then pruned with the minimum-statistic test, and finally the
//! whole source set must pass an omnibus test.
//!
//! Under the Gaussian model, `2·N·I(X;Y|Z)` is asymptotically χ² distributed
//! with `dim(X)·dim(Y)` degrees of freedom, so all tests are analytic.

use crate::network::settings::EstimatorSettings;
use crate::network::{EstimationError, NetworkInference, WindowData};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Diagonal regularisation applied before every Cholesky factorisation.
const DEFAULT_RIDGE: f64 = 1e-8;

/// A lagged process value used as a predictor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaggedVariable {
    pub process: usize,
    pub lag: usize,
}

/// A significant directed link into a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLink {
    pub source: usize,
    pub lag: usize,
    /// Conditional transfer entropy in nats, given all other selected variables
    pub te: f64,
    pub p_value: f64,
}

/// Inference outcome for one target process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetResult {
    pub target: usize,
    /// Lags of the target's own past kept as conditioning variables
    pub target_lags: Vec<usize>,
    pub sources: Vec<SourceLink>,
    /// Collective transfer entropy of all selected sources, in nats
    pub omnibus_te: f64,
    pub omnibus_p_value: f64,
}

/// Inferred network for one window; process ids are window-local.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkResult {
    pub n_processes: usize,
    /// Samples available after discarding the lag history
    pub n_samples: usize,
    pub targets: BTreeMap<usize, TargetResult>,
}

impl NetworkResult {
    /// Distinct `(source, target)` pairs with at least one significant lag.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .targets
            .values()
            .flat_map(|t| t.sources.iter().map(move |s| (s.source, t.target)))
            .collect();
        edges.sort_unstable();
        edges.dedup();
        edges
    }
}

/// Analytic Gaussian estimator.
#[derive(Debug, Clone)]
pub struct GaussianTransferEntropy {
    ridge: f64,
}

impl Default for GaussianTransferEntropy {
    fn default() -> Self {
        Self {
            ridge: DEFAULT_RIDGE,
        }
    }
}

impl GaussianTransferEntropy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl NetworkInference for GaussianTransferEntropy {
    type Output = NetworkResult;

    fn analyse_network(
        &mut self,
        data: &WindowData,
        settings: &EstimatorSettings,
    ) -> Result<NetworkResult, EstimationError> {
        settings.validate()?;

        let values = data.values();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(EstimationError::Inference(
                "window contains non-finite values".to_string(),
            ));
        }

        let n_processes = data.processes();
        let max_lag = settings.max_lag();
        if n_processes == 0 || data.samples() < max_lag + 2 {
            debug!(
                "Degenerate window ({} processes, {} samples); returning empty network",
                n_processes,
                data.samples()
            );
            return Ok(NetworkResult {
                n_processes,
                n_samples: 0,
                targets: BTreeMap::new(),
            });
        }

        let embedding = Embedding::new(values, max_lag, self.ridge);
        let mut targets = BTreeMap::new();
        for target in 0..n_processes {
            let result = embedding.analyse_target(target, settings);
            if settings.verbose {
                info!(
                    "Target {}: {} past lags, {} sources selected",
                    target,
                    result.target_lags.len(),
                    result.sources.len()
                );
            }
            targets.insert(target, result);
        }

        Ok(NetworkResult {
            n_processes,
            n_samples: embedding.n,
            targets,
        })
    }
}

/// Covariance of every process at every lag `0..=max_lag`, over the samples
/// that have a full lag history.
struct Embedding {
    n: usize,
    width: usize,
    ridge: f64,
    cov: DMatrix<f64>,
}

impl Embedding {
    fn new(values: &DMatrix<f64>, max_lag: usize, ridge: f64) -> Self {
        let (processes, samples) = values.shape();
        let n = samples - max_lag;
        let width = max_lag + 1;

        let mut embedded = DMatrix::<f64>::zeros(n, processes * width);
        for p in 0..processes {
            let z = standardize(values.row(p).iter().copied().collect());
            for lag in 0..width {
                for t in 0..n {
                    embedded[(t, p * width + lag)] = z[max_lag + t - lag];
                }
            }
        }

        for mut column in embedded.column_iter_mut() {
            let mean = column.mean();
            column.add_scalar_mut(-mean);
        }

        let cov = (embedded.transpose() * &embedded) / (n as f64 - 1.0);
        Self {
            n,
            width,
            ridge,
            cov,
        }
    }

    fn index(&self, var: LaggedVariable) -> usize {
        var.process * self.width + var.lag
    }

    fn log_det(&self, indices: &[usize]) -> Option<f64> {
        if indices.is_empty() {
            return Some(0.0);
        }
        let k = indices.len();
        let sub = DMatrix::from_fn(k, k, |i, j| {
            let v = self.cov[(indices[i], indices[j])];
            if i == j {
                v + self.ridge
            } else {
                v
            }
        });
        let l = sub.cholesky()?.l();
        Some(2.0 * (0..k).map(|i| l[(i, i)].ln()).sum::<f64>())
    }

    /// `I(X; Y | Z)` in nats, clamped at zero.
    fn cmi(&self, x: &[usize], y: &[usize], z: &[usize]) -> f64 {
        let xz: Vec<usize> = x.iter().chain(z).copied().collect();
        let yz: Vec<usize> = y.iter().chain(z).copied().collect();
        let xyz: Vec<usize> = x.iter().chain(y).chain(z).copied().collect();

        match (
            self.log_det(&xz),
            self.log_det(&yz),
            self.log_det(z),
            self.log_det(&xyz),
        ) {
            (Some(a), Some(b), Some(c), Some(d)) => (0.5 * (a + b - c - d)).max(0.0),
            _ => 0.0,
        }
    }

    fn p_value(&self, cmi: f64, dof: usize) -> f64 {
        chi_squared_sf(2.0 * self.n as f64 * cmi, dof)
    }

    /// Add candidates one at a time while the best passes the max-stat test.
    fn include(
        &self,
        present: usize,
        conditioning: &mut Vec<LaggedVariable>,
        candidates: &[LaggedVariable],
        alpha: f64,
    ) {
        loop {
            let remaining: Vec<LaggedVariable> = candidates
                .iter()
                .filter(|c| !conditioning.contains(c))
                .copied()
                .collect();
            if remaining.is_empty() {
                return;
            }

            let z: Vec<usize> = conditioning.iter().map(|v| self.index(*v)).collect();
            let Some((best, best_cmi)) = remaining
                .iter()
                .map(|c| (*c, self.cmi(&[present], &[self.index(*c)], &z)))
                .max_by(|a, b| a.1.total_cmp(&b.1))
            else {
                return;
            };

            let p = self.p_value(best_cmi, 1);
            let p_max = max_stat_p_value(p, remaining.len());
            if p_max < alpha {
                debug!(
                    "Selected process {} lag {} (cmi {:.4}, p_max {:.2e})",
                    best.process, best.lag, best_cmi, p_max
                );
                conditioning.push(best);
            } else {
                return;
            }
        }
    }

    fn analyse_target(&self, target: usize, settings: &EstimatorSettings) -> TargetResult {
        let present = self.index(LaggedVariable {
            process: target,
            lag: 0,
        });
        let processes = self.cov.nrows() / self.width;

        let past_candidates: Vec<LaggedVariable> = (1..=settings.target_lag())
            .map(|lag| LaggedVariable {
                process: target,
                lag,
            })
            .collect();
        let source_candidates: Vec<LaggedVariable> = (0..processes)
            .filter(|&p| p != target)
            .flat_map(|p| {
                (settings.min_lag_sources..=settings.max_lag_sources)
                    .map(move |lag| LaggedVariable { process: p, lag })
            })
            .collect();

        let mut past = Vec::new();
        self.include(present, &mut past, &past_candidates, settings.alpha_max_stat);

        let mut conditioning = past.clone();
        self.include(
            present,
            &mut conditioning,
            &source_candidates,
            settings.alpha_max_stat,
        );
        let mut sources: Vec<LaggedVariable> = conditioning.split_off(past.len());

        // Minimum-statistic pruning.
        let mut links = loop {
            let links = self.conditional_links(present, &past, &sources);
            let Some((weakest, link)) = links
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.te.total_cmp(&b.1.te))
            else {
                break links;
            };
            let p_min = max_stat_p_value(link.p_value, sources.len());
            if p_min <= settings.alpha_min_stat {
                break links;
            }
            debug!(
                "Pruned process {} lag {} from target {}",
                link.source, link.lag, target
            );
            sources.remove(weakest);
        };

        let past_idx: Vec<usize> = past.iter().map(|v| self.index(*v)).collect();
        let source_idx: Vec<usize> = sources.iter().map(|v| self.index(*v)).collect();
        let (mut omnibus_te, mut omnibus_p_value) = (0.0, 1.0);
        if !sources.is_empty() {
            omnibus_te = self.cmi(&[present], &source_idx, &past_idx);
            omnibus_p_value = self.p_value(omnibus_te, sources.len());
            if omnibus_p_value >= settings.alpha_omnibus {
                debug!("Target {} failed the omnibus test", target);
                links.clear();
            }
        }

        TargetResult {
            target,
            target_lags: past.iter().map(|v| v.lag).collect(),
            sources: links,
            omnibus_te,
            omnibus_p_value,
        }
    }

    /// TE of each selected source given the target past and all other sources.
    fn conditional_links(
        &self,
        present: usize,
        past: &[LaggedVariable],
        sources: &[LaggedVariable],
    ) -> Vec<SourceLink> {
        sources
            .iter()
            .enumerate()
            .map(|(i, var)| {
                let z: Vec<usize> = past
                    .iter()
                    .chain(sources.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, v)| v))
                    .map(|v| self.index(*v))
                    .collect();
                let te = self.cmi(&[present], &[self.index(*var)], &z);
                SourceLink {
                    source: var.process,
                    lag: var.lag,
                    te,
                    p_value: self.p_value(te, 1),
                }
            })
            .collect()
    }
}

/// Z-score a series; a constant series becomes all zeros.
fn standardize(mut series: Vec<f64>) -> Vec<f64> {
    let n = series.len() as f64;
    let mean = series.iter().sum::<f64>() / n;
    let var = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let sd = var.sqrt();
    for v in series.iter_mut() {
        *v = if sd > 0.0 { (*v - mean) / sd } else { 0.0 };
    }
    series
}

fn chi_squared_sf(stat: f64, dof: usize) -> f64 {
    ChiSquared::new(dof.max(1) as f64)
        .map(|d| d.sf(stat.max(0.0)))
        .unwrap_or(1.0)
}

/// p-value of the largest of `m` independent statistics: `1 - (1 - p)^m`.
fn max_stat_p_value(p: f64, m: usize) -> f64 {
    if p >= 1.0 {
        return 1.0;
    }
    -((m as f64) * (-p).ln_1p()).exp_m1()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// xorshift64* uniform noise in [-0.5, 0.5).
    struct Noise(u64);

    impl Noise {
        fn next(&mut self) -> f64 {
            self.0 ^= self.0 >> 12;
            self.0 ^= self.0 << 25;
            self.0 ^= self.0 >> 27;
            let bits = self.0.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 11;
            bits as f64 / (1u64 << 53) as f64 - 0.5
        }
    }

    fn window(rows: Vec<Vec<f64>>) -> WindowData {
        let processes = rows.len();
        let samples = rows.first().map(Vec::len).unwrap_or(0);
        WindowData::new(DMatrix::from_fn(processes, samples, |p, s| rows[p][s]))
    }

    #[test]
    fn test_detects_lagged_coupling() {
        let mut noise = Noise(0x9E37_79B9_7F4A_7C15);
        let samples = 500;
        let x: Vec<f64> = (0..samples).map(|_| noise.next()).collect();
        let y: Vec<f64> = (0..samples)
            .map(|t| {
                let driven = if t >= 2 { 0.8 * x[t - 2] } else { 0.0 };
                driven + 0.3 * noise.next()
            })
            .collect();

        let mut estimator = GaussianTransferEntropy::new();
        let result = estimator
            .analyse_network(&window(vec![x, y]), &EstimatorSettings::default())
            .unwrap();

        assert_eq!(result.n_processes, 2);
        assert_eq!(result.n_samples, samples - 6);
        let into_y = &result.targets[&1];
        assert!(into_y.sources.iter().any(|s| s.source == 0 && s.lag == 2));
        assert!(into_y.omnibus_p_value < 0.01);
        assert!(result.edges().contains(&(0, 1)));
    }

    #[test]
    fn test_cmi_of_independent_series_is_small() {
        let mut a = Noise(11);
        let mut b = Noise(977);
        let rows = vec![
            (0..1000).map(|_| a.next()).collect(),
            (0..1000).map(|_| b.next()).collect(),
        ];
        let data = window(rows);
        let embedding = Embedding::new(data.values(), 1, DEFAULT_RIDGE);

        let present = embedding.index(LaggedVariable { process: 1, lag: 0 });
        let source = embedding.index(LaggedVariable { process: 0, lag: 1 });
        assert!(embedding.cmi(&[present], &[source], &[]) < 0.02);
    }

    #[test]
    fn test_cmi_of_identical_series_is_large() {
        let mut a = Noise(5);
        let x: Vec<f64> = (0..300).map(|_| a.next()).collect();
        let data = window(vec![x.clone(), x]);
        let embedding = Embedding::new(data.values(), 0, DEFAULT_RIDGE);
        assert!(embedding.cmi(&[0], &[1], &[]) > 3.0);
    }

    #[test]
    fn test_degenerate_windows_yield_empty_networks() {
        let mut estimator = GaussianTransferEntropy::new();
        let settings = EstimatorSettings::default();

        let empty = estimator
            .analyse_network(&WindowData::new(DMatrix::zeros(0, 0)), &settings)
            .unwrap();
        assert!(empty.targets.is_empty());

        let short = estimator
            .analyse_network(&window(vec![vec![0.1; 7]]), &settings)
            .unwrap();
        assert_eq!(short.n_processes, 1);
        assert!(short.targets.is_empty());
    }

    #[test]
    fn test_constant_process_selects_nothing() {
        let mut noise = Noise(42);
        let rows = vec![vec![0.5; 100], (0..100).map(|_| noise.next()).collect()];
        let mut estimator = GaussianTransferEntropy::new();
        let result = estimator
            .analyse_network(&window(rows), &EstimatorSettings::default())
            .unwrap();

        let into_constant = &result.targets[&0];
        assert!(into_constant.sources.is_empty());
        assert!(into_constant.target_lags.is_empty());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut estimator = GaussianTransferEntropy::new();
        let err = estimator
            .analyse_network(
                &window(vec![vec![0.1, f64::NAN, 0.3]]),
                &EstimatorSettings::default(),
            )
            .unwrap_err();
        assert!(matches!(err, EstimationError::Inference(_)));
    }

    #[test]
    fn test_max_stat_p_value() {
        assert!((max_stat_p_value(0.01, 1) - 0.01).abs() < 1e-12);
        assert!((max_stat_p_value(0.01, 2) - 0.0199).abs() < 1e-12);
        assert_eq!(max_stat_p_value(1.0, 5), 1.0);
    }
}

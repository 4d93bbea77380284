use anyhow::{Result, bail};
use log::{debug, warn};
use ndarray::Array1;

use crate::io::params::GtrParamsFile;
use crate::nucleotide::Nucleotide;
use crate::reduce::{ModelVariant, ReducedStats};
use crate::stats::RootTally;
use crate::utils::logsumexp;

const FREQ_SUM_TOL: f64 = 1e-6;

/// Fixed GTR parameters: equilibrium frequencies in G, C, T, A order and
/// exchangeabilities in GC, GT, GA, CT, CA, TA order.
#[derive(Debug, Clone, PartialEq)]
pub struct GtrParameters {
    pub pi: [f64; 4],
    pub exchangeability: [f64; 6],
}

impl GtrParameters {
    pub fn new(pi: [f64; 4], exchangeability: [f64; 6]) -> Result<Self> {
        for (i, p) in pi.iter().enumerate() {
            if !p.is_finite() || *p < 0.0 {
                bail!(
                    "frequency of {} must be finite and non-negative, got {p}",
                    Nucleotide::ALL[i]
                );
            }
        }
        for (i, r) in exchangeability.iter().enumerate() {
            if !r.is_finite() || *r < 0.0 {
                bail!("exchangeability {i} must be finite and non-negative, got {r}");
            }
        }
        let sum: f64 = pi.iter().sum();
        if (sum - 1.0).abs() > FREQ_SUM_TOL {
            warn!("equilibrium frequencies sum to {sum}, not 1");
        }
        Ok(Self {
            pi,
            exchangeability,
        })
    }

    pub fn uniform() -> Self {
        Self {
            pi: [0.25; 4],
            exchangeability: [1.0; 6],
        }
    }

    pub fn rates(&self) -> [f64; 12] {
        let [pi_g, pi_c, pi_t, pi_a] = self.pi;
        let [r_gc, r_gt, r_ga, r_ct, r_ca, r_ta] = self.exchangeability;
        [
            r_gc * pi_c,
            r_gt * pi_t,
            r_ga * pi_a,
            r_gc * pi_g,
            r_ct * pi_t,
            r_ca * pi_a,
            r_gt * pi_g,
            r_ct * pi_c,
            r_ta * pi_a,
            r_ga * pi_g,
            r_ca * pi_c,
            r_ta * pi_t,
        ]
    }

    pub fn exit_rates(&self) -> [f64; 4] {
        let mu = self.rates();
        let origin = ModelVariant::ContextFree.origin_states();
        let mut out = [0.0; 4];
        for (k, m) in mu.iter().enumerate() {
            out[origin[k]] += m;
        }
        out
    }
}

impl TryFrom<GtrParamsFile> for GtrParameters {
    type Error = anyhow::Error;

    fn try_from(file: GtrParamsFile) -> Result<Self> {
        let pi: [f64; 4] = match file.frequencies.as_slice().try_into() {
            Ok(v) => v,
            Err(_) => bail!(
                "expected 4 equilibrium frequencies, got {}",
                file.frequencies.len()
            ),
        };
        let r: [f64; 6] = match file.exchangeabilities.as_slice().try_into() {
            Ok(v) => v,
            Err(_) => bail!(
                "expected 6 exchangeabilities, got {}",
                file.exchangeabilities.len()
            ),
        };
        Self::new(pi, r)
    }
}

#[derive(Debug, Clone, Default)]
pub struct LikelihoodOptions {
    pub include_root_term: bool,
}

/// Per-draw GTR log-likelihood under the Poisson-process factorization
///
/// `sum_j sum_k N[j,k] ln(mu_k t_j) - mu_k t_j phi[j,b(k)]`
///
/// A term is exactly zero when its count or its dwell proportion is zero.
#[derive(Debug, Clone)]
pub struct GtrLikelihood {
    params: GtrParameters,
    mu: [f64; 12],
    options: LikelihoodOptions,
}

impl GtrLikelihood {
    pub fn new(params: GtrParameters, options: LikelihoodOptions) -> Self {
        let mu = params.rates();
        debug!("GTR rates: {mu:?}");
        Self {
            params,
            mu,
            options,
        }
    }

    pub fn rates(&self) -> &[f64; 12] {
        &self.mu
    }

    pub fn params(&self) -> &GtrParameters {
        &self.params
    }

    pub fn evaluate(
        &self,
        stats: &ReducedStats,
        branch_lengths: &Array1<f64>,
        root: &RootTally,
    ) -> Result<Array1<f64>> {
        if stats.variant != ModelVariant::ContextFree {
            bail!(
                "GTR likelihood needs context-free statistics, got {:?}",
                stats.variant
            );
        }
        let n_branches = stats.n_branches();
        let n_draws = stats.n_draws();
        if branch_lengths.len() != n_branches {
            bail!(
                "{} branch lengths for {} branches",
                branch_lengths.len(),
                n_branches
            );
        }
        if self.options.include_root_term && root.counts.ncols() != n_draws {
            bail!(
                "root tally covers {} draws, statistics cover {}",
                root.counts.ncols(),
                n_draws
            );
        }

        let mut loglike = Array1::zeros(n_draws);
        for c in 0..n_draws {
            let mut sum = 0.0;
            if self.options.include_root_term {
                for (l, pi) in self.params.pi.iter().enumerate() {
                    let n = root.counts[(l, c)];
                    if n > 0 {
                        sum += f64::from(n) * pi.ln();
                    }
                }
            }
            for j in 0..n_branches {
                let t = branch_lengths[j];
                for (k, mu) in self.mu.iter().enumerate() {
                    let n = stats.counts[(j, k, c)];
                    let phi = stats.proportions[(j, stats.origin(k), c)];
                    if n == 0 || phi == 0.0 {
                        continue;
                    }
                    sum += f64::from(n) * (mu * t).ln();
                    sum -= mu * t * phi;
                }
            }
            loglike[c] = sum;
        }
        Ok(loglike)
    }
}

pub fn draw_weights(loglike: &Array1<f64>) -> (Array1<f64>, f64) {
    if loglike.is_empty() {
        return (Array1::zeros(0), 0.0);
    }
    let vals = loglike.to_vec();
    let norm = logsumexp(&vals);
    if !norm.is_finite() {
        let n = loglike.len();
        return (Array1::from_elem(n, 1.0 / n as f64), n as f64);
    }
    let w = loglike.mapv(|l| (l - norm).exp());
    let sum_sq: f64 = w.iter().map(|x| x * x).sum();
    let ess = if sum_sq > 0.0 { 1.0 / sum_sq } else { 0.0 };
    (w, ess)
}

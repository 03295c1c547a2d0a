//! Collaborative trainer: implicit-feedback Alternating Least Squares.
//!
//! Each stored interaction weight `r` becomes a confidence `c = 1 + alpha * r`
//! with preference 1; unobserved cells have confidence 1 and preference 0.
//! Every call fits from scratch against the matrix it is given.

use crate::config::EngineConfig;
use crate::services::aggregator::InteractionMatrix;
use anyhow::{bail, Context, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

/// ALS hyperparameters.
#[derive(Debug, Clone)]
pub struct AlsConfig {
    pub factors: usize,
    pub iterations: usize,
    pub regularization: f32,
    pub alpha: f32,
    pub seed: u64,
    /// Nonzero entries required before a fit is attempted.
    pub min_interactions: usize,
}

impl Default for AlsConfig {
    fn default() -> Self {
        Self {
            factors: 50,
            iterations: 20,
            regularization: 0.1,
            alpha: 1.0,
            seed: 42,
            min_interactions: 5,
        }
    }
}

impl From<&EngineConfig> for AlsConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            factors: config.als_factors,
            iterations: config.als_iterations,
            regularization: config.als_regularization,
            alpha: config.als_alpha,
            seed: config.als_seed,
            min_interactions: config.min_interactions_for_collab,
        }
    }
}

/// Fitted latent factors.
#[derive(Debug, Clone)]
pub struct LatentFactorModel {
    user_factors: HashMap<String, Array1<f32>>,
    item_factors: Array2<f32>,
}

impl LatentFactorModel {
    pub fn factors(&self) -> usize {
        self.item_factors.ncols()
    }

    pub fn n_items(&self) -> usize {
        self.item_factors.nrows()
    }

    pub fn user_factor(&self, user_id: &str) -> Option<ArrayView1<'_, f32>> {
        self.user_factors.get(user_id).map(|v| v.view())
    }

    pub fn item_factors(&self) -> &Array2<f32> {
        &self.item_factors
    }

    pub fn n_users(&self) -> usize {
        self.user_factors.len()
    }

    /// Raw affinity of `user_id` for every item, if the user has a factor.
    pub fn scores_for(&self, user_id: &str) -> Option<Array1<f32>> {
        self.user_factors
            .get(user_id)
            .map(|factor| self.item_factors.dot(factor))
    }

    /// Every user vector has the same dimensionality as the item factors.
    pub fn is_consistent(&self) -> bool {
        let k = self.factors();
        self.user_factors.values().all(|v| v.len() == k)
    }
}

pub struct AlsTrainer {
    config: AlsConfig,
}

impl AlsTrainer {
    pub fn new(config: AlsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AlsConfig {
        &self.config
    }

    /// Fit a model, or `None` when there is not enough signal or the fit
    /// fails. Failures never propagate.
    pub fn train(&self, matrix: &InteractionMatrix) -> Option<LatentFactorModel> {
        let nnz = matrix.nnz();
        if nnz < self.config.min_interactions {
            debug!(
                nnz,
                min_interactions = self.config.min_interactions,
                "Not enough interactions for collaborative model"
            );
            return None;
        }

        let start = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.fit(matrix)));

        match outcome {
            Ok(Ok(model)) => {
                info!(
                    n_users = matrix.n_users(),
                    n_items = matrix.n_items(),
                    n_interactions = nnz,
                    factors = self.config.factors,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "ALS model trained"
                );
                Some(model)
            }
            Ok(Err(e)) => {
                let reason = format!("{:#}", e);
                warn!(error = %reason, "ALS training failed, falling back to content-based");
                None
            }
            Err(_) => {
                warn!("ALS training panicked, falling back to content-based");
                None
            }
        }
    }

    fn fit(&self, matrix: &InteractionMatrix) -> Result<LatentFactorModel> {
        let k = self.config.factors;
        if k == 0 {
            bail!("factor dimensionality must be positive");
        }
        if matrix.n_users() == 0 {
            bail!("interaction matrix has no users");
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut user_factors = random_factors(&mut rng, matrix.n_users(), k);
        let mut item_factors = random_factors(&mut rng, matrix.n_items(), k);

        let rows = matrix.rows();
        let columns = matrix.columns();

        for iteration in 0..self.config.iterations {
            self.solve_side(&mut user_factors, &item_factors, rows)
                .with_context(|| format!("user step, iteration {}", iteration))?;
            self.solve_side(&mut item_factors, &user_factors, &columns)
                .with_context(|| format!("item step, iteration {}", iteration))?;

            if iteration % 5 == 0 {
                let loss = weighted_loss(rows, &user_factors, &item_factors, self.config.alpha);
                debug!(iteration, loss, "ALS iteration");
            }
        }

        if user_factors.iter().chain(item_factors.iter()).any(|v| !v.is_finite()) {
            bail!("non-finite factor values after {} iterations", self.config.iterations);
        }

        let user_factors = matrix
            .user_ids()
            .iter()
            .enumerate()
            .map(|(u, user_id)| (user_id.clone(), user_factors.row(u).to_owned()))
            .collect();

        Ok(LatentFactorModel {
            user_factors,
            item_factors,
        })
    }

    /// Recompute every row of `target` holding `fixed` constant.
    ///
    /// For row u: (FtF + sum_i (c_ui - 1) f_i f_i^T + lambda I) x_u = sum_i c_ui f_i
    fn solve_side(
        &self,
        target: &mut Array2<f32>,
        fixed: &Array2<f32>,
        entries: &[Vec<(usize, f32)>],
    ) -> Result<()> {
        let k = fixed.ncols();
        let fixed64 = fixed.mapv(f64::from);
        let gram = fixed64.t().dot(&fixed64);
        let lambda = f64::from(self.config.regularization);
        let alpha = f64::from(self.config.alpha);

        for (row, observed) in entries.iter().enumerate() {
            let mut a = gram.clone();
            let mut b = Array1::<f64>::zeros(k);

            for &(other, weight) in observed {
                let confidence = 1.0 + alpha * f64::from(weight);
                let f = fixed64.row(other);
                for i in 0..k {
                    b[i] += confidence * f[i];
                    for j in 0..k {
                        a[[i, j]] += (confidence - 1.0) * f[i] * f[j];
                    }
                }
            }
            for i in 0..k {
                a[[i, i]] += lambda;
            }

            let x = cholesky_solve(&a, &b).with_context(|| format!("row {}", row))?;
            target.row_mut(row).assign(&x.mapv(|v| v as f32));
        }

        Ok(())
    }
}

fn random_factors(rng: &mut StdRng, rows: usize, k: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, k), |_| rng.gen_range(-0.01..0.01))
}

fn weighted_loss(
    rows: &[Vec<(usize, f32)>],
    user_factors: &Array2<f32>,
    item_factors: &Array2<f32>,
    alpha: f32,
) -> f32 {
    let mut loss = 0.0;
    let mut count = 0usize;
    for (u, row) in rows.iter().enumerate() {
        for &(i, weight) in row {
            let prediction = user_factors.row(u).dot(&item_factors.row(i));
            loss += (1.0 + alpha * weight) * (1.0 - prediction).powi(2);
            count += 1;
        }
    }
    if count > 0 {
        loss / count as f32
    } else {
        0.0
    }
}

/// Solve `a x = b` for symmetric positive definite `a`.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for p in 0..j {
                sum += l[[i, p]] * l[[j, p]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    bail!("matrix is not positive definite");
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // L^T x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Ok(x)
}

//! Linear classifiers: penalized logistic regression and a linear support
//! vector classifier with Platt-calibrated probabilities. The Platt sigmoid
//! is fitted on out-of-fold decision values from stratified inner folds of
//! the training partition.
//!
//! Both solve the primal problem with accelerated proximal gradient descent
//! (FISTA); the l1 part of a penalty is handled by soft thresholding. The
//! only exception is the non-smooth hinge loss, which uses averaged
//! subgradient steps.
use ndarray::{s, Array1, Array2, ArrayView1, Axis};

use crate::config::{Penalty, SvcLoss};
use crate::data_handling::TrainingPartition;
use crate::error::{OmicLearnError, Result};
use crate::models::classifier_trait::{not_fitted, sigmoid, ClassifierModel};
use crate::splitter::stratified_fold_ids;

const TOLERANCE: f64 = 1e-6;
const POWER_ITERATIONS: usize = 50;

/// Coefficients of a fitted linear model.
#[derive(Debug, Clone)]
struct LinearFit {
    coef: Array1<f64>,
    intercept: f64,
}

impl LinearFit {
    fn decision(&self, x: &Array2<f64>) -> Array1<f64> {
        x.dot(&self.coef) + self.intercept
    }
}

/// Training rows with a trailing column of ones for the intercept.
fn augment(x: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::ones((x.nrows(), x.ncols() + 1));
    out.slice_mut(s![.., ..x.ncols()]).assign(x);
    out
}

/// Largest eigenvalue of `xᵀx / n` by power iteration.
fn spectral_bound(x: &Array2<f64>) -> f64 {
    let n = x.nrows().max(1) as f64;
    let mut v = Array1::from_elem(x.ncols(), 1.0 / (x.ncols() as f64).sqrt());
    let mut lambda = 0.0;
    for _ in 0..POWER_ITERATIONS {
        let w = x.t().dot(&x.dot(&v)) / n;
        let norm = w.dot(&w).sqrt();
        if norm <= f64::EPSILON {
            return f64::EPSILON;
        }
        lambda = norm;
        v = w / norm;
    }
    lambda
}

fn soft_threshold(v: f64, t: f64) -> f64 {
    if v > t {
        v - t
    } else if v < -t {
        v + t
    } else {
        0.0
    }
}

/// Penalty strengths on the `1/n`-scaled objective.
#[derive(Debug, Clone, Copy)]
struct Regularization {
    l1: f64,
    l2: f64,
    penalize_intercept: bool,
}

/// FISTA on `f(θ) + l1·|w|₁`, where `grad` returns ∇f without the l2 part.
fn fista<G>(
    n_params: usize,
    lipschitz: f64,
    reg: Regularization,
    max_iter: usize,
    grad: G,
) -> Array1<f64>
where
    G: Fn(&Array1<f64>) -> Array1<f64>,
{
    let step = 1.0 / (lipschitz + reg.l2);
    let last = n_params - 1;
    let mut theta = Array1::<f64>::zeros(n_params);
    let mut momentum = theta.clone();
    let mut t = 1.0f64;

    for _ in 0..max_iter {
        let mut g = grad(&momentum);
        for j in 0..n_params {
            if j != last || reg.penalize_intercept {
                g[j] += reg.l2 * momentum[j];
            }
        }
        let mut next = &momentum - &(g * step);
        for j in 0..last {
            next[j] = soft_threshold(next[j], step * reg.l1);
        }

        let t_next = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
        let delta = &next - &theta;
        momentum = &next + &(&delta * ((t - 1.0) / t_next));
        let change = delta.iter().fold(0.0f64, |m, d| m.max(d.abs()));
        theta = next;
        t = t_next;
        if change < TOLERANCE {
            break;
        }
    }
    theta
}

/// ±1 margins: `+1` for Class 0.
fn signs(y: &Array1<bool>) -> Array1<f64> {
    y.mapv(|v| if v { 1.0 } else { -1.0 })
}

fn split_theta(theta: Array1<f64>) -> LinearFit {
    let p = theta.len() - 1;
    LinearFit {
        intercept: theta[p],
        coef: theta.slice(s![..p]).to_owned(),
    }
}

pub struct LogisticRegression {
    penalty: Penalty,
    c: f64,
    l1_ratio: f64,
    max_iter: usize,
    fitted: Option<LinearFit>,
}

impl LogisticRegression {
    pub fn new(penalty: Penalty, c: f64, l1_ratio: f64, max_iter: usize) -> Self {
        LogisticRegression {
            penalty,
            c,
            l1_ratio,
            max_iter,
            fitted: None,
        }
    }
}

impl ClassifierModel for LogisticRegression {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let xa = augment(train.x());
        let s = signs(train.labels());
        let n = xa.nrows() as f64;
        let strength = 1.0 / (self.c * n);
        let (l1, l2) = match self.penalty {
            Penalty::L2 => (0.0, strength),
            Penalty::L1 => (strength, 0.0),
            Penalty::ElasticNet => (self.l1_ratio * strength, (1.0 - self.l1_ratio) * strength),
            Penalty::None => (0.0, 0.0),
        };
        let reg = Regularization {
            l1,
            l2,
            penalize_intercept: false,
        };

        let theta = fista(
            xa.ncols(),
            0.25 * spectral_bound(&xa),
            reg,
            self.max_iter,
            |theta| {
                let z = xa.dot(theta);
                // d/dz log(1 + exp(-s z)) = -s σ(-s z)
                let r = ndarray::Zip::from(&z)
                    .and(&s)
                    .map_collect(|&z, &s| -s * sigmoid(-s * z));
                xa.t().dot(&r) / n
            },
        );
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(OmicLearnError::fit(
                "classifier",
                "logistic regression diverged to non-finite coefficients",
            ));
        }
        self.fitted = Some(split_theta(theta));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let fit = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(fit.decision(x).mapv(sigmoid))
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.fitted.as_ref().map(|f| f.coef.mapv(f64::abs))
    }

    fn name(&self) -> &str {
        "LogisticRegression"
    }
}

pub struct LinearSvc {
    penalty: Penalty,
    loss: SvcLoss,
    c: f64,
    max_iter: usize,
    calibration_folds: usize,
    seed: u64,
    fitted: Option<(LinearFit, PlattScaling)>,
}

impl LinearSvc {
    pub fn new(penalty: Penalty, loss: SvcLoss, c: f64, max_iter: usize) -> Result<Self> {
        if penalty == Penalty::L1 && loss == SvcLoss::Hinge {
            return Err(OmicLearnError::Configuration(
                "LinearSVC does not support the combination of penalty='l1' and loss='hinge'".into(),
            ));
        }
        Ok(LinearSvc {
            penalty,
            loss,
            c,
            max_iter,
            calibration_folds: 2,
            seed: 0,
            fitted: None,
        })
    }

    /// Number of stratified inner folds whose held-out decision values
    /// calibrate the probabilities, and the seed that assigns them.
    pub fn with_calibration_folds(mut self, folds: usize, seed: u64) -> Self {
        self.calibration_folds = folds;
        self.seed = seed;
        self
    }

    fn fit_linear(&self, x: &Array2<f64>, y: &Array1<bool>) -> Result<LinearFit> {
        let xa = augment(x);
        let s = signs(y);
        let theta = match self.loss {
            SvcLoss::SquaredHinge => self.fit_squared_hinge(&xa, &s),
            SvcLoss::Hinge => self.fit_hinge(&xa, &s),
        };
        if theta.iter().any(|v| !v.is_finite()) {
            return Err(OmicLearnError::fit(
                "classifier",
                "LinearSVC diverged to non-finite coefficients",
            ));
        }
        Ok(split_theta(theta))
    }

    /// Decision value of every training row from a model that did not see it.
    fn out_of_fold_decisions(&self, x: &Array2<f64>, y: &Array1<bool>) -> Result<Array1<f64>> {
        let labels = y.to_vec();
        let folds = stratified_fold_ids(&labels, self.calibration_folds, self.seed).map_err(|e| {
            OmicLearnError::fit("classifier", format!("LinearSVC probability calibration: {}", e))
        })?;
        let mut decisions = Array1::<f64>::zeros(x.nrows());
        for fold in 0..self.calibration_folds {
            let (held_out, kept): (Vec<usize>, Vec<usize>) =
                (0..folds.len()).partition(|&i| folds[i] == fold);
            let kept_y: Array1<bool> = kept.iter().map(|&i| labels[i]).collect();
            let fit = self.fit_linear(&x.select(Axis(0), &kept), &kept_y)?;
            let values = fit.decision(&x.select(Axis(0), &held_out));
            for (&i, &v) in held_out.iter().zip(values.iter()) {
                decisions[i] = v;
            }
        }
        Ok(decisions)
    }

    fn fit_squared_hinge(&self, xa: &Array2<f64>, s: &Array1<f64>) -> Array1<f64> {
        let n = xa.nrows() as f64;
        let strength = 1.0 / (self.c * n);
        let reg = match self.penalty {
            Penalty::L1 => Regularization {
                l1: strength,
                l2: 0.0,
                penalize_intercept: false,
            },
            _ => Regularization {
                l1: 0.0,
                l2: strength,
                penalize_intercept: true,
            },
        };
        fista(
            xa.ncols(),
            2.0 * spectral_bound(xa),
            reg,
            self.max_iter,
            |theta| {
                let z = xa.dot(theta);
                let r = ndarray::Zip::from(&z)
                    .and(s)
                    .map_collect(|&z, &s| -2.0 * s * (1.0 - s * z).max(0.0));
                xa.t().dot(&r) / n
            },
        )
    }

    /// Averaged subgradient descent on the l2-penalized hinge loss.
    fn fit_hinge(&self, xa: &Array2<f64>, s: &Array1<f64>) -> Array1<f64> {
        let n = xa.nrows() as f64;
        let lambda = 1.0 / (self.c * n);
        let mut theta = Array1::<f64>::zeros(xa.ncols());
        let mut average = theta.clone();
        for t in 1..=self.max_iter {
            let z = xa.dot(&theta);
            let r = ndarray::Zip::from(&z)
                .and(s)
                .map_collect(|&z, &s| if s * z < 1.0 { -s } else { 0.0 });
            let g = xa.t().dot(&r) / n + &theta * lambda;
            let step = 1.0 / (lambda * t as f64);
            theta = &theta - &(g * step);
            average = &average + &((&theta - &average) / t as f64);
        }
        average
    }
}

impl ClassifierModel for LinearSvc {
    fn fit(&mut self, train: &TrainingPartition) -> Result<()> {
        let decisions = self.out_of_fold_decisions(train.x(), train.labels())?;
        let platt = PlattScaling::fit(decisions.view(), train.labels())?;
        let fit = self.fit_linear(train.x(), train.labels())?;
        self.fitted = Some((fit, platt));
        Ok(())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (fit, platt) = self.fitted.as_ref().ok_or_else(|| not_fitted(self.name()))?;
        Ok(fit.decision(x).mapv(|f| platt.proba(f)))
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.fitted.as_ref().map(|(f, _)| f.coef.mapv(f64::abs))
    }

    fn name(&self) -> &str {
        "LinearSVC"
    }
}

/// Sigmoid mapping of decision values to Class 0 probabilities,
/// `p = σ(a·f + b)`, fitted by Newton's method on regularized targets.
#[derive(Debug, Clone, Copy)]
pub struct PlattScaling {
    a: f64,
    b: f64,
}

impl PlattScaling {
    pub fn fit(decision: ArrayView1<f64>, y: &Array1<bool>) -> Result<Self> {
        let n0 = y.iter().filter(|&&v| v).count() as f64;
        let n1 = y.len() as f64 - n0;
        let hi = (n0 + 1.0) / (n0 + 2.0);
        let lo = 1.0 / (n1 + 2.0);
        let targets: Vec<f64> = y.iter().map(|&v| if v { hi } else { lo }).collect();

        let loss = |a: f64, b: f64| -> f64 {
            decision
                .iter()
                .zip(&targets)
                .map(|(&f, &t)| {
                    let p = sigmoid(a * f + b).clamp(1e-15, 1.0 - 1e-15);
                    -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
                })
                .sum()
        };

        let mut a = 0.0;
        let mut b = ((n0 + 1.0) / (n1 + 1.0)).ln();
        let mut current = loss(a, b);
        for _ in 0..100 {
            let (mut ga, mut gb, mut haa, mut hab, mut hbb) = (0.0, 0.0, 1e-12, 0.0, 1e-12);
            for (&f, &t) in decision.iter().zip(&targets) {
                let p = sigmoid(a * f + b);
                let d = p - t;
                let w = p * (1.0 - p);
                ga += d * f;
                gb += d;
                haa += w * f * f;
                hab += w * f;
                hbb += w;
            }
            if ga.abs() < 1e-9 && gb.abs() < 1e-9 {
                break;
            }
            let det = haa * hbb - hab * hab;
            if det.abs() <= f64::EPSILON {
                break;
            }
            let da = -(hbb * ga - hab * gb) / det;
            let db = -(haa * gb - hab * ga) / det;

            let mut scale = 1.0;
            let mut improved = false;
            while scale >= 1e-10 {
                let candidate = loss(a + scale * da, b + scale * db);
                if candidate < current + 1e-4 * scale * (ga * da + gb * db) {
                    a += scale * da;
                    b += scale * db;
                    current = candidate;
                    improved = true;
                    break;
                }
                scale /= 2.0;
            }
            if !improved {
                break;
            }
        }

        if !a.is_finite() || !b.is_finite() {
            return Err(OmicLearnError::fit(
                "classifier",
                "probability calibration did not converge",
            ));
        }
        Ok(PlattScaling { a, b })
    }

    pub fn proba(&self, decision: f64) -> f64 {
        sigmoid(self.a * decision + self.b)
    }
}

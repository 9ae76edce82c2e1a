//! Stratified fold generation.
//!
//! Every scheme draws from a single `ChaCha8Rng` seeded with the run seed, so
//! the same labels, scheme, counts and seed always yield the same folds.
use ndarray::Array1;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::{CrossValidationConfig, CvScheme};
use crate::error::{OmicLearnError, Result};

/// Disjoint train/test sample indices of one fold, both sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldSplit {
    fold: usize,
    repeat: usize,
    train: Vec<usize>,
    test: Vec<usize>,
}

impl FoldSplit {
    pub(crate) fn new(fold: usize, repeat: usize, train: Vec<usize>, test: Vec<usize>) -> Self {
        FoldSplit {
            fold,
            repeat,
            train,
            test,
        }
    }

    pub fn fold(&self) -> usize {
        self.fold
    }

    pub fn repeat(&self) -> usize {
        self.repeat
    }

    pub fn train(&self) -> &[usize] {
        &self.train
    }

    pub fn test(&self) -> &[usize] {
        &self.test
    }
}

/// Lazy sequence of [`FoldSplit`]s for one of the stratified schemes.
///
/// k-fold schemes shuffle each class separately, lay the shuffled Class 0
/// indices followed by the shuffled Class 1 indices end to end, and deal
/// them round-robin into the folds. Per fold and per class the counts then
/// differ by at most one.
#[derive(Debug, Clone)]
pub struct StratifiedSplitter {
    scheme: CvScheme,
    n_splits: usize,
    total: usize,
    n_test: (usize, usize),
    class0: Vec<usize>,
    class1: Vec<usize>,
    assignment: Vec<usize>,
    rng: ChaCha8Rng,
    next_index: usize,
}

impl StratifiedSplitter {
    pub fn new(labels: &Array1<bool>, config: &CrossValidationConfig, seed: u64) -> Result<Self> {
        config.validate()?;

        let class0: Vec<usize> = (0..labels.len()).filter(|&i| labels[i]).collect();
        let class1: Vec<usize> = (0..labels.len()).filter(|&i| !labels[i]).collect();

        for (name, members) in [("Class 0", class0.len()), ("Class 1", class1.len())] {
            if members < config.n_splits {
                return Err(OmicLearnError::InsufficientSamples {
                    class: name.to_string(),
                    members,
                    required: config.n_splits,
                });
            }
        }

        let n_test = match config.scheme {
            CvScheme::StratifiedShuffleSplit => {
                shuffle_split_test_counts(class0.len(), class1.len(), config.test_size)
            }
            _ => (0, 0),
        };

        log::debug!(
            "{} with {} splits yields {} folds ({} Class 0, {} Class 1 samples)",
            config.scheme,
            config.n_splits,
            config.total_folds(),
            class0.len(),
            class1.len()
        );

        Ok(StratifiedSplitter {
            scheme: config.scheme,
            n_splits: config.n_splits,
            total: config.total_folds(),
            n_test,
            class0,
            class1,
            assignment: vec![0; labels.len()],
            rng: ChaCha8Rng::seed_from_u64(seed),
            next_index: 0,
        })
    }

    fn reshuffle_assignment(&mut self) {
        deal_folds(
            &self.class0,
            &self.class1,
            self.n_splits,
            &mut self.rng,
            &mut self.assignment,
        );
    }

    fn next_kfold(&mut self, fold: usize, repeat: usize) -> FoldSplit {
        if fold == 0 {
            self.reshuffle_assignment();
        }
        let (test, train): (Vec<usize>, Vec<usize>) =
            (0..self.assignment.len()).partition(|&i| self.assignment[i] == fold);
        FoldSplit::new(fold, repeat, train, test)
    }

    fn next_shuffle_split(&mut self, fold: usize) -> FoldSplit {
        let mut c0 = self.class0.clone();
        let mut c1 = self.class1.clone();
        c0.shuffle(&mut self.rng);
        c1.shuffle(&mut self.rng);

        let mut is_test = vec![false; self.assignment.len()];
        for &i in c0.iter().take(self.n_test.0).chain(c1.iter().take(self.n_test.1)) {
            is_test[i] = true;
        }
        let (test, train): (Vec<usize>, Vec<usize>) =
            (0..is_test.len()).partition(|&i| is_test[i]);
        FoldSplit::new(fold, 0, train, test)
    }
}

impl Iterator for StratifiedSplitter {
    type Item = FoldSplit;

    fn next(&mut self) -> Option<FoldSplit> {
        if self.next_index >= self.total {
            return None;
        }
        let index = self.next_index;
        self.next_index += 1;

        let split = match self.scheme {
            CvScheme::StratifiedShuffleSplit => self.next_shuffle_split(index),
            CvScheme::StratifiedKFold | CvScheme::RepeatedStratifiedKFold => {
                self.next_kfold(index % self.n_splits, index / self.n_splits)
            }
        };
        Some(split)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total - self.next_index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for StratifiedSplitter {}

/// Shuffle each class and deal the indices round-robin into `n_folds`
/// folds, writing each sample's fold into `assignment`.
fn deal_folds(
    class0: &[usize],
    class1: &[usize],
    n_folds: usize,
    rng: &mut ChaCha8Rng,
    assignment: &mut [usize],
) {
    let mut c0 = class0.to_vec();
    let mut c1 = class1.to_vec();
    c0.shuffle(rng);
    c1.shuffle(rng);
    for (pos, idx) in c0.into_iter().chain(c1).enumerate() {
        assignment[idx] = pos % n_folds;
    }
}

/// Stratified fold number of every sample for a single seeded k-fold pass.
/// Used for inner folds within a training partition, where the outer split
/// count limits do not apply. Fails when a class has fewer than `n_folds`
/// members.
pub(crate) fn stratified_fold_ids(labels: &[bool], n_folds: usize, seed: u64) -> Result<Vec<usize>> {
    let class0: Vec<usize> = (0..labels.len()).filter(|&i| labels[i]).collect();
    let class1: Vec<usize> = (0..labels.len()).filter(|&i| !labels[i]).collect();
    for (name, members) in [("Class 0", class0.len()), ("Class 1", class1.len())] {
        if members < n_folds {
            return Err(OmicLearnError::InsufficientSamples {
                class: name.to_string(),
                members,
                required: n_folds,
            });
        }
    }
    let mut assignment = vec![0; labels.len()];
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    deal_folds(&class0, &class1, n_folds, &mut rng, &mut assignment);
    Ok(assignment)
}

/// Per-class test sizes for one shuffle split: `ceil(test_size * n)` samples
/// allocated by largest remainder, keeping at least one sample of each class
/// on both sides.
fn shuffle_split_test_counts(n0: usize, n1: usize, test_size: f64) -> (usize, usize) {
    let n = n0 + n1;
    let n_test = ((test_size * n as f64).ceil() as usize).clamp(2, n - 2);

    let exact0 = n_test as f64 * n0 as f64 / n as f64;
    let exact1 = n_test as f64 - exact0;
    let mut t0 = exact0.floor() as usize;
    let mut t1 = exact1.floor() as usize;
    if t0 + t1 < n_test {
        if exact0.fract() >= exact1.fract() {
            t0 += 1;
        } else {
            t1 += 1;
        }
    }

    t0 = t0.clamp(1, n0 - 1);
    t1 = n_test.saturating_sub(t0).clamp(1, n1 - 1);
    t0 = n_test.saturating_sub(t1).clamp(1, n0 - 1);
    (t0, t1)
}

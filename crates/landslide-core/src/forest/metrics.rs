//! Held-out validation: confusion matrix, overall accuracy, Cohen's kappa.
use serde::{Deserialize, Serialize};

/// Square confusion matrix over the labels observed in the evaluated pairs.
/// `counts[i][j]` counts samples whose actual label is `labels[i]` and whose
/// predicted label is `labels[j]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub labels: Vec<u8>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Build from `(actual, predicted)` pairs.
    pub fn from_pairs(pairs: &[(u8, u8)]) -> Self {
        let mut labels: Vec<u8> = pairs.iter().flat_map(|&(a, p)| [a, p]).collect();
        labels.sort_unstable();
        labels.dedup();
        let k = labels.len();
        let mut counts = vec![vec![0usize; k]; k];
        for &(a, p) in pairs {
            if let (Ok(i), Ok(j)) = (labels.binary_search(&a), labels.binary_search(&p)) {
                counts[i][j] += 1;
            }
        }
        Self { labels, counts }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.labels.len()).map(|i| self.counts[i][i]).sum()
    }

    /// Fraction on the diagonal; `None` for an empty matrix.
    pub fn accuracy(&self) -> Option<f64> {
        let n = self.total();
        (n > 0).then(|| self.correct() as f64 / n as f64)
    }

    /// Cohen's kappa. `None` for an empty matrix or when chance agreement is 1.
    pub fn kappa(&self) -> Option<f64> {
        let n = self.total() as f64;
        let po = self.accuracy()?;
        let k = self.labels.len();
        let pe: f64 = (0..k)
            .map(|i| {
                let row: usize = self.counts[i].iter().sum();
                let col: usize = self.counts.iter().map(|r| r[i]).sum();
                row as f64 * col as f64
            })
            .sum::<f64>()
            / (n * n);
        if (1.0 - pe).abs() < 1e-12 {
            return None;
        }
        Some((po - pe) / (1.0 - pe))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub matrix: ConfusionMatrix,
    pub accuracy: Option<f64>,
    pub kappa: Option<f64>,
    /// Labelled test samples evaluated.
    pub evaluated: usize,
}

impl ValidationMetrics {
    pub fn from_pairs(pairs: &[(u8, u8)]) -> Self {
        let matrix = ConfusionMatrix::from_pairs(pairs);
        Self {
            accuracy: matrix.accuracy(),
            kappa: matrix.kappa(),
            evaluated: pairs.len(),
            matrix,
        }
    }
}

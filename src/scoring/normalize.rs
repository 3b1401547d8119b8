/// Score normalization, used at several pipeline stages.
use crate::sources::TaxonCount;

/// Anything carrying a mutable score that can be rescaled.
pub trait Scored {
    fn score(&self) -> f64;
    fn set_score(&mut self, score: f64);
}

impl Scored for TaxonCount {
    fn score(&self) -> f64 {
        self.count
    }
    fn set_score(&mut self, score: f64) {
        self.count = score;
    }
}

/// Rescale scores in place so they sum to `total`. The caller guards the
/// all-zero case; an empty slice is a no-op.
pub fn normalize<S: Scored>(scores: &mut [S], total: f64) {
    let sum: f64 = scores.iter().map(|s| s.score()).sum();
    if sum == 0.0 {
        return;
    }
    for s in scores.iter_mut() {
        s.set_score(s.score() * total / sum);
    }
}

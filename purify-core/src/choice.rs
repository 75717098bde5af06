/// Lexicographic generator of k-element index combinations out of `0..n`.
///
/// Yields `C(n, k)` strictly increasing index vectors, starting at
/// `[0, 1, .., k-1]` and ending at `[n-k, .., n-1]`. Choosing zero elements
/// yields a single empty combination; choosing more than `n` yields nothing.
/// The generator can be rewound with [`ChoiceGenerator::reset`] or cloned.
#[derive(Debug, Clone)]
pub struct ChoiceGenerator {
    n: usize,
    k: usize,
    current: Vec<usize>,
    started: bool,
    done: bool,
}

impl ChoiceGenerator {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            k,
            current: (0..k).collect(),
            started: false,
            done: k > n,
        }
    }

    /// Rewind to the first combination.
    pub fn reset(&mut self) {
        *self = Self::new(self.n, self.k);
    }

    /// Advance `current` in place; false once the last combination was passed.
    fn advance(&mut self) -> bool {
        let (n, k) = (self.n, self.k);
        // Rightmost slot that can still move up.
        let Some(pos) = (0..k).rev().find(|&i| self.current[i] < n - k + i) else {
            return false;
        };
        self.current[pos] += 1;
        for i in pos + 1..k {
            self.current[i] = self.current[i - 1] + 1;
        }
        true
    }
}

impl Iterator for ChoiceGenerator {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        if self.done {
            return None;
        }
        if !self.started {
            self.started = true;
        } else if !self.advance() {
            self.done = true;
            return None;
        }
        Some(self.current.clone())
    }
}

/// Binomial coefficient `C(n, k)`, saturating at `u64::MAX`.
pub fn choose(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u64 = 1;
    for i in 0..k {
        // acc * (n - i) / (i + 1) stays integral at every step.
        acc = match acc.checked_mul((n - i) as u64) {
            Some(v) => v / (i as u64 + 1),
            None => return u64::MAX,
        };
    }
    acc
}

/// Pick the elements of `items` at the positions named by `choice`.
pub fn select<T: Clone>(choice: &[usize], items: &[T]) -> Vec<T> {
    choice.iter().map(|&i| items[i].clone()).collect()
}

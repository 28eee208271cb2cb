//! Viterbi decoding.

use hades_stats::log_sum_exp_slice;
use ndarray::Array2;

use hades_distributions::Symbol;

use crate::compiled::Model;
use crate::state::State;

impl Model {
    /// Finds the most likely state path for a sequence.
    ///
    /// The recurrence is the forward algorithm with sums replaced by
    /// maxima; emitting scores additionally include the state decoding
    /// weights. Returns the path log probability and the path as
    /// `(observations_consumed, state)` pairs from start to the final
    /// state, silent visits included. Returns `(-inf, None)` when no
    /// path can produce the sequence.
    pub fn viterbi(&self, sequence: &[Symbol]) -> (f64, Option<Vec<(usize, State)>>) {
        let emissions = self.emission_table(sequence);
        let n = sequence.len();
        let m = self.len();
        let mut v = Array2::from_elem((n + 1, m), f64::NEG_INFINITY);
        // Traceback: the (row, state) cell each maximum came from.
        let mut tb_row = Array2::from_elem((n + 1, m), -1isize);
        let mut tb_col = Array2::from_elem((n + 1, m), -1isize);
        let mut scales = vec![0.0; n + 1];

        v[[0, self.start_index]] = 0.0;
        for l in self.silent_start..m {
            if l == self.start_index {
                continue;
            }
            for idx in self.in_edges(l) {
                let k = self.in_source[idx];
                if k >= self.silent_start && k < l {
                    let score = v[[0, k]] + self.in_log_p[idx];
                    if score > v[[0, l]] {
                        v[[0, l]] = score;
                        tb_row[[0, l]] = 0;
                        tb_col[[0, l]] = k as isize;
                    }
                }
            }
        }

        for t in 0..n {
            for l in 0..self.silent_start {
                let base = emissions[[t, l]] + self.state_log_weight[l];
                for idx in self.in_edges(l) {
                    let k = self.in_source[idx];
                    let score = v[[t, k]] + self.in_log_p[idx] + base;
                    if score > v[[t + 1, l]] {
                        v[[t + 1, l]] = score;
                        tb_row[[t + 1, l]] = t as isize;
                        tb_col[[t + 1, l]] = k as isize;
                    }
                }
            }
            for l in self.silent_start..m {
                for idx in self.in_edges(l) {
                    let k = self.in_source[idx];
                    if k < self.silent_start {
                        let score = v[[t + 1, k]] + self.in_log_p[idx];
                        if score > v[[t + 1, l]] {
                            v[[t + 1, l]] = score;
                            tb_row[[t + 1, l]] = (t + 1) as isize;
                            tb_col[[t + 1, l]] = k as isize;
                        }
                    }
                }
            }
            for l in self.silent_start..m {
                for idx in self.in_edges(l) {
                    let k = self.in_source[idx];
                    if k >= self.silent_start && k < l {
                        let score = v[[t + 1, k]] + self.in_log_p[idx];
                        if score > v[[t + 1, l]] {
                            v[[t + 1, l]] = score;
                            tb_row[[t + 1, l]] = (t + 1) as isize;
                            tb_col[[t + 1, l]] = k as isize;
                        }
                    }
                }
            }

            // A per-row shift keeps magnitudes bounded and preserves
            // every argmax; the shift column is added back below.
            let row = v.row(t + 1);
            let scale = log_sum_exp_slice(row.as_slice().expect("rows are contiguous"));
            if scale.is_finite() {
                for l in 0..m {
                    v[[t + 1, l]] -= scale;
                }
                scales[t + 1] = scale;
            }
        }

        let mut cumulative = 0.0;
        for t in 1..=n {
            cumulative += scales[t];
            if cumulative != 0.0 {
                for l in 0..m {
                    v[[t, l]] += cumulative;
                }
            }
        }

        let (mut t, mut i) = if self.finite {
            (n, self.end_index)
        } else {
            let mut best = 0usize;
            for l in 1..m {
                if v[[n, l]] > v[[n, best]] {
                    best = l;
                }
            }
            (n, best)
        };
        let score = v[[t, i]];
        if !score.is_finite() {
            return (f64::NEG_INFINITY, None);
        }

        let mut cells = vec![(t, i)];
        while !(t == 0 && i == self.start_index) {
            let pt = tb_row[[t, i]];
            let pi = tb_col[[t, i]];
            if pt < 0 {
                // No recorded predecessor despite a finite score; the
                // path is unrecoverable.
                return (f64::NEG_INFINITY, None);
            }
            t = pt as usize;
            i = pi as usize;
            cells.push((t, i));
        }
        cells.reverse();
        let path = cells
            .into_iter()
            .map(|(t, i)| (t, self.states[i].clone()))
            .collect();
        (score, Some(path))
    }
}

//! The backward algorithm.

use hades_stats::{log_sum_exp, log_sum_exp_slice};
use ndarray::Array2;

use hades_distributions::Symbol;

use crate::compiled::Model;

impl Model {
    /// Runs the backward algorithm.
    ///
    /// Returns an `(n + 1) x |S|` matrix where `b[[t, i]]` is the log
    /// probability of emitting the remaining observations `t..n` (and
    /// reaching end, for finite models) given that the process sits in
    /// state `i` with `t` observations already emitted. The same
    /// row-rescaling scheme as [`Model::forward`] is applied and undone
    /// before returning.
    pub fn backward(&self, sequence: &[Symbol]) -> Array2<f64> {
        let emissions = self.emission_table(sequence);
        self.backward_with(&emissions)
    }

    pub(crate) fn backward_with(&self, emissions: &Array2<f64>) -> Array2<f64> {
        let n = emissions.nrows();
        let m = self.len();
        let mut b = Array2::from_elem((n + 1, m), f64::NEG_INFINITY);
        let mut scales = vec![0.0; n + 1];

        // Row n: a finite model must still reach end through silent
        // transitions; an infinite model may stop in any emitting state.
        if self.finite {
            b[[n, self.end_index]] = 0.0;
            for k in (self.silent_start..m).rev() {
                if k == self.end_index {
                    continue;
                }
                let mut acc = f64::NEG_INFINITY;
                for idx in self.out_edges(k) {
                    let l = self.out_target[idx];
                    if l >= self.silent_start && l > k {
                        acc = log_sum_exp(acc, b[[n, l]] + self.out_log_p[idx]);
                    }
                }
                b[[n, k]] = acc;
            }
            for k in 0..self.silent_start {
                let mut acc = f64::NEG_INFINITY;
                for idx in self.out_edges(k) {
                    let l = self.out_target[idx];
                    if l >= self.silent_start {
                        acc = log_sum_exp(acc, b[[n, l]] + self.out_log_p[idx]);
                    }
                }
                b[[n, k]] = acc;
            }
        } else {
            for k in 0..self.silent_start {
                b[[n, k]] = 0.0;
            }
        }

        for t in (0..n).rev() {
            // Silent states first, against the topological order: a
            // silent state hands off to later silent states in the same
            // row and to emitting states in the next row.
            for k in (self.silent_start..m).rev() {
                let mut acc = f64::NEG_INFINITY;
                for idx in self.out_edges(k) {
                    let l = self.out_target[idx];
                    if l < self.silent_start {
                        acc = log_sum_exp(
                            acc,
                            self.out_log_p[idx] + emissions[[t, l]] + b[[t + 1, l]],
                        );
                    } else if l > k {
                        acc = log_sum_exp(acc, self.out_log_p[idx] + b[[t, l]]);
                    }
                }
                b[[t, k]] = acc;
            }
            for k in 0..self.silent_start {
                let mut acc = f64::NEG_INFINITY;
                for idx in self.out_edges(k) {
                    let l = self.out_target[idx];
                    if l < self.silent_start {
                        acc = log_sum_exp(
                            acc,
                            self.out_log_p[idx] + emissions[[t, l]] + b[[t + 1, l]],
                        );
                    } else {
                        acc = log_sum_exp(acc, self.out_log_p[idx] + b[[t, l]]);
                    }
                }
                b[[t, k]] = acc;
            }

            let row = b.row(t);
            let scale = log_sum_exp_slice(row.as_slice().expect("rows are contiguous"));
            if scale.is_finite() {
                for k in 0..m {
                    b[[t, k]] -= scale;
                }
                scales[t] = scale;
            }
        }

        let mut cumulative = 0.0;
        for t in (0..n).rev() {
            cumulative += scales[t];
            if cumulative != 0.0 {
                for k in 0..m {
                    b[[t, k]] += cumulative;
                }
            }
        }
        b
    }

    pub(crate) fn backward_log_probability(&self, b: &Array2<f64>) -> f64 {
        b[[0, self.start_index]]
    }
}

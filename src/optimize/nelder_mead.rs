//! Nelder-mead (simplex) local search used for refining acquisition function
//! maxima.
//!
//! [Nelder-Mead](https://en.wikipedia.org/wiki/Nelder%E2%80%93Mead_method)
//! simplex-reflection method is a popular derivative-free optimization
//! algorithm. It keeps a [simplex](https://en.wikipedia.org/wiki/Simplex) of *n
//! + 1* points and the simplex is reflected, expanded or contracted based on
//! function value comparison. Points leaving the domain are projected back.
//!
//! # References
//!
//! \[1\] [Numerical
//! Optimization](https://link.springer.com/book/10.1007/978-0-387-40065-5)
//!
//! \[2\] [Implementing the Nelder-Mead simplex algorithm with adaptive
//! parameters](https://link.springer.com/article/10.1007/s10589-010-9329-3)
//!
//! \[3\] [Less is more: Simplified Nelder-Mead method for large unconstrained
//! optimization](https://api.semanticscholar.org/CorpusID:59403095)

use getset::{CopyGetters, Setters};
use log::{debug, trace};
use nalgebra::DVector;
use thiserror::Error;

use crate::core::Domain;

const EPSILON_SQRT: f64 = 1.490_116_119_384_765_6e-8;

/// Family of coefficients for reflection, expansion and contractions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoefficientsFamily {
    /// Standard ("textbook") choice.
    Standard,
    /// The coefficients are adjusted compared to standard by taking problem
    /// dimension into account to avoid diminishing of expansion and contraction
    /// steps in higher dimensions.
    Balanced,
}

/// Options for [`NelderMead`].
#[derive(Debug, Clone, Copy, PartialEq, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
pub struct NelderMeadOptions {
    /// Family of the coefficients. Default: balanced.
    family: CoefficientsFamily,
    /// Size of the initial simplex edges as a fraction of the domain range.
    /// Default: `0.1`.
    initial_step: f64,
}

impl Default for NelderMeadOptions {
    fn default() -> Self {
        Self {
            family: CoefficientsFamily::Balanced,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Coefficients {
    reflection: f64,
    expansion: f64,
    outer_contraction: f64,
    inner_contraction: f64,
    shrink: f64,
}

impl Coefficients {
    fn new(family: CoefficientsFamily, dim: usize) -> Self {
        match family {
            // Balanced coefficients degenerate in one dimension.
            CoefficientsFamily::Balanced if dim >= 2 => {
                let n_inv = 1.0 / dim as f64;
                Self {
                    reflection: -1.0,
                    expansion: -(n_inv * 2.0 + 1.0),
                    outer_contraction: -(1.0 - n_inv),
                    inner_contraction: 1.0 - n_inv,
                    shrink: 1.0 - n_inv,
                }
            }
            _ => Self {
                reflection: -1.0,
                expansion: -2.0,
                outer_contraction: -0.5,
                inner_contraction: 0.5,
                shrink: 0.5,
            },
        }
    }
}

/// Error returned from [`NelderMead`].
#[derive(Debug, Error)]
pub enum NelderMeadError {
    /// Simplex collapsed so it is impossible to make any progress.
    #[error("simplex collapsed")]
    SimplexCollapsed,
    /// Simplex contains too many invalid values (NaN, infinity).
    #[error("simplex contains too many invalid values")]
    SimplexInvalid,
}

/// Nelder-Mead minimizer. See [module](self) documentation for more details.
pub struct NelderMead {
    coeffs: Coefficients,
    step: DVector<f64>,
    simplex: Vec<DVector<f64>>,
    values: Vec<f64>,
    sort_perm: Vec<usize>,
}

/// `a + t * (b - a)`
fn on_line(a: &DVector<f64>, b: &DVector<f64>, t: f64) -> DVector<f64> {
    a + (b - a) * t
}

fn nan_to_inf(value: f64) -> f64 {
    if value.is_nan() {
        f64::INFINITY
    } else {
        value
    }
}

impl NelderMead {
    /// Initializes the minimizer with given options.
    pub fn with_options(dom: &Domain, options: NelderMeadOptions) -> Self {
        let n = dom.dim();
        Self {
            coeffs: Coefficients::new(options.family, n),
            step: dom.range() * options.initial_step,
            simplex: Vec::with_capacity(n + 1),
            values: Vec::with_capacity(n + 1),
            sort_perm: Vec::with_capacity(n + 1),
        }
    }

    /// Initializes the minimizer with default options.
    pub fn new(dom: &Domain) -> Self {
        Self::with_options(dom, NelderMeadOptions::default())
    }

    /// Resets the internal state.
    pub fn reset(&mut self) {
        self.simplex.clear();
        self.values.clear();
        self.sort_perm.clear();
    }

    fn sort(&mut self) {
        let values = &self.values;
        // Stable sort keeps sort_perm[0] consistent with the best value.
        self.sort_perm.sort_by(|a, b| {
            values[*a]
                .partial_cmp(&values[*b])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }

    /// Performs one iteration and stores the best point into `x`. Returns the
    /// function value of the best point.
    pub fn next<F>(&mut self, f: &mut F, dom: &Domain, x: &mut DVector<f64>) -> Result<f64, NelderMeadError>
    where
        F: FnMut(&DVector<f64>) -> f64,
    {
        let n = dom.dim();
        let c = self.coeffs;

        if self.simplex.is_empty() {
            self.values.push(nan_to_inf(f(x)));
            self.simplex.push(x.clone_owned());

            for j in 0..n {
                let mut xi = x.clone_owned();
                // Step inwards when the point sits on the upper bound.
                if xi[j] + self.step[j] > dom.upper()[j] {
                    xi[j] -= self.step[j];
                } else {
                    xi[j] += self.step[j];
                }
                dom.project(&mut xi);

                self.values.push(nan_to_inf(f(&xi)));
                self.simplex.push(xi);
            }

            let invalid = self.values.iter().filter(|v| !v.is_finite()).count();
            if invalid >= self.simplex.len() / 2 + 1 {
                debug!(
                    "{} out of {} points in simplex have invalid value",
                    invalid,
                    self.simplex.len()
                );
                self.reset();
                return Err(NelderMeadError::SimplexInvalid);
            }

            self.sort_perm.extend(0..=n);
            self.sort();
        }

        let perm = self.sort_perm.clone();
        let best = perm[0];
        let worst = perm[n];
        let second_worst = perm[n - 1];

        let mut centroid = DVector::zeros(n);
        for &i in perm.iter().take(n) {
            centroid += &self.simplex[i];
        }
        centroid /= n as f64;

        let mut reflection = on_line(&centroid, &self.simplex[worst], c.reflection);
        let mut not_feasible = dom.project(&mut reflection);
        let reflection_value = nan_to_inf(f(&reflection));

        let mut shrunk = false;
        let mut inner = false;

        if self.values[best] <= reflection_value && reflection_value < self.values[second_worst] {
            trace!("reflection");
            self.simplex[worst] = reflection;
            self.values[worst] = reflection_value;
        } else if reflection_value < self.values[best] {
            let mut expansion = on_line(&centroid, &self.simplex[worst], c.expansion);
            let expansion_not_feasible = dom.project(&mut expansion);
            let expansion_value = nan_to_inf(f(&expansion));

            if expansion_value < reflection_value {
                trace!("expansion");
                self.simplex[worst] = expansion;
                self.values[worst] = expansion_value;
                not_feasible = expansion_not_feasible;
            } else {
                trace!("reflection");
                self.simplex[worst] = reflection;
                self.values[worst] = reflection_value;
            }
        } else {
            let outer = reflection_value < self.values[worst];
            let coeff = if outer {
                c.outer_contraction
            } else {
                c.inner_contraction
            };

            let mut contraction = on_line(&centroid, &self.simplex[worst], coeff);
            not_feasible = dom.project(&mut contraction);
            let contraction_value = nan_to_inf(f(&contraction));

            let accepted = if outer {
                contraction_value <= reflection_value
            } else {
                contraction_value <= self.values[worst]
            };

            if accepted {
                trace!("{} contraction", if outer { "outer" } else { "inner" });
                inner = !outer;
                self.simplex[worst] = contraction;
                self.values[worst] = contraction_value;
            } else {
                trace!("shrinkage");
                shrunk = true;
                not_feasible = false;
                let anchor = self.simplex[best].clone_owned();

                for &i in perm.iter().skip(1) {
                    let xi = on_line(&anchor, &self.simplex[i], c.shrink);
                    self.values[i] = nan_to_inf(f(&xi));
                    self.simplex[i] = xi;
                }
            }
        }

        self.sort();

        let best = self.sort_perm[0];
        let worst = self.sort_perm[n];
        x.copy_from(&self.simplex[best]);

        if shrunk || inner || not_feasible {
            // Collapse criterion taken from "Less is more: Simplified
            // Nelder-Mead method for large unconstrained optimization".
            let numer = (self.values[worst] - self.values[best]).abs() * 2.0;
            let denom = self.values[worst].abs() + self.values[best].abs() + EPSILON_SQRT;

            if numer / denom <= EPSILON_SQRT {
                debug!("simplex collapsed: {} / {} <= {}", numer, denom, EPSILON_SQRT);
                return Err(NelderMeadError::SimplexCollapsed);
            }
        }

        Ok(self.values[best])
    }

    /// Runs the search from `x` for at most `max_iters` iterations or until
    /// the simplex collapses. Returns the best point and its value.
    pub fn minimize<F>(
        &mut self,
        mut f: F,
        dom: &Domain,
        mut x: DVector<f64>,
        max_iters: usize,
    ) -> Result<(DVector<f64>, f64), NelderMeadError>
    where
        F: FnMut(&DVector<f64>) -> f64,
    {
        self.reset();
        dom.project(&mut x);

        let mut value = f64::INFINITY;
        for _ in 0..max_iters {
            match self.next(&mut f, dom, &mut x) {
                Ok(v) => value = v,
                Err(NelderMeadError::SimplexCollapsed) => {
                    value = self.values[self.sort_perm[0]];
                    break;
                }
                Err(error) => return Err(error),
            }
        }

        Ok((x, value))
    }
}

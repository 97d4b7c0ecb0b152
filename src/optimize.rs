//! Numerical minimization used to fit the probabilistic models
//!
//! Model fitting only depends on the [`Optimizer`] trait, so callers can inject
//! another routine. [`NelderMead`] is the default: derivative free and fully
//! deterministic for a given starting point.

use serde::Deserialize;
use tracing::debug;

/// Outcome of a minimization run
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeResult {
    /// Best point found
    pub x: Vec<f64>,
    /// Objective value at `x`
    pub value: f64,
    /// Iterations performed
    pub iterations: usize,
    /// Whether the convergence criteria were met before the iteration cap
    pub converged: bool,
}

/// Minimizes a scalar objective starting from `x0`
pub trait Optimizer {
    fn minimize(&self, objective: &dyn Fn(&[f64]) -> f64, x0: &[f64]) -> OptimizeResult;
}

/// Downhill simplex settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct NelderMead {
    pub max_iterations: usize,
    /// Simplex diameter below which the search stops
    pub x_tolerance: f64,
    /// Spread of objective values below which the search stops
    pub f_tolerance: f64,
    /// Offset of the initial simplex vertices along each axis
    pub initial_step: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            x_tolerance: 1e-8,
            f_tolerance: 1e-10,
            initial_step: 0.1,
        }
    }
}

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

impl NelderMead {
    fn evaluate(objective: &dyn Fn(&[f64]) -> f64, x: &[f64]) -> f64 {
        let value = objective(x);
        if value.is_nan() {
            f64::INFINITY
        } else {
            value
        }
    }

    fn has_converged(&self, simplex: &[Vec<f64>], values: &[f64]) -> bool {
        let best = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|vertex| vertex.iter().zip(best.iter()).map(|(v, b)| (v - b).abs()))
            .fold(0.0_f64, f64::max);
        let f_spread = values[1..]
            .iter()
            .map(|v| (v - values[0]).abs())
            .fold(0.0_f64, f64::max);
        x_spread <= self.x_tolerance && f_spread <= self.f_tolerance
    }
}

impl Optimizer for NelderMead {
    fn minimize(&self, objective: &dyn Fn(&[f64]) -> f64, x0: &[f64]) -> OptimizeResult {
        let n = x0.len();

        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(x0.to_vec());
        for i in 0..n {
            let mut vertex = x0.to_vec();
            vertex[i] += self.initial_step;
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex
            .iter()
            .map(|vertex| Self::evaluate(objective, vertex))
            .collect();

        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            // Order vertices best to worst; ties keep insertion order.
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            if values[0].is_finite() && self.has_converged(&simplex, &values) {
                converged = true;
                break;
            }
            iterations += 1;

            let centroid: Vec<f64> = (0..n)
                .map(|d| simplex[..n].iter().map(|v| v[d]).sum::<f64>() / n as f64)
                .collect();
            let toward = |coef: f64| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(simplex[n].iter())
                    .map(|(c, w)| c + coef * (c - w))
                    .collect()
            };

            let reflected = toward(REFLECTION);
            let f_reflected = Self::evaluate(objective, &reflected);

            if f_reflected < values[0] {
                let expanded = toward(REFLECTION * EXPANSION);
                let f_expanded = Self::evaluate(objective, &expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let (contracted, f_contracted) = if f_reflected < values[n] {
                let outside = toward(REFLECTION * CONTRACTION);
                let f = Self::evaluate(objective, &outside);
                (outside, f)
            } else {
                let inside = toward(-CONTRACTION);
                let f = Self::evaluate(objective, &inside);
                (inside, f)
            };

            if f_contracted < values[n].min(f_reflected) {
                simplex[n] = contracted;
                values[n] = f_contracted;
                continue;
            }

            let best = simplex[0].clone();
            for i in 1..=n {
                simplex[i] = best
                    .iter()
                    .zip(simplex[i].iter())
                    .map(|(b, v)| b + SHRINK * (v - b))
                    .collect();
                values[i] = Self::evaluate(objective, &simplex[i]);
            }
        }

        let best_index = (0..=n)
            .min_by(|&i, &j| values[i].total_cmp(&values[j]))
            .unwrap_or(0);

        debug!(
            iterations,
            converged,
            value = values[best_index],
            "Nelder-Mead finished"
        );

        OptimizeResult {
            x: simplex[best_index].clone(),
            value: values[best_index],
            iterations,
            converged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimizes_quadratic() {
        let objective = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let result = NelderMead::default().minimize(&objective, &[0.0, 0.0]);

        assert!(result.converged);
        assert!((result.x[0] - 3.0).abs() < 1e-4);
        assert!((result.x[1] + 1.0).abs() < 1e-4);
        assert!(result.value < 1e-8);
    }

    #[test]
    fn test_minimizes_rosenbrock() {
        let objective = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let result = NelderMead::default().minimize(&objective, &[-1.2, 1.0]);

        assert!(result.converged);
        assert!((result.x[0] - 1.0).abs() < 1e-3);
        assert!((result.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_reports_iteration_cap() {
        let optimizer = NelderMead {
            max_iterations: 3,
            ..NelderMead::default()
        };
        let objective = |x: &[f64]| x.iter().map(|v| (v - 10.0).powi(2)).sum::<f64>();
        let result = optimizer.minimize(&objective, &[0.0, 0.0, 0.0]);

        assert!(!result.converged);
        assert_eq!(result.iterations, 3);
    }

    #[test]
    fn test_nan_objective_is_treated_as_infinite() {
        let objective = |x: &[f64]| if x[0] < 0.0 { f64::NAN } else { (x[0] - 1.0).powi(2) };
        let result = NelderMead::default().minimize(&objective, &[0.5]);

        assert!(result.value.is_finite());
        assert!((result.x[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_is_deterministic() {
        let objective = |x: &[f64]| (x[0] - 0.3).powi(2) + (x[1] * x[0] - 2.0).powi(2);
        let first = NelderMead::default().minimize(&objective, &[0.1, 0.1]);
        let second = NelderMead::default().minimize(&objective, &[0.1, 0.1]);
        assert_eq!(first, second);
    }
}

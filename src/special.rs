//! Special functions used by the closed-form model expressions

pub use statrs::function::gamma::ln_gamma;

const HYP2F1_MAX_TERMS: usize = 100_000;
const HYP2F1_TOLERANCE: f64 = 1e-15;

/// Gauss hypergeometric function `2F1(a, b; c; z)` by direct power series.
///
/// Only `0 <= z < 1` is supported, which is all the BG/NBD expressions need
/// (`z = t / (alpha + T + t)`). Returns `f64::INFINITY` when the partial sums
/// overflow so callers can switch to the Euler transform.
pub fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    debug_assert!((0.0..1.0).contains(&z), "hyp2f1 series requires 0 <= z < 1");
    if z == 0.0 {
        return 1.0;
    }

    let mut term = 1.0_f64;
    let mut sum = 1.0_f64;
    for n in 0..HYP2F1_MAX_TERMS {
        let n = n as f64;
        term *= (a + n) * (b + n) / ((c + n) * (n + 1.0)) * z;
        sum += term;
        if !sum.is_finite() {
            return f64::INFINITY;
        }
        if term.abs() <= HYP2F1_TOLERANCE * sum.abs() {
            break;
        }
    }
    sum
}

/// Natural log of `2F1(a, b; c; z)`, falling back to Euler's transformation
/// `2F1(a, b; c; z) = (1 - z)^(c - a - b) 2F1(c - a, c - b; c; z)` when the
/// direct series overflows.
pub fn ln_hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    let direct = hyp2f1(a, b, c, z).ln();
    if direct.is_finite() {
        return direct;
    }
    hyp2f1(c - a, c - b, c, z).ln() + (c - a - b) * (1.0 - z).ln()
}

/// Numerically stable `ln(exp(x) + exp(y))`.
pub fn log_add_exp(x: f64, y: f64) -> f64 {
    if x == f64::NEG_INFINITY {
        return y;
    }
    if y == f64::NEG_INFINITY {
        return x;
    }
    let max = x.max(y);
    max + ((x - max).exp() + (y - max).exp()).ln()
}

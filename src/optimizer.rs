//! Derivative-free minimization (Nelder-Mead simplex).

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    pub max_iterations: usize,
    /// Absolute tolerance on the spread of objective values and of vertex coordinates.
    pub abs_tolerance: f64,
    /// Tolerance relative to the magnitude of the best objective value / best vertex.
    pub rel_tolerance: f64,
    /// Offset used to build the initial simplex around the starting point.
    pub initial_step: f64,
}

impl Default for NelderMeadConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            abs_tolerance: 1e-8,
            rel_tolerance: 1e-10,
            initial_step: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NelderMeadOutcome {
    pub optimal_values: Vec<f64>,
    pub optimal_residual: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

const REFLECT: f64 = 1.0;
const EXPAND: f64 = 2.0;
const CONTRACT: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Minimize `objective` starting from `init`. Non-finite objective values are treated as
/// +infinity. When the iteration budget runs out the best vertex is still returned, with
/// `converged = false`.
pub fn nelder_mead(
    init: &[f64],
    config: &NelderMeadConfig,
    mut objective: impl FnMut(&[f64]) -> f64,
) -> NelderMeadOutcome {
    let n = init.len();
    let mut evaluations = 0usize;
    let mut eval = |x: &[f64]| {
        evaluations += 1;
        let v = objective(x);
        if v.is_finite() { v } else { f64::INFINITY }
    };

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    let f0 = eval(init);
    simplex.push((init.to_vec(), f0));
    for i in 0..n {
        let mut x = init.to_vec();
        x[i] += config.initial_step;
        let f = eval(&x);
        simplex.push((x, f));
    }

    let mut iterations = 0usize;
    let mut converged = false;

    while iterations < config.max_iterations {
        sort_simplex(&mut simplex);
        if has_converged(&simplex, config) {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid = centroid_without_worst(&simplex);
        let (worst_x, f_worst) = simplex[n].clone();
        let f_best = simplex[0].1;
        let f_second_worst = simplex[n.saturating_sub(1)].1;

        let reflected = along(&centroid, &worst_x, -REFLECT);
        let f_reflected = eval(&reflected);

        if f_reflected < f_best {
            let expanded = along(&centroid, &worst_x, -REFLECT * EXPAND);
            let f_expanded = eval(&expanded);
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
            continue;
        }

        if f_reflected < f_second_worst {
            simplex[n] = (reflected, f_reflected);
            continue;
        }

        let accepted = if f_reflected < f_worst {
            let outside = along(&centroid, &worst_x, -REFLECT * CONTRACT);
            let f_outside = eval(&outside);
            (f_outside <= f_reflected).then_some((outside, f_outside))
        } else {
            let inside = along(&centroid, &worst_x, CONTRACT);
            let f_inside = eval(&inside);
            (f_inside < f_worst).then_some((inside, f_inside))
        };

        match accepted {
            Some(vertex) => simplex[n] = vertex,
            None => {
                let best = simplex[0].0.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    let x: Vec<f64> = best
                        .iter()
                        .zip(&vertex.0)
                        .map(|(b, v)| b + SHRINK * (v - b))
                        .collect();
                    let f = eval(&x);
                    *vertex = (x, f);
                }
            }
        }
    }

    sort_simplex(&mut simplex);
    if !converged && has_converged(&simplex, config) {
        converged = true;
    }
    let (optimal_values, optimal_residual) = simplex.swap_remove(0);
    NelderMeadOutcome {
        optimal_values,
        optimal_residual,
        iterations,
        evaluations,
        converged,
    }
}

fn sort_simplex(simplex: &mut [(Vec<f64>, f64)]) {
    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
}

fn has_converged(simplex: &[(Vec<f64>, f64)], config: &NelderMeadConfig) -> bool {
    let (best_x, f_best) = &simplex[0];
    let f_worst = simplex[simplex.len() - 1].1;
    if !f_best.is_finite() || !f_worst.is_finite() {
        return false;
    }
    let f_tol = config.abs_tolerance + config.rel_tolerance * f_best.abs();
    if f_worst - f_best > f_tol {
        return false;
    }
    simplex.iter().skip(1).all(|(x, _)| {
        x.iter().zip(best_x).all(|(xi, bi)| {
            (xi - bi).abs() <= config.abs_tolerance.sqrt() + config.rel_tolerance * bi.abs()
        })
    })
}

fn centroid_without_worst(simplex: &[(Vec<f64>, f64)]) -> Vec<f64> {
    let n = simplex.len() - 1;
    let dim = simplex[0].0.len();
    let mut c = vec![0.0; dim];
    for (x, _) in &simplex[..n] {
        for (ci, xi) in c.iter_mut().zip(x) {
            *ci += xi;
        }
    }
    for ci in &mut c {
        *ci /= n.max(1) as f64;
    }
    c
}

/// `centroid + t * (point - centroid)`.
fn along(centroid: &[f64], point: &[f64], t: f64) -> Vec<f64> {
    centroid
        .iter()
        .zip(point)
        .map(|(c, p)| c + t * (p - c))
        .collect()
}

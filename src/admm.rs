//! ADMM projection of the heat gradients onto integrable per-edge
//! differences.
//!
//! The unknown `X` holds one scalar difference per edge, oriented by the
//! edge's canonical halfedge. The face-major auxiliary `Y` is the copy
//! of `X` gathered to face corners and projected so the signed sum
//! around every face vanishes; the scaled dual `D` accumulates the gap
//! between the two. Each iteration alternates the face projection, the
//! per-edge data-closeness update and the dual ascent.

use rayon::prelude::*;

use crate::geometry::Vector3D;
use crate::mesh::HalfEdgeMesh;
use crate::solver::{ConvergenceReport, SolverOptions};
use crate::{Error, Result};

/// Absent face-corner slot of a boundary edge.
pub const NO_SLOT: usize = usize::MAX;

/// Edge-difference state for the alternating minimization.
pub struct EdgeDifferenceSolver {
    n_edges: usize,
    /// Edge index of each face-corner slot, face-major.
    s_idx: Vec<usize>,
    /// Sign of each face corner against its edge's canonical orientation.
    q: Vec<f64>,
    /// Target difference per face corner, projected from the heat
    /// gradient.
    z: Vec<f64>,
    /// The one or two face-corner slots referencing each edge.
    edge_slots: Vec<[usize; 2]>,
    x: Vec<f64>,
    y: Vec<f64>,
    dual: Vec<f64>,
    sx: Vec<f64>,
    sx_prev: Vec<f64>,
}

impl EdgeDifferenceSolver {
    /// Gather the edge/face incidence tables, project the initial
    /// gradients onto the edge basis and seed the primal state.
    pub fn new(mesh: &HalfEdgeMesh, init_grad: &[Vector3D]) -> Self {
        let n_f = mesh.n_faces();
        let n_e = mesh.n_edges();
        let mut s_idx = vec![0usize; 3 * n_f];
        let mut q = vec![0.0f64; 3 * n_f];
        let mut z = vec![0.0f64; 3 * n_f];
        let mut edge_slots = vec![[NO_SLOT; 2]; n_e];

        // Slot registration advances a per-edge cursor; kept serial.
        for f in 0..n_f {
            let hs = mesh.face_halfedges(f);
            for (k, &h) in hs.iter().enumerate() {
                let e = mesh.edge(h);
                let slot = 3 * f + k;
                let vec = mesh.position(mesh.from(h)) - mesh.position(mesh.to(h));
                if mesh.is_canonical(h) {
                    q[slot] = 1.0;
                    z[slot] = init_grad[f].dot(&vec);
                } else {
                    q[slot] = -1.0;
                    z[slot] = init_grad[f].dot(&(-vec));
                }
                s_idx[slot] = e;
                let cell = if edge_slots[e][0] == NO_SLOT { 0 } else { 1 };
                edge_slots[e][cell] = slot;
            }
        }

        // X starts at the per-edge mean of the targets.
        let x: Vec<f64> = edge_slots
            .par_iter()
            .map(|slots| {
                let mut r = 0.0;
                let mut n = 0usize;
                for &s in slots {
                    if s != NO_SLOT {
                        r += z[s];
                        n += 1;
                    }
                }
                r / n as f64
            })
            .collect();

        let mut sx_prev = vec![0.0f64; 3 * n_f];
        sx_prev
            .par_chunks_mut(3)
            .zip(s_idx.par_chunks(3))
            .for_each(|(sx, s)| {
                for k in 0..3 {
                    sx[k] = x[s[k]];
                }
            });

        Self {
            n_edges: n_e,
            s_idx,
            q,
            z,
            edge_slots,
            x,
            y: vec![0.0f64; 3 * n_f],
            dual: vec![0.0f64; 3 * n_f],
            sx: vec![0.0f64; 3 * n_f],
            sx_prev,
        }
    }

    /// Converged per-edge differences, oriented by halfedge 0.
    #[inline]
    pub fn edge_differences(&self) -> &[f64] {
        &self.x
    }

    #[inline]
    pub fn n_edges(&self) -> usize {
        self.n_edges
    }

    /// Run the alternating minimization until both residuals fall under
    /// the squared threshold or the iteration budget runs out.
    pub fn run(&mut self, opts: &SolverOptions) -> Result<ConvergenceReport> {
        let rho = opts.penalty;
        let threshold = opts.grad_solver_eps * opts.grad_solver_eps;
        let mut iterations = 0;
        let mut converged = false;
        let mut primal_sqr = f64::INFINITY;
        let mut dual_sqr = f64::INFINITY;

        while !converged && iterations < opts.grad_solver_max_iter {
            self.update_y();
            self.update_x(rho);

            let check = (iterations + 1) % opts.grad_solver_convergence_check_frequency == 0;

            // Dual ascent: gather the fresh X to face corners, measure
            // the residual pair if due, accumulate the gap.
            let (sx, s_idx, x) = (&mut self.sx, &self.s_idx, &self.x);
            sx.par_chunks_mut(3)
                .zip(s_idx.par_chunks(3))
                .for_each(|(sx, s)| {
                    for k in 0..3 {
                        sx[k] = x[s[k]];
                    }
                });
            if check {
                primal_sqr = self
                    .y
                    .par_iter()
                    .zip(&self.sx)
                    .map(|(y, sx)| (y - sx) * (y - sx))
                    .sum();
                dual_sqr = self
                    .sx
                    .par_iter()
                    .zip(&self.sx_prev)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    * rho
                    * rho;
            }
            let (dual, y, sx) = (&mut self.dual, &self.y, &self.sx);
            dual.par_iter_mut()
                .zip(y.par_iter().zip(sx.par_iter()))
                .for_each(|(d, (y, sx))| *d += y - sx);

            iterations += 1;
            if check {
                if !primal_sqr.is_finite() || !dual_sqr.is_finite() {
                    log::warn!("  ADMM residuals are non-finite, aborting");
                    return Err(Error::GradientDivergence { iterations });
                }
                converged = primal_sqr <= threshold && dual_sqr <= threshold;
                if converged || iterations % opts.grad_solver_output_frequency == 0 {
                    log::debug!(
                        "  ADMM iteration {}: primal {:.6e}, dual {:.6e}, threshold {:.6e}",
                        iterations,
                        primal_sqr,
                        dual_sqr,
                        threshold
                    );
                }
            }
            std::mem::swap(&mut self.sx, &mut self.sx_prev);
        }

        if converged {
            log::info!("  Gradient solver converged after {} iterations", iterations);
        } else {
            log::info!(
                "  Gradient solver stopped at the iteration limit ({})",
                iterations
            );
        }
        Ok(ConvergenceReport {
            converged,
            iterations,
            residual: primal_sqr.max(dual_sqr),
        })
    }

    /// Project the shifted primal onto the face-wise curl-free set.
    fn update_y(&mut self) {
        let (y, sx_prev, dual, q) = (&mut self.y, &self.sx_prev, &self.dual, &self.q);
        y.par_chunks_mut(3).enumerate().for_each(|(f, y)| {
            let base = 3 * f;
            let mut shifted = [0.0f64; 3];
            let mut mu = 0.0;
            for k in 0..3 {
                shifted[k] = sx_prev[base + k] - dual[base + k];
                mu += q[base + k] * shifted[k];
            }
            mu /= 3.0;
            for k in 0..3 {
                y[k] = shifted[k] - mu * q[base + k];
            }
        });
    }

    /// Pull each edge value toward its data targets and the projected
    /// copies.
    fn update_x(&mut self, rho: f64) {
        let (x, edge_slots, y, dual, z) =
            (&mut self.x, &self.edge_slots, &self.y, &self.dual, &self.z);
        x.par_iter_mut()
            .zip(edge_slots.par_iter())
            .for_each(|(x, slots)| {
                let mut r = 0.0;
                let mut n = 0usize;
                for &s in slots {
                    if s != NO_SLOT {
                        r += rho * (y[s] + dual[s]) + z[s];
                        n += 1;
                    }
                }
                *x = r / ((rho + 1.0) * n as f64);
            });
    }

    /// Signed sum of the edge differences around face `f`; zero for an
    /// integrable field.
    #[cfg(test)]
    fn face_curl(&self, f: usize) -> f64 {
        (0..3)
            .map(|k| self.q[3 * f + k] * self.x[self.s_idx[3 * f + k]])
            .sum()
    }
}

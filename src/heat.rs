//! Layered Gauss-Seidel solve of the heat step and extraction of the
//! per-face unit gradient directions.
//!
//! One outer iteration sweeps the BFS layers in order. Updates inside a
//! layer only read values written before the layer started, so they run
//! in parallel into a scratch buffer; the sweep is sequential between
//! layers.

use rayon::prelude::*;

use crate::bfs::BfsOrder;
use crate::geometry::Vector3D;
use crate::laplacian::HeatOperator;
use crate::mesh::HalfEdgeMesh;
use crate::solver::{ConvergenceReport, SolverOptions};
use crate::{Error, Result};

/// Consecutive residual checks that may come back larger than the
/// previous one before the solve is declared divergent.
const MAX_RISING_CHECKS: usize = 2;

/// Solve the heat flow and return the per-face unit gradients together
/// with a convergence report. Hitting the iteration budget is reported,
/// not an error.
pub fn solve_heat_flow(
    mesh: &HalfEdgeMesh,
    bfs: &BfsOrder,
    op: &HeatOperator,
    opts: &SolverOptions,
) -> Result<(Vec<Vector3D>, ConvergenceReport)> {
    let n_v = mesh.n_vertices();
    let n_sources = opts.source_vertices.len();

    // Source magnitude that puts the initial residual near unit scale.
    let total_area: f64 = op.vertex_area.par_iter().sum();
    let source_area: f64 = opts
        .source_vertices
        .iter()
        .map(|&s| op.vertex_area[s])
        .sum();
    let source_val = (n_v as f64 / n_sources as f64)
        .min(total_area / source_area)
        .sqrt();

    let mut d = vec![0.0f64; n_v];
    for &s in &opts.source_vertices {
        d[s] = source_val;
    }

    let mut residuals = vec![0.0f64; n_v];
    compute_residual(bfs, op, &d, n_sources, source_val, &mut residuals);
    let init_norm = l2_norm(&residuals);
    let eps = (init_norm * opts.heat_solver_eps).max(1e-16);
    log::info!(
        "  Initial heat residual {:.6e}, threshold {:.6e}",
        init_norm,
        eps
    );

    let mut scratch = vec![0.0f64; bfs.max_layer_len()];
    let mut converged = init_norm <= eps;
    let mut iterations = 0;
    let mut residual = init_norm;
    let mut previous = init_norm;
    let mut rising = 0;

    while !converged && iterations < opts.heat_solver_max_iter {
        for l in 0..bfs.n_layers() {
            let layer = bfs.layer(l);
            let begin = layer.start;
            let d_read = &d;
            scratch[..layer.len()]
                .par_iter_mut()
                .enumerate()
                .for_each(|(j, out)| {
                    let row = op.row(bfs, begin + j);
                    let (neighbors, diag) = row.split_at(row.len() - 1);
                    let mut value = if l == 0 { source_val } else { 0.0 };
                    for &(v, w) in neighbors {
                        value += d_read[v] * w;
                    }
                    *out = value / diag[0].1;
                });
            for (j, i) in layer.enumerate() {
                d[bfs.order[i]] = scratch[j];
            }
        }
        iterations += 1;

        let budget_spent = iterations >= opts.heat_solver_max_iter;
        if budget_spent || iterations % opts.heat_solver_convergence_check_frequency == 0 {
            compute_residual(bfs, op, &d, n_sources, source_val, &mut residuals);
            residual = l2_norm(&residuals);
            log::debug!(
                "  Gauss-Seidel iteration {}: residual {:.6e}, threshold {:.6e}",
                iterations,
                residual,
                eps
            );
            if !residual.is_finite() {
                log::warn!("  Heat residual is non-finite, aborting");
                return Err(Error::HeatDivergence {
                    iterations,
                    residual: previous,
                });
            }
            if residual <= eps {
                converged = true;
            } else if residual > previous {
                rising += 1;
                if rising >= MAX_RISING_CHECKS {
                    return Err(Error::HeatDivergence {
                        iterations,
                        residual,
                    });
                }
            } else {
                rising = 0;
            }
            previous = residual;
        }
    }

    let report = ConvergenceReport {
        converged,
        iterations,
        residual,
    };
    Ok((extract_gradients(mesh, op, &d), report))
}

/// Residual of `(A + t*L) d = source_val * indicator`, one entry per BFS
/// position. Sources are exactly the first positions of the visit order.
fn compute_residual(
    bfs: &BfsOrder,
    op: &HeatOperator,
    d: &[f64],
    n_sources: usize,
    source_val: f64,
    out: &mut [f64],
) {
    out.par_iter_mut().enumerate().for_each(|(i, r)| {
        let row = op.row(bfs, i);
        let (neighbors, diag) = row.split_at(row.len() - 1);
        let mut res = if i < n_sources { source_val } else { 0.0 };
        for &(v, w) in neighbors {
            res += d[v] * w;
        }
        res -= d[diag[0].0] * diag[0].1;
        *r = res;
    });
}

fn l2_norm(v: &[f64]) -> f64 {
    v.par_iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Per-face unit direction of steepest heat decrease.
///
/// The heat triple and the edge matrix are rescaled before the cross
/// products purely for conditioning; both scalings are uniform and leave
/// the final direction untouched.
fn extract_gradients(mesh: &HalfEdgeMesh, op: &HeatOperator, d: &[f64]) -> Vec<Vector3D> {
    (0..mesh.n_faces())
        .into_par_iter()
        .map(|f| {
            let hs = mesh.face_halfedges(f);
            let mut edges = [Vector3D::zeros(); 3];
            let mut heat = Vector3D::zeros();
            for (k, &h) in hs.iter().enumerate() {
                let vec = op.edge_vector[mesh.edge(h)];
                edges[k] = if mesh.is_canonical(h) { vec } else { -vec };
                heat[k] = d[mesh.to(h)];
            }
            heat.normalize_mut();
            let scale = (edges[0].norm_squared()
                + edges[1].norm_squared()
                + edges[2].norm_squared())
            .sqrt();
            for e in &mut edges {
                *e /= scale;
            }

            let normal = edges[0].cross(&edges[1]).normalize();
            let rotated =
                edges[0] * heat[1] + edges[1] * heat[2] + edges[2] * heat[0];
            rotated.cross(&normal).normalize()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solve(
        mesh: &HalfEdgeMesh,
        sources: &[usize],
    ) -> (Vec<Vector3D>, ConvergenceReport, BfsOrder) {
        let opts = SolverOptions {
            source_vertices: sources.to_vec(),
            ..SolverOptions::default()
        };
        let bfs = BfsOrder::build(mesh, sources).unwrap();
        let op = HeatOperator::build(mesh, &bfs);
        let (grad, report) = solve_heat_flow(mesh, &bfs, &op, &opts).unwrap();
        (grad, report, bfs)
    }

    fn right_triangle() -> HalfEdgeMesh {
        HalfEdgeMesh::from_face_list(
            vec![
                crate::geometry::Point3D::new(0.0, 0.0, 0.0),
                crate::geometry::Point3D::new(1.0, 0.0, 0.0),
                crate::geometry::Point3D::new(0.0, 1.0, 0.0),
            ],
            &[[0, 1, 2]],
        )
        .unwrap()
    }

    #[test]
    fn converges_on_a_triangle() {
        let mesh = right_triangle();
        let (grad, report, _) = solve(&mesh, &[0]);
        assert!(report.converged);
        assert!(report.residual.is_finite());
        assert_eq!(grad.len(), 1);
        assert!((grad[0].norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn gradient_points_away_from_the_source() {
        // Symmetric corner source: the in-plane gradient must be the
        // diagonal bisector heading away from vertex 0.
        let mesh = right_triangle();
        let (grad, _, _) = solve(&mesh, &[0]);
        let expected = Vector3D::new(1.0, 1.0, 0.0).normalize();
        assert!((grad[0] - expected).norm() < 1e-9);
    }

    #[test]
    fn gradient_lies_in_the_face_plane() {
        let mesh = right_triangle();
        let (grad, _, _) = solve(&mesh, &[1]);
        assert!(grad[0].z.abs() < 1e-12);
        assert!((grad[0].norm() - 1.0).abs() < 1e-12);
    }
}

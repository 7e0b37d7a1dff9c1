//! Solver entry point.
//!
//! `compute_geodesic_distances` wires the pipeline together: input
//! validation, normalization into a unit-diameter box, the BFS plan,
//! the Gauss-Seidel heat flow, the ADMM projection and the final tree
//! integration back to the original scale.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::admm::EdgeDifferenceSolver;
use crate::bfs::BfsOrder;
use crate::geometry::Point3D;
use crate::heat;
use crate::integrate::{self, TransitionTable};
use crate::laplacian::HeatOperator;
use crate::mesh::HalfEdgeMesh;
use crate::{Error, Result};

/// Parameters of the geodesic solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverOptions {
    /// Distinct source vertex indices; distances are measured to the
    /// nearest one. Must be non-empty.
    pub source_vertices: Vec<usize>,

    /// Relative residual target of the heat solve.
    pub heat_solver_eps: f64,
    pub heat_solver_max_iter: usize,
    pub heat_solver_convergence_check_frequency: usize,

    /// Absolute residual target of the gradient solve (compared against
    /// squared norms internally).
    pub grad_solver_eps: f64,
    pub grad_solver_max_iter: usize,
    pub grad_solver_convergence_check_frequency: usize,
    pub grad_solver_output_frequency: usize,

    /// ADMM penalty weight; must be positive.
    pub penalty: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            source_vertices: Vec::new(),
            heat_solver_eps: 1e-6,
            heat_solver_max_iter: 1000,
            heat_solver_convergence_check_frequency: 10,
            grad_solver_eps: 1e-5,
            grad_solver_max_iter: 10000,
            grad_solver_convergence_check_frequency: 10,
            grad_solver_output_frequency: 100,
            penalty: 1.0,
        }
    }
}

impl SolverOptions {
    fn validate(&self) -> Result<()> {
        if self.source_vertices.is_empty() {
            return Err(Error::BadParameter("source_vertices must be non-empty"));
        }
        if !(self.penalty > 0.0) {
            return Err(Error::BadParameter("penalty must be positive"));
        }
        if self.heat_solver_convergence_check_frequency == 0
            || self.grad_solver_convergence_check_frequency == 0
            || self.grad_solver_output_frequency == 0
        {
            return Err(Error::BadParameter("frequencies must be positive"));
        }
        Ok(())
    }
}

/// Outcome of one iterative phase. Exhausting the iteration budget is
/// not an error; the result then carries `converged = false`.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceReport {
    pub converged: bool,
    pub iterations: usize,
    /// Last measured residual: an L2 norm for the heat flow, the larger
    /// of the squared primal/dual norms for the gradient solve.
    pub residual: f64,
}

/// Geodesic distances plus per-phase convergence information.
#[derive(Debug, Clone)]
pub struct GeodesicResult {
    /// One non-negative distance per vertex, in the original mesh scale;
    /// zero at sources.
    pub distances: Vec<f64>,
    pub heat_flow: ConvergenceReport,
    pub gradients: ConvergenceReport,
}

/// Compute geodesic distances from the given sources to every vertex.
///
/// The mesh is consumed: it is only needed up to the ADMM setup and is
/// dropped before the iteration loops to cap peak memory.
pub fn compute_geodesic_distances(
    mut mesh: HalfEdgeMesh,
    opts: &SolverOptions,
) -> Result<GeodesicResult> {
    opts.validate()?;
    validate_input(&mesh, opts)?;

    log::info!(
        "Solving geodesic distances: {} vertices, {} edges, {} faces, {} sources",
        mesh.n_vertices(),
        mesh.n_edges(),
        mesh.n_faces(),
        opts.source_vertices.len()
    );

    let start = Instant::now();
    let model_scaling_factor = normalize_mesh(&mut mesh);

    log::info!("Initializing breadth-first propagation order...");
    let bfs = BfsOrder::build(&mesh, &opts.source_vertices)?;
    let after_bfs = Instant::now();

    log::info!("Gauss-Seidel initialization of gradients...");
    let (init_grad, heat_flow) = {
        let op = HeatOperator::build(&mesh, &bfs);
        heat::solve_heat_flow(&mesh, &bfs, &op, opts)?
        // Heat-phase tables drop here.
    };
    let after_heat = Instant::now();

    log::info!("ADMM solver for integrable gradients...");
    let transitions = TransitionTable::build(&mesh, &bfs);
    let mut grad_solver = EdgeDifferenceSolver::new(&mesh, &init_grad);
    drop(init_grad);
    drop(mesh);
    let gradients = grad_solver.run(opts)?;
    let after_admm = Instant::now();

    log::info!("Recovery of geodesic distances...");
    let distances = integrate::integrate_distances(
        &bfs,
        &transitions,
        grad_solver.edge_differences(),
        model_scaling_factor,
    );
    let end = Instant::now();

    log::info!(
        "Timing: BFS {:.3}s, heat flow {:.3}s, ADMM {:.3}s, integration {:.3}s, total {:.3}s",
        (after_bfs - start).as_secs_f64(),
        (after_heat - after_bfs).as_secs_f64(),
        (after_admm - after_heat).as_secs_f64(),
        (end - after_admm).as_secs_f64(),
        (end - start).as_secs_f64()
    );

    Ok(GeodesicResult {
        distances,
        heat_flow,
        gradients,
    })
}

fn validate_input(mesh: &HalfEdgeMesh, opts: &SolverOptions) -> Result<()> {
    if mesh.n_vertices() == 0 || mesh.n_edges() == 0 || mesh.n_faces() == 0 {
        return Err(Error::EmptyMesh);
    }
    let mut seen = vec![false; mesh.n_vertices()];
    for &s in &opts.source_vertices {
        if s >= mesh.n_vertices() || seen[s] {
            return Err(Error::BadSource(s));
        }
        seen[s] = true;
    }
    Ok(())
}

/// Center the mesh and scale it into a unit-diameter bounding box.
/// Returns the scaling factor needed to restore original units.
fn normalize_mesh(mesh: &mut HalfEdgeMesh) -> f64 {
    let positions = mesh.positions_mut();

    let mut min = positions[0];
    let mut max = positions[0];
    for p in positions.iter() {
        for c in 0..3 {
            min[c] = min[c].min(p[c]);
            max[c] = max[c].max(p[c]);
        }
    }

    let scale = (max - min).norm();
    let center = Point3D::from((min.coords + max.coords) * 0.5);
    for p in positions.iter_mut() {
        p.coords = (p.coords - center.coords) / scale;
    }
    scale
}

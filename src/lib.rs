// Edge-based geodesic distance computation on triangle meshes.
//
// The solver runs a three-stage pipeline: a breadth-first traversal that
// fixes the propagation order, a Gauss-Seidel heat-flow solve that yields
// per-face gradient directions, and an ADMM projection that turns those
// gradients into integrable per-edge differences which are accumulated
// along the BFS tree into per-vertex distances.

pub mod admm;
pub mod bfs;
pub mod geometry;
pub mod heat;
pub mod integrate;
pub mod laplacian;
pub mod mesh;
pub mod solver;

// Re-export commonly used types
pub use geometry::{Point3D, Vector3D};
pub use mesh::{HalfEdgeMesh, MeshError};
pub use solver::{compute_geodesic_distances, ConvergenceReport, GeodesicResult, SolverOptions};

/// Main result type for the solver
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the solver
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    #[error("Empty mesh: vertex, edge and face counts must all be non-zero")]
    EmptyMesh,

    #[error("Invalid source vertex {0}: out of range or duplicated")]
    BadSource(usize),

    #[error("Disconnected mesh: BFS reached {visited} of {total} vertices")]
    Disconnected { visited: usize, total: usize },

    #[error("Heat flow diverged at iteration {iterations} (residual {residual:e})")]
    HeatDivergence { iterations: usize, residual: f64 },

    #[error("Gradient solver residuals became non-finite at iteration {iterations}")]
    GradientDivergence { iterations: usize },

    #[error("Invalid parameter: {0}")]
    BadParameter(&'static str),
}

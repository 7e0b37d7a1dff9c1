//! Cotangent heat operator in breadth-first compressed rows.
//!
//! One backward-Euler step of the heat equation reads `(A + t*L) d = b`
//! with `A` the lumped vertex-area mass and `L` the cotangent Laplacian.
//! Instead of a general sparse matrix the operator is stored as one
//! `(neighbor, weight)` row per vertex in BFS order, diagonal last, so
//! the Gauss-Seidel sweep is a tight contiguous loop ending in a single
//! division.

use rayon::prelude::*;

use crate::bfs::BfsOrder;
use crate::geometry::Vector3D;
use crate::mesh::HalfEdgeMesh;

/// Backward-Euler heat operator plus the geometric tables shared with
/// gradient extraction. Dropped as a whole once the heat phase ends.
pub struct HeatOperator {
    /// Canonical vector of each edge: `pos(to(2e)) - pos(from(2e))`.
    pub edge_vector: Vec<Vector3D>,
    /// Heat-flow time step: squared mean edge length.
    pub step_length: f64,
    /// Compressed `(neighbor, weight)` rows addressed by `bfs.lap_addr`;
    /// the last entry of each row is the diagonal.
    pub coef: Vec<(usize, f64)>,
    /// Lumped vertex areas (a third of the incident face areas).
    pub vertex_area: Vec<f64>,
}

impl HeatOperator {
    pub fn build(mesh: &HalfEdgeMesh, bfs: &BfsOrder) -> Self {
        let n_v = mesh.n_vertices();
        let n_e = mesh.n_edges();
        let n_f = mesh.n_faces();
        let n_h = mesh.n_halfedges();

        let edge_vector: Vec<Vector3D> = (0..n_e)
            .into_par_iter()
            .map(|e| {
                let h = mesh.halfedge(e, 0);
                mesh.position(mesh.to(h)) - mesh.position(mesh.from(h))
            })
            .collect();
        let edge_sqr_length: Vec<f64> =
            edge_vector.par_iter().map(|v| v.norm_squared()).collect();

        let mean_edge =
            edge_sqr_length.par_iter().map(|l2| l2.sqrt()).sum::<f64>() / n_e as f64;
        let step_length = mean_edge * mean_edge;

        let face_area: Vec<f64> = (0..n_f)
            .into_par_iter()
            .map(|f| {
                let [h0, h1, _] = mesh.face_halfedges(f);
                edge_vector[mesh.edge(h0)]
                    .cross(&edge_vector[mesh.edge(h1)])
                    .norm()
                    * 0.5
            })
            .collect();

        // Half of the cotangent of the angle opposite each halfedge's
        // edge, inside that halfedge's face. Boundary halfedges stay 0.
        let halfedge_halfcot: Vec<f64> = (0..n_h)
            .into_par_iter()
            .map(|h| match mesh.face(h) {
                None => 0.0,
                Some(f) => {
                    let l2 = edge_sqr_length[mesh.edge(h)];
                    let l2_next = edge_sqr_length[mesh.edge(mesh.next(h))];
                    let l2_prev = edge_sqr_length[mesh.edge(mesh.next(mesh.next(h)))];
                    0.125 * (l2_next + l2_prev - l2) / face_area[f]
                }
            })
            .collect();

        let vertex_area: Vec<f64> = (0..n_v)
            .into_par_iter()
            .map(|v| {
                let mut area = 0.0;
                for h in mesh.outgoing_halfedges(v) {
                    if let Some(f) = mesh.face(h) {
                        area += face_area[f];
                    }
                }
                area / 3.0
            })
            .collect();

        // Fill the compressed rows in parallel over disjoint slices.
        let mut coef = vec![(0usize, 0.0f64); bfs.lap_addr[n_v]];
        let mut rows: Vec<&mut [(usize, f64)]> = Vec::with_capacity(n_v);
        let mut rest = coef.as_mut_slice();
        for i in 0..n_v {
            let (row, tail) = rest.split_at_mut(bfs.lap_addr[i + 1] - bfs.lap_addr[i]);
            rows.push(row);
            rest = tail;
        }
        rows.into_par_iter().enumerate().for_each(|(i, row)| {
            let v = bfs.order[i];
            let mut k = 0;
            let mut neighbor_sum = 0.0;
            for h in mesh.outgoing_halfedges(v) {
                let w = halfedge_halfcot[h] + halfedge_halfcot[mesh.opposite(h)];
                row[k] = (mesh.to(h), step_length * w);
                neighbor_sum += w;
                k += 1;
            }
            row[k] = (v, step_length * neighbor_sum + vertex_area[v]);
        });

        Self {
            edge_vector,
            step_length,
            coef,
            vertex_area,
        }
    }

    /// The compressed row of BFS position `i`, diagonal last.
    #[inline]
    pub fn row(&self, bfs: &BfsOrder, i: usize) -> &[(usize, f64)] {
        &self.coef[bfs.lap_addr[i]..bfs.lap_addr[i + 1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;

    fn equilateral() -> HalfEdgeMesh {
        let h = 3.0f64.sqrt() / 2.0;
        HalfEdgeMesh::from_face_list(
            vec![
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(1.0, 0.0, 0.0),
                Point3D::new(0.5, h, 0.0),
            ],
            &[[0, 1, 2]],
        )
        .unwrap()
    }

    #[test]
    fn equilateral_triangle_weights() {
        let mesh = equilateral();
        let bfs = BfsOrder::build(&mesh, &[0]).unwrap();
        let op = HeatOperator::build(&mesh, &bfs);

        // Unit edges: step is the squared mean edge length.
        assert!((op.step_length - 1.0).abs() < 1e-12);

        let area = 3.0f64.sqrt() / 4.0;
        for v in 0..3 {
            assert!((op.vertex_area[v] - area / 3.0).abs() < 1e-12);
        }

        // Every edge weight is half the cotangent of the opposite 60
        // degree angle, scaled by the time step.
        let expected_w = 0.5 / 3.0f64.sqrt();
        for i in 0..3 {
            let row = op.row(&bfs, i);
            assert_eq!(row.len(), 3);
            let (neighbors, diag) = row.split_at(row.len() - 1);
            let mut sum = 0.0;
            for &(v, w) in neighbors {
                assert_ne!(v, bfs.order[i]);
                assert!((w - op.step_length * expected_w).abs() < 1e-12);
                sum += w;
            }
            assert_eq!(diag[0].0, bfs.order[i]);
            assert!((diag[0].1 - (sum + area / 3.0)).abs() < 1e-12);
        }
    }

    #[test]
    fn right_triangle_has_zero_weight_on_hypotenuse() {
        let mesh = HalfEdgeMesh::from_face_list(
            vec![
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(1.0, 0.0, 0.0),
                Point3D::new(0.0, 1.0, 0.0),
            ],
            &[[0, 1, 2]],
        )
        .unwrap();
        let bfs = BfsOrder::build(&mesh, &[0]).unwrap();
        let op = HeatOperator::build(&mesh, &bfs);

        // The hypotenuse 1-2 faces the right angle at vertex 0.
        let pos = bfs.order.iter().position(|&v| v == 1).unwrap();
        let row = op.row(&bfs, pos);
        let (neighbors, _) = row.split_at(row.len() - 1);
        for &(v, w) in neighbors {
            if v == 2 {
                assert!(w.abs() < 1e-12);
            } else {
                assert!(w > 0.0);
            }
        }
    }
}

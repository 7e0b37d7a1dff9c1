//! Breadth-first propagation order.
//!
//! The traversal fixes everything the later stages need: the order in
//! which the Gauss-Seidel sweep visits vertices, the layer boundaries
//! that separate independent updates from sequential ones, the parent
//! halfedge along which each vertex's distance is later integrated, and
//! the row addresses of the compressed Laplacian.

use crate::mesh::{HalfEdgeMesh, INVALID};
use crate::{Error, Result};

/// BFS plan: visit order, layer boundaries, parent halfedges and
/// compressed Laplacian row addresses.
#[derive(Debug, Clone)]
pub struct BfsOrder {
    /// Permutation of the vertices in visit order; sources come first,
    /// in their input order.
    pub order: Vec<usize>,
    /// Prefix addresses into `order` marking the start of each layer;
    /// the last entry equals the vertex count.
    pub layer_addr: Vec<usize>,
    /// Halfedge from the BFS parent into the vertex at each position
    /// (`INVALID` at source positions).
    pub parent_halfedge: Vec<usize>,
    /// Prefix addresses of the per-vertex Laplacian rows in visit order;
    /// row `i` holds `valence(order[i]) + 1` entries.
    pub lap_addr: Vec<usize>,
}

impl BfsOrder {
    pub fn build(mesh: &HalfEdgeMesh, sources: &[usize]) -> Result<Self> {
        let n_v = mesh.n_vertices();
        let mut order = vec![INVALID; n_v];
        let mut parent_halfedge = vec![INVALID; n_v];
        let mut lap_addr = vec![0usize; n_v + 1];
        let mut visited = vec![false; n_v];
        let mut layer_addr = vec![0, sources.len()];

        let mut id = 0;
        for &s in sources {
            visited[s] = true;
            order[id] = s;
            lap_addr[id + 1] = lap_addr[id] + mesh.valence(s) + 1;
            id += 1;
        }

        let mut front: Vec<usize> = sources.to_vec();
        let mut next_front: Vec<usize> = Vec::new();

        while !front.is_empty() {
            next_front.clear();
            for &v in &front {
                for h in mesh.outgoing_halfedges(v) {
                    let w = mesh.to(h);
                    if !visited[w] {
                        visited[w] = true;
                        next_front.push(w);
                        order[id] = w;
                        lap_addr[id + 1] = lap_addr[id] + mesh.valence(w) + 1;
                        parent_halfedge[id] = h;
                        id += 1;
                    }
                }
            }
            if !next_front.is_empty() {
                layer_addr.push(id);
            }
            std::mem::swap(&mut front, &mut next_front);
        }

        if id != n_v {
            return Err(Error::Disconnected {
                visited: id,
                total: n_v,
            });
        }

        Ok(Self {
            order,
            layer_addr,
            parent_halfedge,
            lap_addr,
        })
    }

    #[inline]
    pub fn n_layers(&self) -> usize {
        self.layer_addr.len() - 1
    }

    /// Positions of layer `l` inside `order`.
    #[inline]
    pub fn layer(&self, l: usize) -> std::ops::Range<usize> {
        self.layer_addr[l]..self.layer_addr[l + 1]
    }

    /// Size of the widest layer.
    pub fn max_layer_len(&self) -> usize {
        (0..self.n_layers())
            .map(|l| self.layer(l).len())
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point3D;

    fn grid(n: usize) -> HalfEdgeMesh {
        let mut positions = Vec::new();
        for j in 0..=n {
            for i in 0..=n {
                positions.push(Point3D::new(i as f64 / n as f64, j as f64 / n as f64, 0.0));
            }
        }
        let idx = |i: usize, j: usize| j * (n + 1) + i;
        let mut faces = Vec::new();
        for j in 0..n {
            for i in 0..n {
                faces.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
                faces.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
            }
        }
        HalfEdgeMesh::from_face_list(positions, &faces).unwrap()
    }

    #[test]
    fn order_is_a_permutation_with_sources_first() {
        let mesh = grid(4);
        let sources = [7, 0];
        let bfs = BfsOrder::build(&mesh, &sources).unwrap();

        assert_eq!(&bfs.order[..2], &sources);
        let mut sorted = bfs.order.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..mesh.n_vertices()).collect::<Vec<_>>());
        assert_eq!(*bfs.layer_addr.last().unwrap(), mesh.n_vertices());
        assert_eq!(bfs.layer_addr[0], 0);
        assert_eq!(bfs.layer_addr[1], sources.len());
    }

    #[test]
    fn parents_lie_in_earlier_layers() {
        let mesh = grid(4);
        let bfs = BfsOrder::build(&mesh, &[0]).unwrap();

        let mut layer_of = vec![0usize; mesh.n_vertices()];
        for l in 0..bfs.n_layers() {
            for i in bfs.layer(l) {
                layer_of[bfs.order[i]] = l;
            }
        }
        for i in 0..mesh.n_vertices() {
            let h = bfs.parent_halfedge[i];
            if i < 1 {
                assert_eq!(h, INVALID);
            } else {
                assert_eq!(mesh.to(h), bfs.order[i]);
                assert!(layer_of[mesh.from(h)] < layer_of[bfs.order[i]]);
            }
        }
    }

    #[test]
    fn row_addresses_match_valence() {
        let mesh = grid(3);
        let bfs = BfsOrder::build(&mesh, &[5]).unwrap();
        for i in 0..mesh.n_vertices() {
            assert_eq!(
                bfs.lap_addr[i + 1] - bfs.lap_addr[i],
                mesh.valence(bfs.order[i]) + 1
            );
        }
        assert_eq!(
            *bfs.lap_addr.last().unwrap(),
            2 * mesh.n_edges() + mesh.n_vertices()
        );
    }

    #[test]
    fn disconnected_mesh_is_rejected() {
        let positions = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(0.0, 1.0, 0.0),
            Point3D::new(5.0, 0.0, 0.0),
            Point3D::new(6.0, 0.0, 0.0),
            Point3D::new(5.0, 1.0, 0.0),
        ];
        let mesh = HalfEdgeMesh::from_face_list(positions, &[[0, 1, 2], [3, 4, 5]]).unwrap();
        assert!(matches!(
            BfsOrder::build(&mesh, &[0]),
            Err(Error::Disconnected {
                visited: 3,
                total: 6
            })
        ));
    }

    #[test]
    fn all_sources_collapse_to_one_layer() {
        let mesh = grid(2);
        let sources: Vec<usize> = (0..mesh.n_vertices()).collect();
        let bfs = BfsOrder::build(&mesh, &sources).unwrap();
        assert_eq!(bfs.n_layers(), 1);
        assert_eq!(bfs.order, sources);
    }
}

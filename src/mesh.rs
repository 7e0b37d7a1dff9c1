//! Index-based half-edge triangle mesh.
//!
//! Every entity is addressed by a plain `usize`: the two halfedges of
//! edge `e` are `2e` and `2e + 1`, with `2e` fixing the edge's canonical
//! orientation. Boundary halfedges carry no face and are linked into
//! boundary loops so that vertex ring circulation also works on open
//! meshes.

use crate::geometry::Point3D;

/// Sentinel for an absent index.
pub const INVALID: usize = usize::MAX;

#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    #[error("Empty mesh")]
    EmptyMesh,

    #[error("Face {face} references vertex {vertex}, but the mesh has {n_vertices} vertices")]
    VertexOutOfRange {
        face: usize,
        vertex: usize,
        n_vertices: usize,
    },

    #[error("Face {0} repeats a vertex")]
    DegenerateFace(usize),

    #[error("Non-manifold mesh: directed edge {from}->{to} is used by more than one face")]
    DoubledEdge { from: usize, to: usize },

    #[error("Non-manifold mesh: vertex {0} touches more than one boundary fan")]
    NonManifoldVertex(usize),
}

/// Half-edge triangle mesh consumed by the geodesic solver.
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh {
    positions: Vec<Point3D>,
    /// Destination vertex of each halfedge.
    to_vertex: Vec<usize>,
    /// Face of each halfedge; `INVALID` on boundary halfedges.
    face_of: Vec<usize>,
    /// Next halfedge around the face, or along the boundary loop.
    next_halfedge: Vec<usize>,
    /// One outgoing halfedge per vertex (`INVALID` for isolated vertices).
    outgoing: Vec<usize>,
    /// First corner halfedge of each face.
    face_halfedge: Vec<usize>,
}

impl HalfEdgeMesh {
    /// Build a half-edge mesh from vertex positions and triangle corner
    /// indices. Rejects non-manifold connectivity.
    pub fn from_face_list(
        positions: Vec<Point3D>,
        faces: &[[usize; 3]],
    ) -> Result<Self, MeshError> {
        if positions.is_empty() || faces.is_empty() {
            return Err(MeshError::EmptyMesh);
        }
        let n_v = positions.len();

        let mut edge_map: std::collections::HashMap<(usize, usize), usize> =
            std::collections::HashMap::with_capacity(faces.len() * 3 / 2);
        let mut to_vertex: Vec<usize> = Vec::with_capacity(faces.len() * 3);
        let mut face_of: Vec<usize> = Vec::with_capacity(faces.len() * 3);
        let mut next_halfedge: Vec<usize> = Vec::with_capacity(faces.len() * 3);
        let mut outgoing = vec![INVALID; n_v];
        let mut face_halfedge = Vec::with_capacity(faces.len());

        for (f, corners) in faces.iter().enumerate() {
            for &v in corners {
                if v >= n_v {
                    return Err(MeshError::VertexOutOfRange {
                        face: f,
                        vertex: v,
                        n_vertices: n_v,
                    });
                }
            }
            if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2] {
                return Err(MeshError::DegenerateFace(f));
            }

            let mut corner_halfedges = [0usize; 3];
            for k in 0..3 {
                let a = corners[k];
                let b = corners[(k + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                let e = *edge_map.entry(key).or_insert_with(|| {
                    // First traversal fixes the canonical orientation a -> b.
                    let e = to_vertex.len() / 2;
                    to_vertex.push(b);
                    to_vertex.push(a);
                    face_of.push(INVALID);
                    face_of.push(INVALID);
                    next_halfedge.push(INVALID);
                    next_halfedge.push(INVALID);
                    e
                });
                let h = if to_vertex[2 * e] == b { 2 * e } else { 2 * e + 1 };
                if face_of[h] != INVALID {
                    return Err(MeshError::DoubledEdge { from: a, to: b });
                }
                face_of[h] = f;
                corner_halfedges[k] = h;
                if outgoing[a] == INVALID {
                    outgoing[a] = h;
                }
            }
            for k in 0..3 {
                next_halfedge[corner_halfedges[k]] = corner_halfedges[(k + 1) % 3];
            }
            face_halfedge.push(corner_halfedges[0]);
        }

        // Chain boundary halfedges into loops. A manifold boundary vertex
        // owns exactly one outgoing boundary halfedge.
        let n_h = to_vertex.len();
        let mut boundary_out = vec![INVALID; n_v];
        for h in 0..n_h {
            if face_of[h] == INVALID {
                let from = to_vertex[h ^ 1];
                if boundary_out[from] != INVALID {
                    return Err(MeshError::NonManifoldVertex(from));
                }
                boundary_out[from] = h;
            }
        }
        for h in 0..n_h {
            if face_of[h] == INVALID {
                let succ = boundary_out[to_vertex[h]];
                if succ == INVALID {
                    return Err(MeshError::NonManifoldVertex(to_vertex[h]));
                }
                next_halfedge[h] = succ;
            }
        }

        Ok(Self {
            positions,
            to_vertex,
            face_of,
            next_halfedge,
            outgoing,
            face_halfedge,
        })
    }

    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn n_edges(&self) -> usize {
        self.to_vertex.len() / 2
    }

    #[inline]
    pub fn n_faces(&self) -> usize {
        self.face_halfedge.len()
    }

    #[inline]
    pub fn n_halfedges(&self) -> usize {
        self.to_vertex.len()
    }

    #[inline]
    pub fn position(&self, v: usize) -> Point3D {
        self.positions[v]
    }

    #[inline]
    pub fn positions_mut(&mut self) -> &mut [Point3D] {
        &mut self.positions
    }

    /// Edge owning halfedge `h`.
    #[inline]
    pub fn edge(&self, h: usize) -> usize {
        h / 2
    }

    /// The oppositely-oriented twin of halfedge `h`.
    #[inline]
    pub fn opposite(&self, h: usize) -> usize {
        h ^ 1
    }

    /// Halfedge `side` (0 or 1) of edge `e`; side 0 is canonical.
    #[inline]
    pub fn halfedge(&self, e: usize, side: usize) -> usize {
        2 * e + side
    }

    /// Whether `h` carries its edge's canonical orientation.
    #[inline]
    pub fn is_canonical(&self, h: usize) -> bool {
        h & 1 == 0
    }

    #[inline]
    pub fn to(&self, h: usize) -> usize {
        self.to_vertex[h]
    }

    #[inline]
    pub fn from(&self, h: usize) -> usize {
        self.to_vertex[h ^ 1]
    }

    /// Face of halfedge `h`, if any.
    #[inline]
    pub fn face(&self, h: usize) -> Option<usize> {
        let f = self.face_of[h];
        (f != INVALID).then_some(f)
    }

    /// Next halfedge around the face of `h` (or along the boundary loop).
    #[inline]
    pub fn next(&self, h: usize) -> usize {
        self.next_halfedge[h]
    }

    /// The three corner halfedges of face `f`, in boundary order.
    #[inline]
    pub fn face_halfedges(&self, f: usize) -> [usize; 3] {
        let h0 = self.face_halfedge[f];
        let h1 = self.next_halfedge[h0];
        [h0, h1, self.next_halfedge[h1]]
    }

    /// Iterator over the halfedges leaving vertex `v`.
    #[inline]
    pub fn outgoing_halfedges(&self, v: usize) -> VertexRing<'_> {
        let start = self.outgoing[v];
        VertexRing {
            mesh: self,
            start,
            current: start,
            exhausted: start == INVALID,
        }
    }

    /// Number of edges incident to vertex `v`.
    pub fn valence(&self, v: usize) -> usize {
        self.outgoing_halfedges(v).count()
    }
}

/// Circulator over the outgoing halfedges of one vertex.
pub struct VertexRing<'a> {
    mesh: &'a HalfEdgeMesh,
    start: usize,
    current: usize,
    exhausted: bool,
}

impl Iterator for VertexRing<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.exhausted {
            return None;
        }
        let h = self.current;
        // Rotate: the twin of `h` points back at the vertex, its `next`
        // leaves the vertex again.
        self.current = self.mesh.next_halfedge[h ^ 1];
        self.exhausted = self.current == self.start;
        Some(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> HalfEdgeMesh {
        // Unit square split along the diagonal 0-2.
        let positions = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(1.0, 1.0, 0.0),
            Point3D::new(0.0, 1.0, 0.0),
        ];
        HalfEdgeMesh::from_face_list(positions, &[[0, 1, 2], [0, 2, 3]]).unwrap()
    }

    #[test]
    fn counts_and_pairing() {
        let mesh = square();
        assert_eq!(mesh.n_vertices(), 4);
        assert_eq!(mesh.n_edges(), 5);
        assert_eq!(mesh.n_faces(), 2);
        assert_eq!(mesh.n_halfedges(), 10);

        for h in 0..mesh.n_halfedges() {
            assert_eq!(mesh.opposite(mesh.opposite(h)), h);
            assert_eq!(mesh.from(h), mesh.to(mesh.opposite(h)));
            assert_eq!(mesh.edge(h), mesh.edge(mesh.opposite(h)));
        }
        for e in 0..mesh.n_edges() {
            assert!(mesh.is_canonical(mesh.halfedge(e, 0)));
            assert!(!mesh.is_canonical(mesh.halfedge(e, 1)));
        }
    }

    #[test]
    fn face_cycles() {
        let mesh = square();
        for f in 0..mesh.n_faces() {
            let hs = mesh.face_halfedges(f);
            for k in 0..3 {
                assert_eq!(mesh.face(hs[k]), Some(f));
                // Head of one corner is the tail of the next.
                assert_eq!(mesh.to(hs[k]), mesh.from(hs[(k + 1) % 3]));
            }
        }
    }

    #[test]
    fn ring_covers_boundary_vertices() {
        let mesh = square();
        // Diagonal endpoints see three neighbors, the others two.
        assert_eq!(mesh.valence(0), 3);
        assert_eq!(mesh.valence(2), 3);
        assert_eq!(mesh.valence(1), 2);
        assert_eq!(mesh.valence(3), 2);

        let mut neighbors: Vec<usize> = mesh.outgoing_halfedges(0).map(|h| mesh.to(h)).collect();
        neighbors.sort_unstable();
        assert_eq!(neighbors, vec![1, 2, 3]);
        for h in mesh.outgoing_halfedges(0) {
            assert_eq!(mesh.from(h), 0);
        }
    }

    #[test]
    fn rejects_bad_input() {
        let p = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(0.0, 1.0, 0.0),
            Point3D::new(0.0, 0.0, 1.0),
        ];
        assert!(matches!(
            HalfEdgeMesh::from_face_list(Vec::new(), &[[0, 1, 2]]),
            Err(MeshError::EmptyMesh)
        ));
        assert!(matches!(
            HalfEdgeMesh::from_face_list(p.clone(), &[]),
            Err(MeshError::EmptyMesh)
        ));
        assert!(matches!(
            HalfEdgeMesh::from_face_list(p.clone(), &[[0, 1, 4]]),
            Err(MeshError::VertexOutOfRange { .. })
        ));
        assert!(matches!(
            HalfEdgeMesh::from_face_list(p.clone(), &[[0, 1, 1]]),
            Err(MeshError::DegenerateFace(0))
        ));
        // Two faces traverse the directed edge 0->1.
        assert!(matches!(
            HalfEdgeMesh::from_face_list(p, &[[0, 1, 2], [0, 1, 3]]),
            Err(MeshError::DoubledEdge { from: 0, to: 1 })
        ));
    }

    #[test]
    fn closed_tetrahedron_has_no_boundary() {
        let p = vec![
            Point3D::new(0.0, 0.0, 0.0),
            Point3D::new(1.0, 0.0, 0.0),
            Point3D::new(0.5, 0.866, 0.0),
            Point3D::new(0.5, 0.289, 0.816),
        ];
        let mesh =
            HalfEdgeMesh::from_face_list(p, &[[0, 1, 2], [0, 2, 3], [0, 3, 1], [1, 3, 2]])
                .unwrap();
        assert_eq!(mesh.n_edges(), 6);
        assert_eq!(mesh.n_faces(), 4);
        for h in 0..mesh.n_halfedges() {
            assert!(mesh.face(h).is_some());
        }
        for v in 0..4 {
            assert_eq!(mesh.valence(v), 3);
        }
    }
}

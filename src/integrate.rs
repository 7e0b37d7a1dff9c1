//! Recovery of vertex distances from the converged edge differences.
//!
//! Every non-source vertex owes its value to its BFS parent: the edge
//! difference along the parent halfedge is added to or subtracted from
//! the parent's distance depending on how the halfedge relates to the
//! edge's canonical orientation. Layers are processed in order so the
//! parent value always exists.

use rayon::prelude::*;

use crate::bfs::BfsOrder;
use crate::mesh::{HalfEdgeMesh, INVALID};

/// Parent link per BFS position, with the traversal direction packed
/// into the sign of the edge reference: a canonical parent halfedge is
/// stored as `-(e + 1)`, the opposite one as `e`.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    pub from_vertex: Vec<usize>,
    pub signed_edge: Vec<i64>,
}

impl TransitionTable {
    pub fn build(mesh: &HalfEdgeMesh, bfs: &BfsOrder) -> Self {
        let n_v = mesh.n_vertices();
        let mut from_vertex = vec![INVALID; n_v];
        let mut signed_edge = vec![0i64; n_v];

        from_vertex
            .par_iter_mut()
            .zip(signed_edge.par_iter_mut())
            .enumerate()
            .for_each(|(i, (from, signed))| {
                let h = bfs.parent_halfedge[i];
                if h != INVALID {
                    *from = mesh.from(h);
                    let e = mesh.edge(h) as i64;
                    *signed = if mesh.is_canonical(h) { -e - 1 } else { e };
                }
            });

        Self {
            from_vertex,
            signed_edge,
        }
    }
}

/// Accumulate the signed differences along the BFS tree and restore the
/// original model scale.
pub fn integrate_distances(
    bfs: &BfsOrder,
    transitions: &TransitionTable,
    x: &[f64],
    model_scaling_factor: f64,
) -> Vec<f64> {
    let n_v = bfs.order.len();
    let mut dist = vec![0.0f64; n_v];
    let mut scratch = vec![0.0f64; bfs.max_layer_len()];

    // Sources stay at zero; propagation starts at the second layer.
    for l in 1..bfs.n_layers() {
        let layer = bfs.layer(l);
        let begin = layer.start;
        let dist_read = &dist;
        scratch[..layer.len()]
            .par_iter_mut()
            .enumerate()
            .for_each(|(j, out)| {
                let i = begin + j;
                let base = dist_read[transitions.from_vertex[i]];
                let signed = transitions.signed_edge[i];
                *out = if signed >= 0 {
                    base + x[signed as usize]
                } else {
                    base - x[(-signed - 1) as usize]
                };
            });
        for (j, i) in layer.enumerate() {
            dist[bfs.order[i]] = scratch[j];
        }
    }

    dist.par_iter_mut().for_each(|d| *d *= model_scaling_factor);
    dist
}

//! Sparse admittance and incidence assembly.
//!
//! Complex matrices store their real (conductance) and imaginary
//! (susceptance) parts as separate CSR matrices. Entries are accumulated in
//! branch-id then phase order, so assembly is reproducible bit for bit.

use eg_core::{Complex, NodeId, Real, Tolerances, nearly_equal_complex};
use eg_graph::{Der, Grid};
use eg_project::{DerConnection, Phase};
use nalgebra::{DMatrix, DVector};
use sprs::{CsMat, TriMat};

use crate::error::{NetworkError, NetworkResult};
use crate::per_unit::PHASE_POWER_SHARE;
use crate::primitive::BranchPrimitive;

/// Sparse complex matrix in CSR format.
#[derive(Debug, Clone)]
pub struct SparseComplex {
    re: CsMat<Real>,
    im: CsMat<Real>,
}

/// Triplet accumulator for a `SparseComplex`.
struct ComplexTriplets {
    re: TriMat<Real>,
    im: TriMat<Real>,
}

impl ComplexTriplets {
    fn new(shape: (usize, usize)) -> Self {
        Self {
            re: TriMat::new(shape),
            im: TriMat::new(shape),
        }
    }

    fn add(&mut self, row: usize, col: usize, v: Complex) {
        if v.re != 0.0 {
            self.re.add_triplet(row, col, v.re);
        }
        if v.im != 0.0 {
            self.im.add_triplet(row, col, v.im);
        }
    }

    fn finish(self) -> SparseComplex {
        SparseComplex {
            re: self.re.to_csr(),
            im: self.im.to_csr(),
        }
    }
}

impl SparseComplex {
    pub fn shape(&self) -> (usize, usize) {
        (self.re.rows(), self.re.cols())
    }

    /// Get entry (i, j); zero when not stored.
    pub fn get(&self, i: usize, j: usize) -> Complex {
        Complex::new(
            self.re.get(i, j).copied().unwrap_or(0.0),
            self.im.get(i, j).copied().unwrap_or(0.0),
        )
    }

    /// Conductance part.
    pub fn re(&self) -> &CsMat<Real> {
        &self.re
    }

    /// Susceptance part.
    pub fn im(&self) -> &CsMat<Real> {
        &self.im
    }

    /// Total stored non-zeros (real + imaginary parts).
    pub fn nnz(&self) -> usize {
        self.re.nnz() + self.im.nnz()
    }

    pub fn to_dense(&self) -> DMatrix<Complex> {
        let (rows, cols) = self.shape();
        let mut out: DMatrix<Complex> = DMatrix::zeros(rows, cols);
        for (v, (i, j)) in self.re.iter() {
            out[(i, j)].re += *v;
        }
        for (v, (i, j)) in self.im.iter() {
            out[(i, j)].im += *v;
        }
        out
    }

    /// Dense copy of the rows/cols selected, in the order given.
    pub fn select(&self, rows: &[usize], cols: &[usize]) -> DMatrix<Complex> {
        DMatrix::from_fn(rows.len(), cols.len(), |i, j| self.get(rows[i], cols[j]))
    }

    /// Matrix-vector product.
    pub fn mul_vec(&self, x: &DVector<Complex>) -> NetworkResult<DVector<Complex>> {
        let (rows, cols) = self.shape();
        if x.len() != cols {
            return Err(NetworkError::InvalidParameter {
                element: "vector".to_string(),
                reason: format!("length {} does not match {cols} columns", x.len()),
            });
        }
        let mut y = DVector::zeros(rows);
        for (i, row) in self.re.outer_iterator().enumerate() {
            for (j, v) in row.iter() {
                y[i] += x[j] * *v;
            }
        }
        for (i, row) in self.im.outer_iterator().enumerate() {
            for (j, v) in row.iter() {
                y[i] += x[j] * Complex::new(0.0, *v);
            }
        }
        Ok(y)
    }

    /// True when square and `Y[i,j] == Y[j,i]` within tolerance.
    pub fn is_symmetric(&self, tol: Tolerances) -> bool {
        let (rows, cols) = self.shape();
        if rows != cols {
            return false;
        }
        let check = |m: &CsMat<Real>| {
            m.iter().all(|(_, (i, j))| {
                nearly_equal_complex(self.get(i, j), self.get(j, i), tol)
            })
        };
        check(&self.re) && check(&self.im)
    }
}

/// Admittance and incidence structures of one grid.
#[derive(Debug, Clone)]
pub struct AdmittanceSet {
    /// Nodal admittance Y (node rows × node rows).
    pub node: SparseComplex,
    /// From-end branch admittance: branch-row currents at the from end.
    pub branch_from: SparseComplex,
    /// To-end branch admittance: branch-row currents at the to end.
    pub branch_to: SparseComplex,
    /// Branch rows × node rows, 1 where a branch phase leaves a node phase.
    pub incidence_from: CsMat<Real>,
    /// Branch rows × node rows, 1 where a branch phase enters a node phase.
    pub incidence_to: CsMat<Real>,
    /// Node rows × node rows, phase-to-neutral to phase-to-phase voltage.
    ///
    /// Row `r` is the pair starting at phase row `r`: `ab`, `bc`, `ca` on a
    /// three-phase node, the single pair on the first row of a two-phase
    /// node, empty otherwise.
    pub node_transformation: CsMat<Real>,
    /// Node rows × DERs, wye DER power on the system base to row power.
    pub der_wye: CsMat<Real>,
    /// Node rows × DERs, delta DER power to phase-pair power, pairs indexed
    /// like the rows of `node_transformation`.
    pub der_delta: CsMat<Real>,
}

/// Assemble every admittance/incidence structure from branch primitives.
///
/// `primitives[b]` belongs to branch id `b`.
pub fn assemble(grid: &Grid, primitives: &[BranchPrimitive]) -> NetworkResult<AdmittanceSet> {
    let index = grid.index();
    let dim = index.node_dim();
    let branch_dim = index.branch_dim();

    if primitives.len() != grid.branches().len() {
        return Err(NetworkError::InvalidParameter {
            element: grid.name().to_string(),
            reason: format!(
                "{} primitives for {} branches",
                primitives.len(),
                grid.branches().len()
            ),
        });
    }

    let mut node = ComplexTriplets::new((dim, dim));
    let mut branch_from = ComplexTriplets::new((branch_dim, dim));
    let mut branch_to = ComplexTriplets::new((branch_dim, dim));
    let mut incidence_from = TriMat::new((branch_dim, dim));
    let mut incidence_to = TriMat::new((branch_dim, dim));

    for (branch, prim) in grid.branches().iter().zip(primitives) {
        let rows: Vec<usize> = index.branch_rows(branch.id).collect();
        let mut from_rows = Vec::with_capacity(rows.len());
        let mut to_rows = Vec::with_capacity(rows.len());
        for &phase in &branch.phases {
            let missing = || NetworkError::InvalidParameter {
                element: branch.name.clone(),
                reason: format!("phase '{}' has no node row", phase.as_str()),
            };
            from_rows.push(index.node_phase_row(branch.from, phase).ok_or_else(missing)?);
            to_rows.push(index.node_phase_row(branch.to, phase).ok_or_else(missing)?);
        }

        let n = rows.len();
        for i in 0..n {
            incidence_from.add_triplet(rows[i], from_rows[i], 1.0);
            incidence_to.add_triplet(rows[i], to_rows[i], 1.0);
            for j in 0..n {
                branch_from.add(rows[i], from_rows[j], prim.y_ff[(i, j)]);
                branch_from.add(rows[i], to_rows[j], prim.y_ft[(i, j)]);
                branch_to.add(rows[i], from_rows[j], prim.y_tf[(i, j)]);
                branch_to.add(rows[i], to_rows[j], prim.y_tt[(i, j)]);

                node.add(from_rows[i], from_rows[j], prim.y_ff[(i, j)]);
                node.add(from_rows[i], to_rows[j], prim.y_ft[(i, j)]);
                node.add(to_rows[i], from_rows[j], prim.y_tf[(i, j)]);
                node.add(to_rows[i], to_rows[j], prim.y_tt[(i, j)]);
            }
        }
    }

    Ok(AdmittanceSet {
        node: node.finish(),
        branch_from: branch_from.finish(),
        branch_to: branch_to.finish(),
        incidence_from: incidence_from.to_csr(),
        incidence_to: incidence_to.to_csr(),
        node_transformation: node_transformation(grid)?,
        der_wye: der_incidence(grid, DerConnection::Wye)?,
        der_delta: der_incidence(grid, DerConnection::Delta)?,
    })
}

/// Phase pairs of a node's phases, keyed by the phase starting each pair.
fn phase_pairs(phases: &[Phase]) -> Vec<(Phase, Phase)> {
    match phases {
        [a, b, c] => vec![(*a, *b), (*b, *c), (*c, *a)],
        [a, b] => vec![(*a, *b)],
        _ => Vec::new(),
    }
}

fn node_transformation(grid: &Grid) -> NetworkResult<CsMat<Real>> {
    let index = grid.index();
    let dim = index.node_dim();
    let mut tri = TriMat::new((dim, dim));
    for node in grid.nodes() {
        for (first, second) in phase_pairs(&node.phases) {
            let row = phase_row(grid, node.id, first, &node.name)?;
            let col = phase_row(grid, node.id, second, &node.name)?;
            tri.add_triplet(row, row, 1.0);
            tri.add_triplet(row, col, -1.0);
        }
    }
    Ok(tri.to_csr())
}

/// DER incidence for one connection: a DER's power splits equally over
/// its phases (wye) or its phase pairs (delta).
///
/// DER power is three-phase power on the system base; rows carry phase
/// power on a third of it, hence the `1 / (n · share)` weight.
fn der_incidence(grid: &Grid, connection: DerConnection) -> NetworkResult<CsMat<Real>> {
    let index = grid.index();
    let mut tri = TriMat::new((index.node_dim(), index.der_count()));
    for der in grid.ders().iter().filter(|d| d.connection == connection) {
        let starts = match connection {
            DerConnection::Wye => der.phases.clone(),
            DerConnection::Delta => delta_pair_starts(grid, der)?,
        };
        let weight = 1.0 / (starts.len() as Real * PHASE_POWER_SHARE);
        for phase in starts {
            let row = phase_row(grid, der.node, phase, &der.name)?;
            tri.add_triplet(row, der.id.index(), weight);
        }
    }
    Ok(tri.to_csr())
}

/// Starting phases of the node pairs a delta DER is connected across.
fn delta_pair_starts(grid: &Grid, der: &Der) -> NetworkResult<Vec<Phase>> {
    let node = grid.node(der.node).ok_or_else(|| NetworkError::InvalidParameter {
        element: der.name.clone(),
        reason: "node outside the grid".to_string(),
    })?;
    let pairs = phase_pairs(&node.phases);
    let starts: Vec<Phase> = if der.phases.len() == 3 {
        pairs.iter().map(|&(first, _)| first).collect()
    } else {
        pairs
            .iter()
            .filter(|(first, second)| {
                der.phases.contains(first) && der.phases.contains(second)
            })
            .map(|&(first, _)| first)
            .collect()
    };
    if starts.is_empty() {
        return Err(NetworkError::InvalidParameter {
            element: der.name.clone(),
            reason: format!("no phase pair of node '{}' matches its phases", node.name),
        });
    }
    Ok(starts)
}

fn phase_row(grid: &Grid, node: NodeId, phase: Phase, element: &str) -> NetworkResult<usize> {
    grid.index()
        .node_phase_row(node, phase)
        .ok_or_else(|| NetworkError::InvalidParameter {
            element: element.to_string(),
            reason: format!("phase '{}' has no node row", phase.as_str()),
        })
}

/// Dense copy of a real sparse matrix.
pub fn real_to_dense(m: &CsMat<Real>) -> DMatrix<Real> {
    let mut out = DMatrix::zeros(m.rows(), m.cols());
    for (v, (i, j)) in m.iter() {
        out[(i, j)] += *v;
    }
    out
}

//! Adjacency, impedance and bus matrices derived once per build.
//!
//! Connections are declared per node, so each direction of a line is written
//! separately. [`NetworkTables::derive`] fills per-direction tables, repairs
//! asymmetric entries to the larger of the two directions and records every
//! repair as a warning. The admittance matrix is stored sparse:
//!
//! ```text
//! G[i,j] = -r / ((r² + x²)·l)      B[i,j] = x / ((r² + x²)·l)      (i ≠ j)
//! G[i,i] = -Σ_j G[i,j]             B[i,i] = -Σ_j B[i,j]
//! ```
//!
//! with `l` the cable length (1 for transformers). The impedance matrix
//! used by the linearized power flow drops the slack row and column:
//! `Zre = G⁻¹`, `Zim = Zre·(−B)·Zre`.

use dopt_core::{Diagnostics, DoptError, NetworkSpec, Node};
use faer::prelude::SpSolver;
use faer::{FaerMat, Mat};
use num_complex::Complex64;
use petgraph::algo::connected_components;
use petgraph::graph::UnGraph;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("connection from '{from}' references unknown line '{line}'")]
    UnknownLine { from: String, line: String },

    #[error("connection from '{from}' references unknown node '{to}'")]
    UnknownNode { from: String, to: String },

    #[error("line between '{0}' and '{1}' has zero impedance")]
    ZeroImpedance(String, String),

    #[error("power flow needs exactly one slack node, found {0}")]
    SlackCount(usize),

    #[error("reduced conductance matrix is singular; every node must reach the slack node through resistive lines")]
    Singular,
}

impl From<NetworkError> for DoptError {
    fn from(err: NetworkError) -> Self {
        DoptError::Network(err.to_string())
    }
}

type Table = Vec<Vec<f64>>;

#[derive(Debug, Clone)]
pub struct NetworkTables {
    pub node_ids: Vec<String>,
    pub slack: Option<usize>,
    pub connected: Vec<Vec<bool>>,
    pub length: Table,
    pub power_capacity: Table,
    pub ampacity: Table,
    pub resistance: Table,
    pub inductance: Table,
    pub is_transformer: Vec<Vec<bool>>,
    /// Derated ampacity
    pub current_capacity: Table,
    /// Branch resistance after length scaling
    pub branch_r: Table,
    /// Branch reactance after length scaling
    pub branch_x: Table,
    g: CsMat<f64>,
    b: CsMat<f64>,
}

impl NetworkTables {
    pub fn derive(spec: &NetworkSpec, nodes: &[Node], diag: &mut Diagnostics) -> Result<Self, NetworkError> {
        let n = nodes.len();
        let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, node)| (node.id.as_str(), i)).collect();
        let zeros = || vec![vec![0.0; n]; n];

        let mut connection = zeros();
        let mut length = zeros();
        let mut power_capacity = zeros();
        let mut ampacity = zeros();
        let mut resistance = zeros();
        let mut inductance = zeros();
        let mut is_transformer = vec![vec![false; n]; n];

        for conn in &spec.connections {
            let (Some(&i), Some(&j)) = (index.get(conn.from.as_str()), index.get(conn.to.as_str())) else {
                return Err(NetworkError::UnknownNode {
                    from: conn.from.clone(),
                    to: conn.to.clone(),
                });
            };
            let line = spec
                .lines
                .iter()
                .find(|l| l.line_id == conn.line)
                .ok_or_else(|| NetworkError::UnknownLine {
                    from: conn.from.clone(),
                    line: conn.line.clone(),
                })?;
            connection[i][j] = 1.0;
            power_capacity[i][j] = line.power_capacity;
            ampacity[i][j] = line.ampacity;
            resistance[i][j] = line.resistance;
            inductance[i][j] = line.inductance;
            is_transformer[i][j] = line.is_transformer;
            if !line.is_transformer {
                length[i][j] = line.length;
            }
        }

        for (label, table) in [
            ("connection", &mut connection),
            ("length", &mut length),
            ("power_capacity", &mut power_capacity),
            ("ampacity", &mut ampacity),
            ("resistance", &mut resistance),
            ("inductance", &mut inductance),
        ] {
            repair_symmetry(label, table, nodes, diag);
        }
        for i in 0..n {
            for j in i + 1..n {
                let tx = is_transformer[i][j] || is_transformer[j][i];
                is_transformer[i][j] = tx;
                is_transformer[j][i] = tx;
            }
        }

        let connected: Vec<Vec<bool>> = connection.iter().map(|row| row.iter().map(|&c| c > 0.0).collect()).collect();
        let settings = &spec.settings;
        let mut current_capacity = zeros();
        let mut branch_r = zeros();
        let mut branch_x = zeros();
        let mut g = TriMat::new((n, n));
        let mut b = TriMat::new((n, n));
        let mut diag_g = vec![0.0; n];
        let mut diag_b = vec![0.0; n];

        for i in 0..n {
            for j in 0..n {
                if i == j || !connected[i][j] {
                    continue;
                }
                let tx = is_transformer[i][j];
                let (derating, scale) = if tx {
                    (settings.tx_derating, 1.0)
                } else {
                    (settings.cable_derating, length[i][j])
                };
                current_capacity[i][j] = derating * ampacity[i][j];
                branch_r[i][j] = scale * resistance[i][j];
                branch_x[i][j] = scale * inductance[i][j];

                if !tx && length[i][j] <= 0.0 {
                    continue;
                }
                let z = Complex64::new(resistance[i][j], inductance[i][j]);
                if z.norm() < 1e-12 {
                    return Err(NetworkError::ZeroImpedance(nodes[i].id.clone(), nodes[j].id.clone()));
                }
                let y = z.inv() / scale;
                g.add_triplet(i, j, -y.re);
                b.add_triplet(i, j, -y.im);
                diag_g[i] += y.re;
                diag_b[i] += y.im;
            }
        }
        for i in 0..n {
            g.add_triplet(i, i, diag_g[i]);
            b.add_triplet(i, i, diag_b[i]);
        }

        let mut graph = UnGraph::<(), ()>::new_undirected();
        let handles: Vec<_> = (0..n).map(|_| graph.add_node(())).collect();
        for i in 0..n {
            for j in i + 1..n {
                if connected[i][j] {
                    graph.add_edge(handles[i], handles[j], ());
                }
            }
        }
        let islands = connected_components(&graph);
        if islands > 1 {
            warn!("network splits into {} islands", islands);
            diag.add_warning("network", &format!("network splits into {} islands", islands));
        }

        let slacks: Vec<usize> = nodes.iter().enumerate().filter(|(_, node)| node.is_slack).map(|(i, _)| i).collect();

        Ok(Self {
            node_ids: nodes.iter().map(|node| node.id.clone()).collect(),
            slack: slacks.first().copied(),
            connected,
            length,
            power_capacity,
            ampacity,
            resistance,
            inductance,
            is_transformer,
            current_capacity,
            branch_r,
            branch_x,
            g: g.to_csr(),
            b: b.to_csr(),
        })
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    pub fn g(&self, i: usize, j: usize) -> f64 {
        self.g.get(i, j).copied().unwrap_or(0.0)
    }

    pub fn b(&self, i: usize, j: usize) -> f64 {
        self.b.get(i, j).copied().unwrap_or(0.0)
    }

    /// Connected pairs `(i, j)` with `i < j`.
    pub fn upper_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.len();
        (0..n)
            .flat_map(|i| (i + 1..n).map(move |j| (i, j)))
            .filter(|&(i, j)| self.connected[i][j])
            .collect()
    }

    /// Connected pairs in both directions.
    pub fn directed_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.len();
        (0..n)
            .flat_map(|i| (0..n).map(move |j| (i, j)))
            .filter(|&(i, j)| i != j && self.connected[i][j])
            .collect()
    }

    /// The single slack node required by the power flow.
    pub fn require_slack(&self, nodes: &[Node]) -> Result<usize, NetworkError> {
        let count = nodes.iter().filter(|n| n.is_slack).count();
        match (count, self.slack) {
            (1, Some(slack)) => Ok(slack),
            _ => Err(NetworkError::SlackCount(count)),
        }
    }

    /// Bus impedance matrix with the slack row and column set to zero.
    pub fn impedance(&self, slack: usize) -> Result<Impedance, NetworkError> {
        let n = self.len();
        let keep: Vec<usize> = (0..n).filter(|&i| i != slack).collect();
        let m = keep.len();
        let mut re = vec![vec![0.0; n]; n];
        let mut im = vec![vec![0.0; n]; n];
        if m == 0 {
            return Ok(Impedance { re, im });
        }

        let mut g = Mat::zeros(m, m);
        let mut identity = Mat::zeros(m, m);
        for (a, &i) in keep.iter().enumerate() {
            for (c, &j) in keep.iter().enumerate() {
                g.write(a, c, self.g(i, j));
            }
            identity.write(a, a, 1.0);
        }
        let inverse = g.partial_piv_lu().solve(&identity);

        let mut zre = vec![vec![0.0; m]; m];
        for (a, row) in zre.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = inverse.read(a, c);
            }
        }
        if zre.iter().flatten().any(|v| !v.is_finite()) {
            return Err(NetworkError::Singular);
        }

        // Zim = Zre · (−B) · Zre
        let mut tmp = vec![vec![0.0; m]; m];
        for a in 0..m {
            for c in 0..m {
                tmp[a][c] = (0..m).map(|k| zre[a][k] * -self.b(keep[k], keep[c])).sum();
            }
        }
        for a in 0..m {
            for c in 0..m {
                let zim: f64 = (0..m).map(|k| tmp[a][k] * zre[k][c]).sum();
                re[keep[a]][keep[c]] = zre[a][c];
                im[keep[a]][keep[c]] = zim;
            }
        }
        Ok(Impedance { re, im })
    }
}

/// Dense bus impedance, indexed by node position.
#[derive(Debug, Clone)]
pub struct Impedance {
    pub re: Table,
    pub im: Table,
}

fn repair_symmetry(label: &str, table: &mut Table, nodes: &[Node], diag: &mut Diagnostics) {
    let n = table.len();
    for i in 0..n {
        for j in i + 1..n {
            let (a, b) = (table[i][j], table[j][i]);
            if a != b {
                let value = a.max(b);
                table[i][j] = value;
                table[j][i] = value;
                let message = format!(
                    "{} between '{}' and '{}' is not symmetric ({} vs {}); using {}",
                    label, nodes[i].id, nodes[j].id, a, b, value
                );
                warn!("{}", message);
                diag.add_warning_with_entity("network", &message, &format!("{}-{}", nodes[i].id, nodes[j].id));
            }
        }
    }
}

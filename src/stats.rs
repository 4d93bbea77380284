//! Raw per-branch sufficient statistics: 18 substitution types and 6 dwell
//! states of the middle site of a window.
//!
//! Substitution types (context of the state the change leaves):
//!
//! | idx | non-CpG | idx | non-CpG | idx | CpG  |
//! |-----|---------|-----|---------|-----|------|
//! | 0   | G->C    | 6   | T->G    | 12  | G->C |
//! | 1   | C->G    | 7   | A->C    | 13  | C->G |
//! | 2   | G->T    | 8   | G->A    | 14  | G->T |
//! | 3   | C->A    | 9   | C->T    | 15  | C->A |
//! | 4   | T->A    | 10  | A->G    | 16  | G->A |
//! | 5   | A->T    | 11  | T->C    | 17  | C->T |
//!
//! Dwell states: non-CpG G, C, T, A, then CpG G, CpG C.

use anyhow::{Result, bail};
use ndarray::{Array1, Array2, Array3, Axis};

use crate::merge::CompositeTimeline;
use crate::nucleotide::{Nucleotide, Triplet};

pub const N_RAW_TYPES: usize = 18;
pub const N_RAW_STATES: usize = 6;
pub const N_ROOT_STATES: usize = 4;

pub const RAW_TYPE_LABELS: [&str; N_RAW_TYPES] = [
    "G>C", "C>G", "G>T", "C>A", "T>A", "A>T", "T>G", "A>C", "G>A", "C>T", "A>G", "T>C",
    "CpG:G>C", "CpG:C>G", "CpG:G>T", "CpG:C>A", "CpG:G>A", "CpG:C>T",
];

pub const RAW_STATE_LABELS: [&str; N_RAW_STATES] = ["G", "C", "T", "A", "CpG:G", "CpG:C"];

pub fn substitution_type(from: Triplet, to: Triplet) -> Option<usize> {
    use Nucleotide::{A, C, G, T};

    let (a, b) = (from.middle(), to.middle());
    if from.is_cpg() {
        return match (a, b) {
            (G, C) => Some(12),
            (C, G) => Some(13),
            (G, T) => Some(14),
            (C, A) => Some(15),
            (G, A) => Some(16),
            (C, T) => Some(17),
            _ => None,
        };
    }
    match (a, b) {
        (G, C) => Some(0),
        (C, G) => Some(1),
        (G, T) => Some(2),
        (C, A) => Some(3),
        (T, A) => Some(4),
        (A, T) => Some(5),
        (T, G) => Some(6),
        (A, C) => Some(7),
        (G, A) => Some(8),
        (C, T) => Some(9),
        (A, G) => Some(10),
        (T, C) => Some(11),
        _ => None,
    }
}

pub fn state_category(state: Triplet) -> usize {
    match (state.is_cpg(), state.middle()) {
        (true, Nucleotide::G) => 4,
        (true, Nucleotide::C) => 5,
        (_, m) => m.index(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchStats {
    pub counts: [u32; N_RAW_TYPES],
    pub dwell: [f64; N_RAW_STATES],
    pub length: f64,
}

impl BranchStats {
    pub fn from_timeline(timeline: &CompositeTimeline, length: f64) -> Self {
        let mut counts = [0u32; N_RAW_TYPES];
        for (from, to) in timeline.transitions() {
            if let Some(k) = substitution_type(from, to) {
                counts[k] += 1;
            }
        }
        let mut dwell = [0.0; N_RAW_STATES];
        for (state, t) in timeline.occupancy() {
            dwell[state_category(state)] += t;
        }
        Self {
            counts,
            dwell,
            length,
        }
    }

    pub fn n_changes(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn proportions(&self) -> [f64; N_RAW_STATES] {
        let mut out = [0.0; N_RAW_STATES];
        if self.length > 0.0 {
            for (o, d) in out.iter_mut().zip(self.dwell) {
                *o = d / self.length;
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct WindowStats {
    pub branches: Vec<BranchStats>,
    pub root_state: Nucleotide,
}

#[derive(Debug, Clone)]
pub struct RawStats {
    pub counts: Array3<u32>,
    pub dwell: Array3<f64>,
    pub proportions: Array3<f64>,
    pub branch_lengths: Array1<f64>,
}

impl RawStats {
    pub fn new(n_branches: usize, n_draws: usize) -> Self {
        Self {
            counts: Array3::zeros((n_branches, N_RAW_TYPES, n_draws)),
            dwell: Array3::zeros((n_branches, N_RAW_STATES, n_draws)),
            proportions: Array3::zeros((n_branches, N_RAW_STATES, n_draws)),
            branch_lengths: Array1::zeros(n_branches),
        }
    }

    pub fn n_branches(&self) -> usize {
        self.counts.len_of(Axis(0))
    }

    pub fn n_draws(&self) -> usize {
        self.counts.len_of(Axis(2))
    }

    pub fn add_window(&mut self, draw: usize, window: &[BranchStats]) -> Result<()> {
        if window.len() != self.n_branches() {
            bail!(
                "window has {} branches but statistics hold {}",
                window.len(),
                self.n_branches()
            );
        }
        if draw >= self.n_draws() {
            bail!("draw {draw} is out of range for {} draws", self.n_draws());
        }
        for (j, b) in window.iter().enumerate() {
            for (k, n) in b.counts.iter().enumerate() {
                self.counts[(j, k, draw)] += n;
            }
            let props = b.proportions();
            for s in 0..N_RAW_STATES {
                self.dwell[(j, s, draw)] += b.dwell[s];
                self.proportions[(j, s, draw)] += props[s];
            }
        }
        Ok(())
    }

    pub fn changes_per_branch(&self) -> Array2<u32> {
        self.counts.sum_axis(Axis(1))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootTally {
    pub counts: Array2<u32>,
}

impl RootTally {
    pub fn new(n_draws: usize) -> Self {
        Self {
            counts: Array2::zeros((N_ROOT_STATES, n_draws)),
        }
    }

    pub fn record(&mut self, draw: usize, state: Nucleotide) {
        self.counts[(state.index(), draw)] += 1;
    }

    pub fn total(&self, draw: usize) -> u32 {
        self.counts.column(draw).sum()
    }
}

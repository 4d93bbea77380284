use ndarray::{Array3, Axis};

use crate::stats::RawStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelVariant {
    ContextFree,
    CpgAware,
}

// G->C, G->T, G->A, C->G, C->T, C->A, T->G, T->C, T->A, A->G, A->C, A->T
static GTR_TYPES: [&[usize]; 12] = [
    &[0, 12],
    &[2, 14],
    &[8, 16],
    &[1, 13],
    &[9, 17],
    &[3, 15],
    &[6],
    &[11],
    &[4],
    &[10],
    &[7],
    &[5],
];
static GTR_STATES: [&[usize]; 4] = [&[0, 4], &[1, 5], &[2], &[3]];
static GTR_ORIGIN: [usize; 12] = [0, 0, 0, 1, 1, 1, 2, 2, 2, 3, 3, 3];

static CPG_TYPES: [&[usize]; 9] = [
    &[0, 1],
    &[2, 3],
    &[4, 5],
    &[6, 7],
    &[8, 9],
    &[10, 11],
    &[12, 13],
    &[14, 15],
    &[16, 17],
];
static CPG_STATES: [&[usize]; 3] = [&[0, 1], &[2, 3], &[4, 5]];
static CPG_ORIGIN: [usize; 9] = [0, 0, 1, 1, 0, 1, 2, 2, 2];

impl ModelVariant {
    pub fn type_groups(self) -> &'static [&'static [usize]] {
        match self {
            ModelVariant::ContextFree => &GTR_TYPES,
            ModelVariant::CpgAware => &CPG_TYPES,
        }
    }

    pub fn state_groups(self) -> &'static [&'static [usize]] {
        match self {
            ModelVariant::ContextFree => &GTR_STATES,
            ModelVariant::CpgAware => &CPG_STATES,
        }
    }

    pub fn origin_states(self) -> &'static [usize] {
        match self {
            ModelVariant::ContextFree => &GTR_ORIGIN,
            ModelVariant::CpgAware => &CPG_ORIGIN,
        }
    }

    pub fn n_types(self) -> usize {
        self.type_groups().len()
    }

    pub fn n_states(self) -> usize {
        self.state_groups().len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReducedStats {
    pub variant: ModelVariant,
    pub counts: Array3<u32>,
    pub proportions: Array3<f64>,
}

impl ReducedStats {
    pub fn origin(&self, k: usize) -> usize {
        self.variant.origin_states()[k]
    }

    pub fn n_branches(&self) -> usize {
        self.counts.len_of(Axis(0))
    }

    pub fn n_draws(&self) -> usize {
        self.counts.len_of(Axis(2))
    }
}

fn fold<T>(raw: &Array3<T>, groups: &[&[usize]]) -> Array3<T>
where
    T: Copy + Default + std::ops::AddAssign,
{
    let (n_branches, _, n_draws) = raw.dim();
    let mut out = Array3::from_elem((n_branches, groups.len(), n_draws), T::default());
    for j in 0..n_branches {
        for (k, members) in groups.iter().enumerate() {
            for c in 0..n_draws {
                let mut acc = T::default();
                for &m in members.iter() {
                    acc += raw[(j, m, c)];
                }
                out[(j, k, c)] = acc;
            }
        }
    }
    out
}

pub fn reduce(raw: &RawStats, variant: ModelVariant) -> ReducedStats {
    ReducedStats {
        variant,
        counts: fold(&raw.counts, variant.type_groups()),
        proportions: fold(&raw.proportions, variant.state_groups()),
    }
}

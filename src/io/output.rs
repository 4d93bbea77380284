use anyhow::{Context, Result};
use ndarray::{Array1, Array2, Array3};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::reduce::{ModelVariant, ReducedStats};
use crate::stats::{RawStats, RootTally};

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub prop_state: PathBuf,
    pub num_change: PathBuf,
    pub root_state: PathBuf,
    pub gtr_weight: PathBuf,
}

impl OutputPaths {
    pub fn new(dir: &Path, start: usize, end: usize) -> Self {
        Self {
            prop_state: dir.join(format!("PropState{start}_{end}.txt")),
            num_change: dir.join(format!("NumChange{start}_{end}.txt")),
            root_state: dir.join(format!("RootState{start}_{end}.txt")),
            gtr_weight: dir.join(format!("GTRweight{start}_{end}.txt")),
        }
    }
}

pub fn reduced_paths(dir: &Path, start: usize, end: usize, variant: ModelVariant) -> (PathBuf, PathBuf) {
    let tag = match variant {
        ModelVariant::ContextFree => "GTR",
        ModelVariant::CpgAware => "CpG",
    };
    (
        dir.join(format!("PropState{tag}{start}_{end}.txt")),
        dir.join(format!("NumChange{tag}{start}_{end}.txt")),
    )
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    Ok(BufWriter::new(file))
}

fn write_row<W: Write, T: Display>(w: &mut W, row: impl IntoIterator<Item = T>) -> std::io::Result<()> {
    for v in row {
        write!(w, "{v} ")?;
    }
    writeln!(w)
}

pub fn write_branch_matrix<T: Display + Copy>(path: &Path, m: &Array3<T>) -> Result<()> {
    let mut w = create(path)?;
    let (n_branches, n_cats, _) = m.dim();
    for j in 0..n_branches {
        for k in 0..n_cats {
            write_row(&mut w, m.slice(ndarray::s![j, k, ..]).iter().copied())
                .with_context(|| format!("failed to write {path:?}"))?;
        }
    }
    w.flush().with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

pub fn write_matrix<T: Display + Copy>(path: &Path, m: &Array2<T>) -> Result<()> {
    let mut w = create(path)?;
    for row in m.rows() {
        write_row(&mut w, row.iter().copied()).with_context(|| format!("failed to write {path:?}"))?;
    }
    w.flush().with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

pub fn write_vector(path: &Path, v: &Array1<f64>) -> Result<()> {
    let mut w = create(path)?;
    write_row(&mut w, v.iter().copied()).with_context(|| format!("failed to write {path:?}"))?;
    w.flush().with_context(|| format!("failed to write {path:?}"))?;
    Ok(())
}

pub fn write_run_outputs(
    paths: &OutputPaths,
    raw: &RawStats,
    root: &RootTally,
    loglike: &Array1<f64>,
) -> Result<()> {
    write_branch_matrix(&paths.prop_state, &raw.proportions)?;
    write_branch_matrix(&paths.num_change, &raw.counts)?;
    write_matrix(&paths.root_state, &root.counts)?;
    write_vector(&paths.gtr_weight, loglike)?;
    Ok(())
}

pub fn write_reduced(dir: &Path, start: usize, end: usize, reduced: &ReducedStats) -> Result<()> {
    let (props, counts) = reduced_paths(dir, start, end, reduced.variant);
    write_branch_matrix(&props, &reduced.proportions)?;
    write_branch_matrix(&counts, &reduced.counts)?;
    Ok(())
}

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, info, warn};
use ndarray::Array1;
use rayon::prelude::*;

use crate::io::mapping::{MappingReader, first_record, mapping_path};
use crate::merge::merge_window;
use crate::progress;
use crate::stats::{BranchStats, RawStats, RootTally, WindowStats};
use crate::tree::{Outgroup, parse_mapping_tree};

#[derive(Debug, Clone, Default)]
pub struct AccumulateOptions {
    pub strict: bool,
    pub progress: bool,
}

#[derive(Debug, Clone)]
pub struct Accumulation {
    pub raw: RawStats,
    pub root: RootTally,
    pub skipped: Vec<usize>,
    pub n_windows: usize,
}

impl Accumulation {
    pub fn n_skipped(&self) -> usize {
        self.skipped.iter().sum()
    }
}

pub struct WindowAccumulator {
    prefix: String,
    outgroup: Outgroup,
    n_draws: usize,
    options: AccumulateOptions,
}

pub fn window_stats(
    topologies: &[String; 3],
    outgroup: &Outgroup,
    n_branches: usize,
) -> Result<WindowStats> {
    let trees = [
        parse_mapping_tree(&topologies[0], outgroup).context("left site")?,
        parse_mapping_tree(&topologies[1], outgroup).context("middle site")?,
        parse_mapping_tree(&topologies[2], outgroup).context("right site")?,
    ];
    if trees[1].n_branches() != n_branches {
        bail!(
            "tree has {} branches, expected {n_branches}",
            trees[1].n_branches()
        );
    }
    let lengths = trees[1].branch_lengths();
    let timelines = merge_window([&trees[0], &trees[1], &trees[2]])?;
    let branches = timelines
        .iter()
        .map(|tl| BranchStats::from_timeline(tl, lengths[tl.branch]))
        .collect();
    Ok(WindowStats {
        branches,
        root_state: trees[1].root_state(),
    })
}

fn read_draw(readers: &mut [MappingReader], draw: usize) -> Result<[String; 3]> {
    let mut topologies = Vec::with_capacity(readers.len());
    let mut failure = None;
    // Every reader advances even after a failure so the streams stay aligned.
    for reader in readers.iter_mut() {
        match reader.next_record() {
            Ok(Some(t)) => topologies.push(t),
            Ok(None) => {
                failure.get_or_insert_with(|| {
                    anyhow!("{:?} has no record for draw {}", reader.path(), draw + 1)
                });
            }
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }
    topologies
        .try_into()
        .map_err(|_| anyhow!("expected three records for draw {}", draw + 1))
}

impl WindowAccumulator {
    pub fn new(
        prefix: impl Into<String>,
        outgroup: Outgroup,
        n_draws: usize,
        options: AccumulateOptions,
    ) -> Result<Self> {
        if n_draws == 0 {
            bail!("number of draws must be >= 1");
        }
        Ok(Self {
            prefix: prefix.into(),
            outgroup,
            n_draws,
            options,
        })
    }

    pub fn n_draws(&self) -> usize {
        self.n_draws
    }

    fn window_records(&self, site: usize) -> Result<Vec<Result<[String; 3]>>> {
        let mut readers = (site..site + 3)
            .map(|s| MappingReader::open(&mapping_path(&self.prefix, s)))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..self.n_draws)
            .map(|c| read_draw(&mut readers, c))
            .collect())
    }

    /// Scan windows starting at sites `start ..= end - 2` (1-based), reading
    /// site files `start ..= end`.
    pub fn accumulate(&self, start: usize, end: usize) -> Result<Accumulation> {
        if start == 0 {
            bail!("start site index is 1-based and must be >= 1");
        }
        let Some(min_end) = start.checked_add(2) else {
            bail!("start site {start} is out of range");
        };
        if end < min_end {
            bail!("end ({end}) must be at least start + 2 ({min_end})");
        }

        let first_path = mapping_path(&self.prefix, start);
        let first = first_record(&first_path)?;
        let n_branches = parse_mapping_tree(&first, &self.outgroup)
            .with_context(|| format!("failed to parse first tree of {first_path:?}"))?
            .n_branches();
        let n_windows = end - 1 - start;
        info!(
            "scanning {n_windows} windows over sites {start}..={end}: {n_branches} branches, {} draws",
            self.n_draws
        );

        let mut raw = RawStats::new(n_branches, self.n_draws);
        let mut root = RootTally::new(self.n_draws);
        let mut skipped = vec![0usize; self.n_draws];
        let mut lengths: Option<Vec<f64>> = None;

        let pb = self
            .options
            .progress
            .then(|| progress::bar(n_windows as u64, "Scan", "windows"));

        for site in start..end - 1 {
            debug!("window at site {site}");
            let records = self.window_records(site)?;
            let outcomes: Vec<Result<WindowStats>> = records
                .into_par_iter()
                .map(|rec| rec.and_then(|r| window_stats(&r, &self.outgroup, n_branches)))
                .collect();

            for (c, outcome) in outcomes.into_iter().enumerate() {
                match outcome {
                    Ok(ws) => {
                        raw.add_window(c, &ws.branches)?;
                        root.record(c, ws.root_state);
                        if lengths.is_none() {
                            lengths = Some(ws.branches.iter().map(|b| b.length).collect());
                        }
                    }
                    Err(e) if self.options.strict => {
                        return Err(e.context(format!(
                            "window at site {site}, draw {}",
                            c + 1
                        )));
                    }
                    Err(e) => {
                        warn!(
                            "skipping window at site {site}, draw {}: {e:#}",
                            c + 1
                        );
                        skipped[c] += 1;
                    }
                }
            }
            if let Some(pb) = &pb {
                pb.inc(1);
            }
        }
        if let Some(pb) = pb {
            pb.finish_with_message("windows done");
        }

        match lengths {
            Some(l) => raw.branch_lengths = Array1::from(l),
            None => warn!("no record could be used; branch lengths are all zero"),
        }
        let n_skipped: usize = skipped.iter().sum();
        if n_skipped > 0 {
            warn!("{n_skipped} window records were skipped");
        }

        Ok(Accumulation {
            raw,
            root,
            skipped,
            n_windows,
        })
    }
}

use anyhow::{Result, bail};

use crate::nucleotide::Triplet;
use crate::tree::{MappedTree, SitePath};

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeTimeline {
    pub branch: usize,
    pub states: Vec<Triplet>,
    pub dwells: Vec<f64>,
}

impl CompositeTimeline {
    pub fn total_time(&self) -> f64 {
        self.dwells.iter().sum()
    }

    pub fn transitions(&self) -> impl Iterator<Item = (Triplet, Triplet)> + '_ {
        self.states.windows(2).map(|w| (w[0], w[1]))
    }

    pub fn occupancy(&self) -> impl Iterator<Item = (Triplet, f64)> + '_ {
        self.states.iter().copied().zip(self.dwells.iter().copied())
    }
}

#[derive(Debug, Clone, Copy)]
struct Event {
    time: f64,
    site: usize,
}

/// Merge the paths of the left, middle and right site on `branch`.
///
/// Events at identical times are applied in site order (left, middle,
/// right). The final dwell runs to the middle site's branch length, which is
/// taken as canonical when the three lengths disagree by rounding.
pub fn merge(branch: usize, paths: [&SitePath; 3]) -> CompositeTimeline {
    let mut events = Vec::new();
    for (site, path) in paths.iter().enumerate() {
        let cumulative = path.cumulative_times();
        for &time in &cumulative[..cumulative.len() - 1] {
            events.push(Event { time, site });
        }
    }
    events.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.site.cmp(&b.site)));

    let mut cursor = [0usize; 3];
    let mut current = Triplet::new(
        paths[0].first_state(),
        paths[1].first_state(),
        paths[2].first_state(),
    );
    let mut states = Vec::with_capacity(events.len() + 2);
    let mut dwells = Vec::with_capacity(events.len() + 1);
    states.push(current);

    let mut previous = 0.0;
    for ev in &events {
        dwells.push(ev.time - previous);
        previous = ev.time;
        cursor[ev.site] += 1;
        current = current.with(ev.site, paths[ev.site].states()[cursor[ev.site]]);
        states.push(current);
    }

    dwells.push(paths[1].length() - previous);
    states.push(Triplet::new(
        paths[0].last_state(),
        paths[1].last_state(),
        paths[2].last_state(),
    ));

    CompositeTimeline {
        branch,
        states,
        dwells,
    }
}

pub fn merge_window(trees: [&MappedTree; 3]) -> Result<Vec<CompositeTimeline>> {
    let n = trees[1].n_branches();
    for (site, tree) in trees.iter().enumerate() {
        if tree.n_branches() != n {
            bail!(
                "site {} of the window has {} branches, expected {}",
                site + 1,
                tree.n_branches(),
                n
            );
        }
    }
    Ok((0..n)
        .map(|j| merge(j, [trees[0].path(j), trees[1].path(j), trees[2].path(j)]))
        .collect())
}

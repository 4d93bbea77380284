//! Mapped trees: one sampled substitution history per branch for one site.
//!
//! A mapping topology string is Newick-like. Each node label ends with the
//! node state (`name_S` for leaves, `S` for internal nodes) and each branch
//! carries its history from the parent end to the child end as
//! `:t0:S1:t1:S2:t2...`, i.e. an initial dwell in the parent state followed by
//! (substituted state, dwell) pairs.

use anyhow::{Context, Result, anyhow, bail};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::nucleotide::Nucleotide;

#[derive(Debug, Clone, PartialEq)]
pub struct SitePath {
    states: Vec<Nucleotide>,
    times: Vec<f64>,
}

impl SitePath {
    pub fn new(states: Vec<Nucleotide>, times: Vec<f64>) -> Result<Self> {
        if states.is_empty() {
            bail!("site path must contain at least one state");
        }
        if states.len() != times.len() {
            bail!(
                "site path has {} states but {} dwell times",
                states.len(),
                times.len()
            );
        }
        for (i, t) in times.iter().enumerate() {
            if !t.is_finite() || *t < 0.0 {
                bail!("dwell time {i} must be finite and non-negative, got {t}");
            }
        }
        Ok(Self { states, times })
    }

    pub fn states(&self) -> &[Nucleotide] {
        &self.states
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn first_state(&self) -> Nucleotide {
        self.states[0]
    }

    pub fn last_state(&self) -> Nucleotide {
        self.states[self.states.len() - 1]
    }

    pub fn length(&self) -> f64 {
        self.times.iter().sum()
    }

    pub fn cumulative_times(&self) -> Vec<f64> {
        let mut acc = 0.0;
        self.times
            .iter()
            .map(|t| {
                acc += t;
                acc
            })
            .collect()
    }

    pub fn n_changes(&self) -> usize {
        self.states.windows(2).filter(|w| w[0] != w[1]).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Outgroup {
    taxa: BTreeSet<String>,
}

impl Outgroup {
    pub fn new<I, S>(taxa: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            taxa: taxa.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read outgroup {path:?}"))?;
        let outgroup = Self::new(content.split_whitespace());
        if outgroup.taxa.is_empty() {
            bail!("outgroup file {path:?} lists no taxa");
        }
        Ok(outgroup)
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taxa.contains(name)
    }
}

/// One parsed mapping. Branch `j` is the branch above the node numbered `j`
/// in canonical post-order; the root has no branch.
#[derive(Debug, Clone)]
pub struct MappedTree {
    root_state: Nucleotide,
    paths: Vec<SitePath>,
    leaf_names: Vec<String>,
}

impl MappedTree {
    pub fn n_branches(&self) -> usize {
        self.paths.len()
    }

    pub fn root_state(&self) -> Nucleotide {
        self.root_state
    }

    pub fn path(&self, branch: usize) -> &SitePath {
        &self.paths[branch]
    }

    pub fn paths(&self) -> &[SitePath] {
        &self.paths
    }

    pub fn branch_lengths(&self) -> Vec<f64> {
        self.paths.iter().map(SitePath::length).collect()
    }

    pub fn leaf_names(&self) -> &[String] {
        &self.leaf_names
    }
}

#[derive(Debug)]
struct RawNode {
    name: Option<String>,
    state: Nucleotide,
    first_dwell: Option<f64>,
    events: Vec<(Nucleotide, f64)>,
    children: Vec<usize>,
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    nodes: Vec<RawNode>,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            nodes: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.as_bytes().get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        self.skip_ws();
        match self.peek() {
            Some(c) if c == b => {
                self.pos += 1;
                Ok(())
            }
            Some(c) => bail!(
                "expected '{}' at offset {}, found '{}'",
                b as char,
                self.pos,
                c as char
            ),
            None => bail!("expected '{}' but reached end of tree", b as char),
        }
    }

    fn token(&mut self) -> &'a str {
        self.skip_ws();
        let src = self.src;
        let start = self.pos;
        while let Some(b) = self.peek() {
            if matches!(b, b':' | b',' | b'(' | b')' | b';') {
                break;
            }
            self.pos += 1;
        }
        src[start..self.pos].trim()
    }

    fn subtree(&mut self) -> Result<usize> {
        self.skip_ws();
        let mut children = Vec::new();
        if self.peek() == Some(b'(') {
            self.pos += 1;
            loop {
                children.push(self.subtree()?);
                self.skip_ws();
                match self.peek() {
                    Some(b',') => self.pos += 1,
                    Some(b')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(c) => bail!("unexpected '{}' at offset {}", c as char, self.pos),
                    None => bail!("unbalanced parentheses"),
                }
            }
        }

        let label = self.token();
        let (name, state) = parse_label(label, children.is_empty())?;

        let mut fields = Vec::new();
        loop {
            self.skip_ws();
            if self.peek() != Some(b':') {
                break;
            }
            self.pos += 1;
            fields.push(self.token());
        }
        let (first_dwell, events) = parse_history(&fields)
            .with_context(|| format!("invalid branch history above node '{label}'"))?;

        self.nodes.push(RawNode {
            name,
            state,
            first_dwell,
            events,
            children,
        });
        Ok(self.nodes.len() - 1)
    }
}

fn parse_label(label: &str, is_leaf: bool) -> Result<(Option<String>, Nucleotide)> {
    if label.is_empty() {
        bail!("node label is missing its state");
    }
    let (name, state) = match label.rsplit_once('_') {
        Some((name, state)) => (Some(name.to_string()), state),
        None if is_leaf => (Some(String::new()), label),
        None => (None, label),
    };
    let state = Nucleotide::parse(state).with_context(|| format!("bad node label '{label}'"))?;
    Ok((name.filter(|_| is_leaf), state))
}

fn parse_dwell(s: &str) -> Result<f64> {
    let t: f64 = s
        .parse()
        .map_err(|_| anyhow!("dwell time '{s}' is not a number"))?;
    if !t.is_finite() || t < 0.0 {
        bail!("dwell time '{s}' must be finite and non-negative");
    }
    Ok(t)
}

fn parse_history(fields: &[&str]) -> Result<(Option<f64>, Vec<(Nucleotide, f64)>)> {
    let Some((first, rest)) = fields.split_first() else {
        return Ok((None, Vec::new()));
    };
    if rest.len() % 2 != 0 {
        bail!("every substituted state needs a dwell time");
    }
    let first = parse_dwell(first)?;
    let mut events = Vec::with_capacity(rest.len() / 2);
    for pair in rest.chunks(2) {
        events.push((Nucleotide::parse(pair[0])?, parse_dwell(pair[1])?));
    }
    Ok((Some(first), events))
}

fn min_leaf_names(nodes: &[RawNode], node: usize, out: &mut Vec<String>) -> String {
    let key = match &nodes[node].name {
        Some(name) if nodes[node].children.is_empty() => name.clone(),
        _ => nodes[node]
            .children
            .iter()
            .map(|&c| min_leaf_names(nodes, c, out))
            .min()
            .unwrap_or_default(),
    };
    out[node] = key.clone();
    key
}

fn contains_taxon(nodes: &[RawNode], node: usize, outgroup: &Outgroup) -> bool {
    let n = &nodes[node];
    if n.children.is_empty() {
        return n.name.as_deref().is_some_and(|name| outgroup.contains(name));
    }
    n.children
        .iter()
        .any(|&c| contains_taxon(nodes, c, outgroup))
}

fn post_order(nodes: &[RawNode], node: usize, order: &mut Vec<usize>) {
    for &c in &nodes[node].children {
        post_order(nodes, c, order);
    }
    order.push(node);
}

pub fn parse_mapping_tree(src: &str, outgroup: &Outgroup) -> Result<MappedTree> {
    let mut parser = Parser::new(src);
    let root = parser.subtree()?;
    parser.expect(b';')?;
    parser.skip_ws();
    if parser.pos != src.len() {
        bail!("trailing characters after ';' at offset {}", parser.pos);
    }
    let mut nodes = parser.nodes;
    if nodes[root].children.is_empty() {
        bail!("tree has no branches");
    }

    let mut keys = vec![String::new(); nodes.len()];
    min_leaf_names(&nodes, root, &mut keys);
    for i in 0..nodes.len() {
        let mut children = std::mem::take(&mut nodes[i].children);
        if i == root && !outgroup.is_empty() {
            children.sort_by(|&a, &b| {
                let a_out = contains_taxon(&nodes, a, outgroup);
                let b_out = contains_taxon(&nodes, b, outgroup);
                b_out.cmp(&a_out).then_with(|| keys[a].cmp(&keys[b]))
            });
        } else {
            children.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        }
        nodes[i].children = children;
    }

    let mut parent = vec![None; nodes.len()];
    for (i, n) in nodes.iter().enumerate() {
        for &c in &n.children {
            parent[c] = Some(i);
        }
    }

    let mut order = Vec::with_capacity(nodes.len());
    post_order(&nodes, root, &mut order);

    let mut paths = Vec::with_capacity(nodes.len() - 1);
    let mut leaf_names = Vec::new();
    for &i in order.iter().filter(|&&i| i != root) {
        let node = &nodes[i];
        let p = parent[i].ok_or_else(|| anyhow!("node {i} has no parent"))?;
        let label = node.name.as_deref().unwrap_or("<internal>");
        let first = node
            .first_dwell
            .ok_or_else(|| anyhow!("branch above '{label}' has no history"))?;

        let mut states = Vec::with_capacity(node.events.len() + 1);
        let mut times = Vec::with_capacity(node.events.len() + 1);
        states.push(nodes[p].state);
        times.push(first);
        for &(s, t) in &node.events {
            states.push(s);
            times.push(t);
        }
        if states[states.len() - 1] != node.state {
            bail!(
                "branch above '{label}' ends in {} but the node state is {}",
                states[states.len() - 1],
                node.state
            );
        }
        paths.push(SitePath::new(states, times)?);
        if node.children.is_empty() {
            leaf_names.push(node.name.clone().unwrap_or_default());
        }
    }

    for taxon in &outgroup.taxa {
        if !leaf_names.iter().any(|n| n == taxon) {
            bail!("outgroup taxon '{taxon}' is not in the tree");
        }
    }

    Ok(MappedTree {
        root_state: nodes[root].state,
        paths,
        leaf_names,
    })
}

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

/// GTR parameters as stored on disk. Frequencies are in G, C, T, A order;
/// exchangeabilities in GC, GT, GA, CT, CA, TA order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GtrParamsFile {
    pub frequencies: Vec<f64>,
    pub exchangeabilities: Vec<f64>,
}

fn parse_line(line: Option<&str>, line_no: usize, what: &str, expected: usize) -> Result<Vec<f64>> {
    let line = line.ok_or_else(|| anyhow!("line {line_no} ({what}) is missing"))?;
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != expected {
        bail!(
            "line {line_no} has {} {what}, expected {expected}",
            fields.len()
        );
    }
    fields
        .iter()
        .map(|f| {
            f.parse::<f64>()
                .map_err(|_| anyhow!("line {line_no}: '{f}' is not a number"))
        })
        .collect()
}

pub fn parse_params_text(content: &str) -> Result<GtrParamsFile> {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty());
    let frequencies = parse_line(lines.next(), 1, "frequencies", 4)?;
    let exchangeabilities = parse_line(lines.next(), 2, "exchangeabilities", 6)?;
    if lines.next().is_some() {
        bail!("unexpected content after line 2");
    }
    Ok(GtrParamsFile {
        frequencies,
        exchangeabilities,
    })
}

pub fn load_params(path: &Path) -> Result<GtrParamsFile> {
    if path.extension().map(|e| e == "json").unwrap_or(false) {
        let file = File::open(path).with_context(|| format!("failed to open {path:?}"))?;
        let params: GtrParamsFile = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to parse {path:?}"))?;
        return Ok(params);
    }
    let content = fs::read_to_string(path).with_context(|| format!("failed to open {path:?}"))?;
    parse_params_text(&content)
        .with_context(|| format!("incorrect format in GTR parameter file {path:?}"))
}

use anyhow::{Context, Result, bail};
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::io::open_reader;

pub fn mapping_path(prefix: &str, site: usize) -> PathBuf {
    let plain = PathBuf::from(format!("{prefix}_{site}.map"));
    if plain.exists() {
        return plain;
    }
    let gz = PathBuf::from(format!("{prefix}_{site}.map.gz"));
    if gz.exists() { gz } else { plain }
}

/// Sequential reader of per-draw records. A record is three lines: the
/// mapping topology, a second mapping draft that is discarded, and a blank
/// separator.
pub struct MappingReader {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    line: String,
    n_records: usize,
}

impl MappingReader {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            reader: open_reader(path)?,
            line: String::new(),
            n_records: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_line(&mut self) -> Result<usize> {
        self.line.clear();
        self.reader
            .read_line(&mut self.line)
            .with_context(|| format!("failed to read {:?}", self.path))
    }

    pub fn next_record(&mut self) -> Result<Option<String>> {
        let record = self.n_records + 1;
        if self.read_line()? == 0 {
            return Ok(None);
        }
        self.n_records += 1;
        let topology = self.line.trim().to_string();
        // Consume the whole record before checking it so later draws stay aligned.
        let has_draft = self.read_line()? > 0;
        // Final record may end without a separator.
        let separated = self.read_line()? == 0 || self.line.trim().is_empty();

        if topology.is_empty() {
            bail!("record {record} of {:?} has an empty topology line", self.path);
        }
        if !has_draft {
            bail!(
                "record {record} of {:?} is truncated: missing second mapping draft",
                self.path
            );
        }
        if !separated {
            bail!(
                "record {record} of {:?} is not followed by a blank separator line",
                self.path
            );
        }
        Ok(Some(topology))
    }
}

pub fn first_record(path: &Path) -> Result<String> {
    let mut reader = MappingReader::open(path)?;
    match reader.next_record()? {
        Some(topology) => Ok(topology),
        None => bail!("mapping file {path:?} contains no records"),
    }
}

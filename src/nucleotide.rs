use anyhow::{Result, bail};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Nucleotide {
    G,
    C,
    T,
    A,
}

impl Nucleotide {
    pub const ALL: [Nucleotide; 4] = [Nucleotide::G, Nucleotide::C, Nucleotide::T, Nucleotide::A];

    pub fn index(self) -> usize {
        match self {
            Nucleotide::G => 0,
            Nucleotide::C => 1,
            Nucleotide::T => 2,
            Nucleotide::A => 3,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'G' | b'g' => Some(Nucleotide::G),
            b'C' | b'c' => Some(Nucleotide::C),
            b'T' | b't' => Some(Nucleotide::T),
            b'A' | b'a' => Some(Nucleotide::A),
            _ => None,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.as_bytes() {
            [b] => match Self::from_byte(*b) {
                Some(n) => Ok(n),
                None => bail!("unknown nucleotide state '{s}'"),
            },
            _ => bail!("nucleotide state must be a single character, got '{s}'"),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Nucleotide::G => 'G',
            Nucleotide::C => 'C',
            Nucleotide::T => 'T',
            Nucleotide::A => 'A',
        }
    }
}

impl fmt::Display for Nucleotide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Triplet(pub [Nucleotide; 3]);

impl Triplet {
    pub fn new(left: Nucleotide, middle: Nucleotide, right: Nucleotide) -> Self {
        Self([left, middle, right])
    }

    pub fn middle(&self) -> Nucleotide {
        self.0[1]
    }

    /// True when the middle base sits in a CG dinucleotide, either as the G
    /// of a left-hand CG or the C of a right-hand CG.
    pub fn is_cpg(&self) -> bool {
        let [l, m, r] = self.0;
        (l == Nucleotide::C && m == Nucleotide::G) || (m == Nucleotide::C && r == Nucleotide::G)
    }

    pub fn with(&self, position: usize, state: Nucleotide) -> Self {
        let mut out = self.0;
        out[position] = state;
        Self(out)
    }
}

impl fmt::Display for Triplet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.0[0], self.0[1], self.0[2])
    }
}

impl std::str::FromStr for Triplet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = s.as_bytes();
        if bytes.len() != 3 {
            bail!("triplet must have 3 characters, got '{s}'");
        }
        let mut out = [Nucleotide::G; 3];
        for (slot, b) in out.iter_mut().zip(bytes) {
            *slot = match Nucleotide::from_byte(*b) {
                Some(n) => n,
                None => bail!("unknown nucleotide in triplet '{s}'"),
            };
        }
        Ok(Self(out))
    }
}

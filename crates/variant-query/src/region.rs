//! Genomic regions and the chunk index.
//!
//! Variant documents carry the ids of the fixed-size chunks their position
//! falls into (`{chromosome}_{index}_{size}k`), so a short region query
//! becomes an indexed membership test instead of a range scan.

use std::fmt;
use std::str::FromStr;

use nom::{
    bytes::complete::take_till1,
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, opt},
    sequence::{pair, preceded, tuple},
    IResult,
};

use crate::error::{FilterError, FilterResult};
use crate::grammar::OR;

/// Small chunk width in bases.
pub const CHUNK_SIZE_SMALL: u32 = 1_000;

/// Big chunk width in bases.
pub const CHUNK_SIZE_BIG: u32 = 10_000;

/// Spans longer than this use big chunks.
pub const BIG_CHUNK_THRESHOLD: u32 = 10_000;

/// Spans of at least this many bases skip the chunk index entirely.
pub const LONG_REGION_THRESHOLD: u32 = 1_000_000;

/// A closed genomic interval `[start, end]` on one chromosome.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    /// Chromosome name.
    pub chromosome: String,
    /// First position (1-based, inclusive).
    pub start: u32,
    /// Last position (inclusive).
    pub end: u32,
}

impl Region {
    /// Creates a region.
    pub fn new(chromosome: impl Into<String>, start: u32, end: u32) -> Self {
        Self {
            chromosome: chromosome.into(),
            start,
            end,
        }
    }

    /// A region covering a whole chromosome.
    pub fn whole_chromosome(chromosome: impl Into<String>) -> Self {
        Self::new(chromosome, 1, u32::MAX)
    }

    /// Parses `chr`, `chr:pos` or `chr:start-end`. Positions are 1-based.
    ///
    /// ```rust
    /// use variant_query::Region;
    ///
    /// let region = Region::parse("1:1000-50000").unwrap();
    /// assert_eq!(region.start, 1000);
    /// assert_eq!(region.end, 50000);
    ///
    /// let point = Region::parse("X:150").unwrap();
    /// assert_eq!((point.start, point.end), (150, 150));
    /// ```
    pub fn parse(input: &str) -> FilterResult<Self> {
        let invalid = || FilterError::InvalidRegion(input.to_string());
        let (_, (chromosome, coords)) = all_consuming(region)(input).map_err(|_| invalid())?;
        let region = match coords {
            None => Region::whole_chromosome(chromosome),
            Some((start, None)) => Region::new(chromosome, start, start),
            Some((start, Some(end))) => Region::new(chromosome, start, end),
        };
        if region.start == 0 || region.start > region.end {
            return Err(invalid());
        }
        Ok(region)
    }

    /// Parses an OR-joined list of regions.
    pub fn parse_list(value: &str) -> FilterResult<Vec<Self>> {
        value.split(OR).map(Region::parse).collect()
    }

    /// Number of bases between start and end.
    pub fn span(&self) -> u32 {
        self.end - self.start
    }

    /// Returns true if the chunk index should be skipped for this region.
    pub fn is_long(&self) -> bool {
        self.span() >= LONG_REGION_THRESHOLD
    }

    /// Returns true if `position` lies inside the region.
    pub fn contains(&self, chromosome: &str, position: u32) -> bool {
        self.chromosome == chromosome && self.start <= position && position <= self.end
    }

    /// Chunk width used to index this region.
    pub fn chunk_size(&self) -> u32 {
        if self.span() > BIG_CHUNK_THRESHOLD {
            CHUNK_SIZE_BIG
        } else {
            CHUNK_SIZE_SMALL
        }
    }

    /// Ids of every chunk the region touches.
    pub fn chunk_ids(&self) -> Vec<String> {
        chunk_ids(self)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == 1 && self.end == u32::MAX {
            write!(f, "{}", self.chromosome)
        } else {
            write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
        }
    }
}

impl FromStr for Region {
    type Err = FilterError;

    fn from_str(s: &str) -> FilterResult<Self> {
        Region::parse(s)
    }
}

fn position(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>)(input)
}

fn region(input: &str) -> IResult<&str, (&str, Option<(u32, Option<u32>)>)> {
    tuple((
        take_till1(|c| c == ':'),
        opt(preceded(
            char(':'),
            pair(position, opt(preceded(char('-'), position))),
        )),
    ))(input)
}

// ============================================================================
// Chunk arithmetic
// ============================================================================

/// Index of the chunk of width `chunk_size` containing `position`.
pub fn chunk_id(position: u32, chunk_size: u32) -> u32 {
    position / chunk_size
}

/// First position of chunk `id`. The first chunk starts at 1.
pub fn chunk_start(id: u32, chunk_size: u32) -> u32 {
    if id == 0 {
        1
    } else {
        id.saturating_mul(chunk_size)
    }
}

/// Last position of chunk `id`.
pub fn chunk_end(id: u32, chunk_size: u32) -> u32 {
    id.saturating_mul(chunk_size)
        .saturating_add(chunk_size - 1)
}

/// Formats a chunk id as stored in variant documents.
pub fn format_chunk_id(chromosome: &str, id: u32, chunk_size: u32) -> String {
    format!("{}_{}_{}k", chromosome, id, chunk_size / 1_000)
}

/// Ids of every chunk the region touches, at the granularity chosen by its span.
pub fn chunk_ids(region: &Region) -> Vec<String> {
    let size = region.chunk_size();
    (chunk_id(region.start, size)..=chunk_id(region.end, size))
        .map(|id| format_chunk_id(&region.chromosome, id, size))
        .collect()
}

/// The small and big chunk ids of a variant position.
pub fn document_chunk_ids(chromosome: &str, position: u32) -> Vec<String> {
    [CHUNK_SIZE_SMALL, CHUNK_SIZE_BIG]
        .iter()
        .map(|&size| format_chunk_id(chromosome, chunk_id(position, size), size))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_region() {
        let region = Region::parse("1:1000-50000").unwrap();
        assert_eq!(region, Region::new("1", 1000, 50000));
        assert_eq!(region.to_string(), "1:1000-50000");
    }

    #[test]
    fn test_parse_bare_chromosome() {
        let region = Region::parse("MT").unwrap();
        assert_eq!(region, Region::whole_chromosome("MT"));
        assert!(region.is_long());
        assert_eq!(region.to_string(), "MT");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Region::parse("1:abc").is_err());
        assert!(Region::parse("1:100-").is_err());
        assert!(Region::parse(":100").is_err());
        assert!(Region::parse("1:500-100").is_err());
        assert!(Region::parse("1:0").is_err());
        assert!(Region::parse("1:0-100").is_err());
    }

    #[test]
    fn test_parse_list() {
        let regions = Region::parse_list("1:10-20,2:30-40").unwrap();
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[1].chromosome, "2");
    }

    #[test]
    fn test_small_region_uses_small_chunks() {
        let ids = Region::new("1", 1500, 3200).chunk_ids();
        assert_eq!(ids, vec!["1_1_1k", "1_2_1k", "1_3_1k"]);
    }

    #[test]
    fn test_big_region_uses_big_chunks() {
        let ids = Region::new("1", 1000, 50000).chunk_ids();
        assert_eq!(ids.first().map(String::as_str), Some("1_0_10k"));
        assert_eq!(ids.last().map(String::as_str), Some("1_5_10k"));
        assert_eq!(ids.len(), 6);
    }

    #[test]
    fn test_chunk_bounds() {
        assert_eq!(chunk_start(0, CHUNK_SIZE_SMALL), 1);
        assert_eq!(chunk_end(0, CHUNK_SIZE_SMALL), 999);
        assert_eq!(chunk_start(3, CHUNK_SIZE_SMALL), 3000);
        assert_eq!(chunk_end(3, CHUNK_SIZE_SMALL), 3999);
        // Last chunk end saturates instead of overflowing
        assert_eq!(chunk_end(u32::MAX / 1000, CHUNK_SIZE_SMALL), u32::MAX);
    }

    #[test]
    fn test_every_position_is_covered() {
        for region in [
            Region::new("1", 1, 2500),
            Region::new("1", 999, 1001),
            Region::new("2", 12_345, 67_890),
        ] {
            let size = region.chunk_size();
            let ids = region.chunk_ids();
            for p in region.start..=region.end {
                let id = chunk_id(p, size);
                assert!(ids.contains(&format_chunk_id(&region.chromosome, id, size)));
                assert!(chunk_start(id, size) <= p && p <= chunk_end(id, size));
            }
        }
    }

    #[test]
    fn test_document_chunk_ids() {
        assert_eq!(document_chunk_ids("1", 25_000), vec!["1_25_1k", "1_2_10k"]);
    }
}

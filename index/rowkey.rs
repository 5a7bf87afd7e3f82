// ========================================================================================
//
//                               Row key formats
//
// ========================================================================================
//
// The index store scans rows in byte order, so a row key must sort exactly like the
// locus it names: chromosome first, then position, then the alleles. Two explicit,
// versioned layouts exist and the configuration picks one of them.
//
// Binary, version 0x01:
//
//     [0x01] [chromosome token] [position: u32 big-endian] [reference] [0x00] [alternate]
//
//     chromosome token:
//         0x01 [u16 big-endian]         numeric chromosomes (1, 2, ... 22, ...)
//         0x02 [rank: u8]               X = 0, Y = 1, MT = 2
//         0x03 [name bytes] [0x00]      any other contig
//
// Text, prefix "v1|":
//
//     v1|<token>|<position, 10 digits>|<reference>|<alternate>
//
//     token: "a" + 5-digit number, "b" + rank, or "c" + contig name.
//
// The text layout groups and orders rows by chromosome and position. Allele order inside
// one position, and the order of contigs whose name is a prefix of another, follow byte
// order of the rendered text rather than the binary rules.

use crate::shared::error::EncodingError;
use crate::types::Locus;
use serde::{Deserialize, Serialize};

pub const BINARY_FORMAT_VERSION: u8 = 0x01;
pub const TEXT_FORMAT_PREFIX: &str = "v1|";

const CLASS_NUMERIC: u8 = 0x01;
const CLASS_NAMED: u8 = 0x02;
const CLASS_CONTIG: u8 = 0x03;
const BINARY_SEPARATOR: u8 = 0x00;
const TEXT_SEPARATOR: char = '|';

const NAMED_CHROMOSOMES: [&str; 3] = ["X", "Y", "MT"];

/// The closed set of row key layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowKeyFormat {
    #[default]
    Binary,
    Text,
}

/// A chromosome name reduced to its sortable form.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChromosomeToken {
    Numeric(u16),
    Named(u8),
    Contig(String),
}

impl ChromosomeToken {
    fn parse(raw: &str) -> Result<Self, EncodingError> {
        let mut trimmed = raw.trim();
        if trimmed.len() > 3
            && trimmed
                .get(..3)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("chr"))
        {
            trimmed = &trimmed[3..];
        }
        if trimmed.is_empty() {
            return Err(EncodingError::EmptyChromosome);
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(number) = trimmed.parse::<u16>() {
                return Ok(Self::Numeric(number));
            }
        }
        if trimmed.eq_ignore_ascii_case("M") {
            return Ok(Self::Named(2));
        }
        if let Some(rank) = NAMED_CHROMOSOMES
            .iter()
            .position(|name| trimmed.eq_ignore_ascii_case(name))
        {
            return Ok(Self::Named(rank as u8));
        }
        Ok(Self::Contig(trimmed.to_string()))
    }

    fn name(&self) -> String {
        match self {
            Self::Numeric(number) => number.to_string(),
            Self::Named(rank) => NAMED_CHROMOSOMES[*rank as usize].to_string(),
            Self::Contig(name) => name.clone(),
        }
    }

    fn named(rank: u8) -> Result<Self, EncodingError> {
        if (rank as usize) < NAMED_CHROMOSOMES.len() {
            Ok(Self::Named(rank))
        } else {
            Err(EncodingError::MalformedRowKey(format!(
                "unknown chromosome rank {rank}"
            )))
        }
    }
}

/// Returns the normalized chromosome name used in row keys, e.g. `chrX` -> `X`.
pub fn normalize_chromosome(raw: &str) -> Result<String, EncodingError> {
    ChromosomeToken::parse(raw).map(|token| token.name())
}

fn check_position(start: u64) -> Result<u32, EncodingError> {
    match u32::try_from(start) {
        Ok(position) if position > 0 => Ok(position),
        _ => Err(EncodingError::PositionOutOfRange(start)),
    }
}

fn check_separator(field: &'static str, value: &str, separator: char) -> Result<(), EncodingError> {
    if value.contains(separator) {
        return Err(EncodingError::ForbiddenSeparator {
            field,
            value: value.to_string(),
            separator,
        });
    }
    Ok(())
}

fn malformed(message: impl Into<String>) -> EncodingError {
    EncodingError::MalformedRowKey(message.into())
}

fn utf8(bytes: &[u8], what: &str) -> Result<String, EncodingError> {
    String::from_utf8(bytes.to_vec()).map_err(|_| malformed(format!("{what} is not valid UTF-8")))
}

impl RowKeyFormat {
    /// Builds the row key for a locus.
    pub fn encode(self, locus: &Locus) -> Result<Vec<u8>, EncodingError> {
        let token = ChromosomeToken::parse(&locus.chromosome)?;
        let position = check_position(locus.start)?;
        match self {
            Self::Binary => encode_binary(&token, position, locus),
            Self::Text => encode_text(&token, position, locus),
        }
    }

    /// Recovers the locus a row key was built from. The chromosome comes back normalized.
    pub fn decode(self, key: &[u8]) -> Result<Locus, EncodingError> {
        match self {
            Self::Binary => decode_binary(key),
            Self::Text => decode_text(key),
        }
    }
}

fn encode_binary(
    token: &ChromosomeToken,
    position: u32,
    locus: &Locus,
) -> Result<Vec<u8>, EncodingError> {
    let separator = char::from(BINARY_SEPARATOR);
    check_separator("Reference allele", &locus.reference, separator)?;
    check_separator("Alternate allele", &locus.alternate, separator)?;

    let mut key = Vec::with_capacity(16 + locus.reference.len() + locus.alternate.len());
    key.push(BINARY_FORMAT_VERSION);
    match token {
        ChromosomeToken::Numeric(number) => {
            key.push(CLASS_NUMERIC);
            key.extend_from_slice(&number.to_be_bytes());
        }
        ChromosomeToken::Named(rank) => {
            key.push(CLASS_NAMED);
            key.push(*rank);
        }
        ChromosomeToken::Contig(name) => {
            check_separator("Chromosome", name, separator)?;
            key.push(CLASS_CONTIG);
            key.extend_from_slice(name.as_bytes());
            key.push(BINARY_SEPARATOR);
        }
    }
    key.extend_from_slice(&position.to_be_bytes());
    key.extend_from_slice(locus.reference.as_bytes());
    key.push(BINARY_SEPARATOR);
    key.extend_from_slice(locus.alternate.as_bytes());
    Ok(key)
}

fn decode_binary(key: &[u8]) -> Result<Locus, EncodingError> {
    let (&version, rest) = key
        .split_first()
        .ok_or_else(|| malformed("row key is empty"))?;
    if version != BINARY_FORMAT_VERSION {
        return Err(malformed(format!("unsupported format version {version:#04x}")));
    }
    let (&class, rest) = rest
        .split_first()
        .ok_or_else(|| malformed("missing chromosome class"))?;

    let (token, rest) = match class {
        CLASS_NUMERIC => {
            let (number, rest) = rest
                .split_first_chunk::<2>()
                .ok_or_else(|| malformed("truncated numeric chromosome"))?;
            (ChromosomeToken::Numeric(u16::from_be_bytes(*number)), rest)
        }
        CLASS_NAMED => {
            let (&rank, rest) = rest
                .split_first()
                .ok_or_else(|| malformed("truncated chromosome rank"))?;
            (ChromosomeToken::named(rank)?, rest)
        }
        CLASS_CONTIG => {
            let end = rest
                .iter()
                .position(|&b| b == BINARY_SEPARATOR)
                .ok_or_else(|| malformed("unterminated contig name"))?;
            (
                ChromosomeToken::Contig(utf8(&rest[..end], "contig name")?),
                &rest[end + 1..],
            )
        }
        other => return Err(malformed(format!("unknown chromosome class {other:#04x}"))),
    };

    let (position, alleles) = rest
        .split_first_chunk::<4>()
        .ok_or_else(|| malformed("truncated position"))?;
    let split = alleles
        .iter()
        .position(|&b| b == BINARY_SEPARATOR)
        .ok_or_else(|| malformed("missing allele separator"))?;

    Ok(Locus {
        chromosome: token.name(),
        start: u64::from(u32::from_be_bytes(*position)),
        reference: utf8(&alleles[..split], "reference allele")?,
        alternate: utf8(&alleles[split + 1..], "alternate allele")?,
    })
}

fn encode_text(
    token: &ChromosomeToken,
    position: u32,
    locus: &Locus,
) -> Result<Vec<u8>, EncodingError> {
    check_separator("Reference allele", &locus.reference, TEXT_SEPARATOR)?;
    check_separator("Alternate allele", &locus.alternate, TEXT_SEPARATOR)?;
    let chromosome = match token {
        ChromosomeToken::Numeric(number) => format!("a{number:05}"),
        ChromosomeToken::Named(rank) => format!("b{rank}"),
        ChromosomeToken::Contig(name) => {
            check_separator("Chromosome", name, TEXT_SEPARATOR)?;
            format!("c{name}")
        }
    };
    Ok(format!(
        "{TEXT_FORMAT_PREFIX}{chromosome}{TEXT_SEPARATOR}{position:010}{TEXT_SEPARATOR}{}{TEXT_SEPARATOR}{}",
        locus.reference, locus.alternate
    )
    .into_bytes())
}

fn decode_text(key: &[u8]) -> Result<Locus, EncodingError> {
    let text = std::str::from_utf8(key).map_err(|_| malformed("text row key is not valid UTF-8"))?;
    let body = text
        .strip_prefix(TEXT_FORMAT_PREFIX)
        .ok_or_else(|| malformed(format!("text row key must start with '{TEXT_FORMAT_PREFIX}'")))?;
    let fields: Vec<&str> = body.split(TEXT_SEPARATOR).collect();
    let [chromosome, position, reference, alternate] = fields.as_slice() else {
        return Err(malformed(format!(
            "expected 4 fields after the prefix, found {}",
            fields.len()
        )));
    };

    let token = match chromosome.split_at_checked(1) {
        Some(("a", number)) => number
            .parse::<u16>()
            .map(ChromosomeToken::Numeric)
            .map_err(|_| malformed(format!("invalid numeric chromosome '{number}'")))?,
        Some(("b", rank)) => {
            let rank = rank
                .parse::<u8>()
                .map_err(|_| malformed(format!("invalid chromosome rank '{rank}'")))?;
            ChromosomeToken::named(rank)?
        }
        Some(("c", name)) if !name.is_empty() => ChromosomeToken::Contig(name.to_string()),
        _ => return Err(malformed(format!("invalid chromosome token '{chromosome}'"))),
    };
    let start = position
        .parse::<u32>()
        .map_err(|_| malformed(format!("invalid position '{position}'")))?;

    Ok(Locus {
        chromosome: token.name(),
        start: u64::from(start),
        reference: reference.to_string(),
        alternate: alternate.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loci_in_genomic_order() -> Vec<Locus> {
        vec![
            Locus::new("1", 100, "A", "T"),
            Locus::new("chr1", 100, "AC", "T"),
            Locus::new("1", 101, "", "G"),
            Locus::new("1", 70_000_000, "G", "C"),
            Locus::new("2", 5, "T", "A"),
            Locus::new("10", 1, "C", "G"),
            Locus::new("22", 50_000_000, "C", "G"),
            Locus::new("X", 3, "A", "G"),
            Locus::new("chrY", 2, "A", "G"),
            Locus::new("M", 1, "A", "G"),
            Locus::new("GL000192.1", 10, "A", "C"),
            Locus::new("GL000192.10", 1, "A", "C"),
        ]
    }

    #[test]
    fn binary_keys_sort_like_loci() {
        let keys: Vec<Vec<u8>> = loci_in_genomic_order()
            .iter()
            .map(|locus| RowKeyFormat::Binary.encode(locus).unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn text_keys_sort_by_chromosome_then_position() {
        let loci = [
            Locus::new("1", 9, "A", "T"),
            Locus::new("1", 10, "A", "T"),
            Locus::new("2", 1, "A", "T"),
            Locus::new("10", 1, "A", "T"),
            Locus::new("X", 1, "A", "T"),
            Locus::new("MT", 1, "A", "T"),
            Locus::new("KI270728.1", 1, "A", "T"),
        ];
        let keys: Vec<Vec<u8>> = loci
            .iter()
            .map(|locus| RowKeyFormat::Text.encode(locus).unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(keys[0], b"v1|a00001|0000000009|A|T".to_vec());
        assert_eq!(keys[4], b"v1|b0|0000000001|A|T".to_vec());
        assert_eq!(keys[6], b"v1|cKI270728.1|0000000001|A|T".to_vec());
    }

    #[test]
    fn both_formats_decode_to_the_normalized_locus() {
        for format in [RowKeyFormat::Binary, RowKeyFormat::Text] {
            let key = format.encode(&Locus::new("chrX", 155_000, "AT", "")).unwrap();
            assert_eq!(format.decode(&key).unwrap(), Locus::new("X", 155_000, "AT", ""));

            let key = format.encode(&Locus::new("chr17", 7_676_154, "G", "C")).unwrap();
            assert_eq!(format.decode(&key).unwrap(), Locus::new("17", 7_676_154, "G", "C"));
        }
    }

    #[test]
    fn chromosome_normalization_matches_common_spellings() {
        assert_eq!(normalize_chromosome("chr1").unwrap(), "1");
        assert_eq!(normalize_chromosome(" CHRx ").unwrap(), "X");
        assert_eq!(normalize_chromosome("chrM").unwrap(), "MT");
        assert_eq!(normalize_chromosome("GL000192.1").unwrap(), "GL000192.1");
        assert_eq!(normalize_chromosome("chr"), Ok("chr".to_string()));
        assert_eq!(normalize_chromosome("  "), Err(EncodingError::EmptyChromosome));
    }

    #[test]
    fn non_ascii_contigs_are_kept_whole() {
        assert_eq!(normalize_chromosome("ch€1").unwrap(), "ch€1");
        assert_eq!(normalize_chromosome("chr€").unwrap(), "€");
        for format in [RowKeyFormat::Binary, RowKeyFormat::Text] {
            let locus = Locus::new("ch€1", 5, "A", "T");
            let key = format.encode(&locus).unwrap();
            assert_eq!(format.decode(&key).unwrap(), locus);
        }
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let zero = Locus::new("1", 0, "A", "T");
        assert_eq!(
            RowKeyFormat::Binary.encode(&zero),
            Err(EncodingError::PositionOutOfRange(0))
        );
        let too_far = Locus::new("1", u64::from(u32::MAX) + 1, "A", "T");
        assert!(RowKeyFormat::Binary.encode(&too_far).is_err());

        let piped = Locus::new("1", 5, "A|C", "T");
        assert!(matches!(
            RowKeyFormat::Text.encode(&piped),
            Err(EncodingError::ForbiddenSeparator { .. })
        ));
        assert!(RowKeyFormat::Binary.encode(&piped).is_ok());

        assert!(RowKeyFormat::Binary.decode(&[]).is_err());
        assert!(RowKeyFormat::Binary.decode(&[0x02, 0x01, 0, 1]).is_err());
        assert!(RowKeyFormat::Binary.decode(&[0x01, 0x02, 0x07, 0, 0, 0, 1, 0]).is_err());
        assert!(RowKeyFormat::Text.decode(b"v1|a00001|12|A").is_err());
    }
}

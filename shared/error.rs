// ========================================================================================
//
//                               The error taxonomy
//
// ========================================================================================
//
// Every failure the core can raise on its own is one of four kinds: a malformed
// encoding input, a configuration gap, a missing variant, or a broken link between a
// genotype call and the file that produced it. Failures from the variant store and the
// metadata resolver are carried through untouched.

use thiserror::Error;

/// The error currency of the external collaborators. The core never inspects it.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Input that cannot be turned into (or read back from) the index byte layout.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodingError {
    #[error("Sequence ontology accession '{0}' is not of the form 'SO:<digits>'.")]
    InvalidSoAccession(String),
    #[error("{field} '{value}' contains the row key separator {separator:?}.")]
    ForbiddenSeparator {
        field: &'static str,
        value: String,
        separator: char,
    },
    #[error("Position {0} cannot be encoded; positions are 1-based and must fit in 32 bits.")]
    PositionOutOfRange(u64),
    #[error("Chromosome name must not be empty.")]
    EmptyChromosome,
    #[error("Malformed row key: {0}")]
    MalformedRowKey(String),
    #[error("Malformed column bytes for '{column}': {message}")]
    MalformedColumn { column: String, message: String },
    #[error("Column '{column}' is declared as {declared} but the encoder produced {found}.")]
    TypeMismatch {
        column: String,
        declared: String,
        found: String,
    },
}

/// Missing or malformed configuration, either in the column registry or in the study
/// metadata the aggregator depends on.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No {kind} column is registered for source '{source_name}'.")]
    UnregisteredSource {
        kind: &'static str,
        source_name: String,
    },
    #[error("The registry declares the {kind} source '{source_name}' more than once.")]
    DuplicateSource {
        kind: &'static str,
        source_name: String,
    },
    #[error("The registry declares {count} {kind} sources; at most 65535 are supported.")]
    TooManySources { kind: &'static str, count: usize },
    #[error("Study '{0}' is not known to the metadata resolver.")]
    UnknownStudy(String),
    #[error("Study '{study}' has an invalid value '{value}' for attribute '{attribute}'.")]
    InvalidStudyAttribute {
        study: String,
        attribute: String,
        value: String,
    },
    #[error("Failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Everything that can stop a single annotation from being encoded.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("Failed to serialize the full annotation: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything that can stop a sample data query. None of these leave a partial result.
#[derive(Error, Debug)]
pub enum SampleDataError {
    #[error("Variant '{variant}' not found in study '{study}'.")]
    NotFound { variant: String, study: String },
    #[error("No file found for sample '{sample}', expected any of {candidates:?}")]
    DataIntegrity {
        sample: String,
        candidates: Vec<String>,
    },
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("{0}")]
    Store(#[source] BoxedError),
    #[error("{0}")]
    Metadata(#[source] BoxedError),
}

// ========================================================================================
//
//                               The column registry
//
// ========================================================================================
//
// A static table from a semantic source (a gene list, a conservation score, a
// population frequency) to the index column that stores it and the value type the store
// declares for that column. It is built once and only read afterwards, which lets every
// encoder thread share it without synchronization.

use crate::shared::config::{PopulationKey, RegistryConfig};
use crate::shared::error::ConfigurationError;
use ahash::AHashMap;
use std::fmt;

/// The value type a column is declared with in the index store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    StringSet,
    IntegerSet,
    DoubleList,
    Scalar(ScalarType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    Double,
    Text,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::StringSet => "string-set",
            Self::IntegerSet => "integer-set",
            Self::DoubleList => "double-list",
            Self::Scalar(ScalarType::Double) => "double",
            Self::Scalar(ScalarType::Text) => "text",
        })
    }
}

/// Identifies one index column. Score and frequency columns carry the slot the registry
/// assigned to their source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ColumnId {
    Genes,
    Transcripts,
    Biotype,
    So,
    Polyphen,
    PolyphenDesc,
    Sift,
    SiftDesc,
    TranscriptFlags,
    GeneTraitName,
    GeneTraitId,
    Hpo,
    Drug,
    ProteinKeywords,
    Xrefs,
    FullAnnotation,
    Conservation(u16),
    PopulationFrequency(u16),
    FunctionalScore(u16),
}

/// Columns whose name and type never depend on configuration.
pub const FIXED_COLUMNS: [(ColumnId, &str, ValueType); 16] = [
    (ColumnId::Genes, "GENES", ValueType::StringSet),
    (ColumnId::Transcripts, "TRANSCRIPTS", ValueType::StringSet),
    (ColumnId::Biotype, "BIOTYPE", ValueType::StringSet),
    (ColumnId::So, "SO", ValueType::IntegerSet),
    (ColumnId::Polyphen, "POLYPHEN", ValueType::DoubleList),
    (ColumnId::PolyphenDesc, "POLYPHEN_DESC", ValueType::StringSet),
    (ColumnId::Sift, "SIFT", ValueType::DoubleList),
    (ColumnId::SiftDesc, "SIFT_DESC", ValueType::StringSet),
    (ColumnId::TranscriptFlags, "TRANSCRIPTION_FLAGS", ValueType::StringSet),
    (ColumnId::GeneTraitName, "GENE_TRAITS_NAME", ValueType::StringSet),
    (ColumnId::GeneTraitId, "GENE_TRAITS_ID", ValueType::StringSet),
    (ColumnId::Hpo, "HPO", ValueType::StringSet),
    (ColumnId::Drug, "DRUG", ValueType::StringSet),
    (ColumnId::ProteinKeywords, "PROTEIN_KEYWORDS", ValueType::StringSet),
    (ColumnId::Xrefs, "XREFS", ValueType::StringSet),
    (
        ColumnId::FullAnnotation,
        "FULL_ANNOTATION",
        ValueType::Scalar(ScalarType::Text),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub id: ColumnId,
    pub name: String,
    pub value_type: ValueType,
}

/// One family of configurable columns (conservation, functional, or frequency).
#[derive(Debug, Clone, Default)]
struct SourceTable {
    specs: Vec<ColumnSpec>,
    by_source: AHashMap<String, u16>,
}

impl SourceTable {
    fn build(
        kind: &'static str,
        sources: &[String],
        value_type: ValueType,
        column: impl Fn(u16) -> ColumnId,
        name: impl Fn(&str) -> String,
    ) -> Result<Self, ConfigurationError> {
        if sources.len() > usize::from(u16::MAX) {
            return Err(ConfigurationError::TooManySources {
                kind,
                count: sources.len(),
            });
        }
        let mut table = Self::default();
        for (index, source) in sources.iter().enumerate() {
            let slot = index as u16;
            if table.by_source.insert(source_key(source), slot).is_some() {
                return Err(ConfigurationError::DuplicateSource {
                    kind,
                    source_name: source.clone(),
                });
            }
            table.specs.push(ColumnSpec {
                id: column(slot),
                name: name(source),
                value_type,
            });
        }
        Ok(table)
    }

    fn lookup(&self, kind: &'static str, source: &str) -> Result<&ColumnSpec, ConfigurationError> {
        self.by_source
            .get(&source_key(source))
            .map(|&slot| &self.specs[usize::from(slot)])
            .ok_or_else(|| ConfigurationError::UnregisteredSource {
                kind,
                source_name: source.to_string(),
            })
    }
}

const CONSERVATION: &str = "conservation";
const POPULATION_FREQUENCY: &str = "population frequency";
const FUNCTIONAL_SCORE: &str = "functional score";

fn source_key(source: &str) -> String {
    source.trim().to_ascii_lowercase()
}

fn population_source(key: &PopulationKey) -> String {
    format!("{}:{}", key.study, key.population)
}

/// The immutable source-to-column table shared by every encoder.
#[derive(Debug, Clone)]
pub struct ColumnRegistry {
    fixed: Vec<ColumnSpec>,
    conservation: SourceTable,
    population: SourceTable,
    functional: SourceTable,
}

impl ColumnRegistry {
    /// Builds a registry from configuration, rejecting sources declared twice.
    pub fn from_config(config: &RegistryConfig) -> Result<Self, ConfigurationError> {
        let populations: Vec<String> = config
            .population_frequencies
            .iter()
            .map(population_source)
            .collect();
        Ok(Self {
            fixed: FIXED_COLUMNS
                .iter()
                .map(|&(id, name, value_type)| ColumnSpec {
                    id,
                    name: name.to_string(),
                    value_type,
                })
                .collect(),
            conservation: SourceTable::build(
                CONSERVATION,
                &config.conservation,
                ValueType::Scalar(ScalarType::Double),
                ColumnId::Conservation,
                |source| format!("C_{}", source.to_ascii_uppercase()),
            )?,
            population: SourceTable::build(
                POPULATION_FREQUENCY,
                &populations,
                ValueType::DoubleList,
                ColumnId::PopulationFrequency,
                |source| format!("A_{source}"),
            )?,
            functional: SourceTable::build(
                FUNCTIONAL_SCORE,
                &config.functional,
                ValueType::Scalar(ScalarType::Double),
                ColumnId::FunctionalScore,
                |source| format!("F_{}", source.to_ascii_uppercase()),
            )?,
        })
    }

    pub fn conservation(&self, source: &str) -> Result<&ColumnSpec, ConfigurationError> {
        self.conservation.lookup(CONSERVATION, source)
    }

    pub fn population_frequency(
        &self,
        study: &str,
        population: &str,
    ) -> Result<&ColumnSpec, ConfigurationError> {
        self.population
            .lookup(POPULATION_FREQUENCY, &format!("{study}:{population}"))
    }

    pub fn functional_score(&self, source: &str) -> Result<&ColumnSpec, ConfigurationError> {
        self.functional.lookup(FUNCTIONAL_SCORE, source)
    }

    /// Resolves any column id back to its declaration.
    pub fn spec(&self, id: ColumnId) -> Option<&ColumnSpec> {
        match id {
            ColumnId::Conservation(slot) => self.conservation.specs.get(usize::from(slot)),
            ColumnId::PopulationFrequency(slot) => self.population.specs.get(usize::from(slot)),
            ColumnId::FunctionalScore(slot) => self.functional.specs.get(usize::from(slot)),
            fixed => self.fixed.iter().find(|spec| spec.id == fixed),
        }
    }

    /// The columns every row may carry regardless of configured sources.
    pub fn fixed_columns(&self) -> &[ColumnSpec] {
        &self.fixed
    }

    /// Every column declared by this registry, fixed columns first.
    pub fn columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.fixed
            .iter()
            .chain(&self.conservation.specs)
            .chain(&self.population.specs)
            .chain(&self.functional.specs)
    }
}

impl Default for ColumnRegistry {
    fn default() -> Self {
        // The built-in source lists are distinct and short, so validation cannot fail.
        match Self::from_config(&RegistryConfig::default()) {
            Ok(registry) => registry,
            Err(err) => unreachable!("built-in registry is invalid: {err}"),
        }
    }
}

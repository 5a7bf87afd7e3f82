// ========================================================================================
//
//                               Configuration
//
// ========================================================================================
//
// A single TOML document configures the whole crate. Every field carries a serde
// default, so an empty file (or no file at all) yields the built-in behavior.

use crate::rowkey::RowKeyFormat;
use crate::shared::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Default number of samples requested from the store per window.
pub const DEFAULT_SAMPLE_BATCH_SIZE: usize = 10_000;
/// Default number of samples returned per genotype bucket.
pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VardexConfig {
    pub encoder: EncoderConfig,
    pub registry: RegistryConfig,
    pub samples: SamplesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub row_key_format: RowKeyFormat,
    /// Store the complete annotation record as JSON next to the index columns.
    pub full_annotation: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            row_key_format: RowKeyFormat::Binary,
            full_annotation: true,
        }
    }
}

/// A population frequency source: the study that measured it and the population.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopulationKey {
    pub study: String,
    pub population: String,
}

impl PopulationKey {
    pub fn new(study: &str, population: &str) -> Self {
        Self {
            study: study.to_string(),
            population: population.to_string(),
        }
    }
}

/// The score and frequency sources that get their own index column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub conservation: Vec<String>,
    pub functional: Vec<String>,
    pub population_frequencies: Vec<PopulationKey>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        let populations: &[(&str, &[&str])] = &[
            ("1kG_phase3", &["ALL", "AFR", "AMR", "EAS", "EUR", "SAS"]),
            (
                "GNOMAD_GENOMES",
                &["ALL", "AFR", "AMR", "EAS", "FIN", "NFE", "ASJ", "OTH"],
            ),
            ("GNOMAD_EXOMES", &["ALL"]),
            ("ESP6500", &["ALL", "AA", "EA"]),
            ("EXAC", &["ALL"]),
        ];
        Self {
            conservation: vec!["phastCons".into(), "phylop".into(), "gerp".into()],
            functional: vec!["cadd_raw".into(), "cadd_scaled".into()],
            population_frequencies: populations
                .iter()
                .flat_map(|(study, names)| {
                    names.iter().map(move |name| PopulationKey::new(study, name))
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplesConfig {
    pub batch_size: usize,
    pub limit: usize,
    /// Genotypes returned when a query names none.
    pub genotypes: Vec<String>,
}

impl Default for SamplesConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SAMPLE_BATCH_SIZE,
            limit: DEFAULT_SAMPLE_LIMIT,
            genotypes: vec!["0/1".to_string(), "1/1".to_string()],
        }
    }
}

impl VardexConfig {
    /// Loads a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the built-in configuration.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Saves the configuration in a human-readable TOML format.
    pub fn save(&self, path: &Path) -> Result<(), ConfigurationError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

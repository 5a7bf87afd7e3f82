// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// This file is ONLY for types that are shared between the encoder, the row key
// formats, and the write surface.

use crate::registry::ColumnId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A genomic coordinate: chromosome, 1-based start, reference and alternate alleles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locus {
    pub chromosome: String,
    pub start: u64,
    pub reference: String,
    pub alternate: String,
}

impl Locus {
    pub fn new(chromosome: &str, start: u64, reference: &str, alternate: &str) -> Self {
        Self {
            chromosome: chromosome.to_string(),
            start,
            reference: reference.to_string(),
            alternate: alternate.to_string(),
        }
    }
}

/// Renders the canonical variant id, e.g. `1:100:A:T`.
impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chromosome, self.start, self.reference, self.alternate
        )
    }
}

/// A source-tagged numeric score (conservation, functional, or protein substitution).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Score {
    pub score: Option<f64>,
    pub source: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceOntologyTerm {
    pub accession: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProteinVariantAnnotation {
    pub substitution_scores: Option<Vec<Score>>,
    pub keywords: Option<Vec<String>>,
}

/// One predicted functional effect of the variant on a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsequenceType {
    pub gene_name: Option<String>,
    pub ensembl_gene_id: Option<String>,
    pub ensembl_transcript_id: Option<String>,
    pub biotype: Option<String>,
    pub transcript_annotation_flags: Option<Vec<String>>,
    pub sequence_ontology_terms: Option<Vec<SequenceOntologyTerm>>,
    pub protein_variant_annotation: Option<ProteinVariantAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PopulationFrequency {
    pub study: String,
    pub population: String,
    pub ref_allele: Option<String>,
    pub alt_allele: Option<String>,
    pub ref_allele_freq: f64,
    pub alt_allele_freq: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneTraitAssociation {
    pub id: Option<String>,
    pub name: Option<String>,
    pub hpo: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneDrugInteraction {
    pub gene_name: Option<String>,
    pub drug_name: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Xref {
    pub id: Option<String>,
    pub source: Option<String>,
}

/// A variant annotation record as produced by the annotation service.
///
/// Every list is optional; an absent list and an empty list mean the same thing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantAnnotation {
    pub chromosome: String,
    pub start: u64,
    pub reference: String,
    pub alternate: String,
    pub id: Option<String>,
    pub consequence_types: Option<Vec<ConsequenceType>>,
    pub conservation: Option<Vec<Score>>,
    pub population_frequencies: Option<Vec<PopulationFrequency>>,
    pub functional_score: Option<Vec<Score>>,
    pub gene_trait_association: Option<Vec<GeneTraitAssociation>>,
    pub gene_drug_interaction: Option<Vec<GeneDrugInteraction>>,
    pub xrefs: Option<Vec<Xref>>,
}

impl VariantAnnotation {
    pub fn locus(&self) -> Locus {
        Locus::new(&self.chromosome, self.start, &self.reference, &self.alternate)
    }
}

/// Iterates an optional list, treating `None` as empty.
pub(crate) fn each<T>(list: &Option<Vec<T>>) -> impl Iterator<Item = &T> {
    list.iter().flatten()
}

/// A typed index column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Strings(BTreeSet<String>),
    Integers(BTreeSet<u32>),
    Doubles(Vec<f64>),
    Double(f64),
    Text(String),
}

impl ColumnValue {
    /// Scalars are never empty; collections are empty when they hold no element.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Strings(values) => values.is_empty(),
            Self::Integers(values) => values.is_empty(),
            Self::Doubles(values) => values.is_empty(),
            Self::Double(_) | Self::Text(_) => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Strings(_) => "string-set",
            Self::Integers(_) => "integer-set",
            Self::Doubles(_) => "double-list",
            Self::Double(_) => "double",
            Self::Text(_) => "text",
        }
    }
}

/// The encoder's output for one variant: the row key plus every index column.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRow {
    pub row_key: Vec<u8>,
    pub columns: BTreeMap<ColumnId, ColumnValue>,
}

impl IndexRow {
    pub fn get(&self, column: ColumnId) -> Option<&ColumnValue> {
        self.columns.get(&column)
    }

    pub fn strings(&self, column: ColumnId) -> Option<&BTreeSet<String>> {
        match self.columns.get(&column) {
            Some(ColumnValue::Strings(values)) => Some(values),
            _ => None,
        }
    }

    pub fn integers(&self, column: ColumnId) -> Option<&BTreeSet<u32>> {
        match self.columns.get(&column) {
            Some(ColumnValue::Integers(values)) => Some(values),
            _ => None,
        }
    }

    pub fn doubles(&self, column: ColumnId) -> Option<&[f64]> {
        match self.columns.get(&column) {
            Some(ColumnValue::Doubles(values)) => Some(values),
            _ => None,
        }
    }
}

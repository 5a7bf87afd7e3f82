// ========================================================================================
//
//                          The annotation index encoder
//
// ========================================================================================
//
// Flattens one nested variant annotation into the row key and the typed, deduplicated
// secondary-index columns of the index store. Encoding is a pure function of the
// annotation: the encoder holds nothing but the immutable column registry and its
// options, so any number of threads may share one instance.

use crate::registry::{ColumnId, ColumnRegistry};
use crate::rowkey::RowKeyFormat;
use crate::shared::config::{EncoderConfig, VardexConfig};
use crate::shared::error::{ConfigurationError, EncodeError, EncodingError};
use crate::shared::progress::{EncodeProgressObserver, EncodeProgressStage};
use crate::types::{ColumnValue, IndexRow, VariantAnnotation, each};
use ahash::AHashSet;
use itertools::{Itertools, MinMaxResult};
use log::{debug, warn};
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Number of annotations encoded in parallel between two progress reports.
const ENCODE_CHUNK_SIZE: usize = 4096;

const SO_PREFIX: &str = "SO:";

/// Converts a sequence ontology accession such as `SO:0001583` into its numeric suffix.
pub fn parse_so_accession(accession: &str) -> Result<u32, EncodingError> {
    accession
        .strip_prefix(SO_PREFIX)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u32>().ok())
        .ok_or_else(|| EncodingError::InvalidSoAccession(accession.to_string()))
}

/// A deduplicated collection of finite scores, in first-seen order.
#[derive(Debug, Default)]
struct ScoreSet {
    seen: AHashSet<u64>,
    values: Vec<f64>,
}

impl ScoreSet {
    fn insert(&mut self, value: f64) {
        if !value.is_finite() {
            warn!("Dropping non-finite substitution score {value}");
            return;
        }
        // -0.0 and 0.0 are the same score.
        let value = if value == 0.0 { 0.0 } else { value };
        if self.seen.insert(value.to_bits()) {
            self.values.push(value);
        }
    }
}

/// Orders substitution scores as `[min, max, rest...]`.
///
/// Downstream readers take the best and worst score from the first two slots without
/// sorting. When no non-negative minimum exists (no scores, or a negative minimum) the
/// result is empty. A single distinct score fills both slots. The order of the remaining
/// elements is unspecified.
pub fn order_substitution_scores(scores: impl IntoIterator<Item = f64>) -> Vec<f64> {
    let mut set = ScoreSet::default();
    for score in scores {
        set.insert(score);
    }
    let values = set.values;

    let (min, max) = match values.iter().copied().minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => return Vec::new(),
        MinMaxResult::OneElement(only) => (only, only),
        MinMaxResult::MinMax(min, max) => (min, max),
    };
    if min < 0.0 {
        return Vec::new();
    }

    let mut ordered = Vec::with_capacity(values.len().max(2));
    ordered.push(min);
    ordered.push(max);
    ordered.extend(values.into_iter().filter(|&value| value != min && value != max));
    ordered
}

fn insert_present(set: &mut BTreeSet<String>, value: Option<&String>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        set.insert(value.clone());
    }
}

/// Per-variant accumulators for every set-valued column.
#[derive(Debug, Default)]
struct Accumulator {
    genes: BTreeSet<String>,
    transcripts: BTreeSet<String>,
    biotypes: BTreeSet<String>,
    flags: BTreeSet<String>,
    so: BTreeSet<u32>,
    sift: ScoreSet,
    sift_desc: BTreeSet<String>,
    polyphen: ScoreSet,
    polyphen_desc: BTreeSet<String>,
    keywords: BTreeSet<String>,
    trait_names: BTreeSet<String>,
    trait_ids: BTreeSet<String>,
    hpo: BTreeSet<String>,
    drugs: BTreeSet<String>,
    xrefs: BTreeSet<String>,
}

impl Accumulator {
    fn collect(annotation: &VariantAnnotation) -> Result<Self, EncodingError> {
        let mut acc = Self::default();

        for consequence in each(&annotation.consequence_types) {
            insert_present(&mut acc.genes, consequence.gene_name.as_ref());
            insert_present(&mut acc.genes, consequence.ensembl_gene_id.as_ref());
            insert_present(&mut acc.transcripts, consequence.ensembl_transcript_id.as_ref());
            insert_present(&mut acc.biotypes, consequence.biotype.as_ref());
            for flag in each(&consequence.transcript_annotation_flags) {
                insert_present(&mut acc.flags, Some(flag));
            }
            for term in each(&consequence.sequence_ontology_terms) {
                acc.so.insert(parse_so_accession(&term.accession)?);
            }

            let Some(protein) = &consequence.protein_variant_annotation else {
                continue;
            };
            for score in each(&protein.substitution_scores) {
                let Some(source) = score.source.as_deref() else {
                    continue;
                };
                let (values, descriptions) = if source.eq_ignore_ascii_case("sift") {
                    (&mut acc.sift, &mut acc.sift_desc)
                } else if source.eq_ignore_ascii_case("polyphen") {
                    (&mut acc.polyphen, &mut acc.polyphen_desc)
                } else {
                    continue;
                };
                if let Some(value) = score.score {
                    values.insert(value);
                }
                insert_present(descriptions, score.description.as_ref());
            }
            for keyword in each(&protein.keywords) {
                insert_present(&mut acc.keywords, Some(keyword));
            }
        }

        for association in each(&annotation.gene_trait_association) {
            insert_present(&mut acc.trait_names, association.name.as_ref());
            insert_present(&mut acc.trait_ids, association.id.as_ref());
            insert_present(&mut acc.hpo, association.hpo.as_ref());
        }
        for interaction in each(&annotation.gene_drug_interaction) {
            insert_present(&mut acc.drugs, interaction.drug_name.as_ref());
        }

        acc.xrefs.insert(annotation.locus().to_string());
        insert_present(&mut acc.xrefs, annotation.id.as_ref());
        for xref in each(&annotation.xrefs) {
            insert_present(&mut acc.xrefs, xref.id.as_ref());
        }
        acc.xrefs.extend(acc.genes.iter().cloned());
        acc.xrefs.extend(acc.transcripts.iter().cloned());

        Ok(acc)
    }

    fn into_columns(self) -> BTreeMap<ColumnId, ColumnValue> {
        BTreeMap::from([
            (ColumnId::Genes, ColumnValue::Strings(self.genes)),
            (ColumnId::Transcripts, ColumnValue::Strings(self.transcripts)),
            (ColumnId::Biotype, ColumnValue::Strings(self.biotypes)),
            (ColumnId::So, ColumnValue::Integers(self.so)),
            (
                ColumnId::Polyphen,
                ColumnValue::Doubles(order_substitution_scores(self.polyphen.values)),
            ),
            (ColumnId::PolyphenDesc, ColumnValue::Strings(self.polyphen_desc)),
            (
                ColumnId::Sift,
                ColumnValue::Doubles(order_substitution_scores(self.sift.values)),
            ),
            (ColumnId::SiftDesc, ColumnValue::Strings(self.sift_desc)),
            (ColumnId::TranscriptFlags, ColumnValue::Strings(self.flags)),
            (ColumnId::GeneTraitName, ColumnValue::Strings(self.trait_names)),
            (ColumnId::GeneTraitId, ColumnValue::Strings(self.trait_ids)),
            (ColumnId::Hpo, ColumnValue::Strings(self.hpo)),
            (ColumnId::Drug, ColumnValue::Strings(self.drugs)),
            (ColumnId::ProteinKeywords, ColumnValue::Strings(self.keywords)),
            (ColumnId::Xrefs, ColumnValue::Strings(self.xrefs)),
        ])
    }
}

/// Turns variant annotations into index rows.
#[derive(Debug, Clone)]
pub struct AnnotationEncoder {
    registry: ColumnRegistry,
    row_key_format: RowKeyFormat,
    full_annotation: bool,
}

impl AnnotationEncoder {
    pub fn new(registry: ColumnRegistry, config: &EncoderConfig) -> Self {
        Self {
            registry,
            row_key_format: config.row_key_format,
            full_annotation: config.full_annotation,
        }
    }

    pub fn from_config(config: &VardexConfig) -> Result<Self, ConfigurationError> {
        let registry = ColumnRegistry::from_config(&config.registry)?;
        Ok(Self::new(registry, &config.encoder))
    }

    pub fn registry(&self) -> &ColumnRegistry {
        &self.registry
    }

    pub fn row_key_format(&self) -> RowKeyFormat {
        self.row_key_format
    }

    /// Encodes one annotation into its row key and index columns.
    pub fn encode(&self, annotation: &VariantAnnotation) -> Result<IndexRow, EncodeError> {
        let locus = annotation.locus();
        let row_key = self.row_key_format.encode(&locus)?;
        let mut columns = Accumulator::collect(annotation)?.into_columns();

        for score in each(&annotation.conservation) {
            let spec = self
                .registry
                .conservation(score.source.as_deref().unwrap_or_default())?;
            if let Some(value) = score.score {
                columns.insert(spec.id, ColumnValue::Double(value));
            }
        }

        for frequency in each(&annotation.population_frequencies) {
            let spec = self
                .registry
                .population_frequency(&frequency.study, &frequency.population)?;
            columns.insert(
                spec.id,
                ColumnValue::Doubles(vec![frequency.ref_allele_freq, frequency.alt_allele_freq]),
            );
        }

        for score in each(&annotation.functional_score) {
            let spec = self
                .registry
                .functional_score(score.source.as_deref().unwrap_or_default())?;
            if let Some(value) = score.score {
                columns.insert(spec.id, ColumnValue::Double(value));
            }
        }

        if self.full_annotation {
            columns.insert(
                ColumnId::FullAnnotation,
                ColumnValue::Text(serde_json::to_string(annotation)?),
            );
        }

        debug!("Encoded {locus} into {} index columns", columns.len());
        Ok(IndexRow { row_key, columns })
    }

    /// Encodes a batch in parallel, preserving input order. The first failure aborts the
    /// batch and is returned.
    pub fn encode_all<P: EncodeProgressObserver>(
        &self,
        annotations: &[VariantAnnotation],
        progress: &mut P,
    ) -> Result<Vec<IndexRow>, EncodeError> {
        let stage = EncodeProgressStage::Encoding;
        progress.on_stage_start(stage, annotations.len());

        let mut rows = Vec::with_capacity(annotations.len());
        for chunk in annotations.chunks(ENCODE_CHUNK_SIZE) {
            let encoded = chunk
                .par_iter()
                .map(|annotation| self.encode(annotation))
                .collect::<Result<Vec<_>, _>>()?;
            rows.extend(encoded);
            progress.on_stage_advance(stage, rows.len());
        }

        progress.on_stage_finish(stage);
        Ok(rows)
    }
}

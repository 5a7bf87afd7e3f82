// ========================================================================================
//
//                     The variant store and metadata seams
//
// ========================================================================================
//
// The aggregator reads samples through two collaborators it does not own: a store that
// returns one window of a variant's samples per call, and a resolver that maps sample
// names to the files that produced them. Both are blocking and both report failures as
// opaque boxed errors, which the aggregator hands back to its caller untouched.

use crate::shared::error::BoxedError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Variant fields a store may leave out of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExcludedField {
    Annotation,
    StudyStats,
}

/// One page of a variant's samples in one study.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleWindowRequest {
    pub variant: String,
    pub study: String,
    /// Restricts the cohort to these samples. `None` means every sample.
    pub include_samples: Option<Vec<String>>,
    /// Index of the first sample in the window.
    pub skip: usize,
    /// Maximum number of samples in the window.
    pub limit: usize,
    pub exclude: BTreeSet<ExcludedField>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VariantStats {
    pub allele_count: u32,
    pub alt_allele_count: u32,
    pub alt_allele_freq: f64,
    pub maf: f64,
    pub genotype_count: BTreeMap<String, u32>,
}

/// The record a file keeps for one variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub file_id: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// The part of a variant record that belongs to a single study.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudyEntry {
    pub study_id: String,
    /// Sample names in a stable order; `sample_data[i]` belongs to `samples[i]`.
    pub samples: Vec<String>,
    pub sample_data: Vec<BTreeMap<String, String>>,
    pub stats: Option<BTreeMap<String, VariantStats>>,
    /// File entries keyed by file name.
    pub files: BTreeMap<String, FileEntry>,
}

impl StudyEntry {
    /// Pairs every sample name with its field map. Samples without a field map get an
    /// empty one.
    pub fn sample_fields(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
        static NO_FIELDS: BTreeMap<String, String> = BTreeMap::new();
        self.samples.iter().enumerate().map(|(index, name)| {
            (
                name.as_str(),
                self.sample_data.get(index).unwrap_or(&NO_FIELDS),
            )
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariantRecord {
    pub id: String,
    pub studies: Vec<StudyEntry>,
}

impl VariantRecord {
    /// The entry for `study`, or the first entry when none carries that id.
    pub fn study(&self, study: &str) -> Option<&StudyEntry> {
        self.studies
            .iter()
            .find(|entry| entry.study_id == study)
            .or_else(|| self.studies.first())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreResponse {
    /// Empty when the variant is not stored for the study.
    pub variants: Vec<VariantRecord>,
    /// Time the store reports spending on this call.
    pub time_ms: u64,
}

/// The variant storage backend.
pub trait VariantStore {
    fn fetch(&self, request: &SampleWindowRequest) -> Result<StoreResponse, BoxedError>;
}

/// Study-level metadata the aggregator needs before it reads any sample.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyMetadata {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

/// Study attribute saying the study was loaded without genotypes.
pub const EXCLUDE_GENOTYPES_ATTRIBUTE: &str = "exclude.genotypes";
/// Study attribute listing the genotypes that were loaded, comma separated.
pub const LOADED_GENOTYPES_ATTRIBUTE: &str = "loaded.genotypes";

/// Resolves names to internal ids and sample ids to their source files.
pub trait MetadataResolver {
    fn study(&self, name: &str) -> Result<Option<StudyMetadata>, BoxedError>;
    fn sample_id(&self, study_id: u32, sample: &str) -> Result<Option<u32>, BoxedError>;
    /// Files containing the sample, in the resolver's preferred order.
    fn file_ids(&self, study_id: u32, sample_id: u32) -> Result<Vec<u32>, BoxedError>;
    fn file_name(&self, study_id: u32, file_id: u32) -> Result<Option<String>, BoxedError>;

    /// Number of samples in the study, when the resolver knows it.
    ///
    /// The aggregator stops paging once its cursor reaches this size, so a cohort of `N`
    /// samples read in windows of `B` costs at most `ceil(N / B)` store calls. Without it
    /// the aggregator only stops on a short window, which takes one extra call whenever
    /// `B` divides `N`.
    fn cohort_size(&self, study_id: u32) -> Result<Option<usize>, BoxedError> {
        let _ = study_id;
        Ok(None)
    }
}

impl<T: VariantStore + ?Sized> VariantStore for &T {
    fn fetch(&self, request: &SampleWindowRequest) -> Result<StoreResponse, BoxedError> {
        (**self).fetch(request)
    }
}

impl<T: MetadataResolver + ?Sized> MetadataResolver for &T {
    fn study(&self, name: &str) -> Result<Option<StudyMetadata>, BoxedError> {
        (**self).study(name)
    }
    fn sample_id(&self, study_id: u32, sample: &str) -> Result<Option<u32>, BoxedError> {
        (**self).sample_id(study_id, sample)
    }
    fn file_ids(&self, study_id: u32, sample_id: u32) -> Result<Vec<u32>, BoxedError> {
        (**self).file_ids(study_id, sample_id)
    }
    fn file_name(&self, study_id: u32, file_id: u32) -> Result<Option<String>, BoxedError> {
        (**self).file_name(study_id, file_id)
    }
    fn cohort_size(&self, study_id: u32) -> Result<Option<usize>, BoxedError> {
        (**self).cohort_size(study_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_fields_pair_names_with_data() {
        let entry = StudyEntry {
            study_id: "S1".to_string(),
            samples: vec!["a".to_string(), "b".to_string()],
            sample_data: vec![BTreeMap::from([("GT".to_string(), "0/1".to_string())])],
            ..StudyEntry::default()
        };
        let pairs: Vec<_> = entry.sample_fields().collect();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].1.get("GT").map(String::as_str), Some("0/1"));
        assert!(pairs[1].1.is_empty());
    }

    #[test]
    fn study_lookup_falls_back_to_the_first_entry() {
        let record = VariantRecord {
            id: "1:100:A:T".to_string(),
            studies: vec![
                StudyEntry {
                    study_id: "S1".to_string(),
                    ..StudyEntry::default()
                },
                StudyEntry {
                    study_id: "S2".to_string(),
                    ..StudyEntry::default()
                },
            ],
        };
        assert_eq!(record.study("S2").map(|e| e.study_id.as_str()), Some("S2"));
        assert_eq!(record.study("S9").map(|e| e.study_id.as_str()), Some("S1"));
        assert!(VariantRecord::default().study("S1").is_none());
    }
}

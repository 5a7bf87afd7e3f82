//! An in-memory cohort that plays both the variant store and the metadata resolver.
//!
//! Loaded from a JSON fixture such as:
//!
//! ```json
//! {
//!   "studies": [{
//!     "id": 1, "name": "S1",
//!     "samples": ["NA12878", "NA12891"],
//!     "files": [{ "id": 10, "name": "trio.vcf.gz", "samples": ["NA12878", "NA12891"] }]
//!   }],
//!   "variants": [{
//!     "id": "1:100:A:T", "study": "S1",
//!     "samples": { "NA12878": { "GT": "0|1" }, "NA12891": { "GT": "1/1" } }
//!   }]
//! }
//! ```

use super::adaptor::{
    ExcludedField, FileEntry, MetadataResolver, SampleWindowRequest, StoreResponse,
    StudyEntry, StudyMetadata, VariantRecord, VariantStats, VariantStore,
};
use crate::shared::error::BoxedError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortFixture {
    #[serde(default)]
    pub studies: Vec<StudyFixture>,
    #[serde(default)]
    pub variants: Vec<VariantFixture>,
    /// Time every store call reports.
    #[serde(default)]
    pub store_time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyFixture {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// The cohort, in store order. A sample's id is its position in this list.
    #[serde(default)]
    pub samples: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileFixture>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFixture {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub samples: Vec<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantFixture {
    pub id: String,
    pub study: String,
    /// Per-sample fields. Samples absent here are returned with no fields.
    #[serde(default)]
    pub samples: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    pub stats: Option<BTreeMap<String, VariantStats>>,
    /// Files of the study that do not carry this variant.
    #[serde(default)]
    pub missing_files: Vec<String>,
}

/// Serves a fixture cohort and counts the store calls made against it.
#[derive(Debug, Default)]
pub struct InMemoryCohort {
    fixture: CohortFixture,
    store_calls: AtomicUsize,
    requests: Mutex<Vec<SampleWindowRequest>>,
}

impl InMemoryCohort {
    pub fn new(fixture: CohortFixture) -> Self {
        Self {
            fixture,
            store_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn fixture(&self) -> &CohortFixture {
        &self.fixture
    }

    /// Number of `fetch` calls served so far.
    pub fn store_calls(&self) -> usize {
        self.store_calls.load(Ordering::Relaxed)
    }

    /// Every request served so far, in arrival order.
    pub fn requests(&self) -> Vec<SampleWindowRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn study_by_name(&self, name: &str) -> Option<&StudyFixture> {
        self.fixture.studies.iter().find(|study| study.name == name)
    }

    fn study_by_id(&self, id: u32) -> Option<&StudyFixture> {
        self.fixture.studies.iter().find(|study| study.id == id)
    }

    fn study_entry(
        &self,
        study: &StudyFixture,
        variant: &VariantFixture,
        request: &SampleWindowRequest,
    ) -> StudyEntry {
        let included: Option<HashSet<&str>> = request
            .include_samples
            .as_ref()
            .map(|samples| samples.iter().map(String::as_str).collect());
        let window: Vec<&String> = study
            .samples
            .iter()
            .filter(|sample| included.as_ref().is_none_or(|set| set.contains(sample.as_str())))
            .skip(request.skip)
            .take(request.limit)
            .collect();

        StudyEntry {
            study_id: study.name.clone(),
            samples: window.iter().map(|sample| sample.to_string()).collect(),
            sample_data: window
                .iter()
                .map(|sample| variant.samples.get(*sample).cloned().unwrap_or_default())
                .collect(),
            stats: if request.exclude.contains(&ExcludedField::StudyStats) {
                None
            } else {
                variant.stats.clone()
            },
            files: study
                .files
                .iter()
                .filter(|file| !variant.missing_files.contains(&file.name))
                .map(|file| {
                    (
                        file.name.clone(),
                        FileEntry {
                            file_id: file.name.clone(),
                            data: file.data.clone(),
                        },
                    )
                })
                .collect(),
        }
    }
}

impl VariantStore for InMemoryCohort {
    fn fetch(&self, request: &SampleWindowRequest) -> Result<StoreResponse, BoxedError> {
        self.store_calls.fetch_add(1, Ordering::Relaxed);
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());

        let record = self.study_by_name(&request.study).and_then(|study| {
            self.fixture
                .variants
                .iter()
                .find(|variant| variant.id == request.variant && variant.study == study.name)
                .map(|variant| VariantRecord {
                    id: variant.id.clone(),
                    studies: vec![self.study_entry(study, variant, request)],
                })
        });
        Ok(StoreResponse {
            variants: record.into_iter().collect(),
            time_ms: self.fixture.store_time_ms,
        })
    }
}

impl MetadataResolver for InMemoryCohort {
    fn study(&self, name: &str) -> Result<Option<StudyMetadata>, BoxedError> {
        Ok(self.study_by_name(name).map(|study| StudyMetadata {
            id: study.id,
            name: study.name.clone(),
            attributes: study.attributes.clone(),
        }))
    }

    fn sample_id(&self, study_id: u32, sample: &str) -> Result<Option<u32>, BoxedError> {
        let Some(study) = self.study_by_id(study_id) else {
            return Ok(None);
        };
        match study.samples.iter().position(|name| name == sample) {
            Some(index) => Ok(Some(u32::try_from(index)?)),
            None => Ok(None),
        }
    }

    fn file_ids(&self, study_id: u32, sample_id: u32) -> Result<Vec<u32>, BoxedError> {
        let Some(study) = self.study_by_id(study_id) else {
            return Ok(Vec::new());
        };
        let Some(sample) = study.samples.get(sample_id as usize) else {
            return Ok(Vec::new());
        };
        Ok(study
            .files
            .iter()
            .filter(|file| file.samples.contains(sample))
            .map(|file| file.id)
            .collect())
    }

    fn file_name(&self, study_id: u32, file_id: u32) -> Result<Option<String>, BoxedError> {
        Ok(self
            .study_by_id(study_id)
            .and_then(|study| study.files.iter().find(|file| file.id == file_id))
            .map(|file| file.name.clone()))
    }

    fn cohort_size(&self, study_id: u32) -> Result<Option<usize>, BoxedError> {
        Ok(self.study_by_id(study_id).map(|study| study.samples.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const FIXTURE: &str = r#"{
        "studies": [{
            "id": 1, "name": "S1",
            "samples": ["a", "b", "c"],
            "files": [
                { "id": 10, "name": "ab.vcf.gz", "samples": ["a", "b"] },
                { "id": 11, "name": "c.vcf.gz", "samples": ["c"] }
            ]
        }],
        "variants": [{
            "id": "1:100:A:T", "study": "S1",
            "samples": { "a": { "GT": "0/1" }, "c": { "GT": "1/1" } },
            "stats": { "ALL": { "altAlleleFreq": 0.5 } },
            "missingFiles": ["c.vcf.gz"]
        }],
        "storeTimeMs": 4
    }"#;

    fn request(skip: usize, limit: usize) -> SampleWindowRequest {
        SampleWindowRequest {
            variant: "1:100:A:T".to_string(),
            study: "S1".to_string(),
            include_samples: None,
            skip,
            limit,
            exclude: BTreeSet::from([ExcludedField::Annotation]),
        }
    }

    #[test]
    fn fixture_windows_follow_cohort_order() {
        let cohort = InMemoryCohort::from_json(FIXTURE).unwrap();
        let response = cohort.fetch(&request(1, 5)).unwrap();
        let entry = &response.variants[0].studies[0];
        assert_eq!(entry.samples, ["b", "c"]);
        assert!(entry.sample_data[0].is_empty());
        assert_eq!(entry.sample_data[1]["GT"], "1/1");
        assert_eq!(entry.files.keys().collect::<Vec<_>>(), ["ab.vcf.gz"]);
        assert_eq!(entry.stats.as_ref().unwrap()["ALL"].alt_allele_freq, 0.5);
        assert_eq!(response.time_ms, 4);
        assert_eq!(cohort.store_calls(), 1);
    }

    #[test]
    fn include_list_and_stats_exclusion_are_honoured() {
        let cohort = InMemoryCohort::from_json(FIXTURE).unwrap();
        let mut req = request(0, 10);
        req.include_samples = Some(vec!["c".to_string(), "a".to_string()]);
        req.exclude.insert(ExcludedField::StudyStats);
        let response = cohort.fetch(&req).unwrap();
        let entry = &response.variants[0].studies[0];
        assert_eq!(entry.samples, ["a", "c"]);
        assert!(entry.stats.is_none());
        assert_eq!(cohort.requests(), vec![req]);
    }

    #[test]
    fn unknown_variant_yields_no_records() {
        let cohort = InMemoryCohort::from_json(FIXTURE).unwrap();
        let mut req = request(0, 10);
        req.variant = "2:5:G:C".to_string();
        assert!(cohort.fetch(&req).unwrap().variants.is_empty());
    }

    #[test]
    fn resolver_maps_samples_to_their_files() {
        let cohort = InMemoryCohort::from_json(FIXTURE).unwrap();
        let study = cohort.study("S1").unwrap().unwrap();
        assert_eq!(study.id, 1);
        assert!(cohort.study("S2").unwrap().is_none());

        let c = cohort.sample_id(1, "c").unwrap().unwrap();
        assert_eq!(c, 2);
        assert_eq!(cohort.file_ids(1, c).unwrap(), [11]);
        assert_eq!(cohort.file_name(1, 11).unwrap().as_deref(), Some("c.vcf.gz"));
        assert_eq!(cohort.sample_id(1, "z").unwrap(), None);
        assert_eq!(cohort.cohort_size(1).unwrap(), Some(3));
    }
}

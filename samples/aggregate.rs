// ========================================================================================
//
//                       The sample-batched genotype aggregator
//
// ========================================================================================
//
// Answers "which samples carry this variant, and with which genotype" for cohorts far
// too large to read in one call. Samples are pulled from the store in fixed-size
// windows; each sample is normalized, filtered against the accepted genotypes and
// counted into its bucket. Each bucket keeps at most `limit` samples after skipping the
// first `skip` matches, so a caller can page through any one genotype. Reading stops as
// soon as the cohort is exhausted or every bucket is full.

use super::adaptor::{
    EXCLUDE_GENOTYPES_ATTRIBUTE, ExcludedField, FileEntry, LOADED_GENOTYPES_ATTRIBUTE,
    MetadataResolver, SampleWindowRequest, StudyEntry, StudyMetadata, VariantStats,
    VariantStore,
};
use super::genotype::{GenotypeNormalizer, MERGED_BUCKET, NA_GT, NO_CALL, NO_GENOTYPES_LOADED};
use crate::shared::config::{DEFAULT_SAMPLE_BATCH_SIZE, DEFAULT_SAMPLE_LIMIT, SamplesConfig};
use crate::shared::error::{ConfigurationError, SampleDataError};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const GT_FIELD: &str = "GT";
const DEFAULT_GENOTYPES: [&str; 2] = ["0/1", "1/1"];

/// Parameters of one sample data query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleDataQuery {
    /// Genotypes to report. Empty means heterozygous and homozygous alternate.
    pub genotypes: Vec<String>,
    /// Restricts the cohort to these samples. `None` or empty means every sample.
    pub include_samples: Option<Vec<String>>,
    /// Matches to pass over in every bucket before samples are kept.
    pub skip: usize,
    /// Samples kept per bucket.
    pub limit: usize,
    /// Samples requested from the store per call. Zero is read as one.
    pub batch_size: usize,
    /// Collapse every accepted genotype into the single bucket `all`.
    pub merge: bool,
}

impl Default for SampleDataQuery {
    fn default() -> Self {
        Self {
            genotypes: Vec::new(),
            include_samples: None,
            skip: 0,
            limit: DEFAULT_SAMPLE_LIMIT,
            batch_size: DEFAULT_SAMPLE_BATCH_SIZE,
            merge: false,
        }
    }
}

impl SampleDataQuery {
    pub fn from_config(config: &SamplesConfig) -> Self {
        Self {
            genotypes: config.genotypes.clone(),
            limit: config.limit,
            batch_size: config.batch_size,
            ..Self::default()
        }
    }
}

/// One accepted sample with its raw fields and the file it was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleData {
    pub name: String,
    pub data: BTreeMap<String, String>,
    pub file_id: String,
}

/// Every match counts; only the matches past `skip` that fit under `limit` are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenotypeBucket {
    pub count: usize,
    pub samples: Vec<SampleData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantSampleData {
    pub id: String,
    pub study_id: String,
    pub buckets: BTreeMap<String, GenotypeBucket>,
    /// File entries of kept samples, keyed by file id.
    pub files: BTreeMap<String, FileEntry>,
    pub stats: BTreeMap<String, VariantStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleDataResult {
    pub data: VariantSampleData,
    /// Sum of the time the store reported across all calls.
    pub db_time_ms: u64,
    /// Store calls issued.
    pub queries: usize,
    /// Samples scanned, accepted or not.
    pub read_samples: usize,
}

/// Per-call aggregation state.
struct Aggregation<'q> {
    query: &'q SampleDataQuery,
    accepted: BTreeSet<String>,
    buckets: BTreeMap<String, GenotypeBucket>,
    files: BTreeMap<String, FileEntry>,
    stats: Option<BTreeMap<String, VariantStats>>,
}

impl Aggregation<'_> {
    fn bucket_key<'a>(&'a self, genotype: &'a str) -> &'a str {
        if self.query.merge {
            MERGED_BUCKET
        } else {
            genotype
        }
    }

    fn all_buckets_full(&self) -> bool {
        self.buckets
            .values()
            .all(|bucket| bucket.samples.len() >= self.query.limit)
    }
}

/// The service owning the collaborators and the genotype cache shared by its calls.
pub struct SampleDataManager<S, M> {
    store: S,
    resolver: M,
    normalizer: GenotypeNormalizer,
}

impl<S: VariantStore, M: MetadataResolver> SampleDataManager<S, M> {
    pub fn new(store: S, resolver: M) -> Self {
        Self {
            store,
            resolver,
            normalizer: GenotypeNormalizer::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resolver(&self) -> &M {
        &self.resolver
    }

    pub fn normalizer(&self) -> &GenotypeNormalizer {
        &self.normalizer
    }

    /// Collects the samples of `study` carrying `variant`, grouped by genotype.
    pub fn get_sample_data(
        &self,
        variant: &str,
        study: &str,
        query: &SampleDataQuery,
    ) -> Result<SampleDataResult, SampleDataError> {
        let metadata = self
            .resolver
            .study(study)
            .map_err(SampleDataError::Metadata)?
            .ok_or_else(|| ConfigurationError::UnknownStudy(study.to_string()))?;
        let accepted = self.accepted_genotypes(&metadata, &query.genotypes)?;

        let bucket_keys: Vec<String> = if query.merge {
            vec![MERGED_BUCKET.to_string()]
        } else {
            accepted.iter().cloned().collect()
        };
        let mut aggregation = Aggregation {
            query,
            buckets: bucket_keys
                .into_iter()
                .map(|key| (key, GenotypeBucket::default()))
                .collect(),
            accepted,
            files: BTreeMap::new(),
            stats: None,
        };

        let include_samples = query
            .include_samples
            .as_ref()
            .filter(|samples| !samples.is_empty());
        let cohort_size = match include_samples {
            Some(samples) => Some(samples.len()),
            None => self
                .resolver
                .cohort_size(metadata.id)
                .map_err(SampleDataError::Metadata)?,
        };
        let batch_size = query.batch_size.max(1);

        let mut cursor = 0usize;
        let mut db_time_ms = 0u64;
        let mut queries = 0usize;
        let mut read_samples = 0usize;
        loop {
            let mut exclude = BTreeSet::from([ExcludedField::Annotation]);
            if aggregation.stats.is_some() {
                exclude.insert(ExcludedField::StudyStats);
            }
            let request = SampleWindowRequest {
                variant: variant.to_string(),
                study: study.to_string(),
                include_samples: include_samples.cloned(),
                skip: cursor,
                limit: batch_size,
                exclude,
            };
            cursor += batch_size;

            let response = self
                .store
                .fetch(&request)
                .map_err(SampleDataError::Store)?;
            queries += 1;
            db_time_ms += response.time_ms;

            let entry = match response.variants.first() {
                Some(record) => record.study(study),
                None if queries == 1 => {
                    return Err(SampleDataError::NotFound {
                        variant: variant.to_string(),
                        study: study.to_string(),
                    });
                }
                None => None,
            };

            let window_len = match entry {
                Some(entry) => {
                    self.accumulate(&metadata, entry, &mut aggregation)?;
                    entry.samples.len()
                }
                None => 0,
            };
            read_samples += window_len;
            debug!(
                "Sample window at {} returned {window_len} samples for {variant} in {study}",
                request.skip
            );

            if window_len < batch_size || aggregation.all_buckets_full() {
                break;
            }
            if cohort_size.is_some_and(|size| cursor >= size) {
                break;
            }
        }

        debug!(
            "Sample data for {variant} in {study}: {queries} queries, {read_samples} samples read, {db_time_ms} ms in store"
        );
        Ok(SampleDataResult {
            data: VariantSampleData {
                id: variant.to_string(),
                study_id: study.to_string(),
                buckets: aggregation.buckets,
                files: aggregation.files,
                stats: aggregation.stats.unwrap_or_default(),
            },
            db_time_ms,
            queries,
            read_samples,
        })
    }

    /// Decides which normalized genotypes are reported, from the query and the way the
    /// study was loaded.
    fn accepted_genotypes(
        &self,
        metadata: &StudyMetadata,
        requested: &[String],
    ) -> Result<BTreeSet<String>, ConfigurationError> {
        let mut accepted: BTreeSet<String> = if requested.is_empty() {
            DEFAULT_GENOTYPES.iter().map(|gt| gt.to_string()).collect()
        } else {
            requested
                .iter()
                .map(|gt| self.normalizer.normalize(gt))
                .collect()
        };

        if genotypes_excluded(metadata)? {
            accepted = BTreeSet::from([NA_GT.to_string()]);
        }

        let loaded: Vec<&str> = metadata
            .attributes
            .get(LOADED_GENOTYPES_ATTRIBUTE)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|gt| !gt.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        match loaded.as_slice() {
            [only] if *only == NA_GT || *only == NO_GENOTYPES_LOADED => {
                accepted = BTreeSet::from([NA_GT.to_string()]);
            }
            [_] => {}
            several if several.contains(&NA_GT) => {
                accepted.insert(NA_GT.to_string());
            }
            _ => {}
        }
        Ok(accepted)
    }

    /// Folds one window of samples into the buckets.
    fn accumulate(
        &self,
        metadata: &StudyMetadata,
        entry: &StudyEntry,
        aggregation: &mut Aggregation<'_>,
    ) -> Result<(), SampleDataError> {
        if aggregation.stats.is_none() {
            aggregation.stats = entry.stats.clone();
        }

        for (sample, fields) in entry.sample_fields() {
            let raw = fields.get(GT_FIELD).map(String::as_str).unwrap_or(NA_GT);
            let mut genotype = self.normalizer.normalize(raw);
            if genotype == NO_CALL {
                genotype = NA_GT.to_string();
            }
            if !aggregation.accepted.contains(&genotype) {
                continue;
            }

            let key = aggregation.bucket_key(&genotype).to_string();
            let limit = aggregation.query.limit;
            let skip = aggregation.query.skip;
            let Some(bucket) = aggregation.buckets.get_mut(&key) else {
                continue;
            };
            bucket.count += 1;
            if bucket.count <= skip || bucket.samples.len() >= limit {
                continue;
            }

            let Some(file) = self.first_file_entry(metadata.id, sample, entry)? else {
                if genotype == NA_GT {
                    continue;
                }
                return Err(SampleDataError::DataIntegrity {
                    sample: sample.to_string(),
                    candidates: self.candidate_file_names(metadata.id, sample)?,
                });
            };
            bucket.samples.push(SampleData {
                name: sample.to_string(),
                data: fields.clone(),
                file_id: file.file_id.clone(),
            });
            aggregation.files.insert(file.file_id.clone(), file.clone());
        }
        Ok(())
    }

    fn sample_file_ids(&self, study_id: u32, sample: &str) -> Result<Vec<u32>, SampleDataError> {
        let Some(sample_id) = self
            .resolver
            .sample_id(study_id, sample)
            .map_err(SampleDataError::Metadata)?
        else {
            return Ok(Vec::new());
        };
        self.resolver
            .file_ids(study_id, sample_id)
            .map_err(SampleDataError::Metadata)
    }

    /// The entry of the sample's first file, when the response carries it.
    fn first_file_entry<'e>(
        &self,
        study_id: u32,
        sample: &str,
        entry: &'e StudyEntry,
    ) -> Result<Option<&'e FileEntry>, SampleDataError> {
        let Some(&file_id) = self.sample_file_ids(study_id, sample)?.first() else {
            return Ok(None);
        };
        let file_name = self
            .resolver
            .file_name(study_id, file_id)
            .map_err(SampleDataError::Metadata)?;
        Ok(file_name.and_then(|name| entry.files.get(&name)))
    }

    fn candidate_file_names(
        &self,
        study_id: u32,
        sample: &str,
    ) -> Result<Vec<String>, SampleDataError> {
        let mut names = Vec::new();
        for file_id in self.sample_file_ids(study_id, sample)? {
            if let Some(name) = self
                .resolver
                .file_name(study_id, file_id)
                .map_err(SampleDataError::Metadata)?
            {
                names.push(name);
            }
        }
        Ok(names)
    }
}

fn genotypes_excluded(metadata: &StudyMetadata) -> Result<bool, ConfigurationError> {
    let Some(value) = metadata.attributes.get(EXCLUDE_GENOTYPES_ATTRIBUTE) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(ConfigurationError::InvalidStudyAttribute {
            study: metadata.name.clone(),
            attribute: EXCLUDE_GENOTYPES_ATTRIBUTE.to_string(),
            value: value.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples::adaptor::{StoreResponse, VariantRecord};
    use crate::shared::error::BoxedError;
    use std::cell::RefCell;

    /// A single-study store serving fixed genotypes, recording every request.
    struct ScriptedStore {
        genotypes: Vec<&'static str>,
        stats: Option<BTreeMap<String, VariantStats>>,
        missing_file: bool,
        requests: RefCell<Vec<SampleWindowRequest>>,
    }

    impl ScriptedStore {
        fn new(genotypes: &[&'static str]) -> Self {
            Self {
                genotypes: genotypes.to_vec(),
                stats: None,
                missing_file: false,
                requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl VariantStore for ScriptedStore {
        fn fetch(&self, request: &SampleWindowRequest) -> Result<StoreResponse, BoxedError> {
            self.requests.borrow_mut().push(request.clone());
            let window: Vec<(usize, &str)> = self
                .genotypes
                .iter()
                .copied()
                .enumerate()
                .skip(request.skip)
                .take(request.limit)
                .collect();
            let mut files = BTreeMap::new();
            if !self.missing_file {
                files.insert(
                    "cohort.vcf.gz".to_string(),
                    FileEntry {
                        file_id: "cohort.vcf.gz".to_string(),
                        data: BTreeMap::from([("FILTER".to_string(), "PASS".to_string())]),
                    },
                );
            }
            let stats = if request.exclude.contains(&ExcludedField::StudyStats) {
                None
            } else {
                self.stats.clone()
            };
            Ok(StoreResponse {
                variants: vec![VariantRecord {
                    id: request.variant.clone(),
                    studies: vec![StudyEntry {
                        study_id: request.study.clone(),
                        samples: window.iter().map(|(i, _)| format!("s{}", i + 1)).collect(),
                        sample_data: window
                            .iter()
                            .map(|(_, gt)| BTreeMap::from([(GT_FIELD.to_string(), gt.to_string())]))
                            .collect(),
                        stats,
                        files,
                    }],
                }],
                time_ms: 3,
            })
        }
    }

    /// One study, every sample in one file.
    struct SingleFileResolver {
        attributes: BTreeMap<String, String>,
    }

    impl SingleFileResolver {
        fn new() -> Self {
            Self {
                attributes: BTreeMap::new(),
            }
        }

        fn with(attribute: &str, value: &str) -> Self {
            Self {
                attributes: BTreeMap::from([(attribute.to_string(), value.to_string())]),
            }
        }
    }

    impl MetadataResolver for SingleFileResolver {
        fn study(&self, name: &str) -> Result<Option<StudyMetadata>, BoxedError> {
            Ok((name == "S1").then(|| StudyMetadata {
                id: 1,
                name: name.to_string(),
                attributes: self.attributes.clone(),
            }))
        }
        fn sample_id(&self, study_id: u32, sample: &str) -> Result<Option<u32>, BoxedError> {
            assert_eq!(study_id, 1);
            Ok(sample.trim_start_matches('s').parse().ok())
        }
        fn file_ids(&self, study_id: u32, sample_id: u32) -> Result<Vec<u32>, BoxedError> {
            let _ = (study_id, sample_id);
            Ok(vec![7])
        }
        fn file_name(&self, study_id: u32, file_id: u32) -> Result<Option<String>, BoxedError> {
            let _ = study_id;
            Ok((file_id == 7).then(|| "cohort.vcf.gz".to_string()))
        }
    }

    fn names(bucket: &GenotypeBucket) -> Vec<&str> {
        bucket.samples.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn end_to_end_buckets_by_normalized_genotype() {
        let manager = SampleDataManager::new(
            ScriptedStore::new(&["0/1", "1/1", "0/0", "1|0", "1/1"]),
            SingleFileResolver::new(),
        );
        let query = SampleDataQuery {
            batch_size: 2,
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("1:100:A:T", "S1", &query).unwrap();

        let buckets = &result.data.buckets;
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets["0/1"].count, 2);
        assert_eq!(names(&buckets["0/1"]), ["s1", "s4"]);
        assert_eq!(buckets["1/1"].count, 2);
        assert_eq!(names(&buckets["1/1"]), ["s2", "s5"]);
        assert_eq!(buckets["0/1"].samples[1].data[GT_FIELD], "1|0");
        assert_eq!(result.data.files.len(), 1);
        assert_eq!(result.queries, 3);
        assert_eq!(result.read_samples, 5);
        assert_eq!(result.db_time_ms, 9);
    }

    #[test]
    fn skip_and_limit_window_each_bucket() {
        let genotypes = ["0/1"; 7];
        for (skip, limit) in [(0, 3), (2, 3), (5, 3), (7, 3), (9, 1), (0, 0), (3, 10)] {
            let manager =
                SampleDataManager::new(ScriptedStore::new(&genotypes), SingleFileResolver::new());
            let query = SampleDataQuery {
                skip,
                limit,
                batch_size: 100,
                ..SampleDataQuery::default()
            };
            let result = manager.get_sample_data("v", "S1", &query).unwrap();
            let bucket = &result.data.buckets["0/1"];
            let expected = limit.min(7usize.saturating_sub(skip));
            assert_eq!(bucket.samples.len(), expected, "skip {skip} limit {limit}");
            assert_eq!(bucket.count, 7);
            if let Some(first) = bucket.samples.first() {
                assert_eq!(first.name, format!("s{}", skip + 1));
            }
        }
    }

    #[test]
    fn merge_collapses_accepted_genotypes_into_one_bucket() {
        let manager = SampleDataManager::new(
            ScriptedStore::new(&["0/1", "1/1", "0/0", "1|0", "1/1"]),
            SingleFileResolver::new(),
        );
        let query = SampleDataQuery {
            merge: true,
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.data.buckets.len(), 1);
        let all = &result.data.buckets[MERGED_BUCKET];
        assert_eq!(all.count, 4);
        assert_eq!(names(all), ["s1", "s2", "s4", "s5"]);
    }

    #[test]
    fn reading_stops_once_every_bucket_is_full() {
        let store = ScriptedStore::new(&["0/1", "1/1", "0/1", "1/1", "0/1", "1/1", "0/1"]);
        let manager = SampleDataManager::new(store, SingleFileResolver::new());
        let query = SampleDataQuery {
            limit: 1,
            batch_size: 2,
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.queries, 1);
        assert_eq!(result.read_samples, 2);
    }

    #[test]
    fn requested_genotypes_are_normalized() {
        let manager = SampleDataManager::new(
            ScriptedStore::new(&["0/1", "1/1", "1|0"]),
            SingleFileResolver::new(),
        );
        let query = SampleDataQuery {
            genotypes: vec!["1|0".to_string()],
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.data.buckets.keys().collect::<Vec<_>>(), ["0/1"]);
        assert_eq!(result.data.buckets["0/1"].count, 2);
    }

    #[test]
    fn no_calls_count_as_not_available() {
        let manager = SampleDataManager::new(
            ScriptedStore::new(&[".", "0/1", "NA"]),
            SingleFileResolver::new(),
        );
        let query = SampleDataQuery {
            genotypes: vec![NA_GT.to_string()],
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.data.buckets[NA_GT].count, 2);
    }

    #[test]
    fn studies_without_genotypes_only_report_not_available() {
        for resolver in [
            SingleFileResolver::with(EXCLUDE_GENOTYPES_ATTRIBUTE, "true"),
            SingleFileResolver::with(LOADED_GENOTYPES_ATTRIBUTE, "-1"),
            SingleFileResolver::with(LOADED_GENOTYPES_ATTRIBUTE, "NA"),
        ] {
            let manager = SampleDataManager::new(ScriptedStore::new(&["0/1", "1/1"]), resolver);
            let result = manager
                .get_sample_data("v", "S1", &SampleDataQuery::default())
                .unwrap();
            assert_eq!(result.data.buckets.keys().collect::<Vec<_>>(), [NA_GT]);
            assert_eq!(result.data.buckets[NA_GT].count, 0);
        }

        let manager = SampleDataManager::new(
            ScriptedStore::new(&["0/1"]),
            SingleFileResolver::with(LOADED_GENOTYPES_ATTRIBUTE, "0/1, 1/1, NA"),
        );
        let result = manager
            .get_sample_data("v", "S1", &SampleDataQuery::default())
            .unwrap();
        assert_eq!(result.data.buckets.len(), 3);
    }

    #[test]
    fn malformed_exclude_attribute_is_a_configuration_error() {
        let manager = SampleDataManager::new(
            ScriptedStore::new(&["0/1"]),
            SingleFileResolver::with(EXCLUDE_GENOTYPES_ATTRIBUTE, "sometimes"),
        );
        let err = manager
            .get_sample_data("v", "S1", &SampleDataQuery::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SampleDataError::Configuration(ConfigurationError::InvalidStudyAttribute { .. })
        ));
    }

    #[test]
    fn unknown_study_is_rejected_before_any_store_call() {
        let manager = SampleDataManager::new(ScriptedStore::new(&["0/1"]), SingleFileResolver::new());
        let err = manager
            .get_sample_data("v", "S2", &SampleDataQuery::default())
            .unwrap_err();
        assert!(matches!(
            err,
            SampleDataError::Configuration(ConfigurationError::UnknownStudy(ref s)) if s == "S2"
        ));
        assert!(manager.store().requests.borrow().is_empty());
    }

    #[test]
    fn accepted_sample_without_file_is_an_integrity_error() {
        let mut store = ScriptedStore::new(&["0/0", "0/1"]);
        store.missing_file = true;
        let manager = SampleDataManager::new(store, SingleFileResolver::new());
        let err = manager
            .get_sample_data("v", "S1", &SampleDataQuery::default())
            .unwrap_err();
        match err {
            SampleDataError::DataIntegrity { sample, candidates } => {
                assert_eq!(sample, "s2");
                assert_eq!(candidates, ["cohort.vcf.gz"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn not_available_samples_without_file_are_skipped() {
        let mut store = ScriptedStore::new(&["NA", "NA"]);
        store.missing_file = true;
        let manager = SampleDataManager::new(store, SingleFileResolver::new());
        let query = SampleDataQuery {
            genotypes: vec![NA_GT.to_string()],
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.data.buckets[NA_GT].count, 2);
        assert!(result.data.buckets[NA_GT].samples.is_empty());
    }

    #[test]
    fn stats_are_captured_once_then_excluded() {
        let mut store = ScriptedStore::new(&["0/1", "1/1", "0/1", "1/1", "0/1"]);
        store.stats = Some(BTreeMap::from([(
            "ALL".to_string(),
            VariantStats {
                allele_count: 10,
                alt_allele_count: 5,
                alt_allele_freq: 0.5,
                ..VariantStats::default()
            },
        )]));
        let manager = SampleDataManager::new(store, SingleFileResolver::new());
        let query = SampleDataQuery {
            batch_size: 2,
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.data.stats["ALL"].alt_allele_count, 5);

        let requests = manager.store().requests.borrow();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.exclude.contains(&ExcludedField::Annotation)));
        assert!(!requests[0].exclude.contains(&ExcludedField::StudyStats));
        assert!(requests[1].exclude.contains(&ExcludedField::StudyStats));
        assert_eq!(
            requests.iter().map(|r| r.skip).collect::<Vec<_>>(),
            [0, 2, 4]
        );
    }

    /// Delegates to [`SingleFileResolver`] and also reports the cohort size.
    struct SizedResolver {
        inner: SingleFileResolver,
        size: usize,
    }

    impl MetadataResolver for SizedResolver {
        fn study(&self, name: &str) -> Result<Option<StudyMetadata>, BoxedError> {
            self.inner.study(name)
        }
        fn sample_id(&self, study_id: u32, sample: &str) -> Result<Option<u32>, BoxedError> {
            self.inner.sample_id(study_id, sample)
        }
        fn file_ids(&self, study_id: u32, sample_id: u32) -> Result<Vec<u32>, BoxedError> {
            self.inner.file_ids(study_id, sample_id)
        }
        fn file_name(&self, study_id: u32, file_id: u32) -> Result<Option<String>, BoxedError> {
            self.inner.file_name(study_id, file_id)
        }
        fn cohort_size(&self, study_id: u32) -> Result<Option<usize>, BoxedError> {
            let _ = study_id;
            Ok(Some(self.size))
        }
    }

    #[test]
    fn exact_multiple_of_the_batch_needs_the_cohort_size_to_stop_early() {
        let genotypes = ["0/1", "1/1", "0/0", "0/1"];
        let query = SampleDataQuery {
            batch_size: 2,
            ..SampleDataQuery::default()
        };

        let unsized_manager =
            SampleDataManager::new(ScriptedStore::new(&genotypes), SingleFileResolver::new());
        let result = unsized_manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.queries, 3);
        assert_eq!(result.read_samples, 4);

        let sized_manager = SampleDataManager::new(
            ScriptedStore::new(&genotypes),
            SizedResolver {
                inner: SingleFileResolver::new(),
                size: genotypes.len(),
            },
        );
        let result = sized_manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.queries, 2);
        assert_eq!(result.read_samples, 4);
        assert_eq!(result.data.buckets["0/1"].count, 2);
    }

    #[test]
    fn include_list_bounds_the_number_of_windows() {
        let manager = SampleDataManager::new(
            ScriptedStore::new(&["0/1", "0/1", "0/1", "0/1"]),
            SingleFileResolver::new(),
        );
        let query = SampleDataQuery {
            include_samples: Some(vec!["s1".to_string(), "s2".to_string()]),
            batch_size: 2,
            ..SampleDataQuery::default()
        };
        let result = manager.get_sample_data("v", "S1", &query).unwrap();
        assert_eq!(result.queries, 1);
        let requests = manager.store().requests.borrow();
        assert_eq!(
            requests[0].include_samples.as_deref(),
            Some(&["s1".to_string(), "s2".to_string()][..])
        );
    }

    #[test]
    fn missing_variant_is_not_found() {
        struct EmptyStore;
        impl VariantStore for EmptyStore {
            fn fetch(&self, request: &SampleWindowRequest) -> Result<StoreResponse, BoxedError> {
                let _ = request;
                Ok(StoreResponse::default())
            }
        }
        let manager = SampleDataManager::new(EmptyStore, SingleFileResolver::new());
        let err = manager
            .get_sample_data("1:1:A:C", "S1", &SampleDataQuery::default())
            .unwrap_err();
        assert!(matches!(err, SampleDataError::NotFound { .. }));
    }

    #[test]
    fn store_failures_propagate_unchanged() {
        struct FailingStore;
        impl VariantStore for FailingStore {
            fn fetch(&self, request: &SampleWindowRequest) -> Result<StoreResponse, BoxedError> {
                let _ = request;
                Err("region server unavailable".into())
            }
        }
        let manager = SampleDataManager::new(FailingStore, SingleFileResolver::new());
        let err = manager
            .get_sample_data("v", "S1", &SampleDataQuery::default())
            .unwrap_err();
        assert!(matches!(err, SampleDataError::Store(_)));
        assert_eq!(err.to_string(), "region server unavailable");
    }
}

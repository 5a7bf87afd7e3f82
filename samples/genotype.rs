use dashmap::DashMap;
use itertools::Itertools;

/// Genotype value meaning "not available".
pub const NA_GT: &str = "NA";
/// A single missing call.
pub const NO_CALL: &str = ".";
/// The bucket every accepted sample lands in when buckets are merged.
pub const MERGED_BUCKET: &str = "all";
/// Legacy marker in a study's loaded genotypes meaning no genotypes were loaded.
pub const NO_GENOTYPES_LOADED: &str = "-1";

/// Raw strings longer than this are normalized but never cached.
const MAX_CACHED_GENOTYPE_LEN: usize = 64;

/// Canonical form of a genotype string.
///
/// Phase separators become `/`. When every allele is a numeric index or `.`, alleles are
/// sorted with missing calls first and indices are rendered without leading zeros, so
/// `1|0`, `0/1` and `00/1` all become `0/1`. Anything else, such as `NA`, is returned
/// with only the phase separators replaced.
pub fn canonical_genotype(raw: &str) -> String {
    let unphased = raw.replace('|', "/");
    let mut alleles: Vec<Option<u32>> = Vec::new();
    for allele in unphased.split('/') {
        if allele == NO_CALL {
            alleles.push(None);
            continue;
        }
        if allele.is_empty() || !allele.bytes().all(|b| b.is_ascii_digit()) {
            return unphased;
        }
        match allele.parse::<u32>() {
            Ok(index) => alleles.push(Some(index)),
            Err(_) => return unphased,
        }
    }
    alleles.sort_unstable();
    alleles
        .iter()
        .map(|allele| match allele {
            Some(index) => index.to_string(),
            None => NO_CALL.to_string(),
        })
        .join("/")
}

/// Memoizing genotype normalizer shared by every aggregation the owning service runs.
///
/// The cache only ever holds pure function results, so racing first writes for the same
/// key store the same value.
#[derive(Debug, Default)]
pub struct GenotypeNormalizer {
    cache: DashMap<String, String>,
}

impl GenotypeNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(&self, raw: &str) -> String {
        if let Some(hit) = self.cache.get(raw) {
            return hit.value().clone();
        }
        let normalized = canonical_genotype(raw);
        if raw.len() <= MAX_CACHED_GENOTYPE_LEN {
            self.cache.insert(raw.to_string(), normalized.clone());
        }
        normalized
    }

    /// Number of distinct raw genotype strings held in the cache.
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

pub mod adaptor;
pub mod aggregate;
pub mod genotype;
pub mod memory;

pub use adaptor::{MetadataResolver, SampleWindowRequest, StoreResponse, VariantStore};
pub use aggregate::{SampleDataManager, SampleDataQuery, SampleDataResult};
pub use genotype::GenotypeNormalizer;
pub use memory::InMemoryCohort;

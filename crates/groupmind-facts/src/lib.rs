pub mod extractor;
pub mod hybrid;
pub mod model_extractor;
pub mod normalize;
pub mod rules;
pub mod types;

pub use extractor::{FactExtractor, RuleBasedExtractor};
pub use hybrid::HybridExtractor;
pub use model_extractor::{ModelFactExtractor, RawModelFact};
pub use types::{ExtractionContext, FactCandidate, FactType};

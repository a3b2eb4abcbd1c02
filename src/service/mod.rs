pub mod assessor;
pub mod cancel;
pub mod candidates;
pub mod eligibility;
pub mod persister;
pub mod pipeline;
pub mod ranker;
pub mod scoring;

pub use assessor::QualitativeAssessor;
pub use cancel::CancelToken;
pub use pipeline::MatchingPipeline;

pub mod applicant;
pub mod candidate;
pub mod product;
pub mod record;
pub mod summary;

pub use applicant::{Applicant, ApplicantDraft, ApplicantRow, EmploymentCategory, NewApplicant};
pub use candidate::{Assessment, EligibilityFlags, MatchCandidate, VerdictSource};
pub use product::{NewProduct, Product, ProductDraft, ProductRow, ValueRange};
pub use record::{Match, MatchRow, MatchSource, MatchStatus, MatchUpsert};
pub use summary::{
    BatchMatchSummary, BatchStatus, PipelineStage, PipelineSummary, StageCount, StageCounts,
};

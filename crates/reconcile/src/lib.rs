pub mod candidates;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod learning;
pub mod pipeline;
pub mod scorer;
pub mod selector;
pub mod suggest;
pub mod summary;
pub mod util;

pub use candidates::{rank, CandidateGenerator, CandidateSet};
pub use error::PipelineError;
pub use extract::{ExtractedIdentifier, IdentifierPattern, ReferenceExtractor};
pub use ingest::{Feed, IngestCounts, IngestReport, Ingestor, MalformedRecord, RecordKind};
pub use learning::{learn_from_confirmation, pattern_for, CompiledRule, LearnedOutcome};
pub use pipeline::{cancel_token, CancelToken, Processed, ReconciliationPipeline};
pub use scorer::{AmountDateScorer, Assessment};
pub use selector::{MatchOutcome, MatchSelector, ReviewItem, ReviewReason, Selection};
pub use suggest::{
    AccountSuggestionEngine, CategoryStrategy, KeywordSet, KeywordStrategy, LearnedRuleStrategy,
    SuggestionStrategy, VendorStrategy, CATEGORY_ACCOUNTS, KEYWORD_SETS,
};
pub use summary::{BatchReport, BatchSummary, BatchTally, OutcomeCounts, TransactionFailure};

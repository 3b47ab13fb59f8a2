pub mod account;
pub mod config;
pub mod document;
pub mod guard;
pub mod matching;
pub mod memory;
pub mod money;
pub mod period;
pub mod record;
pub mod store;
pub mod transaction;

pub use account::{
    account_label, AccountSuggestion, AccountType, LearnedRule, RuleChange, RuleMatchType,
    RuleOrigin, SuggestionMethod, DEFAULT_ACCOUNTS,
};
pub use config::{
    ConfigError, IdentifierPatternConfig, Payee, ReconcileConfig, ScorerConfig, SuggestionConfig,
    MAX_DATE_WINDOW_DAYS,
};
pub use document::Document;
pub use guard::{MatchWrite, PersistenceGuard, WriteKind};
pub use matching::{Candidate, ConfidenceLevel, IdentifierKind, MatchMethod, MatchResult};
pub use memory::{InMemoryLearningStore, InMemoryRecordStore};
pub use money::Money;
pub use period::{days_between, DateRange};
pub use record::{
    BankAccount, BankLine, DocumentRecord, MarketplaceSettlement, Processor, ProcessorEvent,
    RecordError, SourceRecord,
};
pub use store::{LearningStore, RecordStore, StoreError, TransactionFilter, UpsertOutcome};
pub use transaction::{Counterparty, Source, Transaction, TransactionKey};

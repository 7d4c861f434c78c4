pub mod batch;
pub mod domain;
pub mod record;
pub mod report;
pub mod ticker;
pub mod window;

pub use batch::{BatchJob, BatchStatus, TickerFailure};
pub use domain::{CommitPolicy, DomainKind, FetchShape, SyncDomain, UniverseKind, MAJOR_INDEXES};
pub use record::{
    dedupe_by_key, CashflowStatement, DividendRecord, EtfListing, IncomeStatement, IndexListing,
    IndexValuation, IndexWeight, NaturalKey, PriceBar, Record, SectorIndex, SectorMember,
    StockListing,
};
pub use report::{DomainOutcome, DomainReport, RunReport, SyncPhase};
pub use ticker::{Exchange, ListingStatus, Ticker, UniverseSnapshot, UniverseSource};
pub use window::{DateRange, SyncMode, SyncWindow};

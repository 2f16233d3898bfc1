mod account;
mod engine;
mod error;
mod ledger;
mod simulation;
mod types;

pub use account::{Account, AccountKind};
pub use engine::{
    CAPITAL_GAINS_LABEL, Phase, REBALANCE_LABEL, SALE_LABEL, TAX_POST_PROCESSING_LABEL,
    TAX_RETURN_LABEL, Year,
};
pub use error::EngineError;
pub use ledger::{BookEntry, Booking, Ledger, TaxBookEntry};
pub use simulation::{Projection, run_projection};
pub use types::{
    AccountBalance, AccountSpec, BookEntrySummary, Config, DEFAULT_BALANCING_ACCOUNT,
    DEFAULT_CAPITAL_GAINS_TAX_RATE, DEFAULT_INCOME_TAX_RATE, DEFAULT_SAVINGS_ACCOUNT, EntryKind,
    IncomeExpenseItem, Increase, IncreaseKind, MAX_PROJECTION_YEARS, ProjectionSummary, TaxRates,
    TaxType, YearFilter, YearSummary,
};

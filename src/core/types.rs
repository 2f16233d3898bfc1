use serde::Serialize;

use super::error::EngineError;

pub const DEFAULT_SAVINGS_ACCOUNT: &str = "Savings";
pub const DEFAULT_BALANCING_ACCOUNT: &str = "Investment";
pub const DEFAULT_INCOME_TAX_RATE: f64 = 0.45;
pub const DEFAULT_CAPITAL_GAINS_TAX_RATE: f64 = 0.34;
/// Longest allowed span between the start and end year.
pub const MAX_PROJECTION_YEARS: i64 = 200;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum TaxType {
    Income,
    CapitalGains,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Income or expense, including account growth and mortgage flows.
    Regular,
    /// One leg of a movement between two accounts.
    Transfer,
    Tax,
}

/// The only place tax rates live; the tax passes and the tax-aware transfer
/// both read from here.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaxRates {
    pub income: f64,
    pub capital_gains: f64,
}

impl TaxRates {
    pub fn tax_due(&self, taxable_income: f64, capital_gains: f64) -> f64 {
        taxable_income * self.income + capital_gains * self.capital_gains
    }
}

impl Default for TaxRates {
    fn default() -> Self {
        Self {
            income: DEFAULT_INCOME_TAX_RATE,
            capital_gains: DEFAULT_CAPITAL_GAINS_TAX_RATE,
        }
    }
}

/// Inclusive year range; `None` on either side is open.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct YearFilter {
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

impl YearFilter {
    pub fn applies(&self, year: i32) -> bool {
        self.start_year.is_none_or(|start| start <= year)
            && self.end_year.is_none_or(|end| end >= year)
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum IncreaseKind {
    /// Fraction added to the growth factor, e.g. 0.03 for three percent.
    Percent(f64),
    Amount(f64),
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Increase {
    pub kind: IncreaseKind,
    pub filter: YearFilter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomeExpenseItem {
    pub name: String,
    pub amount: f64,
    pub filter: YearFilter,
    pub inflation_adjust: bool,
    pub increases: Vec<Increase>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountSpec {
    pub name: String,
    /// Raw type tag, resolved by the account factory.
    pub account_type: String,
    pub balance: f64,
    pub target_balance: Option<f64>,
    pub return_rate: Option<f64>,
    pub sell_year: Option<i32>,
    pub basis: Option<f64>,
    pub principal: Option<f64>,
    pub mortgage_rate: Option<f64>,
    pub monthly_payment: Option<f64>,
}

impl AccountSpec {
    pub fn basic(name: &str, balance: f64) -> Self {
        Self {
            name: name.to_string(),
            account_type: "basic".to_string(),
            balance,
            target_balance: None,
            return_rate: None,
            sell_year: None,
            basis: None,
            principal: None,
            mortgage_rate: None,
            monthly_payment: None,
        }
    }
}

/// Validated engine input. Built by the `config` loader or directly in tests.
#[derive(Debug, Clone)]
pub struct Config {
    pub inflation: f64,
    pub birth_year: i32,
    pub start_year: i32,
    pub end_year: i32,
    pub tax_rates: TaxRates,
    pub savings_account: String,
    pub balancing_accounts: Vec<String>,
    pub income_expenses: Vec<IncomeExpenseItem>,
    pub accounts: Vec<AccountSpec>,
}

impl Config {
    /// Checks the invariants the engine relies on. Type-specific account
    /// fields are checked by the account factory.
    pub fn validate(&self) -> Result<(), EngineError> {
        if !(0.0..=1.0).contains(&self.inflation) {
            return Err(EngineError::config("inflation must be between 0 and 1"));
        }
        if self.birth_year < 0 {
            return Err(EngineError::config("birthYear must be >= 0"));
        }
        if self.end_year < self.start_year {
            return Err(EngineError::config(format!(
                "projection ends in {} before it starts in {}",
                self.end_year, self.start_year
            )));
        }
        if i64::from(self.end_year) - i64::from(self.start_year) > MAX_PROJECTION_YEARS {
            return Err(EngineError::config(format!(
                "projection from {} to {} spans more than {MAX_PROJECTION_YEARS} years",
                self.start_year, self.end_year
            )));
        }
        if !(0.0..=1.0).contains(&self.tax_rates.income) {
            return Err(EngineError::config("income tax rate must be between 0 and 1"));
        }
        if !(0.0..1.0).contains(&self.tax_rates.capital_gains) {
            return Err(EngineError::config(
                "capital gains tax rate must be >= 0 and < 1",
            ));
        }
        if self.income_expenses.is_empty() {
            return Err(EngineError::config("incomeExpenses must not be empty"));
        }
        for item in &self.income_expenses {
            if item.name.trim().is_empty() {
                return Err(EngineError::config("income/expense name must not be empty"));
            }
            if !item.amount.is_finite() {
                return Err(EngineError::config(format!(
                    "amount of '{}' must be a finite number",
                    item.name
                )));
            }
        }
        if self.accounts.is_empty() {
            return Err(EngineError::config("accounts must not be empty"));
        }
        for (idx, account) in self.accounts.iter().enumerate() {
            if self.accounts[..idx].iter().any(|a| a.name == account.name) {
                return Err(EngineError::config(format!(
                    "duplicate account '{}'",
                    account.name
                )));
            }
        }
        if !self.accounts.iter().any(|a| a.name == self.savings_account) {
            return Err(EngineError::config(format!(
                "savings account '{}' is not configured",
                self.savings_account
            )));
        }
        Ok(())
    }

    pub fn age_in(&self, year: i32) -> i32 {
        year - self.birth_year
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub name: String,
    pub balance: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEntrySummary {
    pub account: String,
    pub amount: f64,
    pub name: String,
    pub from_account: Option<String>,
    pub appreciation: bool,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: i32,
    pub age: i32,
    pub net_worth: f64,
    pub total_income: f64,
    pub total_expenses: f64,
    pub tax_paid: f64,
    pub balances: Vec<AccountBalance>,
    pub books: Vec<BookEntrySummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionSummary {
    pub start_year: i32,
    pub end_year: i32,
    pub final_net_worth: f64,
    pub insolvent_year: Option<i32>,
    pub years: Vec<YearSummary>,
}

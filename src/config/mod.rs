//! Loads a projection config from JSON.
//!
//! Every numeric field may be a JSON number or an expression string over
//! other top-level keys (see [`expr`]). Accounts keep the order they have in
//! the document; that order drives rebalancing and the report columns.

pub mod expr;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::core::{
    Account, AccountSpec, Config, DEFAULT_BALANCING_ACCOUNT, DEFAULT_CAPITAL_GAINS_TAX_RATE,
    DEFAULT_INCOME_TAX_RATE, DEFAULT_SAVINGS_ACCOUNT, EngineError, IncomeExpenseItem, Increase,
    IncreaseKind, TaxRates, YearFilter,
};
use expr::{Evaluator, ExprError};

pub const DEFAULT_END_AGE: i32 = 100;
const LINE_ITEM_TYPE_BASIC: &str = "basic";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot evaluate {field}: {source}")]
    Expression {
        field: String,
        #[source]
        source: ExprError,
    },

    #[error("{0}")]
    Invalid(String),
}

impl From<EngineError> for ConfigError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::ConfigInvalid(msg) => ConfigError::Invalid(msg),
            other => ConfigError::Invalid(other.to_string()),
        }
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Invalid(msg) => EngineError::ConfigInvalid(msg),
            other => EngineError::ConfigInvalid(other.to_string()),
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

/// Settings that come from outside the config document.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Overrides `endAge`/`endYear` from the document.
    pub end_age: Option<i32>,
    /// Default `startYear`; also the upper bound for `birthYear`.
    pub current_year: i32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            end_age: None,
            current_year: chrono::Local::now().year(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    inflation: Value,
    birth_year: Value,
    #[serde(default)]
    federal_income_tax_rate: Option<Value>,
    #[serde(default)]
    state_income_tax_rate: Option<Value>,
    #[serde(default)]
    capital_gains_tax_rate: Option<Value>,
    #[serde(default)]
    start_year: Option<Value>,
    #[serde(default)]
    end_year: Option<Value>,
    #[serde(default)]
    end_age: Option<Value>,
    #[serde(default = "default_savings_account")]
    savings_account: String,
    #[serde(default = "default_balancing_accounts")]
    balancing_accounts: Vec<String>,
    income_expenses: Vec<RawItem>,
    accounts: Map<String, Value>,
}

fn default_savings_account() -> String {
    DEFAULT_SAVINGS_ACCOUNT.to_string()
}

fn default_balancing_accounts() -> Vec<String> {
    vec![DEFAULT_BALANCING_ACCOUNT.to_string()]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawItem {
    name: String,
    #[serde(rename = "type", default = "default_item_type")]
    item_type: String,
    amount: Value,
    #[serde(flatten)]
    range: RawRange,
    #[serde(default)]
    inflation_adjust: Option<Value>,
    #[serde(default)]
    increase: Option<Value>,
}

fn default_item_type() -> String {
    LINE_ITEM_TYPE_BASIC.to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRange {
    #[serde(default)]
    start_year: Option<Value>,
    #[serde(default)]
    end_year: Option<Value>,
    #[serde(default)]
    start_age: Option<Value>,
    #[serde(default)]
    end_age: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIncrease {
    #[serde(default)]
    percent: Option<Value>,
    #[serde(default)]
    amount: Option<Value>,
    #[serde(flatten)]
    range: RawRange,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAccount {
    #[serde(rename = "type")]
    account_type: String,
    balance: Option<Value>,
    #[serde(default)]
    target_balance: Option<Value>,
    #[serde(default)]
    return_rate: Option<Value>,
    #[serde(default)]
    sell: Option<Value>,
    #[serde(default)]
    basis: Option<Value>,
    #[serde(default)]
    principal: Option<Value>,
    #[serde(default)]
    mortgage_rate: Option<Value>,
    #[serde(default)]
    monthly_payment: Option<Value>,
}

pub fn load_config(path: &Path, options: &LoadOptions) -> Result<Config, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "read config");
    config_from_str(&text, options)
}

pub fn config_from_str(text: &str, options: &LoadOptions) -> Result<Config, ConfigError> {
    let value: Value = serde_json::from_str(text)?;
    config_from_value(value, options)
}

/// Builds and validates a [`Config`], including constructing every account
/// once so that bad account definitions fail before any year runs.
pub fn config_from_value(value: Value, options: &LoadOptions) -> Result<Config, ConfigError> {
    let Value::Object(root) = value else {
        return Err(invalid("config must be a JSON object"));
    };
    let raw: RawConfig = serde_json::from_value(Value::Object(root.clone()))?;
    let mut fields = Fields {
        evaluator: Evaluator::new(&root),
    };

    let inflation = fields.number("inflation", &raw.inflation)?;
    let birth_year = fields.year("birthYear", &raw.birth_year)?;
    if birth_year > options.current_year {
        return Err(invalid(format!(
            "birthYear {birth_year} lies in the future"
        )));
    }

    let income_rate = match (&raw.federal_income_tax_rate, &raw.state_income_tax_rate) {
        (None, None) => DEFAULT_INCOME_TAX_RATE,
        (federal, state) => {
            fields.optional_number("federalIncomeTaxRate", federal.as_ref())?.unwrap_or(0.0)
                + fields.optional_number("stateIncomeTaxRate", state.as_ref())?.unwrap_or(0.0)
        }
    };
    let capital_gains_rate = fields
        .optional_number("capitalGainsTaxRate", raw.capital_gains_tax_rate.as_ref())?
        .unwrap_or(DEFAULT_CAPITAL_GAINS_TAX_RATE);

    let start_year = fields
        .optional_year("startYear", raw.start_year.as_ref())?
        .unwrap_or(options.current_year);
    let end_year = match options.end_age {
        Some(age) => year_at_age(birth_year, age, "end age")?,
        None => match fields.optional_year("endYear", raw.end_year.as_ref())? {
            Some(year) => year,
            None => {
                let age = fields
                    .optional_year("endAge", raw.end_age.as_ref())?
                    .unwrap_or(DEFAULT_END_AGE);
                year_at_age(birth_year, age, "endAge")?
            }
        },
    };

    let income_expenses = raw
        .income_expenses
        .iter()
        .map(|item| fields.item(item, birth_year))
        .collect::<Result<Vec<_>, _>>()?;

    let mut accounts = Vec::with_capacity(raw.accounts.len());
    for (name, value) in &raw.accounts {
        let account: RawAccount = serde_json::from_value(value.clone())?;
        accounts.push(fields.account(name, &account)?);
    }

    let config = Config {
        inflation,
        birth_year,
        start_year,
        end_year,
        tax_rates: TaxRates {
            income: income_rate,
            capital_gains: capital_gains_rate,
        },
        savings_account: raw.savings_account,
        balancing_accounts: raw.balancing_accounts,
        income_expenses,
        accounts,
    };
    config.validate()?;
    for spec in &config.accounts {
        Account::from_spec(spec)?;
    }
    debug!(
        start_year = config.start_year,
        end_year = config.end_year,
        accounts = config.accounts.len(),
        "config loaded"
    );
    Ok(config)
}

fn year_at_age(birth_year: i32, age: i32, field: &str) -> Result<i32, ConfigError> {
    birth_year
        .checked_add(age)
        .ok_or_else(|| invalid(format!("{field} {age} is out of range")))
}

struct Fields<'a> {
    evaluator: Evaluator<'a>,
}

impl Fields<'_> {
    fn number(&mut self, field: &str, value: &Value) -> Result<f64, ConfigError> {
        let number = self
            .evaluator
            .eval_value(value)
            .map_err(|source| ConfigError::Expression {
                field: field.to_string(),
                source,
            })?;
        if !number.is_finite() {
            return Err(invalid(format!("{field} must be finite")));
        }
        Ok(number)
    }

    fn optional_number(&mut self, field: &str, value: Option<&Value>) -> Result<Option<f64>, ConfigError> {
        value
            .filter(|v| !v.is_null())
            .map(|v| self.number(field, v))
            .transpose()
    }

    fn year(&mut self, field: &str, value: &Value) -> Result<i32, ConfigError> {
        let number = self.number(field, value)?;
        if number.fract() != 0.0 || number < i32::MIN as f64 || number > i32::MAX as f64 {
            return Err(invalid(format!("{field} must be a whole number, got {number}")));
        }
        Ok(number as i32)
    }

    fn optional_year(&mut self, field: &str, value: Option<&Value>) -> Result<Option<i32>, ConfigError> {
        value
            .filter(|v| !v.is_null())
            .map(|v| self.year(field, v))
            .transpose()
    }

    /// Year bounds, with ages converted through the birth year. When both a
    /// year and an age bound a side, the narrower one wins.
    fn filter(&mut self, prefix: &str, range: &RawRange, birth_year: i32) -> Result<YearFilter, ConfigError> {
        let start_year = self.optional_year(&format!("{prefix}.startYear"), range.start_year.as_ref())?;
        let end_year = self.optional_year(&format!("{prefix}.endYear"), range.end_year.as_ref())?;
        let start_age = self
            .optional_year(&format!("{prefix}.startAge"), range.start_age.as_ref())?
            .map(|age| year_at_age(birth_year, age, &format!("{prefix}.startAge")))
            .transpose()?;
        let end_age = self
            .optional_year(&format!("{prefix}.endAge"), range.end_age.as_ref())?
            .map(|age| year_at_age(birth_year, age, &format!("{prefix}.endAge")))
            .transpose()?;

        let filter = YearFilter {
            start_year: [start_year, start_age].into_iter().flatten().max(),
            end_year: [end_year, end_age].into_iter().flatten().min(),
        };
        Ok(filter)
    }

    fn item(&mut self, raw: &RawItem, birth_year: i32) -> Result<IncomeExpenseItem, ConfigError> {
        let prefix = format!("incomeExpenses.{}", raw.name);
        if raw.item_type != LINE_ITEM_TYPE_BASIC {
            return Err(invalid(format!(
                "{prefix} has unsupported type '{}'",
                raw.item_type
            )));
        }
        let inflation_adjust = match &raw.inflation_adjust {
            None | Some(Value::Null) => false,
            Some(Value::Bool(flag)) => *flag,
            Some(other) => {
                return Err(invalid(format!(
                    "{prefix}.inflationAdjust must be true or false, got {other}"
                )));
            }
        };
        let amount = self.number(&format!("{prefix}.amount"), &raw.amount)?;
        let filter = self.filter(&prefix, &raw.range, birth_year)?;
        let increases = match &raw.increase {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => self.increases(&format!("{prefix}.increase"), value, birth_year)?,
        };
        Ok(IncomeExpenseItem {
            name: raw.name.clone(),
            amount,
            filter,
            inflation_adjust,
            increases,
        })
    }

    /// `increase` is a bare percent, one `{percent|amount, ...}` object, or a
    /// list of them.
    fn increases(&mut self, field: &str, value: &Value, birth_year: i32) -> Result<Vec<Increase>, ConfigError> {
        match value {
            Value::Array(entries) => entries
                .iter()
                .enumerate()
                .map(|(idx, entry)| self.increase(&format!("{field}[{idx}]"), entry, birth_year))
                .collect(),
            Value::Object(_) => Ok(vec![self.increase(field, value, birth_year)?]),
            bare => Ok(vec![Increase {
                kind: IncreaseKind::Percent(self.number(field, bare)?),
                filter: YearFilter::default(),
            }]),
        }
    }

    fn increase(&mut self, field: &str, value: &Value, birth_year: i32) -> Result<Increase, ConfigError> {
        let raw: RawIncrease = serde_json::from_value(value.clone())?;
        let kind = match (&raw.amount, &raw.percent) {
            (Some(amount), _) => IncreaseKind::Amount(self.number(&format!("{field}.amount"), amount)?),
            (None, Some(percent)) => {
                IncreaseKind::Percent(self.number(&format!("{field}.percent"), percent)?)
            }
            (None, None) => {
                return Err(invalid(format!("{field} needs either percent or amount")));
            }
        };
        Ok(Increase {
            kind,
            filter: self.filter(field, &raw.range, birth_year)?,
        })
    }

    fn account(&mut self, name: &str, raw: &RawAccount) -> Result<AccountSpec, ConfigError> {
        let prefix = format!("accounts.{name}");
        let Some(balance) = raw.balance.as_ref().filter(|v| !v.is_null()) else {
            return Err(invalid(format!("{prefix} needs a balance")));
        };
        let mut field = |key: &str, value: Option<&Value>| -> Result<Option<f64>, ConfigError> {
            self.optional_number(&format!("{prefix}.{key}"), value)
        };
        let target_balance = field("targetBalance", raw.target_balance.as_ref())?;
        let return_rate = field("returnRate", raw.return_rate.as_ref())?;
        let basis = field("basis", raw.basis.as_ref())?;
        let principal = field("principal", raw.principal.as_ref())?;
        let mortgage_rate = field("mortgageRate", raw.mortgage_rate.as_ref())?;
        let monthly_payment = field("monthlyPayment", raw.monthly_payment.as_ref())?;

        Ok(AccountSpec {
            name: name.to_string(),
            account_type: raw.account_type.clone(),
            balance: self.number(&format!("{prefix}.balance"), balance)?,
            target_balance,
            return_rate,
            sell_year: self.optional_year(&format!("{prefix}.sell"), raw.sell.as_ref())?,
            basis,
            principal,
            mortgage_rate,
            monthly_payment,
        })
    }
}

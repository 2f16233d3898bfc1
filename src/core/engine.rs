use tracing::{debug, warn};

use super::account::Account;
use super::error::EngineError;
use super::ledger::{BookEntry, Booking, Ledger, TaxBookEntry};
use super::types::{
    AccountBalance, BookEntrySummary, Config, EntryKind, IncomeExpenseItem, IncreaseKind,
    TaxType, YearSummary,
};

pub const TAX_RETURN_LABEL: &str = "Tax return";
pub const TAX_POST_PROCESSING_LABEL: &str = "Tax return (post processing)";
pub const REBALANCE_LABEL: &str = "Rebalance";
pub const SALE_LABEL: &str = "Sale";
pub const CAPITAL_GAINS_LABEL: &str = "Investment Gains";

const BALANCE_EPS: f64 = 1e-6;

/// Phases of one simulated year, in the only order they may run.
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
pub enum Phase {
    Init,
    IncomeExpense,
    TaxFull,
    Rebalance,
    TaxPostProcessing,
    Done,
}

impl Phase {
    fn next(self) -> Self {
        match self {
            Phase::Init => Phase::IncomeExpense,
            Phase::IncomeExpense => Phase::TaxFull,
            Phase::TaxFull => Phase::Rebalance,
            Phase::Rebalance => Phase::TaxPostProcessing,
            Phase::TaxPostProcessing | Phase::Done => Phase::Done,
        }
    }
}

/// One simulated calendar year. Owns its accounts outright; the previous
/// year is only read, never mutated.
#[derive(Debug, Clone)]
pub struct Year {
    year: i32,
    savings: String,
    accounts: Vec<Account>,
    ledger: Ledger,
    phase: Phase,
}

impl Year {
    pub fn new(year: i32) -> Self {
        Self {
            year,
            savings: String::new(),
            accounts: Vec::new(),
            ledger: Ledger::default(),
            phase: Phase::Init,
        }
    }

    /// Runs every phase of the year to completion.
    pub fn process(&mut self, config: &Config, previous: Option<&Year>) -> Result<(), EngineError> {
        self.init_accounts(config, previous)?;
        self.process_income_and_expenses(config, previous)?;
        self.tax_full(config)?;
        self.rebalance_accounts(config)?;
        self.tax_post_processing(config)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    pub fn account(&self, name: &str) -> Option<&Account> {
        self.accounts.iter().find(|account| account.name == name)
    }

    pub fn savings_account(&self) -> Option<&Account> {
        self.account(&self.savings)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn books(&self) -> &[BookEntry] {
        self.ledger.books()
    }

    pub fn tax_books(&self) -> &[TaxBookEntry] {
        self.ledger.tax_books()
    }

    pub fn net_worth(&self) -> f64 {
        self.accounts.iter().map(|account| account.balance).sum()
    }

    pub fn total_income(&self) -> f64 {
        self.ledger.total_income()
    }

    pub fn total_expenses(&self) -> f64 {
        self.ledger.total_expenses()
    }

    pub fn tax_paid(&self) -> f64 {
        self.ledger.tax_paid()
    }

    /// Entry of this year matched on label and initiating account.
    pub fn book_entry(&self, name: &str, from_account: Option<&str>) -> Option<&BookEntry> {
        self.ledger.find_from(name, from_account)
    }

    /// Last year's entry with this label, used to carry recurring amounts forward.
    pub fn previous_book_entry<'p>(previous: Option<&'p Year>, name: &str) -> Option<&'p BookEntry> {
        previous.and_then(|year| year.ledger.find(name))
    }

    /// Books an income or expense. Without an explicit account it lands in savings.
    pub fn book(&mut self, booking: Booking) -> Result<(), EngineError> {
        self.apply(booking, EntryKind::Regular)
    }

    pub fn book_tax(&mut self, amount: f64, tax_type: TaxType, name: &str) {
        debug!(year = self.year, amount, ?tax_type, name, "taxable event");
        self.ledger.record_tax(amount, tax_type, name);
    }

    pub fn init_accounts(&mut self, config: &Config, previous: Option<&Year>) -> Result<(), EngineError> {
        self.enter(Phase::Init)?;
        self.savings = config.savings_account.clone();
        self.accounts = match previous {
            Some(previous) => previous.accounts.clone(),
            None => config
                .accounts
                .iter()
                .map(Account::from_spec)
                .collect::<Result<Vec<_>, _>>()?,
        };
        if self.savings_account().is_none() {
            return Err(EngineError::invariant(
                self.year,
                format!("savings account '{}' is missing", self.savings),
            ));
        }
        Ok(())
    }

    pub fn process_income_and_expenses(
        &mut self,
        config: &Config,
        previous: Option<&Year>,
    ) -> Result<(), EngineError> {
        self.enter(Phase::IncomeExpense)?;
        self.sell_due_accounts()?;

        for item in &config.income_expenses {
            if !item.filter.applies(self.year) {
                continue;
            }
            // Inflation only compounds on a carried amount; increases apply from the first year.
            let amount = match Self::previous_book_entry(previous, &item.name) {
                Some(entry) => adjusted_amount(entry.amount, item, config.inflation, self.year),
                None => adjusted_amount(item.amount, item, 0.0, self.year),
            };
            self.book(Booking::default_account(amount, &item.name))?;
            if amount > 0.0 {
                self.book_tax(amount, TaxType::Income, &item.name);
            }
        }

        for idx in 0..self.accounts.len() {
            for booking in self.accounts[idx].process_annual() {
                self.book(booking)?;
            }
        }
        Ok(())
    }

    /// Full tax return: all pending income and capital gains.
    pub fn tax_full(&mut self, config: &Config) -> Result<(), EngineError> {
        self.enter(Phase::TaxFull)?;
        let (income, income_entries) = self.ledger.take_unprocessed(TaxType::Income);
        let (gains, gains_entries) = self.ledger.take_unprocessed(TaxType::CapitalGains);
        let tax = -config.tax_rates.tax_due(income, gains);
        debug!(
            year = self.year,
            income, income_entries, gains, gains_entries, tax, "tax return"
        );
        self.apply(Booking::default_account(tax, TAX_RETURN_LABEL), EntryKind::Tax)
    }

    /// Moves funds so that accounts with a target balance meet it. Surplus is
    /// pushed into a balancing account as is; a deficit is pulled out of one
    /// with the capital gains tax reserved in savings.
    pub fn rebalance_accounts(&mut self, config: &Config) -> Result<(), EngineError> {
        self.enter(Phase::Rebalance)?;
        let capital_gains_rate = config.tax_rates.capital_gains;

        for idx in 0..self.accounts.len() {
            let unbalanced = &self.accounts[idx];
            if unbalanced.is_mortgage() {
                continue;
            }
            let Some(mut deficit) = unbalanced.deficit() else {
                continue;
            };
            if deficit.abs() < BALANCE_EPS {
                continue;
            }
            let unbalanced_name = unbalanced.name.clone();

            for other in 0..self.accounts.len() {
                if deficit.abs() < BALANCE_EPS {
                    break;
                }
                let counterparty = &self.accounts[other];
                if other == idx
                    || counterparty.name == self.savings
                    || counterparty.is_mortgage()
                    || counterparty.is_at_target()
                    || !config.balancing_accounts.contains(&counterparty.name)
                {
                    continue;
                }
                let counterparty_name = counterparty.name.clone();

                if deficit < 0.0 {
                    self.transfer(&unbalanced_name, &counterparty_name, -deficit, REBALANCE_LABEL)?;
                    deficit = 0.0;
                } else {
                    let available = counterparty.max_net_transfer(capital_gains_rate);
                    if available < BALANCE_EPS {
                        continue;
                    }
                    let amount = deficit.min(available);
                    self.transfer_plus_tax(&counterparty_name, &unbalanced_name, amount, capital_gains_rate)?;
                    deficit -= amount;
                }
            }

            if deficit.abs() >= BALANCE_EPS {
                warn!(
                    year = self.year,
                    account = %unbalanced_name,
                    deficit,
                    "no balancing account could cover the target"
                );
            }
        }
        Ok(())
    }

    /// Second, reduced tax pass for the capital gains realised while
    /// rebalancing. Income must have been taxed already.
    pub fn tax_post_processing(&mut self, config: &Config) -> Result<(), EngineError> {
        self.enter(Phase::TaxPostProcessing)?;
        if self.ledger.has_unprocessed(TaxType::Income) {
            return Err(EngineError::invariant(
                self.year,
                "income reported after the full tax return",
            ));
        }
        let (gains, gains_entries) = self.ledger.take_unprocessed(TaxType::CapitalGains);
        if gains_entries > 0 {
            let tax = -config.tax_rates.tax_due(0.0, gains);
            debug!(year = self.year, gains, gains_entries, tax, "post processing tax");
            self.apply(
                Booking::default_account(tax, TAX_POST_PROCESSING_LABEL),
                EntryKind::Tax,
            )?;
        }
        Ok(())
    }

    pub fn summary(&self, birth_year: i32) -> YearSummary {
        YearSummary {
            year: self.year,
            age: self.year - birth_year,
            net_worth: self.net_worth(),
            total_income: self.total_income(),
            total_expenses: self.total_expenses(),
            tax_paid: self.tax_paid(),
            balances: self
                .accounts
                .iter()
                .map(|account| AccountBalance {
                    name: account.name.clone(),
                    balance: account.balance,
                })
                .collect(),
            books: self
                .books()
                .iter()
                .map(|entry| BookEntrySummary {
                    account: entry.account.clone(),
                    amount: entry.amount,
                    name: entry.name.clone(),
                    from_account: entry.from_account.clone(),
                    appreciation: entry.appreciation,
                    kind: entry.kind,
                })
                .collect(),
        }
    }

    fn enter(&mut self, phase: Phase) -> Result<(), EngineError> {
        if self.phase != phase {
            return Err(EngineError::invariant(
                self.year,
                format!("cannot run {phase:?} while in {:?}", self.phase),
            ));
        }
        self.phase = phase.next();
        Ok(())
    }

    fn apply(&mut self, booking: Booking, kind: EntryKind) -> Result<(), EngineError> {
        let year = self.year;
        let target = booking.account.unwrap_or_else(|| self.savings.clone());
        let account = self
            .accounts
            .iter_mut()
            .find(|account| account.name == target)
            .ok_or_else(|| EngineError::invariant(year, format!("unknown account '{target}'")))?;

        let realized = account.deposit(booking.amount, booking.appreciation)?;
        debug!(
            year,
            account = %target,
            amount = booking.amount,
            name = %booking.name,
            from = ?booking.from_account,
            ?kind,
            "booked"
        );
        if let Some(gain) = realized {
            self.book_tax(gain, TaxType::CapitalGains, CAPITAL_GAINS_LABEL);
        }
        self.ledger.record(BookEntry {
            account: target,
            amount: booking.amount,
            name: booking.name,
            from_account: booking.from_account,
            appreciation: booking.appreciation,
            kind,
        });
        Ok(())
    }

    /// Plain transfer; capital gains follow from the withdrawal itself.
    fn transfer(&mut self, from: &str, to: &str, amount: f64, label: &str) -> Result<(), EngineError> {
        debug!(year = self.year, from, to, amount, "transfer");
        self.apply(Booking::to(from, -amount, label).from(from), EntryKind::Transfer)?;
        self.apply(Booking::to(to, amount, label).from(from), EntryKind::Transfer)
    }

    /// Sells enough of `from` that `amount` arrives in `to` after capital
    /// gains tax; the tax share is parked in savings for the post pass.
    fn transfer_plus_tax(
        &mut self,
        from: &str,
        to: &str,
        amount: f64,
        capital_gains_rate: f64,
    ) -> Result<(), EngineError> {
        if amount < 0.0 {
            return self.transfer(from, to, amount, REBALANCE_LABEL);
        }
        let source = self
            .account(from)
            .ok_or_else(|| EngineError::invariant(self.year, format!("unknown account '{from}'")))?;
        let gross = source.gross_for_net(amount, capital_gains_rate)?;
        debug!(year = self.year, from, to, amount, gross, "transfer with tax reserve");

        self.apply(Booking::to(from, -gross, REBALANCE_LABEL).from(from), EntryKind::Transfer)?;
        self.apply(Booking::to(to, amount, REBALANCE_LABEL).from(from), EntryKind::Transfer)?;
        let reserve = gross - amount;
        if reserve.abs() >= BALANCE_EPS {
            let savings = self.savings.clone();
            self.apply(Booking::to(&savings, reserve, REBALANCE_LABEL).from(from), EntryKind::Transfer)?;
        }
        Ok(())
    }

    fn sell_due_accounts(&mut self) -> Result<(), EngineError> {
        let due: Vec<String> = self
            .accounts
            .iter()
            .filter(|account| {
                account.sell_year == Some(self.year)
                    && account.name != self.savings
                    && account.balance.abs() >= BALANCE_EPS
            })
            .map(|account| account.name.clone())
            .collect();

        for name in due {
            let balance = self.account(&name).map_or(0.0, |account| account.balance);
            let savings = self.savings.clone();
            self.transfer(&name, &savings, balance, SALE_LABEL)?;
            if let Some(account) = self.accounts.iter_mut().find(|account| account.name == name) {
                account.settle();
            }
        }
        Ok(())
    }
}

/// This year's amount of an item, grown from `base` by inflation and the
/// increases whose filter covers `year`.
fn adjusted_amount(base: f64, item: &IncomeExpenseItem, inflation: f64, year: i32) -> f64 {
    let applicable = || item.increases.iter().filter(|inc| inc.filter.applies(year));

    let mut growth = if item.inflation_adjust { inflation } else { 0.0 };
    for increase in applicable() {
        if let IncreaseKind::Percent(percent) = increase.kind {
            growth += percent;
        }
    }
    let mut amount = base * (1.0 + growth);
    for increase in applicable() {
        if let IncreaseKind::Amount(extra) = increase.kind {
            amount += extra;
        }
    }
    amount
}

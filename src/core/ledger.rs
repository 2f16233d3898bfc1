use super::types::{EntryKind, TaxType};

/// A booking that has not been applied yet. `account: None` targets the
/// savings account.
#[derive(Debug, Clone, PartialEq)]
pub struct Booking {
    pub account: Option<String>,
    pub amount: f64,
    pub name: String,
    pub from_account: Option<String>,
    pub appreciation: bool,
}

impl Booking {
    pub fn to(account: &str, amount: f64, name: &str) -> Self {
        Self {
            account: Some(account.to_string()),
            amount,
            name: name.to_string(),
            from_account: None,
            appreciation: false,
        }
    }

    pub fn default_account(amount: f64, name: &str) -> Self {
        Self {
            account: None,
            amount,
            name: name.to_string(),
            from_account: None,
            appreciation: false,
        }
    }

    pub fn appreciation(account: &str, amount: f64, name: &str) -> Self {
        Self {
            appreciation: true,
            from_account: Some(account.to_string()),
            ..Self::to(account, amount, name)
        }
    }

    pub fn from(mut self, account: &str) -> Self {
        self.from_account = Some(account.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BookEntry {
    pub account: String,
    pub amount: f64,
    pub name: String,
    pub from_account: Option<String>,
    pub appreciation: bool,
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaxBookEntry {
    pub amount: f64,
    pub tax_type: TaxType,
    pub name: String,
    processed: bool,
}

impl TaxBookEntry {
    pub fn processed(&self) -> bool {
        self.processed
    }
}

/// Append-only books of one year.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    books: Vec<BookEntry>,
    tax_books: Vec<TaxBookEntry>,
}

impl Ledger {
    pub fn books(&self) -> &[BookEntry] {
        &self.books
    }

    pub fn tax_books(&self) -> &[TaxBookEntry] {
        &self.tax_books
    }

    pub(crate) fn record(&mut self, entry: BookEntry) {
        self.books.push(entry);
    }

    pub(crate) fn record_tax(&mut self, amount: f64, tax_type: TaxType, name: &str) {
        self.tax_books.push(TaxBookEntry {
            amount,
            tax_type,
            name: name.to_string(),
            processed: false,
        });
    }

    /// First entry carrying `name`, regardless of which account initiated it.
    pub fn find(&self, name: &str) -> Option<&BookEntry> {
        self.books.iter().find(|entry| entry.name == name)
    }

    pub fn find_from(&self, name: &str, from_account: Option<&str>) -> Option<&BookEntry> {
        self.books
            .iter()
            .find(|entry| entry.name == name && entry.from_account.as_deref() == from_account)
    }

    pub fn has_unprocessed(&self, tax_type: TaxType) -> bool {
        self.tax_books
            .iter()
            .any(|entry| !entry.processed && entry.tax_type == tax_type)
    }

    /// Sums the pending entries of `tax_type` and marks them processed.
    pub(crate) fn take_unprocessed(&mut self, tax_type: TaxType) -> (f64, usize) {
        let mut total = 0.0;
        let mut count = 0;
        for entry in self
            .tax_books
            .iter_mut()
            .filter(|entry| !entry.processed && entry.tax_type == tax_type)
        {
            entry.processed = true;
            total += entry.amount;
            count += 1;
        }
        (total, count)
    }

    pub fn processed_count(&self) -> usize {
        self.tax_books.iter().filter(|entry| entry.processed).count()
    }

    fn sum_where(&self, keep: impl Fn(&BookEntry) -> bool) -> f64 {
        self.books.iter().filter(|e| keep(e)).map(|e| e.amount).sum()
    }

    pub fn total_income(&self) -> f64 {
        self.sum_where(|e| e.kind == EntryKind::Regular && e.amount > 0.0)
    }

    pub fn total_expenses(&self) -> f64 {
        self.sum_where(|e| e.kind == EntryKind::Regular && e.amount < 0.0)
    }

    pub fn tax_paid(&self) -> f64 {
        -self.sum_where(|e| e.kind == EntryKind::Tax)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, amount: f64, from: Option<&str>, kind: EntryKind) -> BookEntry {
        BookEntry {
            account: "Savings".to_string(),
            amount,
            name: name.to_string(),
            from_account: from.map(str::to_string),
            appreciation: false,
            kind,
        }
    }

    #[test]
    fn find_returns_first_match() {
        let mut ledger = Ledger::default();
        ledger.record(entry("Gains", 10.0, Some("Savings"), EntryKind::Regular));
        ledger.record(entry("Gains", 20.0, Some("Investment"), EntryKind::Regular));
        assert_eq!(ledger.find("Gains").map(|e| e.amount), Some(10.0));
        assert_eq!(
            ledger.find_from("Gains", Some("Investment")).map(|e| e.amount),
            Some(20.0)
        );
        assert!(ledger.find_from("Gains", None).is_none());
        assert!(ledger.find("Salary").is_none());
    }

    #[test]
    fn totals_split_by_kind() {
        let mut ledger = Ledger::default();
        ledger.record(entry("Salary", 5_000.0, None, EntryKind::Regular));
        ledger.record(entry("Rent", -1_200.0, None, EntryKind::Regular));
        ledger.record(entry("Tax return", -2_250.0, None, EntryKind::Tax));
        ledger.record(entry("Rebalance", 700.0, None, EntryKind::Transfer));
        ledger.record(entry("Rebalance", -700.0, None, EntryKind::Transfer));
        assert_eq!(ledger.total_income(), 5_000.0);
        assert_eq!(ledger.total_expenses(), -1_200.0);
        assert_eq!(ledger.tax_paid(), 2_250.0);
    }

    #[test]
    fn take_unprocessed_marks_each_entry_once() {
        let mut ledger = Ledger::default();
        ledger.record_tax(100.0, TaxType::Income, "Salary");
        ledger.record_tax(40.0, TaxType::CapitalGains, "Investment Gains");
        assert_eq!(ledger.take_unprocessed(TaxType::Income), (100.0, 1));
        assert_eq!(ledger.take_unprocessed(TaxType::Income), (0.0, 0));
        assert!(ledger.has_unprocessed(TaxType::CapitalGains));
        assert_eq!(ledger.take_unprocessed(TaxType::CapitalGains), (40.0, 1));
        assert_eq!(ledger.processed_count(), 2);
        assert!(ledger.tax_books().iter().all(TaxBookEntry::processed));
    }
}

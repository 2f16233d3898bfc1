//! Year-by-year report: one HTML table row per simulated year, or the same
//! data as JSON.

use crate::core::{Config, EntryKind, Projection, Year};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Income,
    Expense,
    IncomeExpense,
}

impl ColumnKind {
    fn label(self) -> &'static str {
        match self {
            ColumnKind::Income => "Income",
            ColumnKind::Expense => "Expense",
            ColumnKind::IncomeExpense => "Income/Expense",
        }
    }

    fn merge(self, other: ColumnKind) -> ColumnKind {
        if self == other { self } else { ColumnKind::IncomeExpense }
    }
}

/// One report column: a booking label together with the account that
/// initiated it, classified by the sign of every amount seen under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryColumn {
    pub name: String,
    pub from_account: Option<String>,
    pub kind: ColumnKind,
}

impl EntryColumn {
    pub fn header(&self) -> String {
        let mut header = format!("{} {}", self.kind.label(), self.name);
        if let Some(from) = &self.from_account {
            header.push_str(&format!(" (from {from})"));
        }
        header
    }
}

/// Columns in order of first appearance across all years. Transfers move
/// money between accounts and show up only in the balances.
pub fn entry_columns(years: &[Year]) -> Vec<EntryColumn> {
    let mut columns: Vec<EntryColumn> = Vec::new();
    let entries = years
        .iter()
        .flat_map(|year| year.books())
        .filter(|entry| entry.kind != EntryKind::Transfer);
    for entry in entries {
        let kind = if entry.amount > 0.0 {
            ColumnKind::Income
        } else {
            ColumnKind::Expense
        };
        match columns
            .iter_mut()
            .find(|c| c.name == entry.name && c.from_account == entry.from_account)
        {
            Some(column) => column.kind = column.kind.merge(kind),
            None => columns.push(EntryColumn {
                name: entry.name.clone(),
                from_account: entry.from_account.clone(),
                kind,
            }),
        }
    }
    columns
}

pub fn format_currency(amount: f64) -> String {
    // avoid "$-0" for values that round to zero
    let amount = if amount.abs() < 0.5 { 0.0 } else { amount };
    format!("${}", format_num::format_num!(",.0f", amount))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn cell(content: &str) -> String {
    format!("<TD>{content}</TD>")
}

fn cell_right(content: &str) -> String {
    format!("<TD style=\"text-align:right\">{content}</TD>")
}

pub fn render_html(projection: &Projection, config: &Config) -> String {
    let years = &projection.years;
    let columns = entry_columns(years);
    let final_net_worth = projection.final_net_worth();
    let color = if final_net_worth < 0.0 { "red" } else { "green" };

    let mut out = String::from("<HTML><BODY>\n");
    out.push_str(&format!(
        "<P>Final net worth: <FONT COLOR={color}>{}</FONT></P>\n",
        format_currency(final_net_worth)
    ));
    if let Some(year) = projection.insolvent_year {
        out.push_str(&format!("<P>Destitute in {year}</P>\n"));
    }
    out.push_str("<TABLE>\n<TR>");
    out.push_str("<TH>Year</TH><TH>Age</TH><TH>Net Worth</TH>");
    for account in &config.accounts {
        out.push_str(&format!(
            "<TH>Balance (Year End) {}</TH>",
            escape(&account.name)
        ));
    }
    for column in &columns {
        out.push_str(&format!("<TH>{}</TH>", escape(&column.header())));
    }
    out.push_str("<TH>Total Income</TH><TH>Total Expenses</TH></TR>\n");

    for year in years {
        out.push_str("<TR>");
        out.push_str(&cell(&year.year().to_string()));
        out.push_str(&cell(&config.age_in(year.year()).to_string()));
        out.push_str(&cell_right(&format_currency(year.net_worth())));
        for spec in &config.accounts {
            let balance = year.account(&spec.name).map_or(0.0, |a| a.balance);
            out.push_str(&cell_right(&format_currency(balance)));
        }
        for column in &columns {
            let content = year
                .book_entry(&column.name, column.from_account.as_deref())
                .map_or_else(|| "-".to_string(), |entry| format_currency(entry.amount));
            out.push_str(&cell_right(&content));
        }
        out.push_str(&cell_right(&format_currency(year.total_income())));
        out.push_str(&cell_right(&format_currency(year.total_expenses())));
        out.push_str("</TR>\n");
    }

    out.push_str("</TABLE></BODY></HTML>\n");
    out
}

pub fn render_json(projection: &Projection, config: &Config) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&projection.summary(config))
}

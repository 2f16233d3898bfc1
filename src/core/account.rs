use super::error::EngineError;
use super::ledger::Booking;
use super::types::AccountSpec;

const MONTHS_PER_YEAR: u32 = 12;
const PAID_OFF_EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub enum AccountKind {
    Basic,
    Investment {
        basis: f64,
    },
    Mortgage {
        principal: f64,
        monthly_payment: f64,
        mortgage_rate: f64,
    },
}

/// One named pool of money in a given year. Cloning produces an independent
/// snapshot, which is how a year inherits the previous year's accounts.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub name: String,
    pub balance: f64,
    pub target_balance: Option<f64>,
    pub return_rate: Option<f64>,
    pub sell_year: Option<i32>,
    pub kind: AccountKind,
}

impl Account {
    /// Account factory keyed by the configured type tag.
    pub fn from_spec(spec: &AccountSpec) -> Result<Self, EngineError> {
        if !spec.balance.is_finite() {
            return Err(EngineError::config(format!(
                "account '{}' needs a finite balance",
                spec.name
            )));
        }
        if spec.return_rate.is_some_and(|rate| rate < 0.0) {
            return Err(EngineError::config(format!(
                "returnRate of '{}' must be >= 0",
                spec.name
            )));
        }
        if spec.target_balance.is_some_and(|target| target < 0.0) {
            return Err(EngineError::config(format!(
                "targetBalance of '{}' must be >= 0",
                spec.name
            )));
        }

        let (kind, target_balance) = match spec.account_type.as_str() {
            "basic" => (AccountKind::Basic, spec.target_balance),
            "investment" => {
                let basis = spec.basis.unwrap_or(spec.balance.max(0.0));
                if basis < 0.0 {
                    return Err(EngineError::config(format!(
                        "basis of '{}' must be >= 0",
                        spec.name
                    )));
                }
                (AccountKind::Investment { basis }, spec.target_balance)
            }
            "mortgage" => mortgage_from_spec(spec)?,
            other => {
                return Err(EngineError::config(format!(
                    "account '{}' has unknown type '{other}'",
                    spec.name
                )));
            }
        };

        Ok(Self {
            name: spec.name.clone(),
            balance: spec.balance,
            target_balance,
            return_rate: spec.return_rate,
            sell_year: spec.sell_year,
            kind,
        })
    }

    pub fn basis(&self) -> Option<f64> {
        match self.kind {
            AccountKind::Investment { basis } => Some(basis),
            _ => None,
        }
    }

    pub fn principal(&self) -> Option<f64> {
        match self.kind {
            AccountKind::Mortgage { principal, .. } => Some(principal),
            _ => None,
        }
    }

    pub fn is_mortgage(&self) -> bool {
        matches!(self.kind, AccountKind::Mortgage { .. })
    }

    /// Signed distance to the target; positive means the account needs funds.
    pub fn deficit(&self) -> Option<f64> {
        self.target_balance.map(|target| target - self.balance)
    }

    pub fn is_at_target(&self) -> bool {
        self.deficit().is_some_and(|deficit| deficit.abs() < 1e-9)
    }

    /// Adjusts the balance. A non-appreciation withdrawal from an investment
    /// realises a proportional share of the unrealised gain, which is returned
    /// so the caller can record it as a taxable event.
    pub fn deposit(&mut self, amount: f64, appreciation: bool) -> Result<Option<f64>, EngineError> {
        if !amount.is_finite() {
            return Err(EngineError::domain(
                &self.name,
                format!("cannot book non-finite amount {amount}"),
            ));
        }

        let mut realized = None;
        if let (AccountKind::Investment { basis }, false) = (&mut self.kind, appreciation) {
            if amount < 0.0 {
                if self.balance <= 0.0 {
                    return Err(EngineError::domain(
                        &self.name,
                        format!(
                            "withdrawal of {} from non-positive balance {}",
                            -amount, self.balance
                        ),
                    ));
                }
                let basis_share = *basis * amount / self.balance;
                realized = Some(-amount + basis_share);
                *basis += basis_share;
            } else {
                *basis += amount;
            }
        }

        self.balance += amount;
        Ok(realized)
    }

    /// Largest net amount a tax-aware transfer can move out of this account
    /// without taking it below zero.
    pub fn max_net_transfer(&self, capital_gains_rate: f64) -> f64 {
        if self.balance <= 0.0 {
            return 0.0;
        }
        match self.kind {
            AccountKind::Investment { basis } => {
                self.balance * (1.0 - (1.0 - basis / self.balance) * capital_gains_rate)
            }
            _ => self.balance,
        }
    }

    /// Gross amount that has to be sold so that `net` remains after capital
    /// gains tax. Non-investment accounts have no tax drag.
    pub fn gross_for_net(&self, net: f64, capital_gains_rate: f64) -> Result<f64, EngineError> {
        let AccountKind::Investment { basis } = self.kind else {
            return Ok(net);
        };
        if self.balance <= 0.0 {
            return Err(EngineError::domain(
                &self.name,
                format!("cannot sell from non-positive balance {}", self.balance),
            ));
        }
        let divisor = 1.0 - (1.0 - basis / self.balance) * capital_gains_rate;
        if divisor <= 0.0 {
            return Err(EngineError::domain(
                &self.name,
                format!("capital gains rate {capital_gains_rate} leaves nothing after tax"),
            ));
        }
        Ok(net / divisor)
    }

    /// Annual self-processing: growth for asset accounts, payments for
    /// mortgages. Returns the bookings to apply; mortgage principal is
    /// updated here.
    pub fn process_annual(&mut self) -> Vec<Booking> {
        match &mut self.kind {
            AccountKind::Basic | AccountKind::Investment { .. } => match self.return_rate {
                Some(rate) if rate > 0.0 => vec![Booking::appreciation(
                    &self.name,
                    self.balance * rate,
                    "Gains",
                )],
                _ => Vec::new(),
            },
            AccountKind::Mortgage {
                principal,
                monthly_payment,
                mortgage_rate,
            } => {
                let (principal_paid, paid) =
                    amortize_year(principal, *monthly_payment, *mortgage_rate);
                if paid <= 0.0 {
                    return Vec::new();
                }
                vec![
                    Booking::to(&self.name, principal_paid, "Mortgage Principal Reduction")
                        .from(&self.name),
                    Booking::default_account(-paid, "Mortgage Payment").from(&self.name),
                ]
            }
        }
    }

    /// Marks a mortgage as settled after its balance was paid off by a sale.
    pub fn settle(&mut self) {
        if let AccountKind::Mortgage { principal, .. } = &mut self.kind {
            *principal = 0.0;
        }
    }
}

fn mortgage_from_spec(spec: &AccountSpec) -> Result<(AccountKind, Option<f64>), EngineError> {
    if spec.target_balance.is_some_and(|target| target != 0.0) {
        return Err(EngineError::config(format!(
            "mortgage '{}' must have a target balance of 0",
            spec.name
        )));
    }
    let Some(monthly_payment) = spec.monthly_payment.filter(|p| *p > 0.0) else {
        return Err(EngineError::config(format!(
            "mortgage '{}' needs a monthlyPayment > 0",
            spec.name
        )));
    };
    let Some(mortgage_rate) = spec.mortgage_rate.filter(|r| *r > 0.0) else {
        return Err(EngineError::config(format!(
            "mortgage '{}' needs a mortgageRate > 0",
            spec.name
        )));
    };
    let principal = spec.principal.unwrap_or(-spec.balance);
    if principal < 0.0 {
        return Err(EngineError::config(format!(
            "principal of mortgage '{}' must be >= 0",
            spec.name
        )));
    }
    if principal * mortgage_rate / MONTHS_PER_YEAR as f64 >= monthly_payment {
        return Err(EngineError::config(format!(
            "monthlyPayment of mortgage '{}' does not cover the interest",
            spec.name
        )));
    }

    Ok((
        AccountKind::Mortgage {
            principal,
            monthly_payment,
            mortgage_rate,
        },
        Some(0.0),
    ))
}

/// Runs twelve monthly payments against `principal`, stopping once it is
/// paid off. Returns (principal repaid, total paid).
fn amortize_year(principal: &mut f64, monthly_payment: f64, annual_rate: f64) -> (f64, f64) {
    let monthly_rate = annual_rate / MONTHS_PER_YEAR as f64;
    let mut principal_paid = 0.0;
    let mut paid = 0.0;
    for _ in 0..MONTHS_PER_YEAR {
        if *principal <= PAID_OFF_EPS {
            *principal = 0.0;
            break;
        }
        let interest = *principal * monthly_rate;
        let payment = monthly_payment.min(*principal + interest);
        let reduction = payment - interest;
        *principal -= reduction;
        principal_paid += reduction;
        paid += payment;
    }
    if *principal <= PAID_OFF_EPS {
        *principal = 0.0;
    }
    (principal_paid, paid)
}

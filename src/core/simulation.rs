use tracing::{info, warn};

use super::engine::Year;
use super::error::EngineError;
use super::types::{Config, ProjectionSummary};

/// Result of a projection: one processed year per simulated calendar year,
/// cut short at the first year that ends with negative net worth.
#[derive(Debug, Clone)]
pub struct Projection {
    pub years: Vec<Year>,
    pub insolvent_year: Option<i32>,
}

impl Projection {
    pub fn final_net_worth(&self) -> f64 {
        self.years.last().map_or(0.0, Year::net_worth)
    }

    pub fn summary(&self, config: &Config) -> ProjectionSummary {
        ProjectionSummary {
            start_year: config.start_year,
            end_year: self.years.last().map_or(config.start_year, Year::year),
            final_net_worth: self.final_net_worth(),
            insolvent_year: self.insolvent_year,
            years: self
                .years
                .iter()
                .map(|year| year.summary(config.birth_year))
                .collect(),
        }
    }
}

/// Simulates `start_year..=end_year`, each year seeded from the previous one.
pub fn run_projection(config: &Config) -> Result<Projection, EngineError> {
    config.validate()?;
    info!(
        start_year = config.start_year,
        end_year = config.end_year,
        accounts = config.accounts.len(),
        items = config.income_expenses.len(),
        "starting projection"
    );

    let capacity = usize::try_from(config.end_year - config.start_year + 1).unwrap_or(0);
    let mut years: Vec<Year> = Vec::with_capacity(capacity);
    let mut insolvent_year = None;

    for year_number in config.start_year..=config.end_year {
        let mut year = Year::new(year_number);
        year.process(config, years.last())?;
        let net_worth = year.net_worth();
        info!(
            year = year_number,
            age = config.age_in(year_number),
            net_worth,
            tax_paid = year.tax_paid(),
            "year processed"
        );
        years.push(year);

        if net_worth < 0.0 {
            warn!(year = year_number, net_worth, "net worth went negative, stopping");
            insolvent_year = Some(year_number);
            break;
        }
    }

    Ok(Projection {
        years,
        insolvent_year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{AccountSpec, IncomeExpenseItem, TaxRates, YearFilter};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn item(name: &str, amount: f64) -> IncomeExpenseItem {
        IncomeExpenseItem {
            name: name.to_string(),
            amount,
            filter: YearFilter::default(),
            inflation_adjust: false,
            increases: Vec::new(),
        }
    }

    fn config(start_year: i32, end_year: i32) -> Config {
        let mut savings = AccountSpec::basic("Savings", 10_000.0);
        savings.target_balance = Some(5_000.0);
        let mut investment = AccountSpec::basic("Investment", 20_000.0);
        investment.account_type = "investment".to_string();
        investment.basis = Some(15_000.0);
        Config {
            inflation: 0.0,
            birth_year: 1980,
            start_year,
            end_year,
            tax_rates: TaxRates::default(),
            savings_account: "Savings".to_string(),
            balancing_accounts: vec!["Investment".to_string()],
            income_expenses: vec![item("Salary", 5_000.0)],
            accounts: vec![savings, investment],
        }
    }

    #[test]
    fn single_year_scenario_matches_hand_computation() {
        let config = config(2025, 2025);
        let projection = run_projection(&config).expect("projection");
        assert_eq!(projection.years.len(), 1);
        assert_eq!(projection.insolvent_year, None);
        assert_approx(projection.final_net_worth(), 32_750.0);
    }

    #[test]
    fn horizon_is_inclusive() {
        let config = config(2025, 2027);
        let projection = run_projection(&config).expect("projection");
        let years: Vec<i32> = projection.years.iter().map(Year::year).collect();
        assert_eq!(years, vec![2025, 2026, 2027]);
        assert_approx(projection.final_net_worth(), 32_750.0 + 2.0 * 2_750.0);

        let summary = projection.summary(&config);
        assert_eq!(summary.end_year, 2027);
        assert_eq!(summary.years[0].age, 45);
        assert_eq!(summary.years[2].balances.len(), 2);
    }

    #[test]
    fn stops_after_first_insolvent_year() {
        let mut config = config(2025, 2060);
        config.accounts = vec![AccountSpec::basic("Savings", 1_000.0)];
        config.balancing_accounts.clear();
        config.income_expenses = vec![item("Rent", -600.0)];

        let projection = run_projection(&config).expect("projection");
        assert_eq!(projection.years.len(), 2);
        assert_eq!(projection.insolvent_year, Some(2026));
        assert_approx(projection.years[0].net_worth(), 400.0);
        assert_approx(projection.final_net_worth(), -200.0);
    }

    #[test]
    fn invalid_config_is_rejected_before_running() {
        let mut config = config(2025, 2030);
        config.savings_account = "Checking".to_string();
        assert!(matches!(
            run_projection(&config),
            Err(EngineError::ConfigInvalid(_))
        ));

        let reversed = self::config(2030, 2025);
        assert!(run_projection(&reversed).is_err());
    }

    #[test]
    fn horizon_longer_than_the_cap_is_rejected() {
        let too_long = config(2025, 2025 + 500);
        assert!(matches!(
            run_projection(&too_long),
            Err(EngineError::ConfigInvalid(msg)) if msg.contains("years")
        ));

        let far_end = config(2025, i32::MAX);
        assert!(matches!(
            run_projection(&far_end),
            Err(EngineError::ConfigInvalid(_))
        ));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_only_the_last_year_may_be_insolvent(
            savings in 0u32..50_000,
            rent in 0u32..20_000,
            salary in 0u32..15_000,
            years in 1i32..30,
        ) {
            let mut config = config(2025, 2025 + years - 1);
            config.accounts = vec![AccountSpec::basic("Savings", savings as f64)];
            config.balancing_accounts.clear();
            config.income_expenses = vec![
                item("Salary", salary as f64),
                item("Rent", -(rent as f64)),
            ];

            let projection = run_projection(&config).expect("projection");
            let (last, earlier) = projection.years.split_last().expect("at least one year");
            prop_assert!(earlier.iter().all(|year| year.net_worth() >= 0.0));
            match projection.insolvent_year {
                Some(year) => {
                    prop_assert_eq!(year, last.year());
                    prop_assert!(last.net_worth() < 0.0);
                }
                None => prop_assert_eq!(projection.years.len(), years as usize),
            }
        }
    }
}

//! Built-in rules.

mod curfew;
mod financial;
mod injection;
mod location;
mod pii;

pub use curfew::NightCurfewRule;
pub use financial::FinancialRule;
pub use injection::PromptInjectionRule;
pub use location::SensitiveLocationRule;
pub use pii::PiiRule;

use regex_lite::Regex;

use crate::RuleError;

fn compile(rule: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|e| RuleError::InvalidPattern {
        rule: rule.to_string(),
        detail: e.to_string(),
    })
}

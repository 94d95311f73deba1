//! Personal data detection.
//!
//! Looks for identity documents and payment cards in the user's text and in
//! the most recent tool output. A hit blocks whatever transition is being
//! proposed; the reason never repeats the number.

use regex_lite::Regex;

use super::compile;
use crate::model::{mask, Rule, RuleContext, RuleDecision, Transition};
use crate::RuleError;

const ID: &str = "pii";

/// Mainland resident ID: region, birth date, sequence, check digit.
const NATIONAL_ID: &str =
    r"\b[1-9]\d{5}(?:18|19|20)\d{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12]\d|3[01])\d{3}[\dXx]\b";
/// 13 to 19 digits, optionally grouped with spaces or dashes.
const CARD: &str = r"\b\d(?:[ -]?\d){12,18}\b";
const PASSPORT: &str = r"\b[EGDSP][A-Z]?\d{7,8}\b";
const PASSPORT_KEYWORD: &str = r"(?i)(?:passport|护照)[^A-Za-z0-9]{0,6}([A-Za-z0-9]{6,9})";

pub struct PiiRule {
    national_id: Regex,
    card: Regex,
    passport: Regex,
    passport_keyword: Regex,
}

impl PiiRule {
    pub fn new() -> Result<Self, RuleError> {
        Ok(Self {
            national_id: compile(ID, NATIONAL_ID)?,
            card: compile(ID, CARD)?,
            passport: compile(ID, PASSPORT)?,
            passport_keyword: compile(ID, PASSPORT_KEYWORD)?,
        })
    }

    fn scan(&self, text: &str) -> Option<(&'static str, String)> {
        if let Some(m) = self.national_id.find(text) {
            return Some(("身份证号", m.as_str().to_string()));
        }
        for m in self.card.find_iter(text) {
            let digits: String = m.as_str().chars().filter(char::is_ascii_digit).collect();
            if luhn_valid(&digits) {
                return Some(("银行卡号", digits));
            }
        }
        if let Some(m) = self.passport.find(text) {
            return Some(("护照号", m.as_str().to_string()));
        }
        if let Some(caps) = self.passport_keyword.captures(text) {
            if let Some(number) = caps.get(1) {
                if number.as_str().chars().any(|c| c.is_ascii_digit()) {
                    return Some(("护照号", number.as_str().to_string()));
                }
            }
        }
        None
    }
}

impl Rule for PiiRule {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Blocks messages carrying identity document or payment card numbers"
    }

    fn applies_to(&self, _transition: &Transition) -> bool {
        true
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleDecision {
        for text in ctx.scanned_texts() {
            if let Some((kind, found)) = self.scan(text) {
                return RuleDecision::block(
                    ID,
                    format!("检测到{kind}等敏感个人信息，请勿在对话中发送，本次操作已拦截"),
                )
                .with_evidence(mask(&found));
            }
        }
        RuleDecision::pass(ID)
    }
}

fn luhn_valid(digits: &str) -> bool {
    if !(13..=19).contains(&digits.len()) {
        return false;
    }
    let sum: u32 = digits
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{ctx, noon, state};
    use crate::Verdict;
    use waypoint_core::NodeId;

    #[test]
    fn national_id_blocks_every_transition() {
        let rule = PiiRule::new().unwrap();
        let state = state();
        let text = "我的身份证号是110101199003071234，帮我订票";
        for node in NodeId::ALL {
            let transition = Transition::new(NodeId::Sentinel, node);
            assert!(rule.applies_to(&transition));
            let d = rule.evaluate(&ctx(node, &state, text, noon()));
            assert_eq!(d.verdict, Verdict::Block, "{node}");
            assert!(!d.reason.contains("110101199003071234"));
            assert_eq!(d.evidence.as_deref(), Some("110*************34"));
        }
    }

    #[test]
    fn luhn_valid_card_blocks() {
        let rule = PiiRule::new().unwrap();
        let state = state();
        let d = rule.evaluate(&ctx(NodeId::PayFlight, &state, "卡号 4111 1111 1111 1111", noon()));
        assert_eq!(d.verdict, Verdict::Block);
        assert!(d.reason.contains("银行卡号"));
    }

    #[test]
    fn luhn_invalid_digit_run_passes() {
        let rule = PiiRule::new().unwrap();
        let state = state();
        let d = rule.evaluate(&ctx(NodeId::PayFlight, &state, "订单 4111111111111112", noon()));
        assert!(d.is_pass());
    }

    #[test]
    fn passport_numbers_block() {
        let rule = PiiRule::new().unwrap();
        let state = state();
        for text in ["护照号码 E12345678", "passport: K1234567"] {
            let d = rule.evaluate(&ctx(NodeId::SelectFlight, &state, text, noon()));
            assert_eq!(d.verdict, Verdict::Block, "{text}");
        }
    }

    #[test]
    fn ordinary_booking_text_passes() {
        let rule = PiiRule::new().unwrap();
        let state = state();
        for text in ["F1", "选 H2", "下周五从上海去东京", "预算 5000 元", "MU523 航班"] {
            let d = rule.evaluate(&ctx(NodeId::SelectFlight, &state, text, noon()));
            assert!(d.is_pass(), "{text}");
        }
    }

    #[test]
    fn tool_output_is_scanned_too() {
        let rule = PiiRule::new().unwrap();
        let mut state = state();
        state.last_tool_output = Some(r#"{"holder_id":"110101199003071234"}"#.into());
        let d = rule.evaluate(&ctx(NodeId::PayHotel, &state, "确认", noon()));
        assert_eq!(d.verdict, Verdict::Block);
    }

    #[test]
    fn luhn_checks() {
        assert!(luhn_valid("4111111111111111"));
        assert!(luhn_valid("5500000000000004"));
        assert!(!luhn_valid("1234567890123"));
        assert!(!luhn_valid("411111"));
    }
}

//! Payment preconditions and large-amount review.

use crate::model::{Rule, RuleContext, RuleDecision, Transition};

const ID: &str = "financial_transaction";

/// Guards `pay_flight` and `pay_hotel`.
///
/// A payment needs a locked selection. A leg that is already paid passes so
/// the payment node can replay its receipt. Above the threshold the user
/// must confirm.
pub struct FinancialRule {
    review_threshold: Option<u32>,
}

impl FinancialRule {
    pub fn new(review_threshold: Option<u32>) -> Self {
        Self { review_threshold }
    }
}

impl Rule for FinancialRule {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Requires a locked selection before payment and reviews large amounts"
    }

    fn applies_to(&self, transition: &Transition) -> bool {
        transition.to.is_payment()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleDecision {
        let Some(leg) = ctx.transition.to.leg() else {
            return RuleDecision::pass(ID);
        };
        let booking = ctx.state.booking.leg(leg);
        if booking.is_paid() {
            return RuleDecision::pass(ID);
        }
        let Some(selection) = booking.selection().filter(|_| booking.is_locked()) else {
            return RuleDecision::block(
                ID,
                format!("尚未锁定{}，请先选择{}再支付", leg.label(), leg.label()),
            );
        };
        match self.review_threshold {
            Some(limit) if selection.price > limit => RuleDecision::review(
                ID,
                format!(
                    "{} {} 金额 ¥{} 超过 ¥{}，请确认是否继续支付",
                    leg.label(),
                    selection.token,
                    selection.price,
                    limit
                ),
            )
            .with_evidence(format!("{}", selection.price)),
            _ => RuleDecision::pass(ID),
        }
    }
}

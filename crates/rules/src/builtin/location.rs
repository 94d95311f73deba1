//! Destination denylist.

use waypoint_core::geo;

use crate::model::{Rule, RuleContext, RuleDecision, Transition};

const ID: &str = "sensitive_location";

/// Blocks selections and payments for trips to configured destinations.
///
/// Entries are matched on the canonical city name when the gazetteer knows
/// them, so `东京`, `Tokyo` and `tokyo` all deny the same trip.
pub struct SensitiveLocationRule {
    denied: Vec<String>,
}

impl SensitiveLocationRule {
    pub fn new(locations: &[String]) -> Self {
        let denied = locations
            .iter()
            .map(|l| normalize(l))
            .filter(|l| !l.is_empty())
            .collect();
        Self { denied }
    }
}

fn normalize(name: &str) -> String {
    match geo::resolve(name) {
        Some(city) => city.name.to_lowercase(),
        None => name.trim().to_lowercase(),
    }
}

impl Rule for SensitiveLocationRule {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Blocks bookings for destinations on the denylist"
    }

    fn applies_to(&self, transition: &Transition) -> bool {
        transition.to.is_gated()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleDecision {
        let Some(destination) = ctx.state.slots.destination.as_deref() else {
            return RuleDecision::pass(ID);
        };
        if self.denied.contains(&normalize(destination)) {
            return RuleDecision::block(ID, format!("目的地「{destination}」暂不支持预订"));
        }
        RuleDecision::pass(ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{ctx, noon, state};
    use crate::Verdict;
    use waypoint_core::NodeId;

    #[test]
    fn denied_destination_blocks_in_any_spelling() {
        let rule = SensitiveLocationRule::new(&["东京".to_string()]);
        let mut state = state();
        state.slots.destination = Some("Tokyo".into());
        let d = rule.evaluate(&ctx(NodeId::SelectHotel, &state, "H1", noon()));
        assert_eq!(d.verdict, Verdict::Block);
        assert!(d.reason.contains("Tokyo"));
    }

    #[test]
    fn other_destinations_pass() {
        let rule = SensitiveLocationRule::new(&["Pyongyang".to_string(), " ".to_string()]);
        let mut state = state();
        assert!(rule.evaluate(&ctx(NodeId::PayFlight, &state, "", noon())).is_pass());
        state.slots.destination = Some("Osaka".into());
        assert!(rule.evaluate(&ctx(NodeId::PayFlight, &state, "", noon())).is_pass());
    }

    #[test]
    fn only_gated_transitions() {
        let rule = SensitiveLocationRule::new(&["Tokyo".to_string()]);
        assert!(rule.applies_to(&Transition::new(NodeId::Sentinel, NodeId::PayHotel)));
        assert!(!rule.applies_to(&Transition::new(NodeId::IntentRouter, NodeId::Plan)));
    }
}

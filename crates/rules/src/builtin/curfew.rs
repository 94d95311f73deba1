//! Overnight booking freeze.

use chrono::{FixedOffset, Timelike};
use waypoint_config::CurfewConfig;
use waypoint_core::clock::offset_from_hours;

use crate::model::{Rule, RuleContext, RuleDecision, Transition};
use crate::RuleError;

const ID: &str = "night_curfew";

/// Blocks selections and payments during a local-time window.
///
/// The window is `[start_hour, end_hour)` and may wrap midnight. Equal hours
/// mean an empty window. An active override lets everything through.
pub struct NightCurfewRule {
    start_hour: u32,
    end_hour: u32,
    offset: FixedOffset,
    override_active: bool,
}

impl NightCurfewRule {
    pub fn new(
        start_hour: u32,
        end_hour: u32,
        offset: FixedOffset,
        override_active: bool,
    ) -> Result<Self, RuleError> {
        if start_hour > 23 || end_hour > 23 {
            return Err(RuleError::InvalidConfig(format!(
                "curfew hours must be 0-23, got {start_hour}-{end_hour}"
            )));
        }
        Ok(Self {
            start_hour,
            end_hour,
            offset,
            override_active,
        })
    }

    pub fn from_config(config: &CurfewConfig, utc_offset_hours: i32) -> Result<Self, RuleError> {
        Self::new(
            config.start_hour,
            config.end_hour,
            offset_from_hours(utc_offset_hours),
            config.override_active,
        )
    }

    fn in_window(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

impl Rule for NightCurfewRule {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Freezes selections and payments overnight"
    }

    fn applies_to(&self, transition: &Transition) -> bool {
        transition.to.is_selection() || transition.to.is_payment()
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> RuleDecision {
        if self.override_active {
            return RuleDecision::pass(ID);
        }
        let hour = ctx.now.with_timezone(&self.offset).hour();
        if self.in_window(hour) {
            return RuleDecision::block(
                ID,
                format!(
                    "{:02}:00 至 {:02}:00 暂停预订和支付，请稍后再试",
                    self.start_hour, self.end_hour
                ),
            );
        }
        RuleDecision::pass(ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{ctx, noon, state};
    use crate::Verdict;
    use chrono::{TimeZone, Utc};
    use waypoint_core::NodeId;

    fn rule(override_active: bool) -> NightCurfewRule {
        NightCurfewRule::new(23, 6, offset_from_hours(8), override_active).unwrap()
    }

    #[test]
    fn blocks_inside_wrapped_window() {
        let state = state();
        // 23:30 and 02:00 at UTC+8
        for now in [
            Utc.with_ymd_and_hms(2026, 10, 19, 15, 30, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap(),
        ] {
            let d = rule(false).evaluate(&ctx(NodeId::PayFlight, &state, "", now));
            assert_eq!(d.verdict, Verdict::Block, "{now}");
        }
    }

    #[test]
    fn window_end_is_exclusive() {
        let state = state();
        // 06:00 at UTC+8
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 22, 0, 0).unwrap();
        assert!(rule(false).evaluate(&ctx(NodeId::SelectFlight, &state, "", now)).is_pass());
        assert!(rule(false).evaluate(&ctx(NodeId::SelectFlight, &state, "", noon())).is_pass());
    }

    #[test]
    fn override_lets_through() {
        let state = state();
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 18, 0, 0).unwrap();
        assert!(rule(true).evaluate(&ctx(NodeId::PayHotel, &state, "", now)).is_pass());
    }

    #[test]
    fn daytime_window_does_not_wrap() {
        let r = NightCurfewRule::new(9, 17, offset_from_hours(0), false).unwrap();
        assert!(r.in_window(9));
        assert!(r.in_window(16));
        assert!(!r.in_window(17));
        assert!(!r.in_window(3));
        let empty = NightCurfewRule::new(5, 5, offset_from_hours(0), false).unwrap();
        assert!((0..24).all(|h| !empty.in_window(h)));
    }

    #[test]
    fn rejects_out_of_range_hours() {
        assert!(matches!(
            NightCurfewRule::new(24, 6, offset_from_hours(8), false),
            Err(RuleError::InvalidConfig(_))
        ));
    }

    #[test]
    fn applies_to_gated_moves_only() {
        let r = rule(false);
        assert!(r.applies_to(&Transition::new(NodeId::Sentinel, NodeId::SelectHotel)));
        assert!(r.applies_to(&Transition::new(NodeId::Sentinel, NodeId::PayFlight)));
        assert!(!r.applies_to(&Transition::new(NodeId::IntentRouter, NodeId::SearchFlight)));
    }
}

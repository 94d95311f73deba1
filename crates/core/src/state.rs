//! Conversation state: the persisted, thread-scoped record of one booking
//! dialogue.
//!
//! Booking legs keep their fields private. The only way to lock or pay a leg
//! is through [`ConversationState::lock_option`] and
//! [`ConversationState::settle`], which is what keeps `paid => locked` and
//! `locked => drawn from the presented list` true for every reachable state.
//! Deserialization re-checks the same invariants, so a tampered record is
//! rejected at load time instead of flowing into the graph.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::StateError;
use crate::node::NodeId;

/// Maximum number of history turns kept per thread.
const MAX_HISTORY: usize = 200;

/// One of the two bookable legs of a trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Flight,
    Hotel,
}

impl Leg {
    /// Prefix of the short tokens presented to the user (`F1`, `H2`).
    pub fn token_prefix(&self) -> char {
        match self {
            Self::Flight => 'F',
            Self::Hotel => 'H',
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Flight => "机票",
            Self::Hotel => "酒店",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flight => f.write_str("flight"),
            Self::Hotel => f.write_str("hotel"),
        }
    }
}

// ── Slots ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Origin,
    Destination,
    Date,
}

impl SlotName {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Origin => "出发城市",
            Self::Destination => "目的地",
            Self::Date => "出发日期",
        }
    }
}

/// The three parameters a trip needs before planning can start.
///
/// Cities are stored by canonical English name; the date is absolute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
}

impl Slots {
    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.destination.is_none() && self.date.is_none()
    }

    pub fn missing(&self) -> Vec<SlotName> {
        let mut missing = Vec::new();
        if self.origin.is_none() {
            missing.push(SlotName::Origin);
        }
        if self.destination.is_none() {
            missing.push(SlotName::Destination);
        }
        if self.date.is_none() {
            missing.push(SlotName::Date);
        }
        missing
    }
}

// ── Presented options & booking legs ──────────────────────────────────────

/// An option shown to the user under a short token such as `F2`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentedOption {
    pub token: String,
    pub title: String,
    /// Price in CNY.
    pub price: u32,
    #[serde(default)]
    pub detail: serde_json::Value,
}

/// The most recently presented option lists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Presented {
    #[serde(default)]
    pub flights: Vec<PresentedOption>,
    #[serde(default)]
    pub hotels: Vec<PresentedOption>,
}

impl Presented {
    pub fn options(&self, leg: Leg) -> &[PresentedOption] {
        match leg {
            Leg::Flight => &self.flights,
            Leg::Hotel => &self.hotels,
        }
    }

    fn set(&mut self, leg: Leg, options: Vec<PresentedOption>) {
        match leg {
            Leg::Flight => self.flights = options,
            Leg::Hotel => self.hotels = options,
        }
    }

    fn clear(&mut self) {
        self.flights.clear();
        self.hotels.clear();
    }
}

/// Progress of one leg.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LegRecord")]
pub struct LegBooking {
    selection: Option<PresentedOption>,
    locked: bool,
    paid: bool,
    order_id: Option<String>,
    skipped: bool,
}

/// Outcome of settling a leg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub order_id: String,
    /// True when the leg was already paid and nothing was charged.
    pub replayed: bool,
}

impl LegBooking {
    pub fn selection(&self) -> Option<&PresentedOption> {
        self.selection.as_ref()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn is_paid(&self) -> bool {
        self.paid
    }

    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    /// Paid or explicitly skipped.
    pub fn is_done(&self) -> bool {
        self.paid || self.skipped
    }

    fn lock(&mut self, leg: Leg, option: PresentedOption) -> Result<(), StateError> {
        if self.paid {
            return Err(StateError::AlreadyPaid(leg));
        }
        self.selection = Some(option);
        self.locked = true;
        self.skipped = false;
        Ok(())
    }

    fn settle(
        &mut self,
        leg: Leg,
        make_order_id: impl FnOnce() -> String,
    ) -> Result<Settlement, StateError> {
        if self.paid {
            let order_id = self.order_id.clone().unwrap_or_default();
            return Ok(Settlement {
                order_id,
                replayed: true,
            });
        }
        if !self.locked {
            return Err(StateError::NotLocked(leg));
        }
        let order_id = make_order_id();
        self.paid = true;
        self.order_id = Some(order_id.clone());
        Ok(Settlement {
            order_id,
            replayed: false,
        })
    }

    /// Drop an unpaid lock. Paid legs are never touched.
    fn release(&mut self) {
        if !self.paid {
            self.selection = None;
            self.locked = false;
        }
    }

    fn skip(&mut self, leg: Leg) -> Result<(), StateError> {
        if self.paid {
            return Err(StateError::AlreadyPaid(leg));
        }
        self.release();
        self.skipped = true;
        Ok(())
    }
}

/// Wire form of [`LegBooking`], validated on the way in.
#[derive(Deserialize)]
struct LegRecord {
    #[serde(default)]
    selection: Option<PresentedOption>,
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    paid: bool,
    #[serde(default)]
    order_id: Option<String>,
    #[serde(default)]
    skipped: bool,
}

impl TryFrom<LegRecord> for LegBooking {
    type Error = String;

    fn try_from(r: LegRecord) -> Result<Self, Self::Error> {
        if r.paid && !r.locked {
            return Err("leg marked paid without a lock".into());
        }
        if r.locked && r.selection.is_none() {
            return Err("leg marked locked without a selection".into());
        }
        if r.paid && r.order_id.is_none() {
            return Err("paid leg has no order id".into());
        }
        Ok(Self {
            selection: r.selection,
            locked: r.locked,
            paid: r.paid,
            order_id: r.order_id,
            skipped: r.skipped,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    #[serde(default)]
    pub flight: LegBooking,
    #[serde(default)]
    pub hotel: LegBooking,
}

impl Booking {
    pub fn leg(&self, leg: Leg) -> &LegBooking {
        match leg {
            Leg::Flight => &self.flight,
            Leg::Hotel => &self.hotel,
        }
    }

    fn leg_mut(&mut self, leg: Leg) -> &mut LegBooking {
        match leg {
            Leg::Flight => &mut self.flight,
            Leg::Hotel => &mut self.hotel,
        }
    }
}

// ── Plans ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Economy,
    Luxury,
    Family,
}

impl PlanTier {
    pub const ALL: [PlanTier; 3] = [PlanTier::Economy, PlanTier::Luxury, PlanTier::Family];

    pub fn token(&self) -> &'static str {
        match self {
            Self::Economy => "P1",
            Self::Luxury => "P2",
            Self::Family => "P3",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Economy => "经济实惠",
            Self::Luxury => "奢华享受",
            Self::Family => "亲子家庭",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOption {
    pub token: String,
    pub tier: PlanTier,
    pub title: String,
    /// Estimated total in CNY.
    pub price_estimate: u32,
    pub days: u32,
    pub itinerary: Vec<String>,
}

// ── History, pending confirmations, flags ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    pub at: DateTime<Utc>,
}

/// A gated transition paused by a REVIEW verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingTransition {
    pub target: NodeId,
    /// Rules whose REVIEW the user has been asked to confirm.
    pub acknowledged: Vec<String>,
    pub reason: String,
    pub requested_at: DateTime<Utc>,
}

/// A non-PASS rule outcome remembered on the thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityFlag {
    pub rule_id: String,
    pub verdict: String,
    pub node: NodeId,
    pub reason: String,
    pub at: DateTime<Utc>,
}

// ── ConversationState ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub thread_id: String,
    #[serde(default)]
    pub slots: Slots,
    #[serde(default)]
    pub booking: Booking,
    #[serde(default)]
    pub presented: Presented,
    #[serde(default)]
    pub plan_options: Vec<PlanOption>,
    #[serde(default)]
    pub chosen_plan: Option<PlanTier>,
    #[serde(default)]
    pub history: Vec<Turn>,
    #[serde(default)]
    pub current_node: Option<NodeId>,
    #[serde(default)]
    pub pending: Option<PendingTransition>,
    #[serde(default)]
    pub security_flags: Vec<SecurityFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tool_output: Option<String>,
    /// Sequence number of the last event emitted on this thread.
    #[serde(default)]
    pub event_cursor: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    pub fn new(thread_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            thread_id: thread_id.into(),
            slots: Slots::default(),
            booking: Booking::default(),
            presented: Presented::default(),
            plan_options: Vec::new(),
            chosen_plan: None,
            history: Vec::new(),
            current_node: None,
            pending: None,
            security_flags: Vec::new(),
            last_tool_output: None,
            event_cursor: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn push_turn(
        &mut self,
        role: TurnRole,
        content: impl Into<String>,
        node: Option<NodeId>,
        at: DateTime<Utc>,
    ) {
        if self.history.len() >= MAX_HISTORY {
            self.history.drain(..MAX_HISTORY / 10);
        }
        self.history.push(Turn {
            role,
            content: content.into(),
            node,
            at,
        });
    }

    /// Replace the presented list for a leg. An unpaid lock on that leg is
    /// released because its provenance is no longer on screen.
    pub fn present(&mut self, leg: Leg, options: Vec<PresentedOption>) {
        self.presented.set(leg, options);
        self.booking.leg_mut(leg).release();
    }

    /// Lock the `index`-th (1-based) option of the most recent list.
    pub fn lock_option(&mut self, leg: Leg, index: usize) -> Result<&PresentedOption, StateError> {
        let options = self.presented.options(leg);
        if options.is_empty() {
            return Err(StateError::NothingPresented(leg));
        }
        if index == 0 || index > options.len() {
            return Err(StateError::OptionOutOfRange {
                leg,
                index,
                available: options.len(),
            });
        }
        let option = options[index - 1].clone();
        let booking = self.booking.leg_mut(leg);
        booking.lock(leg, option)?;
        booking
            .selection
            .as_ref()
            .ok_or(StateError::NotLocked(leg))
    }

    /// Pay for the locked selection. Paying twice returns the first order id.
    pub fn settle(
        &mut self,
        leg: Leg,
        make_order_id: impl FnOnce() -> String,
    ) -> Result<Settlement, StateError> {
        self.booking.leg_mut(leg).settle(leg, make_order_id)
    }

    pub fn skip(&mut self, leg: Leg) -> Result<(), StateError> {
        self.booking.leg_mut(leg).skip(leg)
    }

    /// Forget plans and unpaid selections after the trip parameters changed.
    /// Paid legs survive.
    pub fn invalidate_plans(&mut self) {
        self.plan_options.clear();
        self.chosen_plan = None;
        self.presented.clear();
        self.booking.flight.release();
        self.booking.hotel.release();
    }

    /// Whether the user has started the booking track on this thread.
    pub fn in_booking_track(&self) -> bool {
        !self.slots.is_empty()
            || !self.plan_options.is_empty()
            || self.booking.flight.is_locked()
            || self.booking.hotel.is_locked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(token: &str, price: u32) -> PresentedOption {
        PresentedOption {
            token: token.into(),
            title: format!("option {token}"),
            price,
            detail: serde_json::Value::Null,
        }
    }

    fn state_with_flights() -> ConversationState {
        let mut state = ConversationState::new("t1", Utc::now());
        state.present(
            Leg::Flight,
            vec![option("F1", 900), option("F2", 1200), option("F3", 2100)],
        );
        state
    }

    #[test]
    fn slots_report_missing_in_order() {
        let slots = Slots {
            origin: None,
            destination: Some("Tokyo".into()),
            date: None,
        };
        assert_eq!(slots.missing(), vec![SlotName::Origin, SlotName::Date]);
        assert!(!slots.is_complete());
    }

    #[test]
    fn lock_picks_exact_option() {
        let mut state = state_with_flights();
        let locked = state.lock_option(Leg::Flight, 2).unwrap().clone();
        assert_eq!(locked.token, "F2");
        assert!(state.booking.flight.is_locked());
    }

    #[test]
    fn out_of_range_lock_changes_nothing() {
        let mut state = state_with_flights();
        let before = state.booking.clone();
        let err = state.lock_option(Leg::Flight, 9).unwrap_err();
        assert_eq!(
            err,
            StateError::OptionOutOfRange {
                leg: Leg::Flight,
                index: 9,
                available: 3
            }
        );
        assert_eq!(state.booking, before);
    }

    #[test]
    fn settle_requires_lock() {
        let mut state = state_with_flights();
        let err = state.settle(Leg::Flight, || "FL-1".into()).unwrap_err();
        assert_eq!(err, StateError::NotLocked(Leg::Flight));
        assert!(!state.booking.flight.is_paid());
    }

    #[test]
    fn settle_is_idempotent() {
        let mut state = state_with_flights();
        state.lock_option(Leg::Flight, 1).unwrap();
        let first = state.settle(Leg::Flight, || "FL-1".into()).unwrap();
        let second = state.settle(Leg::Flight, || "FL-2".into()).unwrap();
        assert_eq!(first.order_id, "FL-1");
        assert_eq!(second.order_id, "FL-1");
        assert!(!first.replayed);
        assert!(second.replayed);
    }

    #[test]
    fn paid_leg_cannot_be_relocked() {
        let mut state = state_with_flights();
        state.lock_option(Leg::Flight, 1).unwrap();
        state.settle(Leg::Flight, || "FL-1".into()).unwrap();
        let err = state.lock_option(Leg::Flight, 2).unwrap_err();
        assert_eq!(err, StateError::AlreadyPaid(Leg::Flight));
        assert_eq!(state.booking.flight.selection().unwrap().token, "F1");
    }

    #[test]
    fn invalidate_keeps_paid_legs() {
        let mut state = state_with_flights();
        state.lock_option(Leg::Flight, 3).unwrap();
        state.settle(Leg::Flight, || "FL-9".into()).unwrap();
        state.present(Leg::Hotel, vec![option("H1", 600)]);
        state.lock_option(Leg::Hotel, 1).unwrap();

        state.invalidate_plans();

        assert!(state.booking.flight.is_paid());
        assert_eq!(state.booking.flight.order_id(), Some("FL-9"));
        assert!(!state.booking.hotel.is_locked());
        assert!(state.presented.flights.is_empty());
    }

    #[test]
    fn represent_releases_unpaid_lock() {
        let mut state = state_with_flights();
        state.lock_option(Leg::Flight, 1).unwrap();
        state.present(Leg::Flight, vec![option("F1", 800)]);
        assert!(!state.booking.flight.is_locked());
    }

    #[test]
    fn tampered_paid_without_lock_is_rejected() {
        let json = serde_json::json!({
            "selection": null,
            "locked": false,
            "paid": true,
            "order_id": "FL-1",
            "skipped": false
        });
        assert!(serde_json::from_value::<LegBooking>(json).is_err());
    }

    #[test]
    fn state_survives_json_round_trip() {
        let mut state = state_with_flights();
        state.lock_option(Leg::Flight, 2).unwrap();
        let json = serde_json::to_string(&state).unwrap();
        let back: ConversationState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.booking, state.booking);
        assert_eq!(back.presented.flights.len(), 3);
    }

    #[test]
    fn history_is_bounded() {
        let mut state = ConversationState::new("t1", Utc::now());
        for i in 0..(MAX_HISTORY + 5) {
            state.push_turn(TurnRole::User, format!("m{i}"), None, Utc::now());
        }
        assert!(state.history.len() <= MAX_HISTORY);
        assert_eq!(
            state.history.last().unwrap().content,
            format!("m{}", MAX_HISTORY + 4)
        );
    }
}

//! Deterministic language understanding.
//!
//! [`Lexicon`] turns free text into the structured facts the graph needs:
//! trip slots with relative dates resolved, option tokens (`F2`, `H1`,
//! `P3`, bare digits), plan tiers, confirmations and skip requests.
//! [`KeywordClassifier`] builds on it to implement the
//! [`IntentClassifier`] contract without a model.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, Weekday};
use regex_lite::Regex;
use waypoint_core::error::ProviderError;
use waypoint_core::geo;
use waypoint_core::{
    Classification, Clock, ConversationState, IntentClassifier, Leg, NodeId, PlanTier, SlotName,
};

const DESTINATION_MARKERS: &[&str] = &["去", "到", "往", "飞", "前往", "飞往", "抵达"];
const ORIGIN_SUFFIXES: &[&str] = &["出发", "起飞", "启程"];
/// Leading characters that make a "去XX" capture a phrase, not a place.
const NOT_A_PLACE: &[&str] = &["哪", "看", "玩", "时", "了", "过", "这", "那", "吃", "买", "办", "找"];

const PAY_WORDS: &[&str] = &["支付", "付款", "买单", "结账", "pay", "checkout"];
const WEATHER_WORDS: &[&str] = &["天气", "气温", "下雨", "下雪", "冷不冷", "热不热", "weather", "forecast"];
const SUMMARY_WORDS: &[&str] = &["行程单", "总结", "汇总", "summary", "itinerary"];
const HOTEL_WORDS: &[&str] = &["酒店", "住宿", "宾馆", "民宿", "hotel"];
const FLIGHT_WORDS: &[&str] = &["机票", "航班", "飞机", "flight"];
const PLAN_WORDS: &[&str] = &["方案", "计划", "规划", "plan"];
const HELP_WORDS: &[&str] = &["帮助", "怎么用", "下一步", "接下来", "help", "what next"];
const TRAVEL_WORDS: &[&str] = &["旅游", "旅行", "出行", "出发", "行程", "预订", "订", "玩", "travel", "trip", "book"];

const YES_ZH: &[&str] = &["确认", "确定", "是的", "好的", "可以", "继续", "同意", "没问题"];
const NO_ZH: &[&str] = &[
    "不要", "不用", "不需要", "不确认", "不确定", "不同意", "不可以", "不行", "不了", "取消", "算了", "别付", "别支付", "别订",
];
/// English phrases that contain "no" but agree.
const NOT_A_REFUSAL: &[&str] = &["no problem", "no worries"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// A slot the user mentioned but that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unresolved {
    pub slot: SlotName,
    pub raw: String,
    pub problem: Problem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    UnknownCity,
    PastDate,
    InvalidDate,
}

/// Slots found in one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Canonical city names.
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub date: Option<NaiveDate>,
    pub unresolved: Vec<Unresolved>,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.destination.is_none() && self.date.is_none() && self.unresolved.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateParse {
    Found(NaiveDate),
    Past(String),
    Invalid(String),
    Absent,
}

pub struct Lexicon {
    iso_date: Regex,
    month_day: Regex,
    days_later: Regex,
    next_week_zh: Regex,
    weekday_zh: Regex,
    next_week_en: Regex,
    weekday_en: Regex,
    option_token: Regex,
    ordinal: Regex,
    bare_number: Regex,
    unknown_destination: Regex,
    unknown_origin: Regex,
    yes_en: Regex,
    no_en: Regex,
}

impl Lexicon {
    pub fn new() -> Result<Self, regex_lite::Error> {
        Ok(Self {
            iso_date: Regex::new(r"(\d{4})-(\d{1,2})-(\d{1,2})")?,
            month_day: Regex::new(r"(\d{1,2})月(\d{1,2})[日号]")?,
            days_later: Regex::new(r"(\d{1,2})\s*天(?:后|以后|之后)")?,
            next_week_zh: Regex::new(r"下个?(?:周|星期|礼拜)([一二三四五六日天])")?,
            weekday_zh: Regex::new(r"(?:周|星期|礼拜)([一二三四五六日天])")?,
            next_week_en: Regex::new(r"(?i)\bnext\s+(mon|tues|wednes|thurs|fri|satur|sun)day\b")?,
            weekday_en: Regex::new(r"(?i)\b(mon|tues|wednes|thurs|fri|satur|sun)day\b")?,
            option_token: Regex::new(r"(?i)\b([fhp])\s?(\d{1,2})\b")?,
            ordinal: Regex::new(r"第\s*(\d{1,2}|[一二三四五六七八九十])")?,
            bare_number: Regex::new(r"^\s*(\d{1,2})\s*号?\s*$")?,
            unknown_destination: Regex::new(
                r"(?:前往|飞往|去|到)([\x{4e00}-\x{9fff}]{2,4}?)(?:玩|旅游|旅行|出差|看看|度假|[，。！？,.!?\s]|$)",
            )?,
            unknown_origin: Regex::new(
                r"从([\x{4e00}-\x{9fff}]{2,4}?)(?:出发|起飞|飞|去|到|走|[，。！？,.!?\s]|$)",
            )?,
            yes_en: Regex::new(r"\b(?:y|yes|yeah|yep|ok|okay|sure|confirm|confirmed|go ahead)\b")?,
            no_en: Regex::new(r"\b(?:no|nope|cancel|stop|don't|do not)\b")?,
        })
    }

    // ── Slots ──────────────────────────────────────────────────────────

    pub fn extract_slots(&self, text: &str, today: NaiveDate) -> Extraction {
        let mut out = Extraction::default();
        let mut unmarked: Vec<&str> = Vec::new();

        for mention in geo::find_mentions(text) {
            let before = text[..mention.start].trim_end();
            let after = text[mention.end..].trim_start();
            let before_lower = before.to_ascii_lowercase();
            let name = mention.city.name;

            if before.ends_with('从')
                || ends_with_word(&before_lower, "from")
                || ORIGIN_SUFFIXES.iter().any(|s| after.starts_with(s))
            {
                out.origin.get_or_insert_with(|| name.to_string());
            } else if DESTINATION_MARKERS.iter().any(|m| before.ends_with(m))
                || ends_with_word(&before_lower, "to")
            {
                out.destination.get_or_insert_with(|| name.to_string());
            } else {
                unmarked.push(name);
            }
        }

        if out.origin.is_none() && out.destination.is_none() && unmarked.len() >= 2 {
            out.origin = Some(unmarked[0].to_string());
            out.destination = Some(unmarked[1].to_string());
        } else {
            for name in unmarked {
                if out.destination.is_none() {
                    out.destination = Some(name.to_string());
                } else if out.origin.is_none() && out.destination.as_deref() != Some(name) {
                    out.origin = Some(name.to_string());
                }
            }
        }

        if out.destination.is_none() {
            if let Some(raw) = self.unknown_place(&self.unknown_destination, text) {
                out.unresolved.push(Unresolved {
                    slot: SlotName::Destination,
                    raw,
                    problem: Problem::UnknownCity,
                });
            }
        }
        if out.origin.is_none() {
            if let Some(raw) = self.unknown_place(&self.unknown_origin, text) {
                out.unresolved.push(Unresolved {
                    slot: SlotName::Origin,
                    raw,
                    problem: Problem::UnknownCity,
                });
            }
        }

        match self.parse_date(text, today) {
            DateParse::Found(date) => out.date = Some(date),
            DateParse::Past(raw) => out.unresolved.push(Unresolved {
                slot: SlotName::Date,
                raw,
                problem: Problem::PastDate,
            }),
            DateParse::Invalid(raw) => out.unresolved.push(Unresolved {
                slot: SlotName::Date,
                raw,
                problem: Problem::InvalidDate,
            }),
            DateParse::Absent => {}
        }
        out
    }

    fn unknown_place(&self, pattern: &Regex, text: &str) -> Option<String> {
        let raw = pattern.captures(text)?.get(1)?.as_str();
        if NOT_A_PLACE.iter().any(|p| raw.starts_with(p)) || geo::resolve(raw).is_some() {
            return None;
        }
        Some(raw.to_string())
    }

    /// Resolve the first date expression in `text` against `today`.
    pub fn parse_date(&self, text: &str, today: NaiveDate) -> DateParse {
        if let Some(caps) = self.iso_date.captures(text) {
            let raw = caps[0].to_string();
            return match ymd(&caps[1], &caps[2], &caps[3]) {
                Some(date) if date < today => DateParse::Past(raw),
                Some(date) => DateParse::Found(date),
                None => DateParse::Invalid(raw),
            };
        }

        if let Some(caps) = self.month_day.captures(text) {
            let raw = caps[0].to_string();
            let this_year = today.year().to_string();
            return match ymd(&this_year, &caps[1], &caps[2]) {
                Some(date) if date < today => {
                    let next_year = (today.year() + 1).to_string();
                    ymd(&next_year, &caps[1], &caps[2]).map_or(DateParse::Invalid(raw), DateParse::Found)
                }
                Some(date) => DateParse::Found(date),
                None => DateParse::Invalid(raw),
            };
        }

        if let Some(caps) = self.days_later.captures(text) {
            if let Ok(days) = caps[1].parse::<i64>() {
                return DateParse::Found(today + Duration::days(days));
            }
        }

        let lower = text.to_ascii_lowercase();
        let relative: [(&str, i64); 7] = [
            ("大后天", 3),
            ("后天", 2),
            ("明天", 1),
            ("今天", 0),
            ("day after tomorrow", 2),
            ("tomorrow", 1),
            ("today", 0),
        ];
        if let Some((_, days)) = relative.iter().find(|(word, _)| lower.contains(word)) {
            return DateParse::Found(today + Duration::days(*days));
        }

        if let Some(day) = self.next_week_zh.captures(text).and_then(|c| zh_weekday(&c[1])) {
            return DateParse::Found(next_week(today, day));
        }
        if let Some(day) = self.weekday_zh.captures(text).and_then(|c| zh_weekday(&c[1])) {
            return DateParse::Found(upcoming(today, day));
        }
        if let Some(day) = self.next_week_en.captures(text).and_then(|c| en_weekday(&c[1])) {
            return DateParse::Found(next_week(today, day));
        }
        if let Some(day) = self.weekday_en.captures(text).and_then(|c| en_weekday(&c[1])) {
            return DateParse::Found(upcoming(today, day));
        }
        DateParse::Absent
    }

    // ── Options ────────────────────────────────────────────────────────

    /// The first short token in the text, prefix upper-cased: `('F', 2)`.
    pub fn option_token(&self, text: &str) -> Option<(char, usize)> {
        let caps = self.option_token.captures(text)?;
        let prefix = caps[1].chars().next()?.to_ascii_uppercase();
        let index = caps[2].parse().ok()?;
        Some((prefix, index))
    }

    /// An index chosen without a prefix: "2", "第二个".
    pub fn bare_choice(&self, text: &str) -> Option<usize> {
        if let Some(caps) = self.bare_number.captures(text) {
            return caps[1].parse().ok();
        }
        let caps = self.ordinal.captures(text)?;
        let raw = &caps[1];
        raw.parse().ok().or_else(|| zh_numeral(raw))
    }

    /// The 1-based option the user picked for `leg`. A token for the other
    /// leg is not a choice.
    pub fn choice(&self, text: &str, leg: Leg) -> Option<usize> {
        match self.option_token(text) {
            Some((prefix, index)) => (prefix == leg.token_prefix()).then_some(index),
            None => self.bare_choice(text),
        }
    }

    /// A plan tier named by token or by keyword.
    pub fn tier(&self, text: &str) -> Option<PlanTier> {
        if let Some(('P', index)) = self.option_token(text) {
            return index.checked_sub(1).and_then(|i| PlanTier::ALL.get(i)).copied();
        }
        let lower = text.to_lowercase();
        if contains_any(&lower, &["奢华", "豪华", "luxury"]) {
            Some(PlanTier::Luxury)
        } else if contains_any(&lower, &["亲子", "家庭", "带孩子", "family"]) {
            Some(PlanTier::Family)
        } else if contains_any(&lower, &["经济", "实惠", "便宜", "省钱", "economy", "budget"]) {
            Some(PlanTier::Economy)
        } else {
            None
        }
    }

    // ── Replies ────────────────────────────────────────────────────────

    /// English words match whole; Chinese negation only as a phrase, so
    /// "确认，不过快点" still agrees.
    pub fn is_negative(&self, text: &str) -> bool {
        let mut lower = text.trim().to_lowercase();
        for phrase in NOT_A_REFUSAL {
            lower = lower.replace(phrase, " ");
        }
        contains_any(&lower, NO_ZH) || self.no_en.is_match(&lower)
    }

    /// A negative reply wins over an affirmative one ("不确定" is a no).
    pub fn is_affirmative(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        if self.is_negative(&lower) {
            return false;
        }
        lower == "好"
            || contains_any(&lower, YES_ZH)
            || self.yes_en.is_match(&lower)
            || NOT_A_REFUSAL.iter().any(|p| lower.contains(p))
    }
}

// ── Free functions ─────────────────────────────────────────────────────────

/// The leg the user asked to leave out, if any.
pub fn skipped_leg(text: &str) -> Option<Leg> {
    let lower = text.to_lowercase();
    let skip_hotel = ["不订酒店", "不要酒店", "不用酒店", "不需要酒店", "skip hotel", "no hotel"];
    let skip_flight = ["不订机票", "不要机票", "不用机票", "不需要机票", "skip flight", "no flight"];
    if contains_any(&lower, &skip_hotel) {
        Some(Leg::Hotel)
    } else if contains_any(&lower, &skip_flight) {
        Some(Leg::Flight)
    } else {
        None
    }
}

fn ends_with_word(haystack: &str, word: &str) -> bool {
    haystack.strip_suffix(word).is_some_and(|rest| {
        rest.chars().next_back().is_none_or(|c| !c.is_ascii_alphanumeric())
    })
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn zh_weekday(c: &str) -> Option<Weekday> {
    Some(match c {
        "一" => Weekday::Mon,
        "二" => Weekday::Tue,
        "三" => Weekday::Wed,
        "四" => Weekday::Thu,
        "五" => Weekday::Fri,
        "六" => Weekday::Sat,
        "日" | "天" => Weekday::Sun,
        _ => return None,
    })
}

fn en_weekday(stem: &str) -> Option<Weekday> {
    Some(match stem.to_ascii_lowercase().as_str() {
        "mon" => Weekday::Mon,
        "tues" => Weekday::Tue,
        "wednes" => Weekday::Wed,
        "thurs" => Weekday::Thu,
        "fri" => Weekday::Fri,
        "satur" => Weekday::Sat,
        "sun" => Weekday::Sun,
        _ => return None,
    })
}

fn zh_numeral(c: &str) -> Option<usize> {
    "一二三四五六七八九十"
        .chars()
        .position(|n| c.starts_with(n))
        .map(|i| i + 1)
}

/// The next occurrence of `day`, today included.
fn upcoming(today: NaiveDate, day: Weekday) -> NaiveDate {
    let ahead = (7 + i64::from(day.num_days_from_monday()) - i64::from(today.weekday().num_days_from_monday())) % 7;
    today + Duration::days(ahead)
}

/// `day` in the calendar week after this one (weeks start on Monday).
fn next_week(today: NaiveDate, day: Weekday) -> NaiveDate {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    monday + Duration::days(7 + i64::from(day.num_days_from_monday()))
}

// ── Classifier ─────────────────────────────────────────────────────────────

/// Keyword-driven intent classifier.
pub struct KeywordClassifier {
    lexicon: Arc<Lexicon>,
    clock: Arc<dyn Clock>,
    offset: FixedOffset,
}

impl KeywordClassifier {
    pub fn new(lexicon: Arc<Lexicon>, clock: Arc<dyn Clock>, offset: FixedOffset) -> Self {
        Self { lexicon, clock, offset }
    }

    pub fn classify_text(&self, state: &ConversationState, message: &str) -> Classification {
        let text = message.trim();
        let lower = text.to_lowercase();

        if contains_any(&lower, PAY_WORDS) {
            return Classification::confident(pay_target(state, &lower));
        }

        if let Some((prefix, _)) = self.lexicon.option_token(text) {
            return Classification::confident(match prefix {
                'F' => NodeId::SelectFlight,
                'H' => NodeId::SelectHotel,
                _ => NodeId::SearchFlight,
            });
        }
        if self.lexicon.bare_choice(text).is_some() {
            return match state.current_node {
                Some(NodeId::SearchFlight | NodeId::SelectFlight) => {
                    Classification::confident(NodeId::SelectFlight)
                }
                Some(NodeId::SearchHotel | NodeId::SelectHotel) => {
                    Classification::confident(NodeId::SelectHotel)
                }
                Some(NodeId::Plan) => Classification::confident(NodeId::SearchFlight),
                _ => Classification::unknown(state.in_booking_track()),
            };
        }

        if contains_any(&lower, WEATHER_WORDS) {
            return Classification::confident(NodeId::CheckWeather);
        }
        if skipped_leg(text).is_some() || contains_any(&lower, SUMMARY_WORDS) {
            return Classification::confident(NodeId::Summary);
        }

        let today = self.clock.today(self.offset);
        let extraction = self.lexicon.extract_slots(text, today);
        if changes_slots(state, &extraction) {
            return Classification::confident(NodeId::Collect);
        }

        if contains_any(&lower, HOTEL_WORDS) {
            return Classification::confident(NodeId::SearchHotel);
        }
        if contains_any(&lower, FLIGHT_WORDS) {
            return Classification::confident(NodeId::SearchFlight);
        }
        if contains_any(&lower, PLAN_WORDS) || self.lexicon.tier(text).is_some() {
            return Classification::confident(NodeId::Plan);
        }
        if contains_any(&lower, HELP_WORDS) {
            return Classification::confident(NodeId::Guide);
        }

        Classification::unknown(state.in_booking_track() || contains_any(&lower, TRAVEL_WORDS))
    }
}

fn pay_target(state: &ConversationState, lower: &str) -> NodeId {
    let leg = if contains_any(lower, HOTEL_WORDS) {
        Leg::Hotel
    } else if contains_any(lower, FLIGHT_WORDS) {
        Leg::Flight
    } else if state.booking.flight.is_locked() && !state.booking.flight.is_paid() {
        Leg::Flight
    } else if state.booking.hotel.is_locked() && !state.booking.hotel.is_paid() {
        Leg::Hotel
    } else {
        state.current_node.and_then(|n| n.leg()).unwrap_or(Leg::Flight)
    };
    match leg {
        Leg::Flight => NodeId::PayFlight,
        Leg::Hotel => NodeId::PayHotel,
    }
}

fn changes_slots(state: &ConversationState, extraction: &Extraction) -> bool {
    let slots = &state.slots;
    !extraction.unresolved.is_empty()
        || extraction.origin.as_ref().is_some_and(|o| slots.origin.as_ref() != Some(o))
        || extraction.destination.as_ref().is_some_and(|d| slots.destination.as_ref() != Some(d))
        || extraction.date.is_some_and(|d| slots.date != Some(d))
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn classify(
        &self,
        state: &ConversationState,
        message: &str,
    ) -> Result<Classification, ProviderError> {
        Ok(self.classify_text(state, message))
    }
}

//! City gazetteer.
//!
//! A small static table mapping Chinese and English city names (and common
//! aliases) to a canonical English name and a primary airport code. Slot
//! filling uses it to resolve free text; the airport lookup tool serves
//! codes from it.

/// A city the booking flow can resolve.
#[derive(Debug, PartialEq, Eq)]
pub struct City {
    /// Canonical English name, stored in slots.
    pub name: &'static str,
    pub zh: &'static str,
    pub aliases: &'static [&'static str],
    /// IATA code of the primary airport.
    pub airport: &'static str,
    /// ISO 3166 alpha-2 country code.
    pub country: &'static str,
}

impl City {
    fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        [self.name, self.zh].into_iter().chain(self.aliases.iter().copied())
    }

    pub fn is_domestic(&self) -> bool {
        self.country == "CN"
    }
}

pub static CITIES: &[City] = &[
    City { name: "Shanghai", zh: "上海", aliases: &["魔都", "sha"], airport: "PVG", country: "CN" },
    City { name: "Beijing", zh: "北京", aliases: &["帝都", "peking"], airport: "PEK", country: "CN" },
    City { name: "Guangzhou", zh: "广州", aliases: &["canton"], airport: "CAN", country: "CN" },
    City { name: "Shenzhen", zh: "深圳", aliases: &[], airport: "SZX", country: "CN" },
    City { name: "Chengdu", zh: "成都", aliases: &["蓉城"], airport: "CTU", country: "CN" },
    City { name: "Hangzhou", zh: "杭州", aliases: &[], airport: "HGH", country: "CN" },
    City { name: "Xi'an", zh: "西安", aliases: &["xian"], airport: "XIY", country: "CN" },
    City { name: "Chongqing", zh: "重庆", aliases: &["山城"], airport: "CKG", country: "CN" },
    City { name: "Sanya", zh: "三亚", aliases: &[], airport: "SYX", country: "CN" },
    City { name: "Kunming", zh: "昆明", aliases: &["春城"], airport: "KMG", country: "CN" },
    City { name: "Hong Kong", zh: "香港", aliases: &["hongkong"], airport: "HKG", country: "HK" },
    City { name: "Taipei", zh: "台北", aliases: &[], airport: "TPE", country: "TW" },
    City { name: "Tokyo", zh: "东京", aliases: &["tokio"], airport: "NRT", country: "JP" },
    City { name: "Osaka", zh: "大阪", aliases: &[], airport: "KIX", country: "JP" },
    City { name: "Kyoto", zh: "京都", aliases: &[], airport: "KIX", country: "JP" },
    City { name: "Seoul", zh: "首尔", aliases: &["汉城"], airport: "ICN", country: "KR" },
    City { name: "Bangkok", zh: "曼谷", aliases: &[], airport: "BKK", country: "TH" },
    City { name: "Singapore", zh: "新加坡", aliases: &[], airport: "SIN", country: "SG" },
    City { name: "Dubai", zh: "迪拜", aliases: &[], airport: "DXB", country: "AE" },
    City { name: "Paris", zh: "巴黎", aliases: &[], airport: "CDG", country: "FR" },
    City { name: "London", zh: "伦敦", aliases: &[], airport: "LHR", country: "GB" },
    City { name: "New York", zh: "纽约", aliases: &["nyc"], airport: "JFK", country: "US" },
    City { name: "Sydney", zh: "悉尼", aliases: &[], airport: "SYD", country: "AU" },
];

/// Resolve a whole string (a slot value or tool argument) to a city.
pub fn resolve(text: &str) -> Option<&'static City> {
    let needle = text.trim().trim_end_matches('市').to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }
    CITIES
        .iter()
        .find(|c| c.names().any(|n| n.to_ascii_lowercase() == needle))
}

/// A city found inside free text. Offsets are byte offsets into the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mention {
    pub city: &'static City,
    pub start: usize,
    pub end: usize,
}

/// All non-overlapping city mentions in `text`, in reading order.
/// Overlaps are resolved in favor of the earlier, then the longer, match.
pub fn find_mentions(text: &str) -> Vec<Mention> {
    // ASCII lowercasing keeps byte offsets aligned with `text`.
    let haystack = text.to_ascii_lowercase();
    let mut found = Vec::new();

    for city in CITIES {
        for name in city.names() {
            let needle = name.to_ascii_lowercase();
            let ascii = needle.is_ascii();
            for (start, _) in haystack.match_indices(&needle) {
                let end = start + needle.len();
                if ascii && !on_word_boundary(&haystack, start, end) {
                    continue;
                }
                found.push(Mention { city, start, end });
            }
        }
    }

    found.sort_by(|a, b| a.start.cmp(&b.start).then((b.end - b.start).cmp(&(a.end - a.start))));

    let mut mentions: Vec<Mention> = Vec::new();
    for m in found {
        if mentions.last().is_some_and(|last| m.start < last.end) {
            continue;
        }
        mentions.push(m);
    }
    mentions
}

fn on_word_boundary(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    let is_word = |c: Option<char>| c.is_some_and(|c| c.is_ascii_alphanumeric());
    !is_word(before) && !is_word(after)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_chinese_english_and_alias() {
        assert_eq!(resolve("上海").unwrap().name, "Shanghai");
        assert_eq!(resolve("上海市").unwrap().name, "Shanghai");
        assert_eq!(resolve("tokyo").unwrap().airport, "NRT");
        assert_eq!(resolve("魔都").unwrap().name, "Shanghai");
        assert!(resolve("火星").is_none());
        assert!(resolve("  ").is_none());
    }

    #[test]
    fn finds_mentions_in_reading_order() {
        let mentions = find_mentions("我想去东京玩，从上海出发");
        let names: Vec<&str> = mentions.iter().map(|m| m.city.name).collect();
        assert_eq!(names, vec!["Tokyo", "Shanghai"]);
        assert_eq!(&"我想去东京玩，从上海出发"[mentions[0].start..mentions[0].end], "东京");
    }

    #[test]
    fn overlapping_names_prefer_earlier_match() {
        let names: Vec<&str> = find_mentions("去东京都").iter().map(|m| m.city.name).collect();
        assert_eq!(names, vec!["Tokyo"]);
    }

    #[test]
    fn ascii_names_need_word_boundaries() {
        assert!(find_mentions("washable").is_empty());
        let names: Vec<&str> = find_mentions("from Shanghai to New York")
            .iter()
            .map(|m| m.city.name)
            .collect();
        assert_eq!(names, vec!["Shanghai", "New York"]);
    }
}

//! Regex entity extraction for Hebrew decision queries.
//!
//! Date spans are consumed before topic capture, and corpus-domain words
//! ("ממשלה", "החלטות") never become topics — a bare mention of the corpus
//! itself must not suppress or replace a date filter.

use std::collections::HashSet;

use chrono::NaiveDate;
use decision_protocol::{DateRange, DecisionType, EntitySet};
use once_cell::sync::Lazy;
use regex::Regex;

static YEAR_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"בין\s+(?:השנים\s+)?(\d{4})\s*(?:ל|עד|ו)[-־–]?\s*(\d{4})").unwrap()
});
static SINCE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:מאז|החל\s+מ[-־–]?|מ[-־–])\s*(\d{4})").unwrap());
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:ב?שנת\s+|ב[-־–])(\d{4})").unwrap());
static GOV_NUM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:ה?ממשלה|ממשלת(?:\s+ישראל)?)\s*ה?[-־–]?\s*(\d{1,3})").unwrap()
});
static DECISION_NUM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"החלט(?:ה|ת\s+ממשלה)\s+(?:מס(?:פר|')?\.?\s*)?(\d{1,5})").unwrap()
});
static MINISTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"משרד\s+ה([א-ת]+)").unwrap());
static PRIME_MINISTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"ראש\s+הממשלה\s+([א-ת]+(?:\s+[א-ת]+)?)"#).unwrap());
static DECISION_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"אופרטיבי\S*|דקלרטיבי\S*").unwrap());
static LIMIT_VERB: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:הצג|הראה|תן|הבא)\s+(?:לי\s+)?(\d{1,2})").unwrap());
static LIMIT_NOUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})\s+החלטות").unwrap());
static RELATIVE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"לאחרונה|בתקופה\s+האחרונה|בזמן\s+האחרון|בחודשים\s+האחרונים|בשנה\s+האחרונה|השבוע|החודש")
        .unwrap()
});
static EXPLICIT_TOPIC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:בנושא|בתחום|בעניין|לגבי)\s+([א-ת"'׳״]+(?:\s+[א-ת"'׳״]+)*)"#).unwrap()
});
/// Residual words only count as a topic when the text is actually about the
/// corpus; a bare greeting must stay topic-less.
static DOMAIN_CUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"החלט|ממשל").unwrap());

/// Words that never carry topical meaning on their own: function words,
/// question leads, and the corpus-domain vocabulary itself.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "של", "את", "על", "עם", "אל", "מן", "כל", "לא", "או", "גם", "אם", "כי", "זה", "זו",
        "אלו", "אלה", "יש", "אין", "היו", "היה", "הייתה", "מה", "מהי", "מהו", "מהן", "מהם",
        "מי", "מתי", "איפה", "למה",
        "מדוע", "איך", "כיצד", "האם", "אילו", "איזה", "איזו", "כמה", "מספר", "כמות", "הצג",
        "תן", "הראה", "הבא", "לי", "רשימת", "רשימה", "החלטה", "החלטות", "ההחלטה", "ההחלטות",
        "החלטת", "ממשלה", "הממשלה", "ממשלת", "ישראל", "מדינת", "בנושא", "בתחום", "בעניין",
        "לגבי", "נושא", "קיבלה", "קיבל", "התקבלו", "התקבלה", "שהתקבלו", "שהתקבלה",
        "אישרה", "אישר", "עברו", "שעברו", "שניתנו", "נעשו", "אומרת", "אומר", "עוסקת",
        "עוסקות", "בשנת", "שנת", "שנים", "השנים", "בין",
        "מאז", "עד", "בתקופת", "מתקופת", "תקופת", "לאחרונה", "האחרונה", "האחרונות",
        "האחרונים", "השווה", "השוואה", "בהשוואה", "לעומת", "הבדל", "ראש", "ב", "ל", "מ",
        "ו", "ש", "ה",
    ]
    .into_iter()
    .collect()
});

/// Names a PRIME_MINISTER capture can never be: the words that commonly
/// follow "ראש הממשלה" without naming anyone.
static NOT_A_NAME: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "של", "אשר", "החליט", "הודיע", "אמר", "קיבל", "אישר", "הנוכחי", "לשעבר", "יחליט",
    ]
    .into_iter()
    .collect()
});

pub fn extract_entities(text: &str, today: NaiveDate) -> EntitySet {
    let mut entities = EntitySet::default();

    // Dates first: a consumed year span cannot leak into the topic.
    if let Some(caps) = YEAR_RANGE.captures(text) {
        let start = parse_year(&caps[1]);
        let end = parse_year(&caps[2]);
        if let (Some(start), Some(end)) = (start, end) {
            if start <= end {
                entities.date_range = DateRange::year(start)
                    .zip(DateRange::year(end))
                    .map(|(s, e)| DateRange::new(s.start, e.end));
            }
        }
    } else if let Some(caps) = SINCE_YEAR.captures(text) {
        if let Some(year) = parse_year(&caps[1]) {
            entities.date_range = DateRange::since_year(year, today);
        }
    } else if let Some(caps) = YEAR.captures(text) {
        if let Some(year) = parse_year(&caps[1]) {
            entities.date_range = DateRange::year(year);
        }
    }

    if let Some(caps) = GOV_NUM.captures(text) {
        entities.government_number = caps[1].parse::<u32>().ok().filter(|n| (1..=99).contains(n));
    }

    if let Some(caps) = DECISION_NUM.captures(text) {
        entities.decision_number = Some(caps[1].to_string());
    }

    for caps in MINISTRY.captures_iter(text) {
        let ministry = format!("משרד ה{}", &caps[1]);
        if !entities.ministries.contains(&ministry) {
            entities.ministries.push(ministry);
        }
    }

    if let Some(caps) = PRIME_MINISTER.captures(text) {
        let name = caps[1].trim();
        let first_word = name.split_whitespace().next().unwrap_or("");
        if !first_word.is_empty() && !NOT_A_NAME.contains(first_word) {
            entities.prime_minister = Some(name.to_string());
        }
    }

    if let Some(matched) = DECISION_TYPE.find(text) {
        entities.decision_type = if matched.as_str().starts_with("אופרטיבי") {
            Some(DecisionType::Operative)
        } else {
            Some(DecisionType::Declarative)
        };
    }

    entities.limit = LIMIT_VERB
        .captures(text)
        .or_else(|| LIMIT_NOUN.captures(text))
        .and_then(|caps| caps[1].parse::<u32>().ok())
        .filter(|n| *n >= 1);

    if entities.date_range.is_none() {
        entities.relative_time = RELATIVE_TIME.find(text).map(|m| m.as_str().to_string());
    }

    entities.topic = explicit_topic(text)
        .or_else(|| DOMAIN_CUE.is_match(text).then(|| residual_topic(text)).flatten());

    entities
}

fn parse_year(digits: &str) -> Option<i32> {
    digits.parse::<i32>().ok().filter(|y| (1948..=2100).contains(y))
}

fn explicit_topic(text: &str) -> Option<String> {
    let caps = EXPLICIT_TOPIC.captures(text)?;
    clean_topic_words(caps[1].split_whitespace())
}

/// Whatever Hebrew words survive after every recognized entity span and all
/// stopwords are removed. Best-effort: a missing topic is fine.
fn residual_topic(text: &str) -> Option<String> {
    let mut scrubbed = text.to_string();
    let spans: [&Regex; 10] = [
        &YEAR_RANGE,
        &SINCE_YEAR,
        &YEAR,
        &GOV_NUM,
        &DECISION_NUM,
        &MINISTRY,
        &PRIME_MINISTER,
        &DECISION_TYPE,
        &LIMIT_VERB,
        &RELATIVE_TIME,
    ];
    for re in spans {
        scrubbed = re.replace_all(&scrubbed, " ").into_owned();
    }
    clean_topic_words(scrubbed.split_whitespace())
}

fn clean_topic_words<'a>(words: impl Iterator<Item = &'a str>) -> Option<String> {
    let mut kept: Vec<&str> = Vec::new();
    for word in words {
        let word = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '"' && c != '\'');
        if word.is_empty() || STOPWORDS.contains(word) {
            continue;
        }
        if word.chars().all(|c| matches!(c, 'א'..='ת' | '"' | '\'')) {
            kept.push(word);
        }
    }
    let topic = kept.join(" ");
    (topic.chars().count() >= 2).then_some(topic)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn extracts_government_number_variants() {
        for text in [
            "החלטות של ממשלה 37",
            "החלטות הממשלה ה-37",
            "החלטות ממשלת ישראל ה-37",
        ] {
            let entities = extract_entities(text, today());
            assert_eq!(entities.government_number, Some(37), "text: {text}");
        }
    }

    #[test]
    fn extracts_decision_number() {
        let entities = extract_entities("מה אומרת החלטה מספר 1234", today());
        assert_eq!(entities.decision_number.as_deref(), Some("1234"));

        let entities = extract_entities("החלטת ממשלה 550", today());
        assert_eq!(entities.decision_number.as_deref(), Some("550"));
    }

    #[test]
    fn extracts_single_year_as_inclusive_range() {
        let entities = extract_entities("החלטות בנושא חינוך בשנת 2024", today());
        let range = entities.date_range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn extracts_year_range() {
        let entities = extract_entities("החלטות בין 2020 ל-2023 בנושא בריאות", today());
        let range = entities.date_range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
    }

    #[test]
    fn extracts_since_year_up_to_today() {
        let entities = extract_entities("החלטות מאז 2021", today());
        let range = entities.date_range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2021, 1, 1).unwrap());
        assert_eq!(range.end, today());
    }

    #[test]
    fn corpus_words_do_not_become_topics() {
        // The year must be extracted and "ממשלה" must not be mistaken for a
        // topic filter.
        let entities = extract_entities("כמה החלטות ממשלה היו בשנת 2024", today());
        assert_eq!(entities.topic, None);
        assert_eq!(entities.government_number, None);
        let range = entities.date_range.unwrap();
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
    }

    #[test]
    fn explicit_topic_marker_wins() {
        let entities = extract_entities("החלטות בנושא חינוך מיוחד בשנת 2023", today());
        assert_eq!(entities.topic.as_deref(), Some("חינוך מיוחד"));
    }

    #[test]
    fn residual_words_become_best_effort_topic() {
        let entities = extract_entities("החלטות על איכות הסביבה", today());
        assert_eq!(entities.topic.as_deref(), Some("איכות הסביבה"));
    }

    #[test]
    fn extracts_ministries() {
        let entities = extract_entities("החלטות של משרד הבריאות ומשרד החינוך", today());
        assert_eq!(
            entities.ministries,
            vec!["משרד הבריאות".to_string(), "משרד החינוך".to_string()]
        );
    }

    #[test]
    fn extracts_prime_minister_name_but_not_verbs() {
        let entities = extract_entities("החלטות בתקופת ראש הממשלה בנט", today());
        assert_eq!(entities.prime_minister.as_deref(), Some("בנט"));

        let entities = extract_entities("ראש הממשלה הודיע על החלטה", today());
        assert_eq!(entities.prime_minister, None);
    }

    #[test]
    fn extracts_decision_type() {
        let entities = extract_entities("החלטות אופרטיביות בנושא תחבורה", today());
        assert_eq!(entities.decision_type, Some(DecisionType::Operative));
        assert_eq!(entities.topic.as_deref(), Some("תחבורה"));
    }

    #[test]
    fn extracts_limit() {
        let entities = extract_entities("הצג 5 החלטות בנושא דיור", today());
        assert_eq!(entities.limit, Some(5));
    }

    #[test]
    fn relative_time_is_flagged_only_without_a_date() {
        let entities = extract_entities("החלטות שהתקבלו לאחרונה", today());
        assert!(entities.relative_time.is_some());

        let entities = extract_entities("החלטות לאחרונה בשנת 2024", today());
        assert_eq!(entities.relative_time, None);
        assert!(entities.date_range.is_some());
    }
}

//! Local clarification questions, used when the Clarifier stage is down or
//! not configured. The wording stays user-facing Hebrew with a concrete
//! example; no internal detail leaks.

use decision_protocol::{Intent, IntentType, RoutingReason};

pub fn local_question(intent: &Intent, reason: RoutingReason) -> String {
    match reason {
        RoutingReason::LowConfidence => "לא הצלחתי להבין את השאלה. אפשר לנסח אותה מחדש? \
             למשל: \"החלטות בנושא חינוך בשנת 2024\""
            .to_string(),
        RoutingReason::MissingEntities => match intent.intent_type {
            IntentType::Count => "כדי לספור החלטות צריך לפחות מסנן אחד — נושא, מספר ממשלה \
                 או טווח תאריכים. על מה תרצו לדעת?"
                .to_string(),
            IntentType::SpecificDecision => {
                "לאיזו החלטה הכוונה? ציינו מספר החלטה, למשל \"החלטה 550\"".to_string()
            }
            _ => "על איזה נושא או תקופה לחפש? למשל: \"החלטות בנושא בריאות בשנת 2023\""
                .to_string(),
        },
        RoutingReason::AmbiguousTime => {
            let phrase = intent
                .entities
                .relative_time
                .as_deref()
                .unwrap_or("התקופה המבוקשת");
            format!(
                "לאיזו תקופה הכוונה ב\"{phrase}\"? ציינו שנה או טווח תאריכים, \
                 למשל \"בשנת 2024\" או \"בין 2022 ל-2024\""
            )
        }
        RoutingReason::Direct => {
            "אפשר לפרט קצת יותר על מה לחפש? למשל נושא, ממשלה או שנה".to_string()
        }
    }
}

//! `jarvis classify`: Show the intent classifier's decision.

use jarvis_agent::{Classification, IntentClassifier, MatchReason};

pub fn run(text: &str) {
    println!("{}", describe(&IntentClassifier::new().classify(text)));
}

fn describe(classification: &Classification) -> String {
    match (&classification.forced, &classification.reason) {
        (Some(capability), MatchReason::KeywordMatch { keyword }) => {
            format!("{capability} (keyword: \"{keyword}\")")
        }
        (Some(capability), MatchReason::None) => capability.to_string(),
        (None, _) => "auto".to_string(),
    }
}

// 🏷️ Status Classifier - Lexical rules as data
//
// A notice either imposes a restriction (closed), lifts one (open), or says
// nothing we recognise. Rules are tried in priority order; closed rules come
// first so a text matching both directions classifies as closed.
//
// Words inside one rule must be within `window` characters of each other and
// may not be separated by a full stop.

use crate::entities::Status;
use anyhow::{Context, Result};
use regex::{Regex, RegexBuilder};

/// Default character distance allowed between the words of one rule
pub const DEFAULT_WINDOW: usize = 120;

// ============================================================================
// RULE DEFINITION
// ============================================================================

/// Word stems of one rule, in the order they must appear
struct RuleTemplate {
    id: &'static str,
    status: Status,
    stems: &'static [&'static str],
}

const RULE_TEMPLATES: &[RuleTemplate] = &[
    // --- closed -------------------------------------------------------------
    RuleTemplate {
        id: "ru-temporary-restriction-introduced",
        status: Status::Closed,
        stems: &[r"временн\w*", r"ограничен\w*", r"введ\w*"],
    },
    RuleTemplate {
        id: "en-temporary-restriction-introduced",
        status: Status::Closed,
        stems: &[r"temporar\w*", r"restrict\w*", r"(?:introduc|impos)\w*"],
    },
    // --- opened -------------------------------------------------------------
    RuleTemplate {
        id: "ru-restriction-lifted",
        status: Status::Open,
        stems: &[r"ограничен\w*", r"снят\w*"],
    },
    RuleTemplate {
        id: "ru-lifted-restriction",
        status: Status::Open,
        stems: &[r"снят\w*", r"ограничен\w*"],
    },
    RuleTemplate {
        id: "ru-resumed-reception",
        status: Status::Open,
        stems: &[r"возобновил\w*", r"при[её]м"],
    },
    RuleTemplate {
        id: "en-restriction-lifted",
        status: Status::Open,
        stems: &[r"restrict\w*", r"lift\w*"],
    },
    RuleTemplate {
        id: "en-lifted-restriction",
        status: Status::Open,
        stems: &[r"lift\w*", r"restrict\w*"],
    },
    RuleTemplate {
        id: "en-resumed-accepting",
        status: Status::Open,
        stems: &[r"resum\w*", r"accept\w*"],
    },
];

#[derive(Debug, Clone)]
pub struct ClassificationRule {
    pub id: String,
    pub status: Status,
    pattern: Regex,
}

impl ClassificationRule {
    pub fn matches(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub status: Status,
    pub rule_id: String,
}

// ============================================================================
// CLASSIFIER
// ============================================================================

pub struct StatusClassifier {
    /// Closed rules first, then opened rules
    rules: Vec<ClassificationRule>,
}

impl StatusClassifier {
    /// Build the built-in rule set for a proximity window
    pub fn new(window: usize) -> Result<Self> {
        let mut rules = Vec::with_capacity(RULE_TEMPLATES.len());

        for template in RULE_TEMPLATES {
            let gap = format!("[^.]{{0,{}}}?", window);
            let source = template.stems.join(&gap);
            let pattern = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .with_context(|| format!("Failed to build classifier rule {}", template.id))?;

            rules.push(ClassificationRule {
                id: template.id.to_string(),
                status: template.status,
                pattern,
            });
        }

        // Stable: keeps template order within each direction
        rules.sort_by_key(|r| match r.status {
            Status::Closed => 0,
            Status::Open => 1,
        });

        Ok(StatusClassifier { rules })
    }

    /// First matching rule wins
    pub fn classify_detailed(&self, text: &str) -> Option<ClassificationResult> {
        self.rules
            .iter()
            .find(|rule| rule.matches(text))
            .map(|rule| ClassificationResult {
                status: rule.status,
                rule_id: rule.id.clone(),
            })
    }

    /// `Some(Closed)`, `Some(Open)`, or `None` when the text carries no signal
    pub fn classify(&self, text: &str) -> Option<Status> {
        self.classify_detailed(text).map(|r| r.status)
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for StatusClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW).expect("built-in classifier rules are valid")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_closed() {
        let classifier = StatusClassifier::default();

        assert_eq!(
            classifier.classify("Example City (EXAM): temporary restriction introduced"),
            Some(Status::Closed)
        );
        assert_eq!(
            classifier.classify("Temporary flight restrictions have been imposed at Kazan"),
            Some(Status::Closed)
        );
    }

    #[test]
    fn test_english_opened() {
        let classifier = StatusClassifier::default();

        assert_eq!(
            classifier.classify("restriction at Example City lifted"),
            Some(Status::Open)
        );
        assert_eq!(
            classifier.classify("Authorities lifted the restrictions at Kazan"),
            Some(Status::Open)
        );
        assert_eq!(
            classifier.classify("The airport resumed accepting flights"),
            Some(Status::Open)
        );
    }

    #[test]
    fn test_russian_patterns() {
        let classifier = StatusClassifier::default();

        assert_eq!(
            classifier.classify("Казань (UWKD): временные ограничения на полёты введены"),
            Some(Status::Closed)
        );
        assert_eq!(
            classifier.classify("В аэропорту Пулково ограничения сняты"),
            Some(Status::Open)
        );
        assert_eq!(
            classifier.classify("Сняты ограничения в аэропорту Саратова"),
            Some(Status::Open)
        );
        assert_eq!(
            classifier.classify("Аэропорт Внуково возобновил приём и выпуск воздушных судов"),
            Some(Status::Open)
        );
        assert_eq!(
            classifier.classify("Аэропорт Внуково возобновил прием рейсов"),
            Some(Status::Open)
        );
    }

    #[test]
    fn test_closed_takes_priority() {
        let classifier = StatusClassifier::default();

        let both = "Temporary restrictions introduced at Kazan, restrictions lifted at Samara";
        assert_eq!(classifier.classify(both), Some(Status::Closed));

        let detailed = classifier.classify_detailed(both).unwrap();
        assert_eq!(detailed.rule_id, "en-temporary-restriction-introduced");
    }

    #[test]
    fn test_no_signal() {
        let classifier = StatusClassifier::default();

        assert_eq!(classifier.classify(""), None);
        assert_eq!(classifier.classify("Weather at Kazan is fine today"), None);
        assert_eq!(classifier.classify("restrictions remain in force"), None);
    }

    #[test]
    fn test_full_stop_breaks_rule() {
        let classifier = StatusClassifier::default();

        assert_eq!(classifier.classify("New restrictions. Snow lifted by noon"), None);
    }

    #[test]
    fn test_window_bounds_distance() {
        let narrow = StatusClassifier::new(10).unwrap();
        let filler = "x".repeat(50);
        let text = format!("restriction {} lifted", filler);

        assert_eq!(narrow.classify(&text), None);
        assert_eq!(StatusClassifier::default().classify(&text), Some(Status::Open));
        assert_eq!(narrow.classify("restriction now lifted"), Some(Status::Open));
    }

    #[test]
    fn test_case_insensitive() {
        let classifier = StatusClassifier::default();

        assert_eq!(
            classifier.classify("TEMPORARY RESTRICTION INTRODUCED"),
            Some(Status::Closed)
        );
        assert_eq!(classifier.rule_count(), RULE_TEMPLATES.len());
    }
}

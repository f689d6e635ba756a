//! Rule-based remediation hints.
//!
//! The typo rule runs first for every category. After that each category has
//! an ordered list of rules (first match wins) and a default message.
//! Categories without an entry get [`FALLBACK_MESSAGE`].

use crate::classifier::ErrorCategory;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

pub const FALLBACK_MESSAGE: &str = "Review your code carefully.";

static TYPO_SUGGESTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Did you mean: '(.+?)'\?").expect("valid typo regex"));

static UNDEFINED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"name '(.+?)' is not defined").expect("valid name regex"));

/// How a rule inspects the diagnostic text.
pub enum Matcher {
    /// Literal substring containment.
    Contains(&'static str),
    /// First capture group is substituted for `{}` in the template.
    Capture(&'static LazyLock<Regex>),
}

impl Matcher {
    /// Returns the captured value (empty for `Contains`) when the rule applies.
    fn matches<'t>(&self, text: &'t str) -> Option<&'t str> {
        match self {
            Matcher::Contains(needle) => text.contains(needle).then_some(""),
            Matcher::Capture(regex) => regex
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str()),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Contains(needle) => write!(f, "contains \"{}\"", needle),
            Matcher::Capture(regex) => write!(f, "matches /{}/", regex.as_str()),
        }
    }
}

pub struct Rule {
    pub matcher: Matcher,
    pub template: &'static str,
}

impl Rule {
    fn apply(&self, text: &str) -> Option<String> {
        self.matcher
            .matches(text)
            .map(|captured| self.template.replace("{}", captured))
    }
}

pub struct CategoryRules {
    pub category: ErrorCategory,
    pub rules: &'static [Rule],
    pub default: &'static str,
}

pub static TYPO_RULE: Rule = Rule {
    matcher: Matcher::Capture(&TYPO_SUGGESTION),
    template: "It looks like a typo. Did you mean '{}'?",
};

static SYNTAX_RULES: [Rule; 3] = [
    Rule {
        matcher: Matcher::Contains("unterminated string literal"),
        template: "Add a closing quotation mark.",
    },
    Rule {
        matcher: Matcher::Contains("was never closed"),
        template: "Close the missing bracket or parenthesis.",
    },
    Rule {
        matcher: Matcher::Contains("expected ':'"),
        template: "Add ':' at the end of the statement.",
    },
];

static INDENTATION_RULES: [Rule; 2] = [
    Rule {
        matcher: Matcher::Contains("expected an indented block"),
        template: "Indent the next line after the loop or function.",
    },
    Rule {
        matcher: Matcher::Contains("unexpected indent"),
        template: "Remove extra indentation.",
    },
];

static NAME_RULES: [Rule; 1] = [Rule {
    matcher: Matcher::Capture(&UNDEFINED_NAME),
    template: "The variable '{}' is not defined. Define it before using.",
}];

static TYPE_RULES: [Rule; 3] = [
    Rule {
        matcher: Matcher::Contains("concatenate str"),
        template: "Convert integer using str() before concatenation.",
    },
    Rule {
        matcher: Matcher::Contains("unsupported operand type"),
        template: "Ensure operands are compatible types.",
    },
    Rule {
        matcher: Matcher::Contains("positional argument"),
        template: "Check number of arguments passed.",
    },
];

static RULEBOOK: [CategoryRules; 11] = [
    CategoryRules {
        category: ErrorCategory::SyntaxError,
        rules: &SYNTAX_RULES,
        default: "Check syntax carefully.",
    },
    CategoryRules {
        category: ErrorCategory::IndentationError,
        rules: &INDENTATION_RULES,
        default: "Fix indentation using consistent 4 spaces.",
    },
    CategoryRules {
        category: ErrorCategory::NameError,
        rules: &NAME_RULES,
        default: "Make sure all variables are defined.",
    },
    CategoryRules {
        category: ErrorCategory::TypeError,
        rules: &TYPE_RULES,
        default: "Check data types used.",
    },
    CategoryRules {
        category: ErrorCategory::ZeroDivisionError,
        rules: &[],
        default: "You are dividing by zero. Add a condition before division.",
    },
    CategoryRules {
        category: ErrorCategory::IndexError,
        rules: &[],
        default: "List index is out of range. Check list length.",
    },
    CategoryRules {
        category: ErrorCategory::KeyError,
        rules: &[],
        default: "Dictionary key does not exist.",
    },
    CategoryRules {
        category: ErrorCategory::AttributeError,
        rules: &[],
        default: "Object does not have this attribute.",
    },
    CategoryRules {
        category: ErrorCategory::ValueError,
        rules: &[],
        default: "Invalid value passed to function.",
    },
    CategoryRules {
        category: ErrorCategory::ModuleNotFoundError,
        rules: &[],
        default: "Install required module using pip.",
    },
    CategoryRules {
        category: ErrorCategory::FileNotFoundError,
        rules: &[],
        default: "Check file path. File may not exist.",
    },
];

pub fn rulebook() -> &'static [CategoryRules] {
    &RULEBOOK
}

/// Which entry of the table produced a remediation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FiredRule {
    Typo,
    Specific { category: ErrorCategory, index: usize },
    CategoryDefault(ErrorCategory),
    Fallback,
}

impl fmt::Display for FiredRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiredRule::Typo => write!(f, "typo suggestion"),
            FiredRule::Specific { category, index } => write!(f, "{} rule #{}", category, index + 1),
            FiredRule::CategoryDefault(category) => write!(f, "{} default", category),
            FiredRule::Fallback => write!(f, "fallback"),
        }
    }
}

pub fn advise_with_rule(category: &ErrorCategory, diagnostic_text: &str) -> (String, FiredRule) {
    if let Some(message) = TYPO_RULE.apply(diagnostic_text) {
        return (message, FiredRule::Typo);
    }

    let Some(entry) = RULEBOOK.iter().find(|entry| &entry.category == category) else {
        return (FALLBACK_MESSAGE.to_string(), FiredRule::Fallback);
    };

    for (index, rule) in entry.rules.iter().enumerate() {
        if let Some(message) = rule.apply(diagnostic_text) {
            return (
                message,
                FiredRule::Specific {
                    category: category.clone(),
                    index,
                },
            );
        }
    }
    (
        entry.default.to_string(),
        FiredRule::CategoryDefault(category.clone()),
    )
}

/// Map a category and the raw diagnostic text to a remediation hint. Never empty.
pub fn advise(category: &ErrorCategory, diagnostic_text: &str) -> String {
    let (message, fired) = advise_with_rule(category, diagnostic_text);
    log::debug!("advisor: {} fired for {}", fired, category);
    message
}

//! Rule construction for account batches.
//!
//! Rules are plain data: the builder inspects a batch once and returns a
//! [`RuleSet`] keyed by field path. Applying the rules is the validator's job,
//! so both stages can be exercised independently.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::account::{AccountColumn, AccountId};
use super::batch::{AccountField, BatchMode};

/// Maximum length of names and logins.
pub const NAME_MAX: usize = 100;
/// Minimum length of display names.
pub const NAME_MIN: usize = 10;
/// Minimum password length.
pub const PASSWORD_MIN: usize = 8;
/// Maximum length of email addresses; matches the `email` column width.
pub const EMAIL_MAX: usize = 255;

static DIGITS_RE: OnceLock<Regex> = OnceLock::new();
static LETTERS_RE: OnceLock<Regex> = OnceLock::new();

/// Character patterns enforced by [`Rule::Matches`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    /// ASCII digits only.
    Digits,
    /// ASCII letters and whitespace only.
    Letters,
}

impl Pattern {
    /// Test a candidate string against the pattern.
    pub fn is_match(self, candidate: &str) -> bool {
        self.regex().is_match(candidate)
    }

    fn regex(self) -> &'static Regex {
        let (cell, pattern) = match self {
            Self::Digits => (&DIGITS_RE, "^[0-9]+$"),
            Self::Letters => (&LETTERS_RE, r"^[a-zA-Z\s]+$"),
        };
        cell.get_or_init(|| {
            Regex::new(pattern)
                .unwrap_or_else(|error| panic!("field pattern failed to compile: {error}"))
        })
    }
}

/// A single constraint attached to a field path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Stop evaluating this field's remaining rules after the first failure.
    Bail,
    /// The field must be present and non-blank.
    Required,
    /// The value must be a string matching the pattern.
    Matches(Pattern),
    /// The value must be a string.
    Text,
    /// The value must have at least this many characters.
    MinLength(usize),
    /// The value must have at most this many characters.
    MaxLength(usize),
    /// The value must be an RFC-valid email address.
    Email,
    /// The value must reference a stored account.
    Exists,
    /// The value must not be stored on any account other than `except`.
    Unique {
        /// Column checked for collisions.
        column: AccountColumn,
        /// Account whose own value is ignored.
        except: Option<AccountId>,
    },
    /// No other record in the batch may carry the same value.
    Distinct,
}

impl Rule {
    /// Stable rule name reported in validation failures.
    pub fn name(self) -> &'static str {
        match self {
            Self::Bail => "bail",
            Self::Required => "required",
            Self::Matches(_) => "regex",
            Self::Text => "string",
            Self::MinLength(_) => "min",
            Self::MaxLength(_) => "max",
            Self::Email => "email",
            Self::Exists => "exists",
            Self::Unique { .. } => "unique",
            Self::Distinct => "distinct",
        }
    }

    /// Whether the rule runs even when the field is absent.
    pub fn is_implicit(self) -> bool {
        matches!(self, Self::Required)
    }

    /// Whether the rule checks the value's shape rather than its content.
    pub fn is_format(self) -> bool {
        matches!(self, Self::Matches(_) | Self::Text | Self::Email)
    }
}

/// Which records a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordSelector {
    /// Every record in the batch (`*`).
    Every,
    /// Only the record at this index.
    At(usize),
}

/// Field path such as `*.email` or `3.email`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    /// Records addressed by the path.
    pub records: RecordSelector,
    /// Field addressed by the path.
    pub field: AccountField,
}

impl FieldPath {
    /// Path covering `field` on every record.
    pub fn every(field: AccountField) -> Self {
        Self {
            records: RecordSelector::Every,
            field,
        }
    }

    /// Path covering `field` on the record at `index`.
    pub fn at(index: usize, field: AccountField) -> Self {
        Self {
            records: RecordSelector::At(index),
            field,
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.records {
            RecordSelector::Every => write!(f, "*.{}", self.field),
            RecordSelector::At(index) => write!(f, "{index}.{}", self.field),
        }
    }
}

/// Materialised rules for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: BTreeMap<FieldPath, Vec<Rule>>,
}

impl RuleSet {
    /// Create an empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rules to a path, keeping declaration order.
    pub fn extend(&mut self, path: FieldPath, rules: impl IntoIterator<Item = Rule>) {
        self.rules.entry(path).or_default().extend(rules);
    }

    /// Rules declared for an exact path.
    pub fn get(&self, path: &FieldPath) -> &[Rule] {
        self.rules.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Rules applying to `field` on the record at `index`: wildcard rules
    /// first, then rules declared for that index.
    pub fn rules_for(&self, index: usize, field: AccountField) -> Vec<Rule> {
        let mut applicable = self.get(&FieldPath::every(field)).to_vec();
        applicable.extend_from_slice(self.get(&FieldPath::at(index, field)));
        applicable
    }

    /// Fields that carry at least one rule.
    pub fn fields(&self) -> BTreeSet<AccountField> {
        self.rules.keys().map(|path| path.field).collect()
    }

    /// Iterate over every path and its rules.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &[Rule])> {
        self.rules.iter().map(|(path, rules)| (path, rules.as_slice()))
    }

    /// Whether no rules were declared.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Interpret a raw `id` value as an account identifier.
///
/// Accepts JSON integers and digit strings; anything else yields `None`.
pub fn parse_account_id(value: &Value) -> Option<AccountId> {
    let raw = match value {
        Value::Number(number) => number.as_i64()?,
        Value::String(text) => {
            let trimmed = text.trim();
            if !Pattern::Digits.is_match(trimmed) {
                return None;
            }
            trimmed.parse::<i64>().ok()?
        }
        _ => return None,
    };
    AccountId::new(raw).ok()
}

/// Derive the rule set for a batch.
///
/// Pure: the batch is only inspected to compute per-record uniqueness
/// exclusions in `update` mode.
pub fn build_rules(batch: &[Value], mode: BatchMode) -> RuleSet {
    match mode {
        BatchMode::Update => update_rules(batch),
        BatchMode::Create => create_rules(),
    }
}

fn update_rules(batch: &[Value]) -> RuleSet {
    let mut rules = RuleSet::new();
    rules.extend(
        FieldPath::every(AccountField::Id),
        [
            Rule::Bail,
            Rule::Required,
            Rule::Matches(Pattern::Digits),
            Rule::Exists,
            Rule::Distinct,
        ],
    );
    rules.extend(
        FieldPath::every(AccountField::Name),
        [
            Rule::Matches(Pattern::Letters),
            Rule::MaxLength(NAME_MAX),
            Rule::MinLength(NAME_MIN),
        ],
    );
    rules.extend(
        FieldPath::every(AccountField::Login),
        [
            Rule::Matches(Pattern::Letters),
            Rule::MaxLength(NAME_MAX),
            Rule::Distinct,
        ],
    );
    rules.extend(
        FieldPath::every(AccountField::Password),
        [Rule::Text, Rule::MinLength(PASSWORD_MIN)],
    );
    rules.extend(
        FieldPath::every(AccountField::Email),
        [Rule::Email, Rule::MaxLength(EMAIL_MAX), Rule::Distinct],
    );

    for (index, record) in batch.iter().enumerate() {
        let except = record
            .get(AccountField::Id.as_str())
            .and_then(parse_account_id);
        rules.extend(
            FieldPath::at(index, AccountField::Email),
            [Rule::Unique {
                column: AccountColumn::Email,
                except,
            }],
        );
        rules.extend(
            FieldPath::at(index, AccountField::Login),
            [Rule::Unique {
                column: AccountColumn::Login,
                except,
            }],
        );
    }

    rules
}

fn create_rules() -> RuleSet {
    let mut rules = RuleSet::new();
    rules.extend(
        FieldPath::every(AccountField::Name),
        [
            Rule::Required,
            Rule::Matches(Pattern::Letters),
            Rule::MaxLength(NAME_MAX),
            Rule::MinLength(NAME_MIN),
        ],
    );
    rules.extend(
        FieldPath::every(AccountField::Login),
        [
            Rule::Required,
            Rule::Matches(Pattern::Letters),
            Rule::MaxLength(NAME_MAX),
            Rule::Unique {
                column: AccountColumn::Login,
                except: None,
            },
            Rule::Distinct,
        ],
    );
    rules.extend(
        FieldPath::every(AccountField::Password),
        [Rule::Required, Rule::Text, Rule::MinLength(PASSWORD_MIN)],
    );
    rules.extend(
        FieldPath::every(AccountField::Email),
        [
            Rule::Required,
            Rule::Email,
            Rule::MaxLength(EMAIL_MAX),
            Rule::Unique {
                column: AccountColumn::Email,
                except: None,
            },
            Rule::Distinct,
        ],
    );
    rules
}

//! Whole-batch validation.
//!
//! The validator applies a [`RuleSet`] to every record of a batch at once.
//! Distinctness compares values across all records, uniqueness and existence
//! consult the store's read path, and every violation is collected before the
//! batch is rejected. A clean pass yields a [`ValidatedBatch`] holding only
//! known, trimmed fields in their original order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use email_address::EmailAddress;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::account::Password;
use super::batch::{AccountDraft, AccountField, AccountPatch, BatchMode, ValidatedBatch};
use super::ports::{AccountStore, AccountStoreError};
use super::rules::{Rule, RuleSet, parse_account_id};

/// Rule name reported when a record is not a JSON object.
pub const MALFORMED_RECORD_RULE: &str = "array";

/// Location of a violation: a whole record, or one field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ViolationKey {
    /// Record index within the batch.
    pub index: usize,
    /// Offending field; `None` when the record itself is malformed.
    pub field: Option<AccountField>,
}

impl fmt::Display for ViolationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.field {
            Some(field) => write!(f, "{}.{field}", self.index),
            None => write!(f, "{}", self.index),
        }
    }
}

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    rule: &'static str,
    message: String,
}

impl Violation {
    fn new(key: ViolationKey, rule: Rule) -> Self {
        let path = key.to_string();
        let message = match rule {
            Rule::Required => format!("The {path} field is required."),
            Rule::Matches(_) => format!("The {path} format is invalid."),
            Rule::Text => format!("The {path} must be a string."),
            Rule::MinLength(min) => format!("The {path} must be at least {min} characters."),
            Rule::MaxLength(max) => {
                format!("The {path} must not be greater than {max} characters.")
            }
            Rule::Email => format!("The {path} must be a valid email address."),
            Rule::Exists => format!("The selected {path} is invalid."),
            Rule::Unique { .. } => format!("The {path} has already been taken."),
            Rule::Distinct => format!("The {path} field has a duplicate value."),
            Rule::Bail => format!("The {path} is invalid."),
        };
        Self {
            rule: rule.name(),
            message,
        }
    }

    fn malformed(key: ViolationKey) -> Self {
        Self {
            rule: MALFORMED_RECORD_RULE,
            message: format!("The {key} must be an object."),
        }
    }

    /// Name of the violated rule.
    pub fn rule(&self) -> &'static str {
        self.rule
    }

    /// Human-readable explanation.
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Every violation found in a rejected batch.
///
/// Keys are ordered by record index, then field; violations within a key
/// keep rule declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationFailure {
    violations: BTreeMap<ViolationKey, Vec<Violation>>,
}

impl ValidationFailure {
    fn push(&mut self, key: ViolationKey, violation: Violation) {
        self.violations.entry(key).or_default().push(violation);
    }

    /// Whether no violations were recorded.
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// Number of distinct offending paths.
    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Offending paths such as `"0.email"`, in report order.
    pub fn paths(&self) -> Vec<String> {
        self.violations.keys().map(ToString::to_string).collect()
    }

    /// Names of the rules violated by `field` on the record at `index`.
    pub fn rules_at(&self, index: usize, field: AccountField) -> Vec<&'static str> {
        let key = ViolationKey {
            index,
            field: Some(field),
        };
        self.violations
            .get(&key)
            .map(|found| found.iter().map(Violation::rule).collect())
            .unwrap_or_default()
    }

    /// Iterate over every offending path with its violations.
    pub fn iter(&self) -> impl Iterator<Item = (&ViolationKey, &[Violation])> {
        self.violations
            .iter()
            .map(|(key, found)| (key, found.as_slice()))
    }

    /// Structured payload for adapters: rule names and messages per path.
    ///
    /// # Examples
    /// ```
    /// use user_accounts::domain::ValidationFailure;
    ///
    /// let details = ValidationFailure::default().to_details();
    /// assert!(details["errors"].as_object().is_some_and(|e| e.is_empty()));
    /// ```
    pub fn to_details(&self) -> Value {
        let mut errors = Map::new();
        let mut messages = Map::new();
        for (key, found) in &self.violations {
            let path = key.to_string();
            errors.insert(
                path.clone(),
                found.iter().map(|v| Value::from(v.rule())).collect(),
            );
            messages.insert(
                path,
                found.iter().map(|v| Value::from(v.message())).collect(),
            );
        }
        json!({ "errors": errors, "messages": messages })
    }

    fn summary(&self) -> String {
        self.violations
            .iter()
            .map(|(key, found)| {
                let rules: Vec<&str> = found.iter().map(Violation::rule).collect();
                format!("{key} ({})", rules.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} invalid field(s): {}",
            self.violations.len(),
            self.summary()
        )
    }
}

impl std::error::Error for ValidationFailure {}

/// Errors that stop validation from completing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchValidationError {
    /// One or more rules failed.
    #[error(transparent)]
    Invalid(#[from] ValidationFailure),
    /// A uniqueness or existence lookup could not be answered.
    #[error("validation lookup failed: {0}")]
    Lookup(#[from] AccountStoreError),
}

/// Normalised view of one field of one record.
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Absent,
    Text(String),
    Other,
}

impl FieldValue {
    fn read(record: &Map<String, Value>, field: AccountField) -> Self {
        match record.get(field.as_str()) {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::String(raw)) => {
                let text = if field.is_trimmed() {
                    raw.trim()
                } else {
                    raw.as_str()
                };
                if text.trim().is_empty() {
                    Self::Absent
                } else {
                    Self::Text(text.to_owned())
                }
            }
            Some(Value::Number(number)) if field == AccountField::Id => {
                Self::Text(number.to_string())
            }
            Some(_) => Self::Other,
        }
    }
}

/// Field values of one record, or a marker for a non-object record.
type RecordValues = Option<BTreeMap<AccountField, FieldValue>>;

/// Applies rule sets to whole batches.
pub struct BatchValidator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S> BatchValidator<'a, S>
where
    S: AccountStore + ?Sized,
{
    /// Create a validator reading from `store`.
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Validate `batch` against `rules` and sanitise it for `mode`.
    ///
    /// # Errors
    ///
    /// Returns [`BatchValidationError::Invalid`] listing every violation, or
    /// [`BatchValidationError::Lookup`] when the store cannot answer a
    /// uniqueness or existence query.
    pub async fn validate(
        &self,
        batch: &[Value],
        mode: BatchMode,
        rules: &RuleSet,
    ) -> Result<ValidatedBatch, BatchValidationError> {
        let fields = rules.fields();
        let records: Vec<RecordValues> = batch
            .iter()
            .map(|raw| {
                raw.as_object().map(|object| {
                    fields
                        .iter()
                        .map(|field| (*field, FieldValue::read(object, *field)))
                        .collect()
                })
            })
            .collect();
        let occurrences = count_occurrences(&records);

        let mut failure = ValidationFailure::default();
        for (index, record) in records.iter().enumerate() {
            let Some(values) = record else {
                failure.push(
                    ViolationKey { index, field: None },
                    Violation::malformed(ViolationKey { index, field: None }),
                );
                continue;
            };
            for (field, value) in values {
                let key = ViolationKey {
                    index,
                    field: Some(*field),
                };
                for violation in self
                    .check_field(key, value, &rules.rules_for(index, *field), &occurrences)
                    .await?
                {
                    failure.push(key, violation);
                }
            }
        }

        if !failure.is_empty() {
            debug!(
                mode = %mode,
                records = batch.len(),
                invalid_paths = failure.len(),
                "batch rejected by validation"
            );
            return Err(failure.into());
        }

        assemble(records, mode).map_err(BatchValidationError::from)
    }

    async fn check_field(
        &self,
        key: ViolationKey,
        value: &FieldValue,
        rules: &[Rule],
        occurrences: &Occurrences,
    ) -> Result<Vec<Violation>, AccountStoreError> {
        let bail = rules.contains(&Rule::Bail);
        let mut violations = Vec::new();

        for rule in rules.iter().copied().filter(|rule| *rule != Rule::Bail) {
            let passed = match value {
                FieldValue::Absent => !rule.is_implicit(),
                FieldValue::Other => {
                    if rule.is_format() {
                        violations.push(Violation::new(key, rule));
                        break;
                    }
                    true
                }
                FieldValue::Text(text) => self.check_text(key, text, rule, occurrences).await?,
            };

            if !passed {
                violations.push(Violation::new(key, rule));
                if bail {
                    break;
                }
            }
        }

        Ok(violations)
    }

    async fn check_text(
        &self,
        key: ViolationKey,
        text: &str,
        rule: Rule,
        occurrences: &Occurrences,
    ) -> Result<bool, AccountStoreError> {
        let passed = match rule {
            Rule::Bail | Rule::Required | Rule::Text => true,
            Rule::Matches(pattern) => pattern.is_match(text),
            Rule::MinLength(min) => text.chars().count() >= min,
            Rule::MaxLength(max) => text.chars().count() <= max,
            Rule::Email => EmailAddress::is_valid(text),
            Rule::Exists => match parse_account_id(&Value::from(text)) {
                Some(id) => self.store.exists(id).await?,
                None => false,
            },
            Rule::Unique { column, except } => {
                !self.store.is_taken(column, text, except).await?
            }
            Rule::Distinct => key
                .field
                .is_none_or(|field| occurrences.count(field, text) <= 1),
        };
        Ok(passed)
    }
}

/// How often each value appears per field across the batch.
#[derive(Debug, Default)]
struct Occurrences {
    counts: HashMap<(AccountField, String), usize>,
}

impl Occurrences {
    fn count(&self, field: AccountField, text: &str) -> usize {
        self.counts
            .get(&(field, distinct_key(field, text)))
            .copied()
            .unwrap_or(0)
    }
}

fn distinct_key(field: AccountField, text: &str) -> String {
    if field == AccountField::Id {
        if let Some(id) = parse_account_id(&Value::from(text)) {
            return id.to_string();
        }
    }
    text.to_owned()
}

fn count_occurrences(records: &[RecordValues]) -> Occurrences {
    let mut occurrences = Occurrences::default();
    for values in records.iter().flatten() {
        for (field, value) in values {
            if let FieldValue::Text(text) = value {
                *occurrences
                    .counts
                    .entry((*field, distinct_key(*field, text)))
                    .or_insert(0) += 1;
            }
        }
    }
    occurrences
}

fn take_text(
    values: &mut BTreeMap<AccountField, FieldValue>,
    field: AccountField,
) -> Option<String> {
    match values.remove(&field) {
        Some(FieldValue::Text(text)) => Some(text),
        _ => None,
    }
}

/// Convert clean records into typed drafts or patches.
///
/// Records missing a field the mode cannot do without are reported as
/// `required` violations, which only happens for rule sets that omit the
/// corresponding rule.
fn assemble(
    records: Vec<RecordValues>,
    mode: BatchMode,
) -> Result<ValidatedBatch, ValidationFailure> {
    let mut failure = ValidationFailure::default();
    let mut missing = |index: usize, field: AccountField| {
        let key = ViolationKey {
            index,
            field: Some(field),
        };
        failure.push(key, Violation::new(key, Rule::Required));
    };

    let batch = match mode {
        BatchMode::Create => {
            let mut drafts = Vec::with_capacity(records.len());
            for (index, record) in records.into_iter().enumerate() {
                let mut values = record.unwrap_or_default();
                let name = take_text(&mut values, AccountField::Name);
                let login = take_text(&mut values, AccountField::Login);
                let email = take_text(&mut values, AccountField::Email);
                let password = take_text(&mut values, AccountField::Password);
                match (name, login, email, password) {
                    (Some(name), Some(login), Some(email), Some(password)) => {
                        drafts.push(AccountDraft {
                            name,
                            login,
                            email,
                            password: Password::new(password),
                        });
                    }
                    (name, login, email, password) => {
                        for (field, found) in [
                            (AccountField::Name, name.is_some()),
                            (AccountField::Login, login.is_some()),
                            (AccountField::Email, email.is_some()),
                            (AccountField::Password, password.is_some()),
                        ] {
                            if !found {
                                missing(index, field);
                            }
                        }
                    }
                }
            }
            ValidatedBatch::Create(drafts)
        }
        BatchMode::Update => {
            let mut patches = Vec::with_capacity(records.len());
            for (index, record) in records.into_iter().enumerate() {
                let mut values = record.unwrap_or_default();
                let id = take_text(&mut values, AccountField::Id)
                    .and_then(|raw| parse_account_id(&Value::from(raw)));
                let Some(id) = id else {
                    missing(index, AccountField::Id);
                    continue;
                };
                patches.push(AccountPatch {
                    id,
                    name: take_text(&mut values, AccountField::Name),
                    login: take_text(&mut values, AccountField::Login),
                    email: take_text(&mut values, AccountField::Email),
                    password: take_text(&mut values, AccountField::Password).map(Password::new),
                });
            }
            ValidatedBatch::Update(patches)
        }
    };

    if failure.is_empty() {
        Ok(batch)
    } else {
        Err(failure)
    }
}

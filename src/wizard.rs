use crate::models::{
    DEFAULT_CYCLE_LENGTH, DEFAULT_PERIOD_LENGTH, Identity, ProfileRecord, loose_int,
};
use crate::profile_store::LocalProfileStore;
use crate::storage::KeyValueStore;
use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{info, warn};

pub const TOTAL_STEPS: usize = 3;

/// Fields that must be filled before leaving each step.
const REQUIRED_FIELDS: [&[&str]; TOTAL_STEPS] = [&["name"], &["lastPeriod"], &[]];

/// Keys that are derived at submission and never taken from the form.
const DERIVED_FIELDS: [&str; 6] = [
    "email",
    "cycleLength",
    "periodLength",
    "nextPeriod",
    "setupComplete",
    "updatedAt",
];

pub type FormAnswers = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardError {
    #[error("Please fill in all required fields")]
    MissingFields(Vec<String>),
    #[error("Finish the remaining steps before submitting")]
    NotFinished { step: usize },
    #[error("Could not save setup data in this browser.")]
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Completed,
    Active,
    Pending,
}

/// Progress through the setup wizard for one account.
#[derive(Debug, Clone)]
pub struct WizardContext {
    identity: Identity,
    current_step: usize,
    answers: FormAnswers,
}

impl WizardContext {
    pub fn new(identity: Identity) -> Self {
        let mut answers = FormAnswers::new();
        answers.insert("name".to_string(), Value::String(identity.name.clone()));
        Self {
            identity,
            current_step: 1,
            answers,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn is_last_step(&self) -> bool {
        self.current_step == TOTAL_STEPS
    }

    pub fn answers(&self) -> &FormAnswers {
        &self.answers
    }

    pub fn answer_text(&self, key: &str) -> &str {
        self.answers.get(key).and_then(Value::as_str).unwrap_or("")
    }

    pub fn progress(&self) -> Vec<StepState> {
        (1..=TOTAL_STEPS)
            .map(|step| match step.cmp(&self.current_step) {
                std::cmp::Ordering::Less => StepState::Completed,
                std::cmp::Ordering::Equal => StepState::Active,
                std::cmp::Ordering::Greater => StepState::Pending,
            })
            .collect()
    }

    /// Validates the current step with `fields` applied and moves forward.
    pub fn next_step(&mut self, fields: FormAnswers) -> Result<usize, WizardError> {
        self.absorb_validated(fields)?;
        if self.current_step < TOTAL_STEPS {
            self.current_step += 1;
        }
        Ok(self.current_step)
    }

    /// Keeps whatever was typed and moves back. No validation going backwards.
    pub fn prev_step(&mut self, fields: FormAnswers) -> usize {
        self.answers.extend(fields);
        if self.current_step > 1 {
            self.current_step -= 1;
        }
        self.current_step
    }

    fn absorb_validated(&mut self, fields: FormAnswers) -> Result<(), WizardError> {
        let mut merged = self.answers.clone();
        merged.extend(fields);
        validate_step(self.current_step, &merged)?;
        self.answers = merged;
        Ok(())
    }
}

pub fn validate_step(step: usize, answers: &FormAnswers) -> Result<(), WizardError> {
    let Some(required) = step.checked_sub(1).and_then(|index| REQUIRED_FIELDS.get(index)) else {
        return Ok(());
    };

    let missing: Vec<String> = required
        .iter()
        .filter(|field| !answers.get(**field).is_some_and(has_content))
        .map(|field| field.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(WizardError::MissingFields(missing))
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::String(text) => !text.trim().is_empty(),
        Value::Array(items) => items.iter().any(has_content),
        Value::Null => false,
        _ => true,
    }
}

/// Folds submitted form pairs into answers. A key sent more than once
/// becomes an array in submission order.
pub fn collect_form_data(pairs: Vec<(String, String)>) -> FormAnswers {
    let mut answers = FormAnswers::new();
    for (key, value) in pairs {
        match answers.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                answers.insert(key, Value::String(value));
            }
        }
    }
    answers
}

fn answer_int(answers: &FormAnswers, key: &str) -> Option<i64> {
    answers.get(key).and_then(loose_int)
}

fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|moment| moment.date_naive())
        })
}

/// `last_period + cycle_length` days as `YYYY-MM-DD`, or an empty string when
/// the date cannot be read.
pub fn compute_next_period(last_period: &str, cycle_length: i64) -> String {
    parse_calendar_date(last_period)
        .zip(Duration::try_days(cycle_length))
        .and_then(|(date, cycle)| date.checked_add_signed(cycle))
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Turns raw wizard answers into the stored profile.
pub fn build_profile(mut answers: FormAnswers, email: &str, now: DateTime<Utc>) -> ProfileRecord {
    let cycle_length = answer_int(&answers, "cycleLength").unwrap_or(DEFAULT_CYCLE_LENGTH);
    let period_length = answer_int(&answers, "periodLength").unwrap_or(DEFAULT_PERIOD_LENGTH);
    let next_period = answers
        .get("lastPeriod")
        .and_then(Value::as_str)
        .map(|last_period| compute_next_period(last_period, cycle_length))
        .unwrap_or_default();

    for field in DERIVED_FIELDS {
        answers.remove(field);
    }

    ProfileRecord {
        email: Some(email.to_string()).filter(|email| !email.is_empty()),
        cycle_length,
        period_length,
        next_period,
        setup_complete: true,
        updated_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        answers,
    }
}

/// Finishes the wizard: validates the last step and records the profile.
///
/// The global `userData` slot is written first; if that fails nothing else is
/// touched and [`WizardError::Storage`] is returned.
pub async fn submit_setup<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    context: &mut WizardContext,
    fields: FormAnswers,
    now: DateTime<Utc>,
) -> Result<ProfileRecord, WizardError> {
    if !context.is_last_step() {
        return Err(WizardError::NotFinished {
            step: context.current_step,
        });
    }
    context.absorb_validated(fields)?;

    let email = context.identity.email.clone();
    let profile = build_profile(context.answers.clone(), &email, now);
    if !store.set_setup_data(&profile).await {
        return Err(WizardError::Storage);
    }

    let name = profile
        .answer_str("name")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| context.identity.name.clone());

    let mut users = store.users();
    let record = users.entry(email.clone()).or_default();
    record.email = email.clone();
    record.name = name.clone();
    record.setup_done = true;
    record.profile = Some(profile.clone());
    if !store.set_users(&users).await {
        warn!(email = %email, "setup saved globally but account record was not updated");
    }

    let identity = Identity { email: email.clone(), name };
    if !store.set_current_user(&identity).await {
        warn!(email = %email, "could not cache account after setup");
    }

    let mut by_email = store.setup_data_by_email();
    by_email.insert(email.clone(), profile.clone());
    if !store.set_setup_data_by_email(&by_email).await {
        warn!(email = %email, "could not store per-account setup profile");
    }

    info!(email = %email, next_period = %profile.next_period, "setup completed");
    context.identity = identity;
    Ok(profile)
}

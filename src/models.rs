use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const DEFAULT_CYCLE_LENGTH: i64 = 28;
pub const DEFAULT_PERIOD_LENGTH: i64 = 5;

/// The account a page is acting for. The email is the unique key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

impl Identity {
    /// Builds an identity from loosely typed parts, defaulting the name to the
    /// local part of the email. Returns `None` without an email.
    pub fn from_parts(email: Option<&str>, name: Option<&str>) -> Option<Self> {
        let email = email.filter(|email| !email.is_empty())?;
        let name = match name.filter(|name| !name.is_empty()) {
            Some(name) => name.to_string(),
            None => email_local_part(email).to_string(),
        };

        Some(Self {
            email: email.to_string(),
            name,
        })
    }
}

pub fn email_local_part(email: &str) -> &str {
    email.split('@').next().unwrap_or(email)
}

/// Shape of the `erayaUser` slot as it may appear on disk.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoredIdentity {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl StoredIdentity {
    pub fn into_identity(self) -> Option<Identity> {
        Identity::from_parts(self.email.as_deref(), self.name.as_deref())
    }
}

/// One known account in `erayaUsers`.
///
/// A record written here with `setup_done` also carries a completed `profile`.
/// Fields this crate does not know about are carried through `extra`.
///
/// Every field decodes on its own, so an odd `profile` never costs the
/// record its `setupDone` flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, deserialize_with = "loose_string")]
    pub email: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub name: String,
    #[serde(default, deserialize_with = "truthy")]
    pub setup_done: bool,
    #[serde(
        default,
        deserialize_with = "tolerant_profile",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile: Option<ProfileRecord>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Answers from the setup wizard plus the fields derived at submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    #[serde(
        default,
        deserialize_with = "loose_optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub email: Option<String>,
    #[serde(default = "default_cycle_length", deserialize_with = "cycle_length")]
    pub cycle_length: i64,
    #[serde(default = "default_period_length", deserialize_with = "period_length")]
    pub period_length: i64,
    #[serde(default, deserialize_with = "loose_string")]
    pub next_period: String,
    #[serde(default, deserialize_with = "truthy")]
    pub setup_complete: bool,
    #[serde(default, deserialize_with = "loose_string")]
    pub updated_at: String,
    #[serde(flatten)]
    pub answers: Map<String, Value>,
}

impl ProfileRecord {
    pub fn answer_str(&self, key: &str) -> Option<&str> {
        self.answers.get(key).and_then(Value::as_str)
    }

    pub fn belongs_to(&self, email: &str) -> bool {
        self.email.as_deref() == Some(email)
    }
}

impl Default for ProfileRecord {
    fn default() -> Self {
        Self {
            email: None,
            cycle_length: DEFAULT_CYCLE_LENGTH,
            period_length: DEFAULT_PERIOD_LENGTH,
            next_period: String::new(),
            setup_complete: false,
            updated_at: String::new(),
            answers: Map::new(),
        }
    }
}

fn default_cycle_length() -> i64 {
    DEFAULT_CYCLE_LENGTH
}

fn default_period_length() -> i64 {
    DEFAULT_PERIOD_LENGTH
}

/// Counters behind the wellness dashboard (`wellnessStats`).
///
/// A counter that does not read as a number counts as zero; its neighbours
/// and the unknown keys are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WellnessStats {
    #[serde(
        default,
        deserialize_with = "loose_optional_count",
        skip_serializing_if = "Option::is_none"
    )]
    pub days_tracked: Option<u64>,
    #[serde(default, deserialize_with = "loose_count")]
    pub workouts: u64,
    #[serde(default, deserialize_with = "loose_count")]
    pub meditation: u64,
    #[serde(default, deserialize_with = "loose_count")]
    pub water_glasses: u64,
    #[serde(default, deserialize_with = "loose_counts")]
    pub water_by_date: BTreeMap<String, u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize)]
pub struct DailyPoint {
    pub date: String,
    pub water_glasses: u64,
    pub symptom_count: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub days_tracked: u64,
    pub workouts: u64,
    pub meditation_minutes: u64,
    pub water_today: u64,
    pub last_7_days: Vec<DailyPoint>,
}

/// Reads a flag the way the pages always did: any JSON value, judged by truthiness.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(flag) => flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

/// Integer prefix of `raw`, the way form inputs have always been read:
/// `"30 days"` is 30, `"abc"` is nothing.
pub fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|value| sign * value)
}

/// A JSON number or numeric string as an integer. Fractions are truncated.
pub fn loose_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|value| value.trunc() as i64)),
        Value::String(text) => parse_leading_int(text),
        _ => None,
    }
}

fn non_negative(value: &Value) -> Option<u64> {
    loose_int(value).map(|count| count.max(0) as u64)
}

fn cycle_length<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(loose_int(&value).unwrap_or(DEFAULT_CYCLE_LENGTH))
}

fn period_length<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(loose_int(&value).unwrap_or(DEFAULT_PERIOD_LENGTH))
}

fn loose_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(non_negative(&value).unwrap_or(0))
}

fn loose_optional_count<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(non_negative(&value))
}

fn loose_counts<'de, D>(deserializer: D) -> Result<BTreeMap<String, u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let Value::Object(entries) = Value::deserialize(deserializer)? else {
        return Ok(BTreeMap::new());
    };
    Ok(entries
        .into_iter()
        .filter_map(|(date, count)| non_negative(&count).map(|count| (date, count)))
        .collect())
}

fn loose_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(loose_optional_string(deserializer)?.unwrap_or_default())
}

fn loose_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

/// A profile that cannot be read is treated as missing.
fn tolerant_profile<'de, D>(deserializer: D) -> Result<Option<ProfileRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

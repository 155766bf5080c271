use crate::profile_store::LocalProfileStore;
use crate::storage::KeyValueStore;
use rand::seq::{IndexedRandom, SliceRandom};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const TIPS_SHOWN: usize = 4;
pub const NO_NUTRITION_NOTICE: &str = "No nutrition data available for this phase.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WellnessError {
    #[error("Could not save water tracking in this browser.")]
    WaterNotSaved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub text: String,
    pub author: String,
}

const FALLBACK_QUOTES: [(&str, &str); 5] = [
    ("Your body is your most priceless possession. Take care of it.", "Jack Lalanne"),
    ("Health is a state of body, wellness is a state of being.", "J. Stanford"),
    ("Take care of your body. It is the only place you have to live.", "Jim Rohn"),
    ("Self-care is giving the world the best of you, instead of what is left of you.", "Katie Reed"),
    ("Wellness is the complete integration of body, mind, and spirit.", "Greg Anderson"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthTip {
    pub title: String,
    pub description: String,
}

const BASE_TIPS: [(&str, &str); 6] = [
    (
        "Stay Hydrated",
        "Drinking plenty of water helps reduce bloating and can ease menstrual cramps. Aim for 8-10 glasses daily.",
    ),
    (
        "Gentle Movement",
        "Light exercise like walking or yoga can help reduce period pain and boost your mood through endorphin release.",
    ),
    (
        "Heat Therapy",
        "Apply a heating pad to your lower abdomen for 15-20 minutes to relax muscles and relieve cramps.",
    ),
    (
        "Magnesium-Rich Foods",
        "Include foods like spinach, almonds, and dark chocolate to help reduce cramps and muscle tension.",
    ),
    (
        "Quality Sleep",
        "Aim for 7-9 hours of sleep to help regulate hormones and reduce fatigue during your period.",
    ),
    (
        "Reduce Caffeine",
        "Limiting caffeine can help reduce breast tenderness and anxiety during your menstrual cycle.",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FoodItem {
    pub icon: &'static str,
    pub name: &'static str,
}

const fn food(icon: &'static str, name: &'static str) -> FoodItem {
    FoodItem { icon, name }
}

const MENSTRUAL_FOODS: [FoodItem; 6] = [
    food("🥬", "Leafy Greens - Iron boost"),
    food("🐟", "Salmon - Omega-3 for pain relief"),
    food("🍫", "Dark Chocolate - Magnesium and comfort"),
    food("🥜", "Nuts and Seeds - Reduce inflammation"),
    food("🍓", "Berries - Antioxidants"),
    food("🥑", "Avocado - Healthy fats"),
];

const FOLLICULAR_FOODS: [FoodItem; 6] = [
    food("🥚", "Eggs - Protein and B vitamins"),
    food("🥦", "Broccoli - Estrogen balance"),
    food("🫐", "Blueberries - Energy boost"),
    food("🌰", "Brazil Nuts - Selenium"),
    food("🥕", "Carrots - Beta-carotene"),
    food("🫘", "Lentils - Plant protein"),
];

const OVULATION_FOODS: [FoodItem; 6] = [
    food("🍊", "Citrus Fruits - Vitamin C"),
    food("🥬", "Spinach - Folate"),
    food("🫐", "Berries - Antioxidants"),
    food("🥜", "Almonds - Vitamin E"),
    food("🫑", "Bell Peppers - Vitamin C"),
    food("🥥", "Coconut - Healthy fats"),
];

const LUTEAL_FOODS: [FoodItem; 6] = [
    food("🍠", "Sweet Potatoes - Complex carbs"),
    food("🥬", "Dark Leafy Greens - Calcium"),
    food("🍌", "Bananas - B6 for mood"),
    food("🌻", "Sunflower Seeds - Vitamin E"),
    food("🥜", "Chickpeas - Magnesium"),
    food("🍫", "Dark Chocolate - Mood support"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePhase {
    Menstrual,
    Follicular,
    Ovulation,
    Luteal,
}

impl CyclePhase {
    pub fn foods(self) -> &'static [FoodItem] {
        match self {
            Self::Menstrual => &MENSTRUAL_FOODS,
            Self::Follicular => &FOLLICULAR_FOODS,
            Self::Ovulation => &OVULATION_FOODS,
            Self::Luteal => &LUTEAL_FOODS,
        }
    }
}

impl FromStr for CyclePhase {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "menstrual" => Ok(Self::Menstrual),
            "follicular" => Ok(Self::Follicular),
            "ovulation" => Ok(Self::Ovulation),
            "luteal" => Ok(Self::Luteal),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseDetails {
    pub title: &'static str,
    pub duration: &'static str,
    pub benefits: &'static str,
    pub bullets_title: &'static str,
    pub bullets: &'static [&'static str],
}

/// Guidance for one of the suggested exercises, if `kind` is known.
pub fn exercise_details(kind: &str) -> Option<ExerciseDetails> {
    let details = match kind {
        "yoga" => ExerciseDetails {
            title: "Gentle Yoga Flow",
            duration: "15-20 minutes",
            benefits: "Reduces cramps, improves flexibility, calms mind",
            bullets_title: "Recommended Poses",
            bullets: &["Child's Pose", "Cat-Cow", "Reclined Twist", "Legs Up The Wall"],
        },
        "walking" => ExerciseDetails {
            title: "Light Walking",
            duration: "20-30 minutes",
            benefits: "Boosts circulation, reduces bloating, improves mood",
            bullets_title: "Helpful Tips",
            bullets: &["Start slow", "Maintain steady pace", "Breathe deeply"],
        },
        "stretching" => ExerciseDetails {
            title: "Gentle Stretching",
            duration: "10-15 minutes",
            benefits: "Relieves muscle tension, improves blood flow",
            bullets_title: "Focus Areas",
            bullets: &["Lower back", "Hips", "Legs", "Shoulders"],
        },
        _ => return None,
    };
    Some(details)
}

pub fn fallback_quote() -> Quote {
    let (text, author) = FALLBACK_QUOTES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(FALLBACK_QUOTES[0]);
    Quote {
        text: text.to_string(),
        author: author.to_string(),
    }
}

/// Picks [`TIPS_SHOWN`] tips at random from the base set plus `advice`.
pub fn pick_tips(advice: Option<String>) -> Vec<HealthTip> {
    let mut tips: Vec<HealthTip> = BASE_TIPS
        .iter()
        .map(|(title, description)| HealthTip {
            title: title.to_string(),
            description: description.to_string(),
        })
        .collect();
    if let Some(advice) = advice {
        tips.push(HealthTip {
            title: "Wellness Wisdom".to_string(),
            description: advice,
        });
    }

    tips.shuffle(&mut rand::rng());
    tips.truncate(TIPS_SHOWN);
    tips
}

#[derive(Debug, Error)]
enum FeedError {
    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("feed timed out")]
    Timeout,
    #[error("feed returned an unexpected body")]
    Unexpected,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuotePayload {
    Many(Vec<RawQuote>),
    One(RawQuote),
}

#[derive(Debug, Deserialize)]
struct RawQuote {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdvicePayload {
    slip: Option<AdviceSlip>,
}

#[derive(Debug, Deserialize)]
struct AdviceSlip {
    advice: Option<String>,
}

/// Public quote and advice feeds. Both are optional decoration: every
/// failure falls back to built-in content.
#[derive(Clone)]
pub struct WellnessFeeds {
    client: Client,
    quote_url: String,
    advice_url: String,
    timeout: Duration,
}

impl WellnessFeeds {
    pub fn new(client: Client, quote_url: String, advice_url: String, timeout: Duration) -> Self {
        Self {
            client,
            quote_url,
            advice_url,
            timeout,
        }
    }

    pub async fn daily_quote(&self) -> Quote {
        match self.fetch_quote().await {
            Ok(quote) => quote,
            Err(err) => {
                debug!(error = %err, "quote feed unavailable, using fallback");
                fallback_quote()
            }
        }
    }

    pub async fn health_tips(&self) -> Vec<HealthTip> {
        let advice = match self.fetch_advice().await {
            Ok(advice) => Some(advice),
            Err(err) => {
                debug!(error = %err, "advice feed unavailable");
                None
            }
        };
        pick_tips(advice)
    }

    async fn fetch_quote(&self) -> Result<Quote, FeedError> {
        let payload: QuotePayload = self.fetch_json(&self.quote_url).await?;
        let raw = match payload {
            QuotePayload::Many(quotes) => quotes.into_iter().next(),
            QuotePayload::One(quote) => Some(quote),
        }
        .ok_or(FeedError::Unexpected)?;

        let text = raw
            .content
            .filter(|content| !content.is_empty())
            .ok_or(FeedError::Unexpected)?;
        Ok(Quote {
            text,
            author: raw
                .author
                .filter(|author| !author.is_empty())
                .unwrap_or_else(|| "Unknown".to_string()),
        })
    }

    async fn fetch_advice(&self) -> Result<String, FeedError> {
        let payload: AdvicePayload = self.fetch_json(&self.advice_url).await?;
        payload
            .slip
            .and_then(|slip| slip.advice)
            .filter(|advice| !advice.is_empty())
            .ok_or(FeedError::Unexpected)
    }

    async fn fetch_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, FeedError> {
        let call = async {
            self.client
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<T>()
                .await
        };
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(FeedError::Timeout),
        }
    }
}

/// Adds a glass of water to today's tally and returns the new count.
pub async fn track_water<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    today: &str,
) -> Result<u64, WellnessError> {
    let mut stats = store.wellness_stats();
    let glasses = stats.water_by_date.entry(today.to_string()).or_insert(0);
    *glasses += 1;
    let glasses = *glasses;
    stats.water_glasses = glasses;

    if !store.set_wellness_stats(&stats).await {
        return Err(WellnessError::WaterNotSaved);
    }
    info!(today, glasses, "water logged");
    Ok(glasses)
}

/// Credits a finished meditation session.
pub async fn credit_meditation<S: KeyValueStore>(
    store: &mut LocalProfileStore<S>,
    minutes: u32,
) -> bool {
    let mut stats = store.wellness_stats();
    stats.meditation += u64::from(minutes);
    store.set_wellness_stats(&stats).await
}

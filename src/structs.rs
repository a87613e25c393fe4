use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// `user_id` written on every generated review.
pub const SYNTHETIC_USER_ID: &str = "AI_GENERATED";

/// Column order of every review table this crate writes.
pub const REVIEW_COLUMNS: [&str; 8] = [
    "text",
    "product_title",
    "rating",
    "timestamp",
    "user_id",
    "asin",
    "label",
    "pair_id",
];

/// One line of the product metadata dump. Everything but the two join
/// fields is ignored.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct MetadataRecord {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub(crate) parent_asin: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub(crate) title: Option<String>,
}

/// One line of the review dump, as parsed.
///
/// Only syntax errors make a line malformed. A field holding a value of the
/// wrong type reads as missing, and the review's own headline is not parsed
/// at all.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawReview {
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub parent_asin: Option<String>,
    #[serde(default, deserialize_with = "deserialize_rating")]
    pub rating: Option<u8>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub text: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub verified_purchase: Option<bool>,
}

fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

// The dumps store ratings as `5.0`; anything that is not a whole star in
// 1..=5 is treated as missing.
fn deserialize_rating<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| value.as_f64()).and_then(|rating| {
        if rating.fract() == 0.0 && (1.0..=5.0).contains(&rating) {
            Some(rating as u8)
        } else {
            None
        }
    }))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Human,
    Synthetic,
}

impl Label {
    pub fn as_u8(self) -> u8 {
        match self {
            Label::Human => 0,
            Label::Synthetic => 1,
        }
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.as_u8())
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(Label::Human),
            1 => Ok(Label::Synthetic),
            other => Err(serde::de::Error::custom(format!(
                "invalid label {other}, expected 0 or 1"
            ))),
        }
    }
}

/// A row of `human_reviews.csv` / `synthetic_reviews.csv`.
///
/// Human and generated reviews share the schema and differ in `label` and
/// `user_id`. `pair_id` links a generated review to the human review it was
/// modelled on and is only assigned once generation succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub text: String,
    pub product_title: String,
    pub rating: u8,
    pub timestamp: Option<i64>,
    pub user_id: String,
    pub asin: String,
    pub label: Label,
    #[serde(default)]
    pub pair_id: Option<u64>,
}

impl ReviewEntry {
    pub fn human(
        text: impl Into<String>,
        product_title: impl Into<String>,
        rating: u8,
        timestamp: Option<i64>,
        user_id: impl Into<String>,
        asin: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            product_title: product_title.into(),
            rating,
            timestamp,
            user_id: user_id.into(),
            asin: asin.into(),
            label: Label::Human,
            pair_id: None,
        }
    }

    /// Builds the generated counterpart of `self`, keeping everything the
    /// two rows are correlated by.
    pub fn synthetic_counterpart(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            product_title: self.product_title.clone(),
            rating: self.rating,
            timestamp: self.timestamp,
            user_id: SYNTHETIC_USER_ID.to_owned(),
            asin: self.asin.clone(),
            label: Label::Synthetic,
            pair_id: self.pair_id,
        }
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Output of the generation phase. `real[i]` and `synthetic[i]` always
/// describe the same pair; `failed` holds the human reviews whose
/// counterpart could not be generated.
#[derive(Debug, Clone, Default)]
pub struct PairedDataset {
    pub real: Vec<ReviewEntry>,
    pub synthetic: Vec<ReviewEntry>,
    pub failed: Vec<ReviewEntry>,
}

impl PairedDataset {
    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub(crate) fn push_pair(&mut self, mut real: ReviewEntry, generated_text: String) {
        real.pair_id = Some(self.real.len() as u64 + 1);
        let synthetic = real.synthetic_counterpart(generated_text);
        self.real.push(real);
        self.synthetic.push(synthetic);
    }
}

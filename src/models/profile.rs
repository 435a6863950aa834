use serde::{Deserialize, Deserializer, Serialize};

/// Read-only snapshot of a user's health profile, owned by the profile store.
///
/// Every field is optional: profiles are filled in gradually by users and the
/// context builder renders only what is present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserMedicalProfile {
    #[serde(alias = "full_name", alias = "name")]
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub age: Option<u32>,
    #[serde(alias = "height")]
    pub height_cm: Option<f64>,
    #[serde(alias = "weight")]
    pub weight_kg: Option<f64>,
    #[serde(alias = "allergy")]
    pub allergies: Option<String>,
    #[serde(alias = "medication", alias = "current_medications")]
    pub medications: Option<String>,
    #[serde(alias = "has_hypertension", deserialize_with = "null_as_false")]
    pub hypertension: bool,
    #[serde(alias = "has_diabetes", deserialize_with = "null_as_false")]
    pub diabetes: bool,
    #[serde(alias = "is_smoker", deserialize_with = "null_as_false")]
    pub smoking: bool,
}

impl UserMedicalProfile {
    /// Body-mass index, only when both height and weight are known and positive.
    pub fn bmi(&self) -> Option<f64> {
        let height_m = self.height_cm.filter(|h| *h > 0.0)? / 100.0;
        let weight = self.weight_kg.filter(|w| *w > 0.0)?;
        Some(weight / (height_m * height_m))
    }
}

/// Stores return `null` for flags the user never answered.
fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

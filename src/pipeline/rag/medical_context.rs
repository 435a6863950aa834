//! Compacts a user's health profile into a short text block for the
//! `{userMedicalContext}` placeholder.

use crate::models::UserMedicalProfile;
use crate::profile_store::ProfileStore;

/// Free-text profile fields are cut to this many characters.
const FREE_TEXT_LIMIT: usize = 50;

/// Fetch the profile for `user_id` and render it.
///
/// Returns an empty string for anonymous callers (no lookup), unknown users,
/// and lookup failures. Never fails.
pub async fn build_medical_context(store: &dyn ProfileStore, user_id: Option<&str>) -> String {
    let Some(user_id) = user_id else {
        return String::new();
    };

    match store.fetch_profile(user_id).await {
        Ok(Some(profile)) => render_medical_context(&profile),
        Ok(None) => {
            tracing::debug!("No profile for user, answering without personalization");
            String::new()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Profile lookup failed, answering without personalization");
            String::new()
        }
    }
}

/// Render a profile snapshot. Lines with nothing to show are dropped.
pub fn render_medical_context(profile: &UserMedicalProfile) -> String {
    let mut lines: Vec<String> = Vec::new();

    if let Some(name) = non_blank(profile.display_name.as_deref()) {
        lines.push(format!("Tên: {name}"));
    }

    let mut summary: Vec<String> = Vec::new();
    if let Some(gender) = non_blank(profile.gender.as_deref()) {
        summary.push(display_gender(gender).to_string());
    }
    if let Some(age) = profile.age {
        summary.push(format!("{age}t"));
    }
    if let Some(bmi) = profile.bmi() {
        summary.push(format!("BMI {bmi:.1}"));
    }
    if !summary.is_empty() {
        lines.push(format!("Thông tin: {}", summary.join(", ")));
    }

    let conditions: Vec<&str> = [
        (profile.hypertension, "THA"),
        (profile.diabetes, "ĐTĐ"),
        (profile.smoking, "HT"),
    ]
    .into_iter()
    .filter_map(|(present, abbrev)| present.then_some(abbrev))
    .collect();
    if !conditions.is_empty() {
        lines.push(format!("Bệnh nền: {}", conditions.join(", ")));
    }

    if let Some(allergies) = non_blank(profile.allergies.as_deref()) {
        lines.push(format!("Dị ứng: {}", truncate_chars(allergies, FREE_TEXT_LIMIT)));
    }
    if let Some(medications) = non_blank(profile.medications.as_deref()) {
        lines.push(format!(
            "Thuốc đang dùng: {}",
            truncate_chars(medications, FREE_TEXT_LIMIT)
        ));
    }

    lines.join("\n")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn display_gender(gender: &str) -> &str {
    match gender.to_lowercase().as_str() {
        "male" | "nam" => "Nam",
        "female" | "nu" | "nữ" => "Nữ",
        _ => gender,
    }
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

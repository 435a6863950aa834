use super::types::{ContextItem, RetrievalResult};

pub const MEDICAL_CONTEXT_TOKEN: &str = "{userMedicalContext}";
pub const CONTEXT_TEXT_TOKEN: &str = "{contextText}";
pub const USER_ADVICE_TOKEN: &str = "{userAdvice}";

/// Added to the prompt only when a health profile was rendered.
pub const USER_ADVICE: &str = "Hãy cá nhân hóa câu trả lời dựa trên thông tin sức khỏe của người dùng ở trên, lưu ý bệnh nền, dị ứng và thuốc đang dùng.";

/// The fallback answer must close with this line.
pub const FALLBACK_DISCLAIMER: &str = "⚠️ Thông tin chỉ mang tính chất tham khảo, không thay thế cho chẩn đoán hoặc tư vấn của bác sĩ.";

pub const DEFAULT_GROUNDED_TEMPLATE: &str = r#"Bạn là trợ lý sức khỏe AI, luôn trả lời bằng tiếng Việt, ngắn gọn, dễ hiểu và chính xác.

THÔNG TIN NGƯỜI DÙNG:
{userMedicalContext}

TÀI LIỆU THAM KHẢO:
{contextText}

NGUYÊN TẮC:
1. Chỉ sử dụng thông tin trong tài liệu tham khảo ở trên để trả lời.
2. Không chẩn đoán bệnh, không kê đơn thuốc.
3. Nếu tài liệu không đủ để trả lời, hãy nói rõ điều đó.
4. Khuyến khích người dùng đi khám bác sĩ khi có dấu hiệu bất thường.
{userAdvice}"#;

pub const DEFAULT_FALLBACK_TEMPLATE: &str = r#"Bạn là trợ lý sức khỏe AI, luôn trả lời bằng tiếng Việt, ngắn gọn và dễ hiểu.

THÔNG TIN NGƯỜI DÙNG:
{userMedicalContext}

Không tìm thấy tài liệu tham khảo phù hợp cho câu hỏi này. Hãy trả lời dựa trên kiến thức y khoa phổ thông, thận trọng, không chẩn đoán bệnh và không kê đơn thuốc.
{userAdvice}

Luôn kết thúc câu trả lời bằng dòng sau:
"⚠️ Thông tin chỉ mang tính chất tham khảo, không thay thế cho chẩn đoán hoặc tư vấn của bác sĩ.""#;

/// The two system-prompt templates in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    pub grounded: String,
    pub fallback: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::with_overrides(None, None)
    }
}

impl PromptTemplates {
    pub fn with_overrides(grounded: Option<String>, fallback: Option<String>) -> Self {
        Self {
            grounded: grounded.unwrap_or_else(|| DEFAULT_GROUNDED_TEMPLATE.to_string()),
            fallback: fallback.unwrap_or_else(|| DEFAULT_FALLBACK_TEMPLATE.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Grounded,
    Fallback,
}

/// A filled system prompt and which template produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedPrompt {
    pub system: String,
    pub kind: PromptKind,
    pub context_items: usize,
}

/// Pick the template for a filtered retrieval result and fill it.
pub fn compose_system_prompt(
    templates: &PromptTemplates,
    filtered: &RetrievalResult,
    medical_context: &str,
) -> ComposedPrompt {
    let advice = if medical_context.is_empty() { "" } else { USER_ADVICE };

    if !filtered.fallback_needed && !filtered.items.is_empty() {
        let context_text = render_context_text(&filtered.items);
        let system = fill_template(
            &templates.grounded,
            &[
                (MEDICAL_CONTEXT_TOKEN, medical_context),
                (CONTEXT_TEXT_TOKEN, &context_text),
                (USER_ADVICE_TOKEN, advice),
            ],
        );
        ComposedPrompt {
            system,
            kind: PromptKind::Grounded,
            context_items: filtered.items.len(),
        }
    } else {
        let system = fill_template(
            &templates.fallback,
            &[
                (MEDICAL_CONTEXT_TOKEN, medical_context),
                (USER_ADVICE_TOKEN, advice),
            ],
        );
        ComposedPrompt {
            system,
            kind: PromptKind::Fallback,
            context_items: 0,
        }
    }
}

/// One `- content` line per item.
pub fn render_context_text(items: &[ContextItem]) -> String {
    items
        .iter()
        .map(|item| format!("- {}", item.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the first occurrence of each token in `template`.
///
/// Single left-to-right pass: inserted values are never scanned for tokens,
/// and tokens missing from the template are skipped.
pub fn fill_template(template: &str, substitutions: &[(&str, &str)]) -> String {
    let mut pending: Vec<(&str, &str)> = substitutions.to_vec();
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    loop {
        let next = pending
            .iter()
            .enumerate()
            .filter_map(|(i, (token, _))| rest.find(token).map(|pos| (pos, i)))
            .min();

        let Some((pos, i)) = next else {
            out.push_str(rest);
            break;
        };

        let (token, value) = pending.remove(i);
        out.push_str(&rest[..pos]);
        out.push_str(value);
        rest = &rest[pos + token.len()..];
    }

    out
}

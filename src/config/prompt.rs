use crate::store::{ ConversationStore, FaqRecord };
use log::{ error, info, warn };

const BASE_SYSTEM_PROMPT: &str = "You are a friendly and helpful support agent for a small e-commerce store.

Your responsibilities:
- Answer customer questions clearly and concisely
- Provide helpful information about products, orders, shipping, and returns
- Be professional, empathetic, and approachable
- Keep responses focused and to the point

STRICT GUARDRAILS:
- You MUST ONLY answer questions using the information provided in the store FAQ knowledge base below
- If a customer asks about something NOT covered in the FAQs, politely acknowledge the question and suggest contacting support for the most accurate information
- NEVER invent or make up order details, tracking numbers, customer data, product specifications, or pricing
- ALWAYS err on the side of saying you don't know if the information isn't in the FAQ

Constraints:
- You do not have access to real-time order, payment, or customer data
- You cannot look up specific orders, shipments, or account information
- You can only provide general information from the FAQ knowledge base

Guidelines:
- Use simple, clear language
- Show empathy for customer concerns
- When you cannot provide an answer, politely direct the user to contact support with phrasing like:
  \"I'm not sure about that, but our support team will be happy to help! Please reach out to them for assistance.\"";

/// System instruction sent as the first model message. The FAQ knowledge
/// block is loaded once at startup; a load failure degrades to the base
/// prompt instead of aborting.
pub struct SystemPrompt {
    text: String,
}

impl SystemPrompt {
    pub async fn load(store: &dyn ConversationStore) -> Self {
        match store.list_faqs().await {
            Ok(faqs) if !faqs.is_empty() => {
                info!("Loaded {} FAQs into the system prompt", faqs.len());
                Self {
                    text: format!("{}\n\n{}", BASE_SYSTEM_PROMPT, format_faq_block(&faqs)),
                }
            }
            Ok(_) => {
                warn!("No FAQs found, using base system prompt only");
                Self::base()
            }
            Err(e) => {
                error!("Failed to load FAQs: {}", e);
                Self::base()
            }
        }
    }

    pub fn base() -> Self {
        Self {
            text: BASE_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Format FAQ rows (already sorted by category) into a prompt text block.
fn format_faq_block(faqs: &[FaqRecord]) -> String {
    let mut lines = vec![
        "--- Store FAQ Knowledge Base ---".to_string(),
        "Use this information to answer customer questions:\n".to_string()
    ];

    let mut current_category: Option<&str> = None;
    for faq in faqs {
        if current_category != Some(faq.category.as_str()) {
            lines.push(format!("{}:", faq.category.to_uppercase()));
            current_category = Some(faq.category.as_str());
        }
        lines.push(format!("Q: {}", faq.question));
        lines.push(format!("A: {}\n", faq.answer));
    }

    lines.join("\n")
}

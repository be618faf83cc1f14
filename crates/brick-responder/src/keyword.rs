//! Keyword-matched canned replies
//!
//! The default generator used until a real inference backend is plugged in.
//! Input is classified by substring presence and answered with a fixed
//! bilingual template.

use async_trait::async_trait;
use brick_core::Language;

use crate::error::Result;
use crate::responder::ResponseGenerator;

/// What the investor is asking about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Dashboard,
    Property,
    Verification,
    Market,
    Greeting,
    General,
}

/// Checked in order; the first topic with a matching keyword wins
const TOPIC_KEYWORDS: &[(Topic, &[&str])] = &[
    (
        Topic::Dashboard,
        &["dashboard", "portfolio", "my investment", "returns", "لوحة", "محفظ", "استثمارات"],
    ),
    (
        Topic::Property,
        &["property", "properties", "real estate", "listing", "عقار", "عقارات", "ملكية"],
    ),
    (
        Topic::Verification,
        &["kyc", "verify", "verification", "identity", "document", "التحقق", "توثيق", "هوية"],
    ),
    (
        Topic::Market,
        &["market", "trend", "price", "yield", "سوق", "أسعار", "عائد"],
    ),
    (
        Topic::Greeting,
        &["hello", "hi", "hey", "good morning", "good evening", "مرحبا", "السلام", "أهلا"],
    ),
];

impl Topic {
    /// Classify free text by keyword presence
    pub fn classify(input: &str) -> Topic {
        let lowered = input.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for (topic, keywords) in TOPIC_KEYWORDS {
            let hit = keywords.iter().any(|keyword| {
                // Short latin keywords must match a whole word so "hi" does
                // not fire on "this" or "which".
                if keyword.is_ascii() && keyword.len() <= 3 {
                    words.iter().any(|w| w == keyword)
                } else {
                    lowered.contains(keyword)
                }
            });
            if hit {
                return *topic;
            }
        }
        Topic::General
    }

    /// Template reply for this topic
    pub fn reply(&self, language: Language) -> &'static str {
        match (self, language) {
            (Topic::Dashboard, Language::En) => {
                "Your dashboard shows your active investments, expected returns and distribution history. Open the Dashboard tab to see each property's performance."
            }
            (Topic::Dashboard, Language::Ar) => {
                "تعرض لوحة التحكم استثماراتك النشطة والعوائد المتوقعة وسجل التوزيعات. افتح تبويب لوحة التحكم لمتابعة أداء كل عقار."
            }
            (Topic::Property, Language::En) => {
                "We list vetted residential and commercial properties. Each listing shows the funding target, minimum ticket and projected yield. Browse the Properties page to get started."
            }
            (Topic::Property, Language::Ar) => {
                "نعرض عقارات سكنية وتجارية تم فحصها بعناية. تعرض كل قائمة هدف التمويل والحد الأدنى للاستثمار والعائد المتوقع. تصفح صفحة العقارات للبدء."
            }
            (Topic::Verification, Language::En) => {
                "To complete KYC verification, upload a valid ID and proof of address from your profile. Reviews usually finish within two business days."
            }
            (Topic::Verification, Language::Ar) => {
                "لإكمال التحقق من الهوية، قم برفع هوية سارية وإثبات عنوان من ملفك الشخصي. تكتمل المراجعة عادة خلال يومي عمل."
            }
            (Topic::Market, Language::En) => {
                "Market conditions vary by city and asset type. Each property page includes a market summary with recent price and rental-yield trends."
            }
            (Topic::Market, Language::Ar) => {
                "تختلف ظروف السوق حسب المدينة ونوع الأصل. تتضمن صفحة كل عقار ملخصا للسوق مع أحدث اتجاهات الأسعار وعوائد الإيجار."
            }
            (Topic::Greeting, Language::En) => {
                "Hello! I'm your investment assistant. Ask me about properties, your dashboard, verification or market trends."
            }
            (Topic::Greeting, Language::Ar) => {
                "مرحبا! أنا مساعدك الاستثماري. اسألني عن العقارات أو لوحة التحكم أو التحقق من الهوية أو اتجاهات السوق."
            }
            (Topic::General, Language::En) => {
                "Thanks for your message. I can help with properties, your dashboard, KYC verification and market insights. What would you like to know?"
            }
            (Topic::General, Language::Ar) => {
                "شكرا لرسالتك. يمكنني مساعدتك في العقارات ولوحة التحكم والتحقق من الهوية ورؤى السوق. ماذا تود أن تعرف؟"
            }
        }
    }
}

/// Deterministic keyword responder
#[derive(Debug, Clone, Default)]
pub struct KeywordResponder;

impl KeywordResponder {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous form, used where no runtime is involved
    pub fn reply_for(&self, input: &str, language: Language) -> &'static str {
        Topic::classify(input).reply(language)
    }
}

#[async_trait]
impl ResponseGenerator for KeywordResponder {
    fn responder_id(&self) -> &str {
        "keyword"
    }

    async fn generate(&self, input: &str, language: Language) -> Result<String> {
        Ok(self.reply_for(input, language).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_topics() {
        assert_eq!(Topic::classify("Tell me about properties"), Topic::Property);
        assert_eq!(Topic::classify("Where is my DASHBOARD?"), Topic::Dashboard);
        assert_eq!(Topic::classify("How do I finish KYC?"), Topic::Verification);
        assert_eq!(Topic::classify("what's the market like"), Topic::Market);
        assert_eq!(Topic::classify("hi"), Topic::Greeting);
        assert_eq!(Topic::classify("which one is this"), Topic::General);
        assert_eq!(Topic::classify("أريد معرفة العقارات"), Topic::Property);
    }

    #[test]
    fn test_first_matching_topic_wins() {
        assert_eq!(
            Topic::classify("hello, show me property listings"),
            Topic::Property
        );
    }

    #[tokio::test]
    async fn test_replies_are_never_empty() {
        let responder = KeywordResponder::new();
        for input in ["", "properties", "مرحبا", "random words"] {
            for language in [Language::En, Language::Ar] {
                let reply = responder.generate(input, language).await.unwrap();
                assert!(!reply.trim().is_empty());
            }
        }
    }

    #[tokio::test]
    async fn test_language_selects_template() {
        let responder = KeywordResponder::new();
        let en = responder.generate("properties", Language::En).await.unwrap();
        let ar = responder.generate("properties", Language::Ar).await.unwrap();
        assert!(en.contains("properties"));
        assert_ne!(en, ar);
    }
}

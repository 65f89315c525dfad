//! Canned replies served when the completion provider can't answer.
//!
//! The message is matched against keyword buckets in a fixed order, so the
//! same text always selects the same template.

use std::sync::Arc;

use crate::config::persona::PersonaConfig;
use crate::models::chat::FallbackReason;

const TIMEOUT_NOTE: &str =
    "\n\n⚠️ Note: AI response timed out, providing basic information instead.";
const ERROR_NOTE: &str =
    "\n\n⚠️ Note: AI system is temporarily unavailable. Providing basic information instead.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Identity,
    Services,
    Contact,
    General,
}

#[derive(Debug, Clone)]
pub struct FallbackPolicy {
    persona: Arc<PersonaConfig>,
    buckets: Vec<(Topic, Vec<String>)>,
}

impl FallbackPolicy {
    pub fn new(persona: Arc<PersonaConfig>) -> Self {
        let mut identity = vec!["about", "experience", "background"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        identity.push(persona.owner_first_name().to_lowercase());

        let mut services = vec!["services", "offer", "business"]
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();
        if let Some(brand) = persona.business_name.split_whitespace().next() {
            services.push(brand.to_lowercase());
        }

        let contact: Vec<String> = vec!["contact", "email", "reach", "connect"]
            .into_iter()
            .map(String::from)
            .collect();

        Self {
            persona,
            buckets: vec![
                (Topic::Identity, identity),
                (Topic::Services, services),
                (Topic::Contact, contact),
            ],
        }
    }

    pub fn classify(&self, message: &str) -> Topic {
        let lower = message.to_lowercase();
        self.buckets
            .iter()
            .find(|(_, words)| words.iter().any(|w| !w.is_empty() && lower.contains(w.as_str())))
            .map(|(topic, _)| *topic)
            .unwrap_or(Topic::General)
    }

    /// Template for `message`, with a note naming the failure class when the
    /// provider failed mid-request.
    pub fn respond(&self, message: &str, reason: FallbackReason) -> String {
        let mut reply = self.template(self.classify(message));
        match reason {
            FallbackReason::ProviderOffline => {}
            FallbackReason::Timeout => reply.push_str(TIMEOUT_NOTE),
            FallbackReason::ProviderError => reply.push_str(ERROR_NOTE),
        }
        reply
    }

    pub fn template(&self, topic: Topic) -> String {
        let p = &self.persona;
        let first = p.owner_first_name();
        match topic {
            Topic::Identity =>
                format!(
                    "I'm {assistant}, {owner}'s AI knowledge database. While my full AI capabilities are temporarily unavailable, I can tell you that {first} is an {title} specializing in {specialty}.\n\n\
                     For detailed information about {first}'s experience, services, and background, please visit:\n\
                     🌐 Website: {website}\n\
                     📧 Email: {email}\n\n\
                     I'll be back to full functionality shortly!",
                    assistant = p.assistant_name,
                    owner = p.owner_name,
                    first = first,
                    title = p.owner_title,
                    specialty = p.specialty,
                    website = p.website,
                    email = p.email,
                ),
            Topic::Services => {
                let services = p.services
                    .iter()
                    .map(|s| format!("• {}", s))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "{business} offers comprehensive {specialty} services including:\n\
                     {services}\n\n\
                     While my AI processing is temporarily offline, you can get full details at:\n\
                     🌐 {website}\n\
                     📧 {email}",
                    business = p.business_name,
                    specialty = p.specialty,
                    services = services,
                    website = p.website,
                    email = p.email,
                )
            }
            Topic::Contact =>
                format!(
                    "You can reach {owner} at:\n\
                     📧 {email}\n\
                     🌐 {website}\n\n\
                     I'm {assistant} - {first}'s AI assistant. I'm experiencing technical difficulties right now, but I'll be back soon with full conversational capabilities!",
                    owner = p.owner_name,
                    email = p.email,
                    website = p.website,
                    assistant = p.assistant_name,
                    first = first,
                ),
            Topic::General =>
                format!(
                    "Hello! I'm {assistant}, {owner}'s AI knowledge database. I'm currently experiencing technical difficulties with my AI processing, but I can still help you with basic information.\n\n\
                     {first} is a {specialty} expert working as an {title}. For detailed information, please visit:\n\
                     🌐 {website}\n\
                     📧 {email}\n\n\
                     I should be back to full functionality shortly. Thank you for your patience!",
                    assistant = p.assistant_name,
                    owner = p.owner_name,
                    first = first,
                    specialty = p.specialty,
                    title = p.owner_title,
                    website = p.website,
                    email = p.email,
                ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> FallbackPolicy {
        FallbackPolicy::new(Arc::new(PersonaConfig::default()))
    }

    #[test]
    fn classifies_by_bucket_order() {
        let p = policy();
        assert_eq!(p.classify("Tell me about yourself"), Topic::Identity);
        assert_eq!(p.classify("Who is BRENDA?"), Topic::Identity);
        assert_eq!(p.classify("What services do you offer?"), Topic::Services);
        assert_eq!(p.classify("Is TamperTantrum hiring?"), Topic::Services);
        assert_eq!(p.classify("How do I reach you?"), Topic::Contact);
        assert_eq!(p.classify("What's the weather?"), Topic::General);
        // Identity is checked before contact.
        assert_eq!(p.classify("email me about your background"), Topic::Identity);
    }

    #[test]
    fn same_message_same_reply() {
        let p = policy();
        let a = p.respond("contact info please", FallbackReason::ProviderOffline);
        let b = p.respond("contact info please", FallbackReason::ProviderOffline);
        assert_eq!(a, b);
        assert!(a.starts_with("You can reach Brenda Hensley"));
    }

    #[test]
    fn notes_name_the_failure_class() {
        let p = policy();
        let offline = p.respond("hi", FallbackReason::ProviderOffline);
        let timeout = p.respond("hi", FallbackReason::Timeout);
        let error = p.respond("hi", FallbackReason::ProviderError);

        assert!(!offline.contains("⚠️"));
        assert!(timeout.ends_with(TIMEOUT_NOTE));
        assert!(error.ends_with(ERROR_NOTE));
        assert!(timeout.starts_with(&offline));
    }

    #[test]
    fn every_template_points_to_contact_channel() {
        let p = policy();
        let persona = PersonaConfig::default();
        for topic in [Topic::Identity, Topic::Services, Topic::Contact, Topic::General] {
            let text = p.template(topic);
            assert!(text.contains(&persona.website), "{topic:?}");
            assert!(text.contains(&persona.email), "{topic:?}");
        }
    }
}

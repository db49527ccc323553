use serde::{Deserialize, Serialize};

use crate::session::QuickReply;

/// Language of the static texts the widget shows on its own (greeting and
/// apology). Bot replies are localized by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fil,
}

const GREETING_PAYLOADS: [&str; 4] = ["/profile_builder", "/job_search", "/upload_resume", "/faq"];

impl Locale {
    pub fn greeting(self) -> &'static str {
        match self {
            Locale::En => "Hi! I'm your onboarding assistant. I'll help you build your profile so employers can find you. What would you like to do?",
            Locale::Fil => "Kumusta! Ako ang iyong onboarding assistant. Tutulungan kitang buuin ang iyong profile para makita ka ng mga employer. Ano ang gusto mong gawin?",
        }
    }

    pub fn greeting_quick_replies(self) -> Vec<QuickReply> {
        let titles: [&str; 4] = match self {
            Locale::En => [
                "Build my profile\nAnswer a few questions about yourself",
                "Find jobs\nBrowse openings that match you",
                "Upload resume\nFill your profile from an existing CV",
                "FAQ\nCommon questions about the platform",
            ],
            Locale::Fil => [
                "Buuin ang profile\nSumagot sa ilang tanong tungkol sa iyo",
                "Maghanap ng trabaho\nTingnan ang mga bakanteng akma sa iyo",
                "Mag-upload ng resume\nPunan ang profile mula sa iyong CV",
                "FAQ\nMga karaniwang tanong tungkol sa platform",
            ],
        };
        titles
            .iter()
            .zip(GREETING_PAYLOADS)
            .map(|(title, payload)| QuickReply::new(*title, payload))
            .collect()
    }

    pub fn connection_error(self) -> &'static str {
        match self {
            Locale::En => "Sorry, I'm having trouble connecting right now. Please try again in a moment.",
            Locale::Fil => "Paumanhin, may problema sa koneksyon ngayon. Pakisubukang muli mamaya.",
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "en-us" | "en-ph" => Ok(Locale::En),
            "fil" | "tl" | "fil-ph" | "tl-ph" => Ok(Locale::Fil),
            other => anyhow::bail!("unsupported locale: {other}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_buttons_share_payloads_across_locales() {
        let en: Vec<_> = Locale::En.greeting_quick_replies().into_iter().map(|q| q.payload).collect();
        let fil: Vec<_> = Locale::Fil.greeting_quick_replies().into_iter().map(|q| q.payload).collect();
        assert_eq!(en, fil);
        assert_eq!(en[0], "/profile_builder");
    }

    #[test]
    fn parses_locale_tags() {
        assert_eq!("EN".parse::<Locale>().unwrap(), Locale::En);
        assert_eq!("tl".parse::<Locale>().unwrap(), Locale::Fil);
        assert!("de".parse::<Locale>().is_err());
    }
}

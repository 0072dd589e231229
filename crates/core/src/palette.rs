use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Industry {
    Health,
    Technology,
    Education,
    Ecommerce,
    Finance,
    General,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Palette {
    pub primary: &'static str,
    pub secondary: &'static str,
    pub accent: &'static str,
    pub cta_label: &'static str,
}

impl Palette {
    pub fn gradient(&self) -> String {
        format!(
            "linear-gradient(135deg, {} 0%, {} 50%, {} 100%)",
            self.primary, self.secondary, self.accent
        )
    }
}

const INDUSTRY_KEYWORDS: &[(Industry, &[&str])] = &[
    (Industry::Health, &["health", "clinic", "doctor", "wellness", "saúde", "saude", "clínica", "médic"]),
    (Industry::Technology, &["tech", "software", "saas", "startup", "tecnologia", "cloud"]),
    (Industry::Education, &["course", "school", "learn", "education", "curso", "escola", "educa"]),
    (Industry::Ecommerce, &["shop", "store", "sale", "discount", "loja", "oferta", "desconto", "ecommerce"]),
    (Industry::Finance, &["bank", "financ", "invest", "loan", "banco", "crédito", "credito"]),
];

impl Industry {
    /// First industry whose keyword prefixes a word of the text.
    pub fn detect(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let words: Vec<&str> =
            lowered.split(|ch: char| !ch.is_alphanumeric()).filter(|w| !w.is_empty()).collect();

        INDUSTRY_KEYWORDS
            .iter()
            .find(|(_, keywords)| {
                words.iter().any(|word| keywords.iter().any(|keyword| word.starts_with(keyword)))
            })
            .map(|(industry, _)| *industry)
            .unwrap_or(Self::General)
    }

    pub fn palette(self) -> Palette {
        match self {
            Self::Health => Palette {
                primary: "#059669",
                secondary: "#10b981",
                accent: "#22d3ee",
                cta_label: "Book an Appointment",
            },
            Self::Technology => Palette {
                primary: "#2563eb",
                secondary: "#3b82f6",
                accent: "#8b5cf6",
                cta_label: "Try It Now",
            },
            Self::Education => Palette {
                primary: "#8b5cf6",
                secondary: "#a78bfa",
                accent: "#c084fc",
                cta_label: "Start Learning",
            },
            Self::Ecommerce => Palette {
                primary: "#16a34a",
                secondary: "#22c55e",
                accent: "#65a30d",
                cta_label: "Shop Now",
            },
            Self::Finance => Palette {
                primary: "#1f2937",
                secondary: "#374151",
                accent: "#d4af37",
                cta_label: "Get Started",
            },
            Self::General => Palette {
                primary: "#6366f1",
                secondary: "#8b5cf6",
                accent: "#a855f7",
                cta_label: "Learn More",
            },
        }
    }
}

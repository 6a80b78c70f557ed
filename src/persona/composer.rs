//! # Personalization Composer
//!
//! Pure functions turning (humor level, first name, pet-name candidates,
//! random source) into the greeting spoken at session start, the system
//! instructions that seed the realtime model, and the confirmation line for a
//! humor change.
//!
//! Randomness is injected through [`RandomSource`] so tests can pin every
//! choice.

use crate::persona::humor::{HumorBand, HumorLevel};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

/// Probability of swapping the first name for a pet name in the casual band.
pub const PET_NAME_PROBABILITY: f64 = 0.3;

/// Source of uniform values in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    fn next_f64(&mut self) -> f64;
}

/// Production random source backed by a `StdRng`.
pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for StdRandom {
    fn next_f64(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Output of [`compose`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Personalization {
    pub band: HumorBand,
    /// Name used in the greeting (first name or a pet name)
    pub address_name: String,
    pub greeting: String,
    pub instructions: String,
}

type Variants = &'static [(u32, &'static str)];

const CASUAL_GREETINGS: Variants = &[
    (3, "Hey {name}! Good to have you here. What's on your mind today?"),
    (2, "Well hello, {name}! Ready when you are. How are things going?"),
    (1, "{name}! There you are. How are you feeling today?"),
];

const WARM_GREETINGS: Variants = &[
    (3, "Hello {name}, it's good to see you. How are you feeling today?"),
    (2, "Hi {name}, I'm glad you're here. How can I support you today?"),
];

const STANDARD_GREETINGS: Variants = &[
    (3, "Hello {name}. How can I help you today?"),
    (1, "Good day, {name}. What would you like to work on today?"),
];

const FORMAL_GREETINGS: Variants = &[
    (2, "Good day, {name}. I am ready to assist you. How may I help?"),
    (1, "Greetings, {name}. Please let me know how I may be of assistance."),
];

const MAXIMALLY_FORMAL_GREETINGS: Variants = &[
    (1, "Good day, {name}. I am at your service. Please state how I may assist you."),
    (1, "Greetings, {name}. This session is now active. Please indicate how I may be of assistance."),
];

fn greetings_for(band: HumorBand) -> Variants {
    match band {
        HumorBand::Casual => CASUAL_GREETINGS,
        HumorBand::WarmProfessional => WARM_GREETINGS,
        HumorBand::StandardProfessional => STANDARD_GREETINGS,
        HumorBand::Formal => FORMAL_GREETINGS,
        HumorBand::MaximallyFormal => MAXIMALLY_FORMAL_GREETINGS,
    }
}

fn style_for(band: HumorBand, first_name: &str) -> String {
    match band {
        HumorBand::Casual => format!(
            "Be relaxed and friendly with occasional humor. Address {} by first name, or about 30% of the time use a casual pet name.",
            first_name
        ),
        HumorBand::WarmProfessional => format!(
            "Be professional but warm and supportive. Address {} with friendly terms.",
            first_name
        ),
        HumorBand::StandardProfessional => format!(
            "Use a standard professional tone. Address {} professionally.",
            first_name
        ),
        HumorBand::Formal => format!(
            "Use formal and structured communication. Address {} respectfully.",
            first_name
        ),
        HumorBand::MaximallyFormal => format!(
            "Communicate with maximum formality and precision. Address {} with formal courtesy.",
            first_name
        ),
    }
}

/// Weighted pick among fixed variants.
fn pick_weighted(variants: Variants, rng: &mut dyn RandomSource) -> &'static str {
    let total: u32 = variants.iter().map(|(weight, _)| weight).sum();
    let mut target = rng.next_f64().clamp(0.0, 1.0) * total as f64;

    for (weight, text) in variants {
        if target < *weight as f64 {
            return *text;
        }
        target -= *weight as f64;
    }

    variants.last().map(|(_, text)| *text).unwrap_or_default()
}

/// First name, or in the casual band a pet name roughly 30% of the time.
pub fn address_name(
    humor: HumorLevel,
    first_name: &str,
    pet_names: &[String],
    rng: &mut dyn RandomSource,
) -> String {
    if humor.band() != HumorBand::Casual || pet_names.is_empty() {
        return first_name.to_string();
    }
    if rng.next_f64() >= PET_NAME_PROBABILITY {
        return first_name.to_string();
    }

    let index = (rng.next_f64() * pet_names.len() as f64) as usize;
    pet_names[index.min(pet_names.len() - 1)].clone()
}

/// Build the greeting and system instructions for a new session.
pub fn compose(
    humor: HumorLevel,
    first_name: &str,
    pet_names: &[String],
    rng: &mut dyn RandomSource,
) -> Personalization {
    let band = humor.band();
    let name = address_name(humor, first_name, pet_names, rng);
    let greeting = pick_weighted(greetings_for(band), rng).replace("{name}", &name);

    let mut instructions = format!(
        "You are a supportive voice assistant talking with {first}. Your current humor level is {humor}.\n\n\
         Communication style: {style}\n",
        first = first_name,
        humor = humor,
        style = style_for(band, first_name),
    );

    if band == HumorBand::Casual && !pet_names.is_empty() {
        instructions.push_str(&format!(
            "Pet names you may use: {}.\n",
            pet_names.join(", ")
        ));
    }

    instructions.push_str(&format!(
        "\nAlways acknowledge what {first} said before responding. Speak naturally and use clear, everyday language.\n\n\
         Screening protocol:\n\
         - When {first} asks for a quick screening call invoke-phq2; for a full assessment call invoke-phq9.\n\
         - Ask exactly one question at a time. Start each question with the hidden marker [PHQ-Q<n>] followed by \"Question <n>:\" and the question text.\n\
         - Answers use the scale 0 = Not at all, 1 = Several days, 2 = More than half the days, 3 = Nearly every day.\n\
         - If an answer is unclear, restate the scale and ask again.\n\n\
         Session control: {first} can say \"pause session\", \"resume session\", \"close session\", \"set humor level to [0-100]\", or \"help\".",
        first = first_name,
    ));

    Personalization {
        band,
        address_name: name,
        greeting,
        instructions,
    }
}

/// Assistant line confirming a humor change.
pub fn humor_confirmation(
    humor: HumorLevel,
    first_name: &str,
    pet_names: &[String],
    rng: &mut dyn RandomSource,
) -> String {
    let tail = match humor.band() {
        HumorBand::Casual => format!(
            "Got it, {}! I'm feeling pretty relaxed and friendly now.",
            address_name(humor, first_name, pet_names, rng)
        ),
        HumorBand::WarmProfessional => format!(
            "Understood, {}. I'll be professional but warm and supportive.",
            first_name
        ),
        HumorBand::StandardProfessional => format!(
            "Acknowledged, {}. I'll maintain a professional and helpful tone.",
            first_name
        ),
        HumorBand::Formal => format!(
            "Confirmed, {}. I'll use formal and structured communication.",
            first_name
        ),
        HumorBand::MaximallyFormal => format!(
            "Understood, {}. I'll communicate with maximum formality and precision.",
            first_name
        ),
    };

    format!("Humor level adjusted to {}. {}", humor, tail)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::RandomSource;

    /// Replays a fixed sequence of values, cycling when exhausted.
    pub struct FixedRandom {
        values: Vec<f64>,
        index: usize,
    }

    impl FixedRandom {
        pub fn new(values: &[f64]) -> Self {
            Self {
                values: values.to_vec(),
                index: 0,
            }
        }
    }

    impl RandomSource for FixedRandom {
        fn next_f64(&mut self) -> f64 {
            let value = self.values.get(self.index % self.values.len().max(1)).copied().unwrap_or(0.0);
            self.index += 1;
            value
        }
    }
}

//! Keyword-based interest profiling for recommendation labels.
//!
//! The profile is built from the events a user has registered for and only
//! produces the human-readable "why was this recommended" line. Candidate
//! selection stays a uniform random sample; `score` is public so a caller
//! may rank with it if it ever wants to.

use std::collections::HashMap;

use crate::portal_store::Event;

pub struct InterestCategory {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

pub const INTEREST_CATEGORIES: &[InterestCategory] = &[
    InterestCategory {
        name: "Sports",
        keywords: &[
            "basketball",
            "volleyball",
            "sports",
            "tournament",
            "league",
            "fun run",
            "zumba",
            "fitness",
            "athletics",
        ],
    },
    InterestCategory {
        name: "Environment",
        keywords: &[
            "cleanup",
            "clean-up",
            "tree",
            "planting",
            "coastal",
            "environment",
            "recycling",
            "climate",
            "garden",
        ],
    },
    InterestCategory {
        name: "Education",
        keywords: &[
            "seminar",
            "workshop",
            "training",
            "scholarship",
            "tutorial",
            "review",
            "literacy",
            "education",
        ],
    },
    InterestCategory {
        name: "Arts & Culture",
        keywords: &[
            "art",
            "mural",
            "dance",
            "music",
            "culture",
            "festival",
            "theater",
            "pageant",
            "talent",
        ],
    },
    InterestCategory {
        name: "Community Service",
        keywords: &[
            "outreach",
            "donation",
            "relief",
            "feeding",
            "volunteer",
            "blood",
            "medical",
            "mission",
        ],
    },
    InterestCategory {
        name: "Technology",
        keywords: &[
            "tech",
            "coding",
            "computer",
            "digital",
            "robotics",
            "innovation",
            "esports",
            "ict",
        ],
    },
];

fn event_text(event: &Event) -> String {
    match &event.description {
        Some(description) => format!("{} {}", event.title, description).to_lowercase(),
        None => event.title.to_lowercase(),
    }
}

fn category_hits(text: &str, category: &InterestCategory) -> usize {
    category
        .keywords
        .iter()
        .filter(|keyword| text.contains(*keyword))
        .count()
}

/// Interest weights derived from a user's event participation history.
pub struct InterestProfile {
    /// Keyword-hit counts per category name, accumulated over all
    /// participated events.
    weights: HashMap<&'static str, usize>,
    /// Lowercased locations of participated events.
    locations: Vec<String>,
}

impl InterestProfile {
    pub fn from_events(events: &[Event]) -> Self {
        let mut weights: HashMap<&'static str, usize> = HashMap::new();
        let mut locations = Vec::new();
        for event in events {
            let text = event_text(event);
            for category in INTEREST_CATEGORIES {
                let hits = category_hits(&text, category);
                if hits > 0 {
                    *weights.entry(category.name).or_insert(0) += hits;
                }
            }
            if let Some(location) = &event.location {
                locations.push(location.to_lowercase());
            }
        }
        InterestProfile { weights, locations }
    }

    /// Overlap score between the profile and a candidate event: for every
    /// category the candidate's own text hits, the user's accumulated weight
    /// for that category, summed.
    pub fn score(&self, event: &Event) -> usize {
        let text = event_text(event);
        INTEREST_CATEGORIES
            .iter()
            .filter(|category| category_hits(&text, category) > 0)
            .filter_map(|category| self.weights.get(category.name))
            .sum()
    }

    /// The profile category with the highest weight among those the candidate
    /// event touches, if any.
    pub fn best_category(&self, event: &Event) -> Option<&'static str> {
        let text = event_text(event);
        INTEREST_CATEGORIES
            .iter()
            .filter(|category| category_hits(&text, category) > 0)
            .filter_map(|category| {
                self.weights
                    .get(category.name)
                    .filter(|weight| **weight > 0)
                    .map(|weight| (category.name, *weight))
            })
            .max_by_key(|(_, weight)| *weight)
            .map(|(name, _)| name)
    }

    fn matches_location(&self, event: &Event) -> bool {
        match &event.location {
            Some(location) => self.locations.contains(&location.to_lowercase()),
            None => false,
        }
    }

    /// The display line attached to a recommendation.
    pub fn similarity_reason(&self, event: &Event) -> String {
        if let Some(category) = self.best_category(event) {
            return format!("Similar to your {} interests", category);
        }
        if self.matches_location(event) {
            return "At a location you've visited before".to_string();
        }
        "Based on your interests".to_string()
    }
}

use serde::{Deserialize, Serialize};

/// One author (or editor) of a work, in publication order.
///
/// `given` keeps the display form exactly as received ("Donald E."), while
/// `initials` and `normalized` exist for comparison only. A generational
/// `suffix` ("Jr.") is carried for display and ignored when comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub surname: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,

    #[serde(default)]
    pub initials: String,

    #[serde(default)]
    pub normalized: String,
}

impl Author {
    pub fn new(surname: impl Into<String>, given: Option<String>) -> Self {
        let surname = surname.into().trim().to_string();
        let given = given
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty());
        let initials = given.as_deref().map(initials_of).unwrap_or_default();
        let normalized = if initials.is_empty() {
            surname_key(&surname)
        } else {
            format!("{} {}", surname_key(&surname), initials.to_lowercase())
        };
        Self {
            surname,
            given,
            suffix: None,
            initials,
            normalized,
        }
    }

    pub fn with_suffix(mut self, suffix: Option<String>) -> Self {
        self.suffix = suffix
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    /// Lowercased surname with punctuation removed, used for author overlap.
    pub fn surname_key(&self) -> String {
        surname_key(&self.surname)
    }

    /// `Surname, Given` or `Surname, Suffix, Given`, the BibTeX-friendly
    /// display form.
    pub fn display(&self) -> String {
        match (&self.suffix, &self.given) {
            (Some(suffix), Some(given)) => format!("{}, {}, {}", self.surname, suffix, given),
            (Some(suffix), None) => format!("{}, {}", self.surname, suffix),
            (None, Some(given)) => format!("{}, {}", self.surname, given),
            (None, None) => self.surname.clone(),
        }
    }

    /// `Given Surname Suffix`, the reading order used by CSV exports.
    pub fn display_natural(&self) -> String {
        let mut name = match &self.given {
            Some(given) => format!("{} {}", given, self.surname),
            None => self.surname.clone(),
        };
        if let Some(suffix) = &self.suffix {
            name.push(' ');
            name.push_str(suffix);
        }
        name
    }

    /// Amount of name information carried, used to pick the richer of two
    /// author lists during a merge.
    pub fn richness(&self) -> usize {
        self.surname.chars().count()
            + self.given.as_deref().map_or(0, |g| g.chars().count())
            + self.suffix.as_deref().map_or(0, |s| s.chars().count())
    }
}

pub fn surname_key(surname: &str) -> String {
    surname
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-')
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn initials_of(given: &str) -> String {
    given
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.split('-')
                .filter_map(|piece| piece.chars().find(|c| c.is_alphabetic()))
                .map(|c| c.to_uppercase().to_string())
                .collect::<Vec<_>>()
                .join("-")
        })
        .filter(|initial| !initial.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

use serde::{Deserialize, Serialize};
use tsbib_core::IdScheme;

use super::InvalidIdentifier;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Isbn {
    pub raw: String,
    /// Digits only, check character uppercased. This is the stored value.
    pub stripped: String,
    pub isbn13: String,
}

fn strip_isbn(input: &str) -> String {
    let input = input.trim();
    let input = input
        .strip_prefix("ISBN-13:")
        .or_else(|| input.strip_prefix("ISBN-10:"))
        .or_else(|| input.strip_prefix("ISBN:"))
        .or_else(|| input.strip_prefix("ISBN"))
        .unwrap_or(input);
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

fn check_isbn10(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| (10 - i as u32) * d)
        .sum();
    sum % 11 == 0
}

fn check_isbn13(digits: &[u32]) -> bool {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    sum % 10 == 0
}

fn isbn10_to_isbn13(digits10: &[u32]) -> String {
    let mut d13: Vec<u32> = vec![9, 7, 8];
    d13.extend_from_slice(&digits10[..9]);
    let sum: u32 = d13
        .iter()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d } else { d * 3 })
        .sum();
    d13.push((10 - (sum % 10)) % 10);
    d13.iter().map(|d| d.to_string()).collect()
}

impl Isbn {
    pub fn parse(input: &str) -> Result<Self, InvalidIdentifier> {
        let invalid = || InvalidIdentifier::new(IdScheme::Isbn, input);
        let stripped = strip_isbn(input);

        match stripped.len() {
            13 => {
                let digits = stripped
                    .chars()
                    .map(|c| c.to_digit(10))
                    .collect::<Option<Vec<u32>>>()
                    .ok_or_else(invalid)?;
                if !check_isbn13(&digits) {
                    return Err(invalid());
                }
                Ok(Self {
                    raw: input.to_string(),
                    isbn13: stripped.clone(),
                    stripped,
                })
            }
            10 => {
                let mut digits = Vec::with_capacity(10);
                for (i, c) in stripped.chars().enumerate() {
                    match c.to_digit(10) {
                        Some(d) => digits.push(d),
                        None if i == 9 && c == 'X' => digits.push(10),
                        None => return Err(invalid()),
                    }
                }
                if !check_isbn10(&digits) {
                    return Err(invalid());
                }
                Ok(Self {
                    raw: input.to_string(),
                    isbn13: isbn10_to_isbn13(&digits),
                    stripped,
                })
            }
            _ => Err(invalid()),
        }
    }
}

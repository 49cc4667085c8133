//! Fixture data generation.
//!
//! Produces randomized inputs that are valid by construction: CPF numbers
//! with computed check digits, synthetic names and `example.com` emails,
//! bounded numbers and real calendar birth dates. Generators are seeded so
//! a failing run can be replayed.
//!
//! # Example
//!
//! ```
//! use stepwright::fixture::{validate_cpf, FixtureGenerator};
//!
//! let mut generator = FixtureGenerator::seeded(42);
//! let cpf = generator.cpf(true);
//! assert!(validate_cpf(&cpf));
//! ```

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

/// Synthetic first names
const FIRST_NAMES: &[&str] = &[
    "Ana", "Bruno", "Carla", "Diego", "Elisa", "Fabio", "Gabriela", "Heitor", "Iara", "Joao",
    "Larissa", "Marcos", "Natalia", "Otavio", "Paula", "Rafael", "Sofia", "Tiago", "Vera", "Yuri",
];

/// Synthetic last names
const LAST_NAMES: &[&str] = &[
    "Almeida", "Barros", "Cardoso", "Duarte", "Esteves", "Freitas", "Gomes", "Lima", "Moraes",
    "Nogueira", "Pereira", "Queiroz", "Ribeiro", "Santos", "Teixeira", "Vieira",
];

/// Domain used for every generated email
pub const EMAIL_DOMAIN: &str = "example.com";

/// Earliest birth year when a rule does not set one
pub const DEFAULT_MIN_BIRTH_YEAR: i32 = 1940;

/// Latest birth year when a rule does not set one
pub const DEFAULT_MAX_BIRTH_YEAR: i32 = 2005;

/// How a fixture value is produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FixtureRule {
    /// Checksum-valid CPF, `XXX.XXX.XXX-XX` when formatted
    Cpf {
        /// Include dots and dash
        #[serde(default)]
        formatted: bool,
    },
    /// First and last name
    FullName,
    /// Unique-looking address on [`EMAIL_DOMAIN`]
    Email,
    /// Integer in `min..=max`
    Number {
        /// Lower bound (inclusive)
        min: i64,
        /// Upper bound (inclusive)
        max: i64,
    },
    /// `DDMMYYYY`, as typed into masked date inputs
    BirthDate {
        /// Earliest year
        #[serde(default = "default_min_year")]
        min_year: i32,
        /// Latest year
        #[serde(default = "default_max_year")]
        max_year: i32,
    },
    /// Record with `cpf`, `full_name`, `birth_date` and `email`
    Patient,
}

const fn default_min_year() -> i32 {
    DEFAULT_MIN_BIRTH_YEAR
}

const fn default_max_year() -> i32 {
    DEFAULT_MAX_BIRTH_YEAR
}

impl FixtureRule {
    /// Bounds are consistent
    ///
    /// # Errors
    ///
    /// Describes the inverted range
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::Number { min, max } if min > max => {
                Err(format!("number range is empty: min {min} > max {max}"))
            }
            Self::BirthDate { min_year, max_year } if min_year > max_year => Err(format!(
                "birth year range is empty: min_year {min_year} > max_year {max_year}"
            )),
            _ => Ok(()),
        }
    }

    /// Field names of record values, empty for text rules
    #[must_use]
    pub const fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Patient => &["cpf", "full_name", "birth_date", "email"],
            _ => &[],
        }
    }
}

/// A generated input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FixtureValue {
    /// Single string
    Text(String),
    /// Named fields
    Record(BTreeMap<String, String>),
}

impl FixtureValue {
    /// Text content, `None` for records
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Record(_) => None,
        }
    }

    /// Field of a record, `None` for text or unknown fields
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        match self {
            Self::Record(fields) => fields.get(name).map(String::as_str),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for FixtureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Record(fields) => {
                let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
                f.write_str(&parts.join(" "))
            }
        }
    }
}

/// Seeded fixture generator
#[derive(Debug, Clone)]
pub struct FixtureGenerator {
    rng: StdRng,
    seed: Option<u64>,
}

impl FixtureGenerator {
    /// Deterministic generator
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed: Some(seed),
        }
    }

    /// Generator seeded from OS entropy
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seed: None,
        }
    }

    /// Seed this generator was created with, if any
    #[must_use]
    pub const fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Produce a value for `rule`
    pub fn generate(&mut self, rule: &FixtureRule) -> FixtureValue {
        match rule {
            FixtureRule::Cpf { formatted } => FixtureValue::Text(self.cpf(*formatted)),
            FixtureRule::FullName => FixtureValue::Text(self.full_name()),
            FixtureRule::Email => FixtureValue::Text(self.email()),
            FixtureRule::Number { min, max } => {
                FixtureValue::Text(self.number(*min, *max).to_string())
            }
            FixtureRule::BirthDate { min_year, max_year } => {
                FixtureValue::Text(self.birth_date(*min_year, *max_year))
            }
            FixtureRule::Patient => {
                let mut fields = BTreeMap::new();
                fields.insert("cpf".to_string(), self.cpf(true));
                fields.insert("full_name".to_string(), self.full_name());
                fields.insert(
                    "birth_date".to_string(),
                    self.birth_date(default_min_year(), default_max_year()),
                );
                fields.insert("email".to_string(), self.email());
                FixtureValue::Record(fields)
            }
        }
    }

    /// Checksum-valid CPF
    pub fn cpf(&mut self, formatted: bool) -> String {
        let mut digits = [0u8; 11];
        loop {
            for d in digits.iter_mut().take(9) {
                *d = self.rng.gen_range(0..10);
            }
            if digits[..9].iter().any(|&d| d != digits[0]) {
                break;
            }
        }
        digits[9] = check_digit(&digits[..9]);
        digits[10] = check_digit(&digits[..10]);
        let bare: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        if formatted {
            format_cpf(&bare).unwrap_or(bare)
        } else {
            bare
        }
    }

    /// First and last name from the synthetic lists
    pub fn full_name(&mut self) -> String {
        let first = FIRST_NAMES.choose(&mut self.rng).copied().unwrap_or("Ana");
        let last = LAST_NAMES.choose(&mut self.rng).copied().unwrap_or("Santos");
        format!("{first} {last}")
    }

    /// Lowercase address on [`EMAIL_DOMAIN`]
    pub fn email(&mut self) -> String {
        let first = FIRST_NAMES.choose(&mut self.rng).copied().unwrap_or("ana");
        let last = LAST_NAMES.choose(&mut self.rng).copied().unwrap_or("santos");
        let tag: u32 = self.rng.gen_range(100..10_000);
        format!(
            "{}.{}{tag}@{EMAIL_DOMAIN}",
            first.to_lowercase(),
            last.to_lowercase()
        )
    }

    /// Integer in `min..=max` (bounds are swapped when inverted)
    pub fn number(&mut self, min: i64, max: i64) -> i64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        self.rng.gen_range(lo..=hi)
    }

    /// `DDMMYYYY` for a real calendar day
    pub fn birth_date(&mut self, min_year: i32, max_year: i32) -> String {
        let (lo, hi) = if min_year <= max_year {
            (min_year, max_year)
        } else {
            (max_year, min_year)
        };
        let first = NaiveDate::from_ymd_opt(lo, 1, 1).unwrap_or(NaiveDate::MIN);
        let last = NaiveDate::from_ymd_opt(hi, 12, 31).unwrap_or(NaiveDate::MAX);
        let span = u64::try_from((last - first).num_days()).unwrap_or(0);
        let date = first
            .checked_add_days(Days::new(self.rng.gen_range(0..=span)))
            .unwrap_or(first);
        date.format("%d%m%Y").to_string()
    }
}

/// Mod-11 check digit over `digits`, weights descending to 2
fn check_digit(digits: &[u8]) -> u8 {
    let weight_start = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, &d)| u32::from(d) * (weight_start - i as u32))
        .sum();
    ((sum * 10) % 11 % 10) as u8
}

/// Digits of a CPF in bare or `XXX.XXX.XXX-XX` form
fn cpf_digits(input: &str) -> Option<Vec<u8>> {
    let trimmed = input.trim();
    let bare = trimmed.len() == 11 && trimmed.bytes().all(|b| b.is_ascii_digit());
    let formatted = trimmed.len() == 14
        && trimmed.bytes().enumerate().all(|(i, b)| match i {
            3 | 7 => b == b'.',
            11 => b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !bare && !formatted {
        return None;
    }
    Some(
        trimmed
            .bytes()
            .filter(u8::is_ascii_digit)
            .map(|b| b - b'0')
            .collect(),
    )
}

/// Whether `input` is a valid CPF (bare or formatted)
#[must_use]
pub fn validate_cpf(input: &str) -> bool {
    let Some(digits) = cpf_digits(input) else {
        return false;
    };
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }
    digits[9] == check_digit(&digits[..9]) && digits[10] == check_digit(&digits[..10])
}

/// `XXX.XXX.XXX-XX` form of a CPF given in either form
#[must_use]
pub fn format_cpf(input: &str) -> Option<String> {
    let digits: String = cpf_digits(input)?
        .into_iter()
        .map(|d| char::from(b'0' + d))
        .collect();
    Some(format!(
        "{}.{}.{}-{}",
        &digits[0..3],
        &digits[3..6],
        &digits[6..9],
        &digits[9..11]
    ))
}

static SHARED: OnceLock<Mutex<FixtureGenerator>> = OnceLock::new();

/// Process-wide generator, seeded from entropy on first use
pub fn shared() -> &'static Mutex<FixtureGenerator> {
    SHARED.get_or_init(|| Mutex::new(FixtureGenerator::from_entropy()))
}

/// Reseed the process-wide generator
pub fn reseed(seed: u64) {
    let mut generator = shared().lock().unwrap_or_else(PoisonError::into_inner);
    *generator = FixtureGenerator::seeded(seed);
}

/// Generate from the process-wide generator
pub fn generate(rule: &FixtureRule) -> FixtureValue {
    shared()
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .generate(rule)
}

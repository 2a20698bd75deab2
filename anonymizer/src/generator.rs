//! Synthetic identity generation
//!
//! Picks a noun as the last name and an adjective as the first name ("Hazy Heron"),
//! then derives login, email, profile URL and display fields from the pair.
//! The random source is injected so a seeded `StdRng` gives reproducible output.

use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::interface::{AnonymizerError, ContactMethodRegistry};
use crate::models::{Field, IdentityBundle};
use crate::words::WordLists;

/// Domain used for generated emails and profile URLs
pub const EXAMPLE_DOMAIN: &str = "example.com";

const PROFILE_BASE_URL: &str = "http://example.com/";

const PASSWORD_LEN: usize = 24;

const PASSWORD_CHARS: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*()";

const HEX: &[u8] = b"0123456789abcdef";

/// Post-processing hook applied to every generated bundle
pub type Transform = Box<dyn Fn(IdentityBundle) -> IdentityBundle + Send + Sync>;

/// How generated logins are made distinct from each other
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginSuffix {
    /// Bare `firstlast`. Collides quickly on large datasets.
    None,
    /// 13 hex digits of a microsecond clock, strictly increasing per generator
    #[default]
    Timestamp,
    /// 13 hex digits drawn from the generator's RNG
    Random,
}

pub struct IdentityGenerator<R: Rng> {
    words: WordLists,
    contact_methods: Vec<String>,
    suffix: LoginSuffix,
    transforms: Vec<Transform>,
    rng: R,
    last_stamp: i64,
}

impl<R: Rng> IdentityGenerator<R> {
    pub fn new<C>(words: WordLists, contact_methods: &C, rng: R) -> Self
    where
        C: ContactMethodRegistry + ?Sized,
    {
        Self {
            words,
            contact_methods: contact_methods.contact_methods(),
            suffix: LoginSuffix::default(),
            transforms: Vec::new(),
            rng,
            last_stamp: 0,
        }
    }

    pub fn with_login_suffix(mut self, suffix: LoginSuffix) -> Self {
        self.suffix = suffix;
        self
    }

    /// Register a transform. Transforms run in registration order.
    pub fn register_transform<F>(&mut self, transform: F)
    where
        F: Fn(IdentityBundle) -> IdentityBundle + Send + Sync + 'static,
    {
        self.transforms.push(Box::new(transform));
    }

    /// Produce a fresh identity bundle.
    ///
    /// With `alliterate`, the first name is drawn only from adjectives sharing the last
    /// name's initial (case-insensitive). If none do, this fails rather than falling back.
    pub fn generate(&mut self, alliterate: bool) -> Result<IdentityBundle, AnonymizerError> {
        let last_name = self
            .words
            .nouns
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| AnonymizerError::InvalidInput("noun list is empty".to_string()))?;

        let first_name = if alliterate {
            let initial = first_lower(&last_name).ok_or_else(|| {
                AnonymizerError::InvalidInput(format!("empty last name '{}'", last_name))
            })?;
            let candidates: Vec<&String> = self
                .words
                .adjectives
                .iter()
                .filter(|w| first_lower(w) == Some(initial))
                .collect();
            candidates
                .choose(&mut self.rng)
                .map(|w| w.to_string())
                .ok_or_else(|| AnonymizerError::NoAlliterativeMatch {
                    initial,
                    last_name: last_name.clone(),
                })?
        } else {
            self.words
                .adjectives
                .choose(&mut self.rng)
                .cloned()
                .ok_or_else(|| AnonymizerError::InvalidInput("adjective list is empty".to_string()))?
        };

        let bundle = self.build(&first_name, &last_name)?;
        Ok(self.transforms.iter().fold(bundle, |bundle, transform| transform(bundle)))
    }

    fn build(&mut self, first_name: &str, last_name: &str) -> Result<IdentityBundle, AnonymizerError> {
        let base_login = format!("{}{}", first_name, last_name).to_lowercase();
        let login = match self.suffix {
            LoginSuffix::None => base_login,
            LoginSuffix::Timestamp => format!("{}{}", base_login, self.next_stamp()),
            LoginSuffix::Random => format!("{}{}", base_login, self.random_hex(13)),
        };

        let slug = slugify(&format!("{}-{}", first_name, last_name));
        let url = Url::parse(PROFILE_BASE_URL)
            .and_then(|base| base.join(&slug))
            .map_err(|e| AnonymizerError::InvalidInput(format!("profile url for '{}': {}", slug, e)))?;

        let mut bundle = IdentityBundle::new();
        bundle
            .set(Field::Email, sanitize_email(&format!("{}@{}", login, EXAMPLE_DOMAIN)))
            .set(Field::Login, login)
            .set(Field::Password, self.password_hash())
            .set(Field::Nicename, slug)
            .set(Field::Url, url.to_string())
            .set(Field::DisplayName, format!("{} {}", capitalize(first_name), capitalize(last_name)))
            .set(Field::FirstName, capitalize(first_name))
            .set(Field::LastName, capitalize(last_name))
            .set(Field::Nickname, format!("{} {}", first_name, last_name))
            .set(Field::Description, "");

        for method in &self.contact_methods {
            bundle.set_meta(method.clone(), "");
        }

        Ok(bundle)
    }

    /// `uniqid`-style suffix: seconds as 8 hex digits then microseconds as 5.
    fn next_stamp(&mut self) -> String {
        let now = Utc::now().timestamp_micros();
        let stamp = now.max(self.last_stamp + 1);
        self.last_stamp = stamp;
        format!("{:08x}{:05x}", stamp / 1_000_000, stamp % 1_000_000)
    }

    fn random_hex(&mut self, len: usize) -> String {
        (0..len)
            .map(|_| HEX[self.rng.gen_range(0..HEX.len())] as char)
            .collect()
    }

    /// A throwaway password; only its digest leaves the generator.
    fn password_hash(&mut self) -> String {
        let password: String = (0..PASSWORD_LEN)
            .map(|_| PASSWORD_CHARS[self.rng.gen_range(0..PASSWORD_CHARS.len())] as char)
            .collect();
        format!("{:x}", Sha256::digest(password.as_bytes()))
    }
}

fn first_lower(word: &str) -> Option<char> {
    word.chars().next().and_then(|c| c.to_lowercase().next())
}

/// Uppercase the first character, leave the rest alone
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lowercase, collapse runs of anything non-alphanumeric into single dashes.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Drop characters that are not valid in an ASCII email address
pub fn sanitize_email(email: &str) -> String {
    let (local, domain) = match email.rsplit_once('@') {
        Some(parts) => parts,
        None => return String::new(),
    };
    let local: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(*c))
        .collect();
    let domain: String = domain
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.' || *c == '-')
        .collect();
    format!("{}@{}", local, domain)
}

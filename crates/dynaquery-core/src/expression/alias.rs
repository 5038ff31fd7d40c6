//! Placeholder alias generation.
//!
//! Aliases are `#n{counter}{suffix}` for attribute names and
//! `:v{counter}{suffix}` for attribute values. The counter is shared by both
//! kinds and only ever increases, and the suffix has a fixed length for the
//! generator's lifetime, so two aliases from one generator can never collide.
//! The suffix keeps aliases from independent generators apart when their
//! outputs end up in the same request.

/// Length of the random suffix.
const SUFFIX_LEN: usize = 4;

/// Issues fresh placeholder tokens for one compile call.
#[derive(Debug, Clone)]
pub struct AliasGenerator {
    counter: u64,
    suffix: String,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasGenerator {
    /// Creates a generator starting at zero with a random lowercase suffix.
    #[must_use]
    pub fn new() -> Self {
        let random = uuid::Uuid::new_v4().simple().to_string();
        Self {
            counter: 0,
            suffix: random[..SUFFIX_LEN].to_owned(),
        }
    }

    /// Creates a deterministic generator.
    ///
    /// Non-alphanumeric characters are dropped from `suffix` and the rest is
    /// lowercased, so the output stays a valid placeholder token.
    #[must_use]
    pub fn seeded(start: u64, suffix: &str) -> Self {
        Self {
            counter: start,
            suffix: suffix
                .chars()
                .filter(char::is_ascii_alphanumeric)
                .map(|c| c.to_ascii_lowercase())
                .collect(),
        }
    }

    /// The suffix shared by every alias of this generator.
    #[must_use]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Returns a new attribute-name alias.
    pub fn name(&mut self) -> String {
        let n = self.bump();
        format!("#n{n}{}", self.suffix)
    }

    /// Returns a new attribute-value alias.
    pub fn value(&mut self) -> String {
        let n = self.bump();
        format!(":v{n}{}", self.suffix)
    }

    fn bump(&mut self) -> u64 {
        let n = self.counter;
        self.counter += 1;
        n
    }
}

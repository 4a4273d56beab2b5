// cd_engine/src/logging/masker.rs
pub const REDACTED: &str = "[REDACTED]";

/// Replaces every configured secret with `[REDACTED]`.
///
/// Secrets are matched longest first so a secret that contains another is masked whole.
#[derive(Debug, Clone, Default)]
pub struct SecretMasker {
  secrets: Vec<String>,
}

impl SecretMasker {
  pub fn new(secrets: impl IntoIterator<Item = impl Into<String>>) -> Self {
    let mut masker = Self::default();
    for secret in secrets {
      masker.add_secret(secret);
    }
    masker
  }

  /// Empty strings are ignored.
  pub fn add_secret(&mut self, value: impl Into<String>) {
    let value = value.into();
    if value.is_empty() || self.secrets.contains(&value) {
      return;
    }
    self.secrets.push(value);
    self.secrets.sort_by(|a, b| b.len().cmp(&a.len()));
  }

  pub fn mask(&self, input: &str) -> String {
    let mut result = input.to_string();
    for secret in &self.secrets {
      if result.contains(secret.as_str()) {
        result = result.replace(secret.as_str(), REDACTED);
      }
    }
    result
  }

  pub fn secret_count(&self) -> usize {
    self.secrets.len()
  }
}

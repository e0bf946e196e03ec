//! Visibility policy for resources with no path to a zone.

use serde::Deserialize;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Who may see a resource whose ownership closure resolves to no zone.
///
/// Applied identically to anchors, items, captures and everything hanging off
/// an unscoped anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnscopedPolicy {
    /// Nobody. Unscoped rows are unreachable until re-parented.
    Hidden,
    /// Only the caller recorded as `created_by`.
    #[default]
    Creator,
    /// Every caller. Matches the legacy API, which bypassed ownership here.
    Shared,
}

impl UnscopedPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hidden => "hidden",
            Self::Creator => "creator",
            Self::Shared => "shared",
        }
    }
}

impl Display for UnscopedPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnscopedPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hidden" => Ok(Self::Hidden),
            "creator" => Ok(Self::Creator),
            "shared" => Ok(Self::Shared),
            other => Err(format!(
                "unsupported unscoped policy `{other}`; expected hidden|creator|shared"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::UnscopedPolicy;

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(" Hidden ".parse::<UnscopedPolicy>(), Ok(UnscopedPolicy::Hidden));
        assert!("public".parse::<UnscopedPolicy>().is_err());
    }
}

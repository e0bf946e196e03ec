//! Tri-state field update for nullable columns.

/// Update instruction for one nullable field.
///
/// Non-nullable fields use plain `Option<T>` (`None` = keep). Nullable fields
/// need a third state to distinguish "leave as is" from "set to null".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Self::Keep)
    }

    /// Resolves the patch against the current value.
    pub fn apply(self, current: Option<T>) -> Option<T> {
        match self {
            Self::Keep => current,
            Self::Clear => None,
            Self::Set(value) => Some(value),
        }
    }

    /// Value newly written by this patch, if any.
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            _ => None,
        }
    }

    /// Validates or converts a `Set` value; `Keep` and `Clear` pass through.
    pub fn try_map<U, E, F>(self, f: F) -> Result<Patch<U>, E>
    where
        F: FnOnce(T) -> Result<U, E>,
    {
        Ok(match self {
            Self::Keep => Patch::Keep,
            Self::Clear => Patch::Clear,
            Self::Set(value) => Patch::Set(f(value)?),
        })
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Self::Set(value),
            None => Self::Clear,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Patch;

    #[test]
    fn apply_resolves_each_state() {
        assert_eq!(Patch::Keep.apply(Some(1)), Some(1));
        assert_eq!(Patch::<i32>::Clear.apply(Some(1)), None);
        assert_eq!(Patch::Set(2).apply(None), Some(2));
    }

    #[test]
    fn option_conversion_sets_or_clears() {
        assert_eq!(Patch::from(Some("x")), Patch::Set("x"));
        assert_eq!(Patch::<&str>::from(None), Patch::Clear);
    }
}

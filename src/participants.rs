use std::collections::BTreeSet;
use std::fmt;

/// Backend persona identifier.
pub type PersonaId = u64;

/// Scenario-declared participant bounds, `1 <= min <= max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantBounds {
    pub min: usize,
    pub max: usize,
}

impl ParticipantBounds {
    /// Returns `None` when the bounds are inverted or the minimum is zero.
    pub fn new(min: usize, max: usize) -> Option<Self> {
        if min == 0 || min > max {
            return None;
        }
        Some(Self { min, max })
    }

    pub fn check(&self, selected: usize) -> ParticipantCheck {
        validate(selected, self.min, self.max)
    }
}

impl fmt::Display for ParticipantBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

/// Outcome of comparing a selection size with participant bounds.
/// At most one of `deficit` and `excess` is nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticipantCheck {
    pub ok: bool,
    pub deficit: usize,
    pub excess: usize,
    pub min: usize,
    pub max: usize,
}

impl ParticipantCheck {
    /// Operator-facing hint, or `None` when the selection is acceptable.
    pub fn message(&self) -> Option<String> {
        if self.ok {
            return None;
        }

        let action = if self.deficit > 0 {
            format!("Need at least {} more {}", self.deficit, plural(self.deficit))
        } else {
            format!("Please remove {} {}", self.excess, plural(self.excess))
        };
        Some(format!(
            "{action} (this scenario requires {}-{} participants)",
            self.min, self.max
        ))
    }
}

impl fmt::Display for ParticipantCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => f.write_str(&message),
            None => write!(f, "participant count within {}-{}", self.min, self.max),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        "participant"
    } else {
        "participants"
    }
}

pub fn validate(selected: usize, min: usize, max: usize) -> ParticipantCheck {
    ParticipantCheck {
        ok: min <= selected && selected <= max,
        deficit: min.saturating_sub(selected),
        excess: selected.saturating_sub(max),
        min,
        max,
    }
}

/// The operator's chosen personas. Unique, unordered; iteration is by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonaSelection {
    ids: BTreeSet<PersonaId>,
}

impl PersonaSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the persona was already selected.
    pub fn add(&mut self, id: PersonaId) -> bool {
        self.ids.insert(id)
    }

    /// Returns `false` when the persona was not selected.
    pub fn remove(&mut self, id: PersonaId) -> bool {
        self.ids.remove(&id)
    }

    pub fn contains(&self, id: PersonaId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }

    pub fn ids(&self) -> Vec<PersonaId> {
        self.ids.iter().copied().collect()
    }
}

impl FromIterator<PersonaId> for PersonaSelection {
    fn from_iter<I: IntoIterator<Item = PersonaId>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

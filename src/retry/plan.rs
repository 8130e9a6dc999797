//! Up-front attempt sequence for one retry run.

/// Which provider of the pair an attempt targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderSlot {
    Preferred,
    Alternate,
}

impl ProviderSlot {
    pub fn index(self) -> usize {
        match self {
            ProviderSlot::Preferred => 0,
            ProviderSlot::Alternate => 1,
        }
    }
}

/// One planned attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptSlot {
    pub provider: ProviderSlot,
    /// 1-based attempt number within the provider
    pub attempt_number: u32,
}

/// The ordered `{provider, attempt}` pairs: every attempt on the preferred provider, then
/// every attempt on the alternate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptPlan {
    slots: Vec<AttemptSlot>,
}

impl AttemptPlan {
    pub fn new(attempts_per_provider: u32) -> Self {
        let slots = [ProviderSlot::Preferred, ProviderSlot::Alternate]
            .into_iter()
            .flat_map(|provider| {
                (1..=attempts_per_provider).map(move |attempt_number| AttemptSlot {
                    provider,
                    attempt_number,
                })
            })
            .collect();
        Self { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttemptSlot> {
        self.slots.iter()
    }
}

//! Cycle-scoped names for ephemeral views and supporting relations.

use veil_types::CycleId;

/// Hands out view names that are unique within one cycle.
///
/// Names embed the cycle id, so two cycles never produce the same name and
/// the same cycle id always produces the same sequence.
#[derive(Debug, Clone)]
pub struct ViewNamer {
    cycle: CycleId,
    issued: u32,
}

impl ViewNamer {
    pub fn new(cycle: CycleId) -> Self {
        Self { cycle, issued: 0 }
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    /// Next filtering-view name: `veil_c<cycle>_v<n>`.
    pub fn next_view(&mut self) -> String {
        self.issued += 1;
        format!("veil_c{}_v{}", self.cycle, self.issued)
    }

    /// Cycle-scoped name for a supporting relation declared by a template.
    pub fn relation(&self, base: &str) -> String {
        format!("veil_c{}_{base}", self.cycle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_sequential_within_cycle() {
        let mut namer = ViewNamer::new(CycleId::new(7));
        assert_eq!(namer.next_view(), "veil_c7_v1");
        assert_eq!(namer.next_view(), "veil_c7_v2");
        assert_eq!(namer.relation("revenue0"), "veil_c7_revenue0");
    }

    #[test]
    fn test_cycles_do_not_collide() {
        let mut a = ViewNamer::new(CycleId::new(1));
        let mut b = ViewNamer::new(CycleId::new(11));
        assert_ne!(a.next_view(), b.next_view());
    }
}

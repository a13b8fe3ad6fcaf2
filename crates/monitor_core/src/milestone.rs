use std::collections::BTreeSet;

/// Thresholds already announced during the current run.
pub type MilestoneSet = BTreeSet<u8>;

/// Emits each configured threshold at most once per run.
///
/// A threshold fires when progress enters `[t, t + window)`, or when a single
/// update jumps from below `t` to past the window so a coarse poll cannot skip it.
#[derive(Debug, Clone, PartialEq)]
pub struct MilestoneNotifier {
    thresholds: Vec<u8>,
    window: f64,
    fired: MilestoneSet,
    last_observed: f64,
}

impl MilestoneNotifier {
    pub fn new(thresholds: &[u8], window: f64) -> Self {
        let mut thresholds = thresholds.to_vec();
        thresholds.sort_unstable();
        thresholds.dedup();
        Self {
            thresholds,
            window: window.max(0.0),
            fired: MilestoneSet::new(),
            last_observed: 0.0,
        }
    }

    /// Feed the latest reconciled progress; returns newly crossed thresholds in
    /// ascending order.
    pub fn observe(&mut self, progress: f64) -> Vec<u8> {
        let previous = self.last_observed;
        self.last_observed = previous.max(progress);

        let mut crossed = Vec::new();
        for &threshold in &self.thresholds {
            if self.fired.contains(&threshold) {
                continue;
            }
            let t = f64::from(threshold);
            let in_window = progress >= t && progress < t + self.window;
            let jumped_over = previous < t && progress >= t + self.window;
            if in_window || jumped_over {
                self.fired.insert(threshold);
                crossed.push(threshold);
            }
        }
        crossed
    }

    pub fn clear(&mut self) {
        self.fired.clear();
        self.last_observed = 0.0;
    }

    pub fn fired(&self) -> &MilestoneSet {
        &self.fired
    }
}

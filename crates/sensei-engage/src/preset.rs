use serde::{Deserialize, Serialize};

/// Sensitivity preset controlling how readily the engine intervenes.
///
/// Looser sensitivity tolerates longer idleness and a lower score floor
/// before raising an intervention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    /// Tolerates up to a minute of idleness; intervenes only when the
    /// score has collapsed.
    Low,
    /// Default for most learners.
    Medium,
    /// Intervenes early - short idle tolerance, high score floor.
    High,
}

impl Sensitivity {
    /// Seconds of idleness tolerated before it counts as a distraction.
    #[must_use]
    pub const fn idle_threshold_secs(&self) -> u32 {
        match self {
            Self::Low => 60,
            Self::Medium => 30,
            Self::High => 15,
        }
    }

    /// Score floor at which the focus check fires an intervention.
    #[must_use]
    pub const fn distraction_threshold(&self) -> f64 {
        match self {
            Self::Low => 30.0,
            Self::Medium => 50.0,
            Self::High => 70.0,
        }
    }

    /// Get human-readable description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Low => "Relaxed monitoring",
            Self::Medium => "Balanced monitoring",
            Self::High => "Close monitoring",
        }
    }
}

impl Default for Sensitivity {
    fn default() -> Self {
        Self::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_loosen_with_lower_sensitivity() {
        assert!(Sensitivity::Low.idle_threshold_secs() > Sensitivity::Medium.idle_threshold_secs());
        assert!(
            Sensitivity::Medium.idle_threshold_secs() > Sensitivity::High.idle_threshold_secs()
        );
        assert!(
            Sensitivity::Low.distraction_threshold() < Sensitivity::Medium.distraction_threshold()
        );
        assert!(
            Sensitivity::Medium.distraction_threshold() < Sensitivity::High.distraction_threshold()
        );
    }

    #[test]
    fn medium_matches_documented_pair() {
        assert_eq!(Sensitivity::Medium.idle_threshold_secs(), 30);
        assert!((Sensitivity::Medium.distraction_threshold() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn serde_round_trip() {
        let json = serde_json::to_string(&Sensitivity::High).unwrap();
        assert_eq!(json, "\"high\"");
        let back: Sensitivity = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Sensitivity::High);
    }
}

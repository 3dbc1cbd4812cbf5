//! Fusion of the classifier probability and the anomaly flag.

/// Default operating point. Chosen by hand, not learned; it trades some
/// precision for recall and has not been tuned against real traffic.
pub const DEFAULT_THRESHOLD: f64 = 0.45;

/// Spam (1) when the probability reaches `threshold` or the detector flags
/// the message, ham (0) otherwise. Either signal alone is enough.
pub fn decide(probability: f64, anomaly: bool, threshold: f64) -> u8 {
    u8::from(probability >= threshold || anomaly)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_alone_crosses_at_threshold() {
        assert_eq!(decide(0.44, false, DEFAULT_THRESHOLD), 0);
        assert_eq!(decide(0.45, false, DEFAULT_THRESHOLD), 1);
        assert_eq!(decide(0.46, false, DEFAULT_THRESHOLD), 1);
    }

    #[test]
    fn anomaly_alone_is_spam() {
        assert_eq!(decide(0.0, true, DEFAULT_THRESHOLD), 1);
    }
}

//! Verdict decision table.

use fv_models::{RiskLevel, Verdict};

/// Output of the decision table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub verdict: Verdict,
    pub confidence: f64,
    pub risk: RiskLevel,
}

/// Derive the verdict from mean `a`, max `m` and segment count `s`.
///
/// First matching rule wins:
///
/// | rule | condition                          | verdict          | confidence | risk   |
/// |------|------------------------------------|------------------|------------|--------|
/// | 1    | `a >= 0.70` or (`m >= 0.90` and `s > 2`) | ai_generated | a      | high   |
/// | 2    | `a >= 0.50` or (`m >= 0.75` and `s > 0`) | likely_ai    | a      | medium |
/// | 3    | `a >= 0.35` or `s > 0`             | inconclusive     | a          | medium |
/// | 4    | `a >= 0.20`                        | likely_authentic | 1 - a      | low    |
/// | 5    | otherwise                          | authentic        | 1 - a      | low    |
pub fn decide(a: f64, m: f64, s: usize) -> Decision {
    let (verdict, confidence, risk) = if a >= 0.70 || (m >= 0.90 && s > 2) {
        (Verdict::AiGenerated, a, RiskLevel::High)
    } else if a >= 0.50 || (m >= 0.75 && s > 0) {
        (Verdict::LikelyAi, a, RiskLevel::Medium)
    } else if a >= 0.35 || s > 0 {
        (Verdict::Inconclusive, a, RiskLevel::Medium)
    } else if a >= 0.20 {
        (Verdict::LikelyAuthentic, 1.0 - a, RiskLevel::Low)
    } else {
        (Verdict::Authentic, 1.0 - a, RiskLevel::Low)
    };

    Decision {
        verdict,
        confidence: confidence.clamp(0.0, 1.0),
        risk,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_one() {
        assert_eq!(decide(0.7, 0.7, 0).verdict, Verdict::AiGenerated);
        let d = decide(0.3, 0.95, 3);
        assert_eq!(d.verdict, Verdict::AiGenerated);
        assert_eq!(d.risk, RiskLevel::High);
        assert_eq!(d.confidence, 0.3);
    }

    #[test]
    fn test_rule_two() {
        assert_eq!(decide(0.5, 0.5, 0).verdict, Verdict::LikelyAi);
        // Three segments are needed for rule 1's max clause
        let d = decide(0.3, 0.95, 2);
        assert_eq!(d.verdict, Verdict::LikelyAi);
        assert_eq!(d.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_single_segment_with_high_max_is_likely_ai() {
        // 5 frames at 0.1 then 5 at 0.8: A=0.45, M=0.8, S=1
        let d = decide(0.45, 0.8, 1);
        assert_eq!(d.verdict, Verdict::LikelyAi);
        assert_eq!(d.risk, RiskLevel::Medium);
        assert!((d.confidence - 0.45).abs() < 1e-12);
    }

    #[test]
    fn test_rule_three() {
        assert_eq!(decide(0.35, 0.4, 0).verdict, Verdict::Inconclusive);
        let d = decide(0.1, 0.7, 1);
        assert_eq!(d.verdict, Verdict::Inconclusive);
        assert_eq!(d.risk, RiskLevel::Medium);
    }

    #[test]
    fn test_rule_four_and_five() {
        let d = decide(0.2, 0.3, 0);
        assert_eq!(d.verdict, Verdict::LikelyAuthentic);
        assert!((d.confidence - 0.8).abs() < 1e-12);
        assert_eq!(d.risk, RiskLevel::Low);

        let d = decide(0.1, 0.1, 0);
        assert_eq!(d.verdict, Verdict::Authentic);
        assert!((d.confidence - 0.9).abs() < 1e-12);
        assert_eq!(d.risk, RiskLevel::Low);
    }

    #[test]
    fn test_zero_frames_is_authentic() {
        let d = decide(0.0, 0.0, 0);
        assert_eq!(d.verdict, Verdict::Authentic);
        assert_eq!(d.confidence, 1.0);
    }

    #[test]
    fn test_table_is_total_and_deterministic() {
        for ai in 0..=20 {
            for mi in 0..=20 {
                for s in 0..5 {
                    let a = ai as f64 / 20.0;
                    let m = mi as f64 / 20.0;
                    let d1 = decide(a, m, s);
                    let d2 = decide(a, m, s);
                    assert_eq!(d1, d2);
                    assert!((0.0..=1.0).contains(&d1.confidence));
                }
            }
        }
    }
}

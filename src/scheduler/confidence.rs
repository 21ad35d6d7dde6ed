//! Confidence scoring and parameter adjustment

use crate::domain::{Bias, ConfidenceBand, IntelligenceReport, ParameterMatrix};

/// No decision trades below this score, whatever the configured minimum
pub const MIN_TRADING_CONFIDENCE: f64 = 0.4;

/// Weight of the risk term; risk 0 alone gives 0.8
const RISK_WEIGHT: f64 = 0.8;
/// Contribution of one directional reading
const BIAS_STEP: f64 = 0.1;

fn bias_term(bias: Bias) -> f64 {
    match bias {
        Bias::Positive => BIAS_STEP,
        Bias::Neutral => 0.0,
        Bias::Negative => -BIAS_STEP,
    }
}

/// `clamp(0.8 * (1 - risk/100) + s + b, 0, 1)`
///
/// Decreasing in risk, increasing in sentiment and global bias. With both
/// readings positive the score still drops below 0.4 once risk reaches 76.
pub fn confidence_score(report: &IntelligenceReport) -> f64 {
    let risk = report.risk_score.clamp(0.0, 100.0);
    let score = RISK_WEIGHT * (1.0 - risk / 100.0)
        + bias_term(report.sentiment_category)
        + bias_term(report.global_bias);
    round4(score.clamp(0.0, 1.0))
}

/// Scale position size and stop-loss distance by the band multipliers
pub fn adjust_parameters(params: &ParameterMatrix, band: ConfidenceBand) -> ParameterMatrix {
    let size = band.position_multiplier();
    let stop = band.stop_loss_multiplier();

    params
        .iter()
        .map(|(strategy, symbols)| {
            let adjusted = symbols
                .iter()
                .map(|(symbol, p)| {
                    let mut p = p.clone();
                    p.position_size = round4(p.position_size * size);
                    p.stop_loss = round4(p.stop_loss * stop);
                    (symbol.clone(), p)
                })
                .collect();
            (strategy.clone(), adjusted)
        })
        .collect()
}

/// Keeps decisions byte-stable across reruns
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

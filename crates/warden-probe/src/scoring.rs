//! Weighted scoring, grading, and recommendations
//!
//! Pure functions: replaying the same session inputs always yields the
//! same verdict.

use warden_common::{
    EndpointsSummary, MockDataCheck, PerformanceCheck, PerformanceGrade, SiteCheck, UiCheck,
    UiOutcome,
};

/// Everything the scorer looks at
pub struct ScoreInputs<'a> {
    pub site: &'a SiteCheck,
    pub endpoints: &'a EndpointsSummary,
    pub ui: &'a UiCheck,
    pub performance: &'a PerformanceCheck,
    pub mock_data: &'a MockDataCheck,
    pub open_breakers: usize,
    pub total_breakers: usize,
    pub sla_ms: u64,
}

/// Weighted additive score out of 100, clamped to [0, 100].
pub fn composite_score(inputs: &ScoreInputs<'_>) -> f64 {
    let mut score = 100.0;

    // site availability: weight 20
    if !inputs.site.available {
        score -= 20.0;
    } else if inputs.site.latency_ms > inputs.sla_ms {
        score -= 10.0;
    }

    // endpoints: weight 25
    score -= (100.0 - inputs.endpoints.percent) * 0.25;

    // ui: weight 15
    match inputs.ui.outcome {
        UiOutcome::Error => score -= 15.0,
        UiOutcome::Failed => score -= 10.0,
        UiOutcome::Passed | UiOutcome::Skipped => {
            if let Some(accessibility) = &inputs.ui.accessibility {
                if accessibility.score < 0.8 {
                    score -= 5.0;
                }
            }
        }
    }

    // performance: weight 25
    let grade_penalty = match inputs.performance.grade {
        PerformanceGrade::F => 15.0,
        PerformanceGrade::D => 10.0,
        PerformanceGrade::C => 5.0,
        PerformanceGrade::A | PerformanceGrade::B => 0.0,
    };
    let availability_penalty = if inputs.performance.availability_pct < 90.0 {
        10.0
    } else {
        0.0
    };
    let perf_deduction =
        (5.0 * inputs.performance.sla_violations as f64 + availability_penalty + grade_penalty)
            .min(25.0);
    score -= perf_deduction;

    // mock data: weight 5
    score -= (100.0 - inputs.mock_data.percent) * 0.05;

    // circuit breakers: weight 10
    if inputs.total_breakers > 0 {
        score -= 10.0 * inputs.open_breakers as f64 / inputs.total_breakers as f64;
    }

    score.clamp(0.0, 100.0)
}

/// Performance letter grade, reported separately from the composite.
pub fn performance_grade(
    sla_violations: u32,
    average_ms: f64,
    availability_pct: f64,
    sla_ms: u64,
) -> PerformanceGrade {
    let sla = sla_ms as f64;
    if sla_violations == 0 && average_ms <= 0.5 * sla && availability_pct >= 100.0 {
        PerformanceGrade::A
    } else if sla_violations <= 1 && average_ms <= 0.8 * sla && availability_pct >= 90.0 {
        PerformanceGrade::B
    } else if sla_violations <= 2 && average_ms <= sla && availability_pct >= 80.0 {
        PerformanceGrade::C
    } else if availability_pct >= 60.0 {
        PerformanceGrade::D
    } else {
        PerformanceGrade::F
    }
}

/// Fixed-copy recommendations derived from failing dimensions.
pub fn recommendations(inputs: &ScoreInputs<'_>) -> Vec<String> {
    let mut out = Vec::new();

    if !inputs.site.available {
        out.push("Verify the deployment and hosting status of the target origin".to_string());
    }
    if inputs.endpoints.percent < 100.0 {
        let failing: Vec<&str> = inputs
            .endpoints
            .results
            .iter()
            .filter(|r| !r.healthy)
            .map(|r| r.endpoint.as_str())
            .collect();
        out.push(format!(
            "Investigate failing endpoints: {}",
            failing.join(", ")
        ));
    }
    if matches!(inputs.ui.outcome, UiOutcome::Failed | UiOutcome::Error) {
        out.push("Review the UI test harness report for regressions".to_string());
    }
    if let Some(accessibility) = &inputs.ui.accessibility {
        if accessibility.score < 0.8 {
            out.push("Address failing accessibility checks on the root document".to_string());
        }
    }
    if matches!(
        inputs.performance.grade,
        PerformanceGrade::C | PerformanceGrade::D | PerformanceGrade::F
    ) {
        out.push(format!(
            "Performance grade {}: review response times against the {}ms SLA",
            inputs.performance.grade.as_str(),
            inputs.sla_ms
        ));
    }
    if inputs.mock_data.percent < 100.0 {
        out.push("Repair mock-data endpoints used by fallback rendering".to_string());
    }
    if inputs.open_breakers > 0 {
        out.push(format!(
            "{} circuit breaker(s) open; the affected endpoints are being skipped",
            inputs.open_breakers
        ));
    }

    out
}

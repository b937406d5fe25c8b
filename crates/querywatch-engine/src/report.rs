use querywatch_types::{ReportResults, Testcase};

/// Summarize a testcase after a verification session
pub fn report_results(testcase: &Testcase) -> ReportResults {
    let expectations = testcase.expectations.len();
    let verified: u64 = testcase
        .expectations
        .iter()
        .map(|e| u64::from(e.verified))
        .sum();
    let verification_mean = if expectations == 0 {
        0.0
    } else {
        verified as f64 / expectations as f64
    };

    ReportResults {
        name: testcase.name.clone(),
        verifications: testcase.verifications,
        expectations,
        fulfilled: testcase.fulfilled_count(),
        verification_mean,
        unfulfilled: testcase
            .expectations
            .iter()
            .filter(|e| !e.fulfilled)
            .cloned()
            .collect(),
        additional: testcase.additional_expectations.clone(),
    }
}

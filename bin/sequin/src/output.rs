//! Terminal tables for run results.

use comfy_table::{Table, presets::UTF8_FULL};
use sequin_deploy::{DeploymentResult, RunFailure, VerificationOutcome, VerificationReport};

pub fn results_table(results: &[DeploymentResult]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Label", "Contract", "Address", "Tx hash", "Block", "Value (wei)", "Status"]);

    for result in results {
        table.add_row(vec![
            result.label.clone(),
            result.contract.clone(),
            result.address.to_checksum(None),
            result.tx_hash.to_string(),
            result
                .block_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".to_string()),
            result.value.to_string(),
            result.status.to_string(),
        ]);
    }

    table
}

/// The confirmed prefix of a failed run, followed by the step it stopped at.
pub fn failure_table(failure: &RunFailure) -> Table {
    let mut table = results_table(&failure.completed);

    if let Some(step) = &failure.step {
        table.add_row(vec![
            step.label.clone(),
            step.contract.clone(),
            "-".to_string(),
            step.tx_hash
                .map(|hash| hash.to_string())
                .unwrap_or_else(|| "-".to_string()),
            "-".to_string(),
            "-".to_string(),
            step.status.to_string(),
        ]);
    }

    table
}

pub fn verification_table(reports: &[VerificationReport]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Label", "Address", "Verification"]);

    for report in reports {
        let status = match (&report.outcome, &report.error) {
            (_, Some(error)) => format!("failed: {error}"),
            (Some(VerificationOutcome::Verified), None) => "verified".to_string(),
            (Some(VerificationOutcome::AlreadyVerified), None) => "already verified".to_string(),
            (Some(VerificationOutcome::Pending { guid }), None) => format!("pending ({guid})"),
            (None, None) => "-".to_string(),
        };
        table.add_row(vec![report.label.clone(), report.address.to_checksum(None), status]);
    }

    table
}

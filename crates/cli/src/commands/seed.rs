use crate::commands::{with_migrated_pool, CommandResult};
use reimburse_db::{DemoSeedDataset, SeedResult};

pub fn run() -> CommandResult {
    let result = with_migrated_pool("seed", |pool| async move {
        let seeded = DemoSeedDataset::load(&pool)
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;

        let verification = DemoSeedDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;

        if !verification.all_present {
            let failed_checks = verification
                .checks
                .iter()
                .filter_map(|(check, passed)| (!passed).then_some(*check))
                .collect::<Vec<_>>();
            return Err(("seed_verification", verification_failure_message(&failed_checks), 6u8));
        }

        Ok(seeded)
    });

    match result {
        Ok(seeded) => CommandResult::success("seed", summary(&seeded)),
        Err(failure) => failure,
    }
}

fn summary(seeded: &SeedResult) -> String {
    format!(
        "demo dataset loaded: companies [{}], {} employees, {} policy rules",
        seeded.companies.join(", "),
        seeded.employees,
        seeded.rules
    )
}

fn verification_failure_message(failed_checks: &[&str]) -> String {
    if failed_checks.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed_checks.join(", "))
    }
}

use std::future::Future;

use super::{seed_deal, TestResult, T1};
use crate::{DealPatch, DealStore, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "update_increments_version",
            update_increments_version(factory).await,
        ),
        TestResult::from_result(
            "version",
            "matching_version_succeeds",
            matching_version_succeeds(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_returns_conflict",
            stale_version_returns_conflict(factory).await,
        ),
        TestResult::from_result(
            "version",
            "conflict_does_not_change_deal",
            conflict_does_not_change_deal(factory).await,
        ),
        TestResult::from_result(
            "version",
            "update_unknown_deal_returns_not_found",
            update_unknown_deal_returns_not_found(factory).await,
        ),
    ]
}

fn stage_patch(stage: &str) -> DealPatch {
    DealPatch {
        stage: Some(stage.to_string()),
        ..Default::default()
    }
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let before = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    let after = s
        .update_deal("deal-1", stage_patch("aip"), None, T1)
        .await
        .map_err(|e| e.to_string())?;
    if after.version != before.version + 1 {
        return Err(format!(
            "expected version {}, got {}",
            before.version + 1,
            after.version
        ));
    }
    if after.updated_at != T1 {
        return Err(format!("expected updated_at {}, got {}", T1, after.updated_at));
    }
    Ok(())
}

async fn matching_version_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let current = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    let updated = s
        .update_deal("deal-1", stage_patch("aip"), Some(current.version), T1)
        .await
        .map_err(|e| e.to_string())?;
    if updated.stage != "aip" {
        return Err(format!("expected stage aip, got {}", updated.stage));
    }
    Ok(())
}

async fn stale_version_returns_conflict<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let current = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    s.update_deal("deal-1", stage_patch("aip"), None, T1)
        .await
        .map_err(|e| e.to_string())?;

    match s
        .update_deal("deal-1", stage_patch("ntu"), Some(current.version), T1)
        .await
    {
        Err(StorageError::ConcurrentConflict {
            deal_id,
            expected_version,
            found_version,
        }) => {
            if deal_id != "deal-1" || expected_version != current.version {
                return Err(format!(
                    "conflict has wrong fields: {} / {}",
                    deal_id, expected_version
                ));
            }
            if found_version != current.version + 1 {
                return Err(format!("conflict found_version {}", found_version));
            }
            Ok(())
        }
        Err(e) => Err(format!("expected ConcurrentConflict, got {}", e)),
        Ok(_) => Err("stale update succeeded".to_string()),
    }
}

async fn conflict_does_not_change_deal<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let _ = s
        .update_deal("deal-1", stage_patch("ntu"), Some(99), T1)
        .await;
    let deal = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    if deal.stage != "submitted" || deal.version != 0 {
        return Err(format!(
            "conflicting update leaked: stage {} version {}",
            deal.stage, deal.version
        ));
    }
    Ok(())
}

async fn update_unknown_deal_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.update_deal("ghost", stage_patch("aip"), None, T1).await {
        Err(StorageError::DealNotFound { .. }) => Ok(()),
        Err(e) => Err(format!("expected DealNotFound, got {}", e)),
        Ok(_) => Err("update of unknown deal succeeded".to_string()),
    }
}

use std::future::Future;

use super::{make_activity, TestResult, T0, T1, T2};
use crate::DealStore;

pub(super) async fn run_activity_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "activity",
            "list_is_newest_first",
            list_is_newest_first(factory).await,
        ),
        TestResult::from_result(
            "activity",
            "list_filters_by_deal",
            list_filters_by_deal(factory).await,
        ),
        TestResult::from_result(
            "activity",
            "list_respects_limit",
            list_respects_limit(factory).await,
        ),
        TestResult::from_result(
            "activity",
            "zero_limit_returns_all",
            zero_limit_returns_all(factory).await,
        ),
    ]
}

async fn seed_activity<S: DealStore>(s: &S) -> Result<(), String> {
    for record in [
        make_activity("a-1", "deal-1", T0),
        make_activity("a-3", "deal-2", T2),
        make_activity("a-2", "deal-1", T1),
    ] {
        s.insert_activity(record).await.map_err(|e| e.to_string())?;
    }
    Ok(())
}

async fn list_is_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_activity(&s).await?;
    let rows = s.list_activity(None, 0).await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    if ids != ["a-3", "a-2", "a-1"] {
        return Err(format!("unexpected order: {:?}", ids));
    }
    Ok(())
}

async fn list_filters_by_deal<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_activity(&s).await?;
    let rows = s
        .list_activity(Some("deal-1"), 0)
        .await
        .map_err(|e| e.to_string())?;
    if rows.len() != 2 || rows.iter().any(|r| r.deal_id != "deal-1") {
        return Err(format!("filter returned {} rows", rows.len()));
    }
    Ok(())
}

async fn list_respects_limit<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_activity(&s).await?;
    let rows = s.list_activity(None, 2).await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    if ids != ["a-3", "a-2"] {
        return Err(format!("limit kept wrong rows: {:?}", ids));
    }
    Ok(())
}

async fn zero_limit_returns_all<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_activity(&s).await?;
    let rows = s.list_activity(None, 0).await.map_err(|e| e.to_string())?;
    if rows.len() != 3 {
        return Err(format!("expected 3 rows, got {}", rows.len()));
    }
    Ok(())
}

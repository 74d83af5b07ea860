use std::future::Future;

use super::{make_deal, seed_deal, TestResult, T0, T1, T2};
use crate::{DealStore, StorageError};

pub(super) async fn run_deal_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result("deals", "get_deal_by_id", get_deal_by_id(factory).await),
        TestResult::from_result(
            "deals",
            "get_deal_by_code",
            get_deal_by_code(factory).await,
        ),
        TestResult::from_result(
            "deals",
            "unknown_key_returns_not_found",
            unknown_key_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "deals",
            "duplicate_insert_returns_already_exists",
            duplicate_insert_returns_already_exists(factory).await,
        ),
        TestResult::from_result(
            "deals",
            "list_is_newest_first_and_filters_by_stage",
            list_is_newest_first_and_filters_by_stage(factory).await,
        ),
    ]
}

async fn get_deal_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let deal = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    if deal.deal_code != "CODE-1" {
        return Err(format!("expected CODE-1, got {}", deal.deal_code));
    }
    Ok(())
}

async fn get_deal_by_code<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let deal = s.get_deal("CODE-1").await.map_err(|e| e.to_string())?;
    if deal.id != "deal-1" {
        return Err(format!("expected deal-1, got {}", deal.id));
    }
    Ok(())
}

async fn unknown_key_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    match s.get_deal("nope").await {
        Err(StorageError::DealNotFound { deal_key }) if deal_key == "nope" => Ok(()),
        Err(e) => Err(format!("expected DealNotFound, got {}", e)),
        Ok(d) => Err(format!("expected DealNotFound, got deal {}", d.id)),
    }
}

async fn duplicate_insert_returns_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    match s.insert_deal(make_deal("deal-1", "CODE-X", T1)).await {
        Err(StorageError::AlreadyExists { deal_id }) if deal_id == "deal-1" => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists, got {}", e)),
        Ok(()) => Err("duplicate insert succeeded".to_string()),
    }
}

async fn list_is_newest_first_and_filters_by_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut granted = make_deal("deal-2", "CODE-2", T2);
    granted.stage = "granted".to_string();
    for deal in [make_deal("deal-1", "CODE-1", T0), granted, make_deal("deal-3", "CODE-3", T1)] {
        s.insert_deal(deal).await.map_err(|e| e.to_string())?;
    }

    let all = s.list_deals(None).await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
    if ids != ["deal-2", "deal-3", "deal-1"] {
        return Err(format!("unexpected order: {:?}", ids));
    }

    let submitted = s
        .list_deals(Some("submitted"))
        .await
        .map_err(|e| e.to_string())?;
    if submitted.len() != 2 || submitted.iter().any(|d| d.stage != "submitted") {
        return Err(format!("stage filter returned {} deals", submitted.len()));
    }
    Ok(())
}

use std::future::Future;

use super::{make_history, seed_deal, TestResult, T1, T2};
use crate::{DealPatch, DealStore};

pub(super) async fn run_history_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "history",
            "patch_applies_columns_and_history_together",
            patch_applies_columns_and_history_together(factory).await,
        ),
        TestResult::from_result(
            "history",
            "history_appends_in_order",
            history_appends_in_order(factory).await,
        ),
        TestResult::from_result(
            "history",
            "nullable_column_can_be_cleared",
            nullable_column_can_be_cleared(factory).await,
        ),
        TestResult::from_result(
            "history",
            "stage_bank_text_is_keyed_by_stage",
            stage_bank_text_is_keyed_by_stage(factory).await,
        ),
    ]
}

async fn patch_applies_columns_and_history_together<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let patch = DealPatch {
        stage: Some("aip".to_string()),
        last_moved_by: Some("test-actor".to_string()),
        last_moved_at: Some(T1.to_string()),
        append_history: Some(make_history("submitted", "aip", T1)),
        ..Default::default()
    };
    s.update_deal("deal-1", patch, None, T1)
        .await
        .map_err(|e| e.to_string())?;

    let deal = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    if deal.stage != "aip" {
        return Err(format!("expected stage aip, got {}", deal.stage));
    }
    if deal.last_moved_by.as_deref() != Some("test-actor") {
        return Err(format!("last_moved_by is {:?}", deal.last_moved_by));
    }
    match deal.move_history.last() {
        Some(h) if h.from == "submitted" && h.to == "aip" && h.at == T1 => Ok(()),
        other => Err(format!("unexpected last history entry: {:?}", other)),
    }
}

async fn history_appends_in_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    for (from, to, at) in [("submitted", "aip", T1), ("aip", "granted", T2)] {
        let patch = DealPatch {
            stage: Some(to.to_string()),
            append_history: Some(make_history(from, to, at)),
            ..Default::default()
        };
        s.update_deal("deal-1", patch, None, at)
            .await
            .map_err(|e| e.to_string())?;
    }

    let deal = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    let tos: Vec<&str> = deal.move_history.iter().map(|h| h.to.as_str()).collect();
    if tos != ["aip", "granted"] {
        return Err(format!("unexpected history order: {:?}", tos));
    }
    Ok(())
}

async fn nullable_column_can_be_cleared<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let set = DealPatch {
        ntu_reason: Some(Some("Client withdrew".to_string())),
        ..Default::default()
    };
    s.update_deal("deal-1", set, None, T1)
        .await
        .map_err(|e| e.to_string())?;
    let clear = DealPatch {
        ntu_reason: Some(None),
        ..Default::default()
    };
    let deal = s
        .update_deal("deal-1", clear, None, T2)
        .await
        .map_err(|e| e.to_string())?;
    if deal.ntu_reason.is_some() {
        return Err(format!("ntu_reason not cleared: {:?}", deal.ntu_reason));
    }
    Ok(())
}

async fn stage_bank_text_is_keyed_by_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    for stage in ["aip", "granted"] {
        let patch = DealPatch {
            stage_bank_text: Some((
                stage.to_string(),
                format!("ABSA: {} note", stage),
                format!("ABSA: {}-ref", stage),
            )),
            ..Default::default()
        };
        s.update_deal("deal-1", patch, None, T1)
            .await
            .map_err(|e| e.to_string())?;
    }
    let deal = s.get_deal("deal-1").await.map_err(|e| e.to_string())?;
    if deal.bank_notes.get("aip").map(String::as_str) != Some("ABSA: aip note") {
        return Err(format!("aip notes overwritten: {:?}", deal.bank_notes));
    }
    if deal.bank_refs.get("granted").map(String::as_str) != Some("ABSA: granted-ref") {
        return Err(format!("granted refs missing: {:?}", deal.bank_refs));
    }
    Ok(())
}

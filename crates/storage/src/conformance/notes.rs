use std::future::Future;

use super::{make_note, seed_deal, TestResult};
use crate::DealStore;

pub(super) async fn run_note_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "notes",
            "replace_is_scoped_to_stage",
            replace_is_scoped_to_stage(factory).await,
        ),
        TestResult::from_result(
            "notes",
            "replace_drops_blank_bank_names",
            replace_drops_blank_bank_names(factory).await,
        ),
        TestResult::from_result(
            "notes",
            "replace_with_empty_wipes_stage",
            replace_with_empty_wipes_stage(factory).await,
        ),
    ]
}

async fn replace_is_scoped_to_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    s.replace_stage_notes("deal-1", "aip", vec![make_note("ABSA", "aip note")])
        .await
        .map_err(|e| e.to_string())?;
    s.replace_stage_notes("deal-1", "global", vec![make_note("FNB", "first")])
        .await
        .map_err(|e| e.to_string())?;
    s.replace_stage_notes("deal-1", "global", vec![make_note("FNB", "second")])
        .await
        .map_err(|e| e.to_string())?;

    let rows = s
        .list_stage_notes("deal-1")
        .await
        .map_err(|e| e.to_string())?;
    if rows.len() != 2 {
        return Err(format!("expected 2 rows, got {}", rows.len()));
    }
    if !rows.iter().any(|r| r.stage == "aip" && r.bank_notes == "aip note") {
        return Err("aip row was lost".to_string());
    }
    if !rows
        .iter()
        .any(|r| r.stage == "global" && r.bank_notes == "second")
    {
        return Err("global row was not replaced".to_string());
    }
    Ok(())
}

async fn replace_drops_blank_bank_names<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    let inserted = s
        .replace_stage_notes(
            "deal-1",
            "global",
            vec![make_note("ABSA", "ok"), make_note("   ", "orphan")],
        )
        .await
        .map_err(|e| e.to_string())?;
    if inserted != 1 {
        return Err(format!("expected 1 inserted row, got {}", inserted));
    }
    let rows = s
        .list_stage_notes("deal-1")
        .await
        .map_err(|e| e.to_string())?;
    match rows.as_slice() {
        [row] if row.bank_name == "ABSA" && row.deal_id == "deal-1" && !row.id.is_empty() => Ok(()),
        other => Err(format!("unexpected rows: {:?}", other)),
    }
}

async fn replace_with_empty_wipes_stage<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DealStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_deal(&s).await?;
    s.replace_stage_notes("deal-1", "global", vec![make_note("ABSA", "x")])
        .await
        .map_err(|e| e.to_string())?;
    s.replace_stage_notes("deal-1", "global", Vec::new())
        .await
        .map_err(|e| e.to_string())?;
    let rows = s
        .list_stage_notes("deal-1")
        .await
        .map_err(|e| e.to_string())?;
    if !rows.is_empty() {
        return Err(format!("expected no rows, got {}", rows.len()));
    }
    Ok(())
}

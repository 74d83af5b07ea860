use bondflow_workflow::FeedEntry;

use super::{block_on, open_session, or_exit, print_json};
use crate::config::ServeConfig;
use crate::OutputFormat;

pub(crate) struct FeedQuery {
    pub(crate) query: Option<String>,
    pub(crate) limit: Option<usize>,
    pub(crate) deal: Option<String>,
    pub(crate) from_history: bool,
}

pub(crate) fn cmd_activity(
    query: FeedQuery,
    config: &ServeConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let session = open_session(config, output, quiet);
    let executor = &session.executor;

    if let Some(deal) = query.deal.as_deref() {
        let result = block_on(
            async { executor.list_moves(Some(deal)).await.map_err(|e| e.to_string()) },
            output,
            quiet,
        );
        let rows = or_exit(result, output, quiet);
        match output {
            OutputFormat::Text => {
                let entries: Vec<FeedEntry> = rows.iter().map(FeedEntry::from_record).collect();
                print_entries(&entries);
            }
            OutputFormat::Json => print_json(&rows),
        }
        return;
    }

    let result = block_on(
        async {
            let q = query.query.as_deref();
            let feed = if query.from_history {
                executor.history_feed(q, query.limit).await
            } else {
                executor.activity_feed(q, query.limit).await
            };
            feed.map_err(|e| e.to_string())
        },
        output,
        quiet,
    );
    let feed = or_exit(result, output, quiet);
    match output {
        OutputFormat::Text => print_entries(&feed),
        OutputFormat::Json => print_json(&feed),
    }
}

fn print_entries(entries: &[FeedEntry]) {
    if entries.is_empty() {
        println!("No activity");
        return;
    }
    for entry in entries {
        let stages = match (entry.from_stage.as_deref(), entry.to_stage.as_deref()) {
            (Some(from), Some(to)) if from != to => format!("{} -> {}", from, to),
            (_, Some(to)) => to.to_string(),
            (Some(from), None) => from.to_string(),
            (None, None) => String::new(),
        };
        println!(
            "{}  {:<12} {:<8} {:<24} {}",
            entry.at.as_deref().unwrap_or("-"),
            entry.deal_code.as_deref().unwrap_or(&entry.deal_id),
            entry.action,
            stages,
            entry.actor,
        );
    }
}

use bondflow_workflow::NewDeal;
use clap::Args;
use rust_decimal::Decimal;

use super::{block_on, open_session, or_exit, print_json};
use crate::config::ServeConfig;
use crate::OutputFormat;

#[derive(Args)]
pub(crate) struct CreateArgs {
    /// Deal deck identifier
    #[arg(long)]
    deck_id: String,
    /// Deal code shown in lists [default: the deck id]
    #[arg(long)]
    code: Option<String>,
    #[arg(long)]
    applicant: String,
    #[arg(long)]
    consultant: String,
    #[arg(long)]
    agent: String,
    /// Bond amount, greater than zero
    #[arg(long)]
    amount: Decimal,
    /// Starting stage [default: submitted]
    #[arg(long)]
    stage: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    /// Bank the deal was submitted to (repeatable)
    #[arg(long = "bank")]
    banks: Vec<String>,
}

pub(crate) fn cmd_create(args: CreateArgs, config: &ServeConfig, output: OutputFormat, quiet: bool) {
    let session = open_session(config, output, quiet);
    let new = NewDeal {
        deal_deck_id: args.deck_id,
        deal_code: args.code,
        applicant: args.applicant,
        consultant: args.consultant,
        agent: args.agent,
        amount: Some(args.amount),
        stage: args.stage,
        notes: args.notes,
        banks: args.banks,
    };

    let result = block_on(
        async {
            let deal = session
                .executor
                .create_deal(new)
                .await
                .map_err(|e| e.to_string())?;
            session.save().await?;
            Ok::<_, String>(deal)
        },
        output,
        quiet,
    );
    let deal = or_exit(result, output, quiet);

    match output {
        OutputFormat::Text => {
            if !quiet {
                println!("Created {} ({}) at {}", deal.deal_code, deal.id, deal.stage);
            }
        }
        OutputFormat::Json => print_json(&deal),
    }
}

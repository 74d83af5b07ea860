use bondflow_workflow::{
    normalize, Clock, MoveOutcome, MoveRequest, Stage, StageForm, StagePayload, WorkflowError,
};
use clap::Args;

use super::{block_on, open_session, or_exit, print_json};
use crate::config::ServeConfig;
use crate::store::Session;
use crate::OutputFormat;

#[derive(Args)]
pub(crate) struct MoveArgs {
    /// Deal id or deal code
    deal: String,
    /// Target stage, in any spelling
    to: String,
    /// User making the move
    #[arg(long)]
    by: Option<String>,
    /// Note stored on the deal and the history entry
    #[arg(long)]
    note: Option<String>,
    /// Confirm the captured stage details and commit the move
    #[arg(long)]
    confirm: bool,
    /// Fail if the deal has changed since this version
    #[arg(long)]
    expected_version: Option<i64>,
    #[command(flatten)]
    capture: CaptureArgs,
}

/// Stage details captured with the move. Unset values keep what was seeded
/// from the deal's bank notes.
#[derive(Args, Default)]
pub(crate) struct CaptureArgs {
    /// Per-bank note as NAME=TEXT (repeatable)
    #[arg(long = "bank-note", value_name = "NAME=TEXT")]
    bank_notes: Vec<String>,
    /// Per-bank reference as NAME=REF (repeatable)
    #[arg(long = "bank-ref", value_name = "NAME=REF")]
    bank_refs: Vec<String>,
    /// Timestamped stage note (repeatable)
    #[arg(long = "add-note")]
    add_notes: Vec<String>,
    #[arg(long)]
    conditions: Option<String>,
    #[arg(long)]
    attorney_name: Option<String>,
    #[arg(long)]
    attorney_firm: Option<String>,
    #[arg(long)]
    attorney_tel: Option<String>,
    #[arg(long)]
    attorney_email: Option<String>,
    #[arg(long)]
    estimated_reg_date: Option<String>,
    #[arg(long)]
    registration_number: Option<String>,
    #[arg(long)]
    registration_reference: Option<String>,
    #[arg(long)]
    payment_due_date: Option<String>,
    #[arg(long)]
    agent_comm_paid: bool,
    #[arg(long)]
    ntu_reason: Option<String>,
    /// Explanation when the NTU reason is "Other"
    #[arg(long)]
    ntu_note: Option<String>,
}

impl CaptureArgs {
    fn apply(self, form: &mut StageForm, clock: &dyn Clock) -> Result<(), String> {
        for raw in &self.bank_notes {
            let (name, text) = split_pair(raw, "--bank-note")?;
            form.set_bank_note(name, text);
        }
        for raw in &self.bank_refs {
            let (name, text) = split_pair(raw, "--bank-ref")?;
            form.set_bank_reference(name, text);
        }
        for text in &self.add_notes {
            form.add_note(text, clock);
        }

        let set = |slot: &mut String, value: Option<String>| {
            if let Some(value) = value {
                *slot = value;
            }
        };
        set(&mut form.conditions, self.conditions);
        set(&mut form.attorney.name, self.attorney_name);
        set(&mut form.attorney.firm, self.attorney_firm);
        set(&mut form.attorney.tel, self.attorney_tel);
        set(&mut form.attorney.email, self.attorney_email);
        set(&mut form.estimated_reg_date, self.estimated_reg_date);
        set(&mut form.registration_number, self.registration_number);
        set(&mut form.registration_reference, self.registration_reference);
        set(&mut form.payment_due_date, self.payment_due_date);
        set(&mut form.ntu_reason, self.ntu_reason);
        set(&mut form.ntu_other_note, self.ntu_note);
        form.agent_comm_paid |= self.agent_comm_paid;
        Ok(())
    }
}

fn split_pair<'a>(raw: &'a str, flag: &str) -> Result<(&'a str, &'a str), String> {
    match raw.split_once('=') {
        Some((name, text)) if !name.trim().is_empty() => Ok((name.trim(), text)),
        _ => Err(format!("{} expects NAME=VALUE, got '{}'", flag, raw)),
    }
}

pub(crate) fn cmd_move(args: MoveArgs, config: &ServeConfig, output: OutputFormat, quiet: bool) {
    let session = open_session(config, output, quiet);
    let result = block_on(run_move(&session, args), output, quiet);
    let outcome = or_exit(result, output, quiet);

    match output {
        OutputFormat::Text => {
            if quiet {
                return;
            }
            println!(
                "Moved {} from {} to {} by {} (version {})",
                outcome.deal.deal_code,
                outcome.entry.from.label(),
                outcome.entry.to.label(),
                outcome.entry.by,
                outcome.deal.version,
            );
            if outcome.activity.is_none() {
                eprintln!("warning: the move was saved but its activity entry was not");
            }
        }
        OutputFormat::Json => print_json(&outcome),
    }
}

async fn run_move(session: &Session, args: MoveArgs) -> Result<MoveOutcome, String> {
    let executor = &session.executor;
    let target = normalize(&args.to);

    let payload = if target == Stage::Submitted {
        None
    } else {
        let mut form = executor
            .seed_form(&args.deal, target)
            .await
            .map_err(|e| e.to_string())?;
        args.capture.apply(&mut form, executor.clock())?;
        form.build()
    };

    let request = MoveRequest {
        deal_key: args.deal,
        to_stage: args.to,
        payload: payload.filter(|_| args.confirm).map(StagePayload::confirm),
        actor: args.by,
        note: args.note,
        expected_version: args.expected_version,
    };
    let outcome = executor.move_deal(request).await.map_err(|e| match e {
        WorkflowError::IncompletePayload { .. } if !args.confirm => {
            format!("{} (review the details and re-run with --confirm)", e)
        }
        other => other.to_string(),
    })?;
    session.save().await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bondflow_workflow::FixedClock;

    #[test]
    fn pairs_split_at_first_equals() {
        assert_eq!(
            split_pair("ABSA=ref=1", "--bank-ref").unwrap(),
            ("ABSA", "ref=1")
        );
        assert!(split_pair("no-equals", "--bank-note").is_err());
        assert!(split_pair(" =text", "--bank-note").is_err());
    }

    #[test]
    fn capture_overrides_seeded_values() {
        let clock = FixedClock::at("2026-01-01T09:00:00.000Z").unwrap();
        let mut form = StageForm::new(Stage::Ntu);
        let capture = CaptureArgs {
            ntu_reason: Some("Other".to_string()),
            ntu_note: Some("client emigrated".to_string()),
            add_notes: vec!["called client".to_string(), "  ".to_string()],
            ..Default::default()
        };
        capture.apply(&mut form, &clock).unwrap();

        assert_eq!(form.ntu_reason, "Other");
        assert_eq!(form.notes_items().len(), 1);
        assert_eq!(form.notes_items()[0].ts, "2026-01-01T09:00:00.000Z");
        assert!(form.build().is_some());
    }
}

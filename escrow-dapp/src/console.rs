//! Line-oriented console surface
//!
//! Parses typed commands, runs them against the [`EscrowApp`] and renders
//! list snapshots as text. Approvals and timelocks are spawned so the prompt
//! stays responsive while transactions confirm.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::app::{ApprovalOutcome, EscrowApp};
use crate::domain_types::DomainEthAddress;
use crate::store::{ApprovalStatus, EscrowListSnapshot, TimelockState};

#[derive(Debug, PartialEq)]
pub enum Command {
    /// Deploy a new escrow: `deploy <arbiter> <beneficiary> <amount-wei>`
    Deploy {
        arbiter: String,
        beneficiary: String,
        amount: String,
    },
    /// Print the list: `list`
    List,
    /// Approve an escrow: `approve <address>`
    Approve(DomainEthAddress),
    /// Ask to delete an escrow: `delete <address>`
    Delete(DomainEthAddress),
    /// Confirm the open delete prompt: `yes`
    Yes,
    /// Dismiss the open delete prompt: `no`
    No,
    /// Open the timelock prompt: `timelock <address>`
    Timelock(DomainEthAddress),
    /// Answer the timelock prompt: `set <unix-time>`
    Set(String),
    /// Close the timelock prompt: `cancel`
    Cancel,
    Help,
    Quit,
}

/// Parse a command line. Returns `None` for unknown commands or missing arguments.
pub fn parse(text: &str) -> Option<Command> {
    let parts: Vec<&str> = text.split_whitespace().collect();
    let command = parts.first()?.to_lowercase();

    let address = || -> Option<DomainEthAddress> {
        let raw = parts.get(1)?;
        match raw.parse::<DomainEthAddress>() {
            Ok(address) => Some(address),
            Err(e) => {
                log::debug!("Console: bad address '{}': {}", raw, e);
                None
            }
        }
    };

    match command.as_str() {
        "deploy" | "new" => match parts.as_slice() {
            [_, arbiter, beneficiary, amount] => Some(Command::Deploy {
                arbiter: arbiter.to_string(),
                beneficiary: beneficiary.to_string(),
                amount: amount.to_string(),
            }),
            _ => None,
        },
        "list" | "ls" => Some(Command::List),
        "approve" => address().map(Command::Approve),
        "delete" | "rm" => address().map(Command::Delete),
        "yes" | "y" => Some(Command::Yes),
        "no" | "n" => Some(Command::No),
        "timelock" => address().map(Command::Timelock),
        "set" => parts.get(1).map(|t| Command::Set(t.to_string())),
        "cancel" => Some(Command::Cancel),
        "help" | "?" => Some(Command::Help),
        "quit" | "exit" | "q" => Some(Command::Quit),
        _ => {
            log::debug!("Console: unknown command '{}'", command);
            None
        }
    }
}

pub fn help_text() -> &'static str {
    "Commands:\n\
     \x20 deploy <arbiter> <beneficiary> <amount-wei>  deploy a new escrow\n\
     \x20 list                                          show all escrows\n\
     \x20 approve <address>                             approve release of funds\n\
     \x20 delete <address>                              remove an escrow from the list\n\
     \x20 yes | no                                      answer the delete prompt\n\
     \x20 timelock <address>                            open the timelock prompt\n\
     \x20 set <unix-time>                               submit the unlock time\n\
     \x20 cancel                                        close the timelock prompt\n\
     \x20 help                                          show this text\n\
     \x20 quit                                          exit"
}

/// Run a command. Returns the text to print; `Quit` is handled by the caller.
pub async fn execute(cmd: Command, app: &Arc<EscrowApp>) -> Result<String, String> {
    match cmd {
        Command::Deploy {
            arbiter,
            beneficiary,
            amount,
        } => {
            let record = app
                .new_contract(&arbiter, &beneficiary, &amount)
                .await
                .map_err(|e| format!("Deploy failed: {}", e))?;
            Ok(format!("Deployed escrow {}", record.address))
        }
        Command::List => Ok(render(&app.snapshot())),
        Command::Approve(address) => {
            let app = app.clone();
            tokio::spawn(async move {
                match app.approve(&address).await {
                    Ok(ApprovalOutcome::Abandoned { .. }) => {}
                    Ok(_) => println!("✓ Escrow {} approved", address.short()),
                    Err(e) => println!("✗ Approve {} failed: {}", address.short(), e),
                }
            });
            Ok(format!("Approving {}...", address.short()))
        }
        Command::Delete(address) => {
            let prompt = app.request_delete(&address).map_err(|e| e.to_string())?;
            Ok(format!("{} [yes/no]", prompt.description))
        }
        Command::Yes => match app.confirm_delete().map_err(|e| e.to_string())? {
            Some(record) => Ok(format!("Deleted {} from the list", record.address.short())),
            None => Ok("Nothing to delete".to_string()),
        },
        Command::No => {
            app.cancel_delete();
            Ok("Delete cancelled".to_string())
        }
        Command::Timelock(address) => {
            let prompt = app.open_timelock(&address).map_err(|e| e.to_string())?;
            Ok(format!("{} (set <unix-time> | cancel)", prompt.description))
        }
        Command::Set(input) => {
            let app = app.clone();
            tokio::spawn(async move {
                match app.submit_timelock(&input).await {
                    Ok(confirmed) => println!("✓ Time set successfully (unlock at {})", confirmed.unlock_time),
                    Err(e) => println!("✗ Timelock failed: {}", e),
                }
            });
            Ok("Setting timelock...".to_string())
        }
        Command::Cancel => {
            app.close_timelock();
            Ok("Timelock prompt closed".to_string())
        }
        Command::Help => Ok(help_text().to_string()),
        Command::Quit => Ok(String::new()),
    }
}

/// Text rendering of one snapshot
pub fn render(snapshot: &EscrowListSnapshot) -> String {
    let mut out = String::new();

    if snapshot.records.is_empty() {
        out.push_str("No escrows yet. Deploy one with `deploy`.\n");
    }
    for (i, record) in snapshot.records.iter().enumerate() {
        let approval = match record.approval {
            ApprovalStatus::Idle if snapshot.approve_disabled => "approve disabled".to_string(),
            ApprovalStatus::Idle => "not approved".to_string(),
            ApprovalStatus::Approving => "approving...".to_string(),
            ApprovalStatus::Approved => "✓ approved".to_string(),
        };
        let timelock = match record.timelock {
            TimelockState::NotSet => "no timelock",
            TimelockState::Pending => "timelock pending",
            TimelockState::Set => "timelock set",
        };
        let _ = writeln!(
            out,
            "{}. {}  arbiter: {}  beneficiary: {}  value: {}  [{}] [{}]",
            i + 1,
            record.address,
            record.arbiter,
            record.beneficiary,
            record.format_value_eth(),
            approval,
            timelock
        );
    }

    if snapshot.approve_disabled {
        let _ = writeln!(
            out,
            "Approve disabled for {}s",
            snapshot.approve_cooldown_remaining_ms.div_ceil(1000)
        );
    }
    if snapshot.show_time_set_prompt {
        out.push_str("Time set successfully\n");
    }
    if let Some(address) = &snapshot.pending_delete {
        let _ = writeln!(out, "Delete {}? [yes/no]", address.short());
    }
    if let Some(address) = &snapshot.pending_timelock {
        let _ = writeln!(out, "Unlock time for {}: set <unix-time> | cancel", address.short());
    }
    out
}

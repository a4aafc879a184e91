//! Proposal lifecycle subcommands.

use agora::governance::{MemberId, Operation, ProposalId, ProposalState, SpaceId};

use super::Context;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Parse an operation spec of the form `target[:value[:payload_hex]]`.
pub fn parse_operation(spec: &str) -> Result<Operation, Box<dyn std::error::Error>> {
    let mut parts = spec.splitn(3, ':');
    let target = parts
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| format!("Operation '{}' has an empty target", spec))?
        .to_string();

    let value = match parts.next() {
        Some(v) if !v.is_empty() => v
            .parse::<u64>()
            .map_err(|e| format!("Invalid value in operation '{}': {}", spec, e))?,
        _ => 0,
    };

    let payload = match parts.next() {
        Some(p) if !p.is_empty() => {
            hex::decode(p).map_err(|e| format!("Invalid payload hex in '{}': {}", spec, e))?
        }
        _ => Vec::new(),
    };

    Ok(Operation {
        target,
        value,
        payload,
    })
}

pub async fn propose(
    ctx: &Context,
    space: u64,
    creator: String,
    duration: String,
    op_specs: Vec<String>,
) -> CliResult {
    let duration_secs = humantime::parse_duration(&duration)
        .map_err(|e| format!("Invalid duration '{}': {}", duration, e))?
        .as_secs();

    let operations = op_specs
        .iter()
        .map(|spec| parse_operation(spec))
        .collect::<Result<Vec<_>, _>>()?;

    let id = ctx
        .engine
        .create_proposal(SpaceId(space), MemberId(creator), duration_secs, operations)
        .await?;

    println!("Created proposal {}", id);
    Ok(())
}

pub async fn vote(ctx: &Context, proposal: u64, voter: String, support: bool) -> CliResult {
    let state = ctx
        .engine
        .vote(ProposalId(proposal), MemberId(voter), support)
        .await?;
    print_state(proposal, state);
    Ok(())
}

pub async fn evaluate(ctx: &Context, proposal: u64) -> CliResult {
    let state = ctx.engine.evaluate(ProposalId(proposal)).await?;
    print_state(proposal, state);
    Ok(())
}

pub async fn withdraw(ctx: &Context, proposal: u64, caller: String) -> CliResult {
    ctx.engine
        .withdraw(ProposalId(proposal), MemberId(caller))
        .await?;
    println!("Proposal {} withdrawn", proposal);
    Ok(())
}

pub async fn show(ctx: &Context, proposal: u64) -> CliResult {
    let view = ctx.engine.get_proposal(ProposalId(proposal)).await?;
    let (yes, no) = ctx.engine.proposal_voters(ProposalId(proposal)).await?;

    println!("{}", serde_json::to_string_pretty(&view)?);
    println!(
        "yes voters: {}",
        yes.iter().map(|m| m.0.as_str()).collect::<Vec<_>>().join(", ")
    );
    println!(
        "no voters:  {}",
        no.iter().map(|m| m.0.as_str()).collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

pub async fn list(ctx: &Context, space: u64) -> CliResult {
    let views = ctx.engine.list_space_proposals(SpaceId(space)).await?;
    if views.is_empty() {
        println!("Space {} has no proposals", space);
        return Ok(());
    }
    for view in views {
        println!(
            "{}  {:?}  yes={} no={} of {}  window=[{}, {})  creator={}",
            view.id,
            view.state,
            view.yes_votes,
            view.no_votes,
            view.total_voting_power_at_snapshot,
            view.start_time,
            view.end_time,
            view.creator
        );
    }
    Ok(())
}

pub async fn latest(ctx: &Context) -> CliResult {
    match ctx.engine.latest_proposal_id().await? {
        Some(id) => println!("{}", id),
        None => println!("No proposals yet"),
    }
    Ok(())
}

pub async fn sweep(ctx: &Context, space: u64) -> CliResult {
    let resolved = ctx.engine.sweep_space(SpaceId(space)).await?;
    println!("Resolved {} proposal(s) in space {}", resolved, space);
    Ok(())
}

fn print_state(proposal: u64, state: ProposalState) {
    match state {
        ProposalState::Pending => println!("Proposal {} is pending", proposal),
        ProposalState::Executed => println!("Proposal {} passed and was executed", proposal),
        ProposalState::Expired => println!("Proposal {} expired", proposal),
        ProposalState::Withdrawn => println!("Proposal {} is withdrawn", proposal),
    }
}

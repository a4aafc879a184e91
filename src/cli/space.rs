//! Space administration subcommands.

use agora::governance::{Clock, MemberId, SpaceId, SystemClock, Thresholds};

use super::Context;

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn parse_duration_secs(s: &str) -> Result<u64, Box<dyn std::error::Error>> {
    Ok(humantime::parse_duration(s)
        .map_err(|e| format!("Invalid duration '{}': {}", s, e))?
        .as_secs())
}

pub async fn create_space(
    ctx: &Context,
    name: String,
    owner: String,
    quorum: u64,
    unity: u64,
    min_duration: Option<String>,
) -> CliResult {
    validate_pct("quorum", quorum)?;
    validate_pct("unity", unity)?;
    let min_secs = match min_duration {
        Some(s) => parse_duration_secs(&s)?,
        None => 0,
    };

    let space = ctx
        .spaces
        .create_space(
            &name,
            &MemberId(owner),
            Thresholds {
                quorum_pct: quorum,
                unity_pct: unity,
            },
            min_secs,
        )
        .await?;

    println!("Created space {} ({})", space, name);
    Ok(())
}

pub async fn add_member(ctx: &Context, space: u64, member: String, power: u64) -> CliResult {
    ctx.spaces
        .add_member(
            SpaceId(space),
            &MemberId(member.clone()),
            power,
            SystemClock.now(),
        )
        .await?;
    println!("{} now holds {} voting power in space {}", member, power, space);
    Ok(())
}

pub async fn remove_member(ctx: &Context, space: u64, member: String) -> CliResult {
    ctx.spaces
        .remove_member(SpaceId(space), &MemberId(member.clone()), SystemClock.now())
        .await?;
    println!("Removed {} from space {}", member, space);
    Ok(())
}

pub async fn add_admin(ctx: &Context, space: u64, member: String) -> CliResult {
    ctx.spaces
        .add_administrator(SpaceId(space), &MemberId(member.clone()))
        .await?;
    println!("{} is now an administrator of space {}", member, space);
    Ok(())
}

pub async fn set_thresholds(ctx: &Context, space: u64, quorum: u64, unity: u64) -> CliResult {
    validate_pct("quorum", quorum)?;
    validate_pct("unity", unity)?;
    ctx.spaces
        .set_thresholds(
            SpaceId(space),
            Thresholds {
                quorum_pct: quorum,
                unity_pct: unity,
            },
        )
        .await?;
    println!("Space {} thresholds set to quorum {}% / unity {}%", space, quorum, unity);
    Ok(())
}

pub async fn set_min_duration(ctx: &Context, space: u64, duration: String) -> CliResult {
    let secs = parse_duration_secs(&duration)?;
    ctx.spaces
        .set_minimum_duration(SpaceId(space), secs)
        .await?;
    println!("Space {} minimum proposal duration set to {}s", space, secs);
    Ok(())
}

fn validate_pct(name: &str, value: u64) -> Result<(), Box<dyn std::error::Error>> {
    if value > 100 {
        return Err(format!("{} must be 0-100, got {}", name, value).into());
    }
    Ok(())
}

use color_eyre::{eyre::eyre, Result};
use condprof_core::api as condprof_core;
use condprof_core::{ExecutionOutcome, FetchRequest, HistoryRequest, PackRequest};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::{CommandCli, FetchArgs, HistoryArgs, PackArgs};

pub async fn dispatch_command(command: &CommandCli) -> Result<(&'static str, ExecutionOutcome)> {
    match command {
        CommandCli::Fetch(args) => {
            let request = fetch_request_from_args(args);
            let outcome = condprof_core::fetch_profile(&request)
                .await
                .map_err(|err| eyre!("{err:?}"))?;
            Ok(("fetch", outcome))
        }
        CommandCli::Pack(args) => {
            let request = pack_request_from_args(args);
            let outcome = condprof_core::pack_profile(&request).map_err(|err| eyre!("{err:?}"))?;
            Ok(("pack", outcome))
        }
        CommandCli::History(args) => {
            let request = history_request_from_args(args)?;
            let outcome = condprof_core::changelog_history(&request).map_err(|err| eyre!("{err:?}"))?;
            Ok(("history", outcome))
        }
    }
}

fn fetch_request_from_args(args: &FetchArgs) -> FetchRequest {
    FetchRequest {
        platform: args.platform.clone(),
        scenario: args.scenario.clone(),
        customization: args.customization.clone(),
        dest: args.dest.clone(),
        store_url: args.store_url.clone(),
    }
}

fn pack_request_from_args(args: &PackArgs) -> PackRequest {
    PackRequest {
        profile: args.profile.clone(),
        archive_dir: args.archive_dir.clone(),
    }
}

fn history_request_from_args(args: &HistoryArgs) -> Result<HistoryRequest> {
    let before = match &args.before {
        Some(raw) => Some(parse_timestamp(raw)?),
        None => None,
    };
    Ok(HistoryRequest {
        platform: args.platform.clone(),
        root: args.archive_dir.clone(),
        before,
    })
}

fn parse_timestamp(raw: &str) -> Result<i64> {
    if let Ok(unix) = raw.parse::<i64>() {
        return Ok(unix);
    }
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| eyre!("invalid --before value {raw:?}: {err}"))?;
    Ok(parsed.unix_timestamp())
}

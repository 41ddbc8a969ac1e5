use super::WorldLinks;
use crate::error::Result;
use crate::interop::message::{
    ChannelUserLimit, ChannelUserLimitResponse, ClientAuth, ClientInitializeSpw, MigrateClient,
    MigrateClientResponse,
};
use crate::process::ProcessContext;
use crate::registry::DirectoryEntry;
use std::net::Ipv4Addr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Where a channel can be reached, or `None` when it is unknown or has no
/// routable host.
pub fn migrate_client(process: &ProcessContext, request: MigrateClient) -> Result<MigrateClientResponse> {
    let entry = process.topology.channel(request.world_id, request.channel_id)?;
    let response = entry
        .filter(|entry| entry.host != Ipv4Addr::UNSPECIFIED)
        .map(|entry| (entry.host, entry.port));

    debug!(
        world = request.world_id,
        channel = request.channel_id,
        available = response.is_some(),
        "Migration lookup"
    );
    Ok(response)
}

/// Relay a user-count query to the channel itself. Any relay failure is
/// answered as "not ok" rather than failing the caller's channel.
pub async fn channel_user_limit(
    process: &ProcessContext,
    links: &WorldLinks,
    request: ChannelUserLimit,
) -> Result<ChannelUserLimitResponse> {
    let Some(entry) = process.topology.channel(request.world_id, request.channel_id)? else {
        debug!(world = request.world_id, channel = request.channel_id, "User count for unknown channel");
        return Ok(None);
    };

    let link = links.link(&entry)?;
    match link.request(&request).await {
        Ok(Some(count)) => {
            process
                .topology
                .record_user_count(request.world_id, request.channel_id, count)?;
            Ok(Some(count))
        }
        Ok(None) => Ok(None),
        Err(e) => {
            warn!(
                world = request.world_id,
                channel = request.channel_id,
                address = link.address(),
                error = %e,
                "User count relay failed"
            );
            Ok(None)
        }
    }
}

pub fn client_initialize_spw(process: &ProcessContext, request: ClientInitializeSpw) -> Result<bool> {
    let stored = process
        .storage
        .set_secondary_password(&request.username, &request.secondary_password)?;
    if stored {
        info!(username = %request.username, "Secondary password registered");
    } else {
        warn!(username = %request.username, "Secondary password for unknown account");
    }
    Ok(stored)
}

pub fn client_auth(process: &ProcessContext, request: ClientAuth) -> Result<bool> {
    debug!(
        username = %request.username,
        status = ?request.login_status,
        "Login directory update"
    );
    process.directory.upsert(DirectoryEntry {
        username: request.username,
        account_id: request.account_id,
        login_status: request.login_status,
        world_id: request.world_id,
        channel_id: request.channel_id,
        remote_ip: request.remote_ip,
        updated_at: Instant::now(),
    })?;
    Ok(true)
}

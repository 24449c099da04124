//! Tracker queries: which storage node should serve an upload, read or update,
//! and what groups and storage nodes the cluster has.

use rand::seq::SliceRandom;
use tracing::{debug, warn};

use crate::error::{Result, TrackerError, TransportError};
use crate::file_id::{validate_group, FileId};
use crate::protocol::error::FrameError;
use crate::protocol::frame::{Command, Reply};
use crate::protocol::request::Request;
use crate::protocol::response::{decode_body, GroupStat, ResponseBody, StorageEndpoint, StorageStat};
use crate::transport::{AsyncTransport, ServerAddr, Transport};

pub struct TrackerClient<'a, T> {
    transport: &'a T,
    trackers: &'a [ServerAddr],
}

impl<'a, T: Transport> TrackerClient<'a, T> {
    pub fn new(transport: &'a T, trackers: &'a [ServerAddr]) -> Self {
        Self { transport, trackers }
    }

    /// Storage node for an upload, optionally pinned to `group`.
    pub fn query_store(&self, group: Option<&str>) -> Result<StorageEndpoint> {
        if let Some(group) = group {
            validate_group(group)?;
        }
        self.query(Request::QueryStore { group }, group.unwrap_or("*"))
    }

    /// Storage node currently serving `file_id` for reads.
    pub fn query_fetch(&self, file_id: &FileId) -> Result<StorageEndpoint> {
        self.query(Request::QueryFetch { file_id }, &file_id.to_string())
    }

    /// Storage node currently serving `file_id` for deletes and updates.
    pub fn query_update(&self, file_id: &FileId) -> Result<StorageEndpoint> {
        self.query(Request::QueryUpdate { file_id }, &file_id.to_string())
    }

    pub fn list_all_groups(&self) -> Result<Vec<GroupStat>> {
        let request = Request::ListGroups { group: None };
        let body = self.ask(&request, "*")?;
        listed_groups(body)
    }

    pub fn list_one_group(&self, group: &str) -> Result<GroupStat> {
        validate_group(group)?;
        let body = self.ask(&Request::ListGroups { group: Some(group) }, group)?;
        single_group(body)
    }

    /// Storage nodes of `group`; `storage_ip` narrows the list to one node.
    pub fn list_servers(&self, group: &str, storage_ip: Option<&str>) -> Result<Vec<StorageStat>> {
        validate_group(group)?;
        let request = Request::ListServers { group, storage_ip };
        let body = self.ask(&request, storage_ip.unwrap_or(group))?;
        listed_servers(group, body)
    }

    pub fn active_test(&self) -> Result<bool> {
        self.transport.active_test(pick_tracker(self.trackers)?)
    }

    fn query(&self, request: Request<'_>, target: &str) -> Result<StorageEndpoint> {
        let tracker = pick_tracker(self.trackers)?;
        let reply = self.transport.send_receive(tracker, &request.encode())?;
        endpoint_from_reply(request.command(), reply, target)
    }

    fn ask(&self, request: &Request<'_>, target: &str) -> Result<ResponseBody> {
        let tracker = pick_tracker(self.trackers)?;
        let reply = self.transport.send_receive(tracker, &request.encode())?;
        checked(request.command(), reply, target)
    }
}

pub struct AsyncTrackerClient<'a, T> {
    transport: &'a T,
    trackers: &'a [ServerAddr],
}

impl<'a, T: AsyncTransport> AsyncTrackerClient<'a, T> {
    pub fn new(transport: &'a T, trackers: &'a [ServerAddr]) -> Self {
        Self { transport, trackers }
    }

    pub async fn query_store(&self, group: Option<&str>) -> Result<StorageEndpoint> {
        if let Some(group) = group {
            validate_group(group)?;
        }
        self.query(Request::QueryStore { group }, group.unwrap_or("*"))
            .await
    }

    pub async fn query_fetch(&self, file_id: &FileId) -> Result<StorageEndpoint> {
        self.query(Request::QueryFetch { file_id }, &file_id.to_string())
            .await
    }

    pub async fn query_update(&self, file_id: &FileId) -> Result<StorageEndpoint> {
        self.query(Request::QueryUpdate { file_id }, &file_id.to_string())
            .await
    }

    pub async fn list_all_groups(&self) -> Result<Vec<GroupStat>> {
        let request = Request::ListGroups { group: None };
        let body = self.ask(&request, "*").await?;
        listed_groups(body)
    }

    pub async fn list_one_group(&self, group: &str) -> Result<GroupStat> {
        validate_group(group)?;
        let body = self
            .ask(&Request::ListGroups { group: Some(group) }, group)
            .await?;
        single_group(body)
    }

    pub async fn list_servers(
        &self,
        group: &str,
        storage_ip: Option<&str>,
    ) -> Result<Vec<StorageStat>> {
        validate_group(group)?;
        let request = Request::ListServers { group, storage_ip };
        let body = self.ask(&request, storage_ip.unwrap_or(group)).await?;
        listed_servers(group, body)
    }

    pub async fn active_test(&self) -> Result<bool> {
        self.transport
            .active_test(pick_tracker(self.trackers)?)
            .await
    }

    async fn query(&self, request: Request<'_>, target: &str) -> Result<StorageEndpoint> {
        let tracker = pick_tracker(self.trackers)?;
        let reply = self
            .transport
            .send_receive(tracker, &request.encode())
            .await?;
        endpoint_from_reply(request.command(), reply, target)
    }

    async fn ask(&self, request: &Request<'_>, target: &str) -> Result<ResponseBody> {
        let tracker = pick_tracker(self.trackers)?;
        let reply = self
            .transport
            .send_receive(tracker, &request.encode())
            .await?;
        checked(request.command(), reply, target)
    }
}

/// Any configured tracker will do; spread load across them.
fn pick_tracker(trackers: &[ServerAddr]) -> std::result::Result<&ServerAddr, TransportError> {
    trackers
        .choose(&mut rand::thread_rng())
        .ok_or(TransportError::NoTracker)
}

/// Maps a nonzero status to `TrackerError`, otherwise decodes the body.
fn checked(command: Command, reply: Reply, target: &str) -> Result<ResponseBody> {
    if !reply.header.is_ok() {
        warn!(
            "Tracker rejected {:?} for '{}' with status {}",
            command,
            target,
            reply.status()
        );
        return Err(TrackerError::from_status(command, reply.status(), target).into());
    }
    Ok(decode_body(command, reply.body)?)
}

fn endpoint_from_reply(command: Command, reply: Reply, target: &str) -> Result<StorageEndpoint> {
    let endpoint = checked(command, reply, target)?.into_endpoint()?;
    debug!(
        "Tracker nominated {}:{} (group '{}', path index {}) for {:?}",
        endpoint.host, endpoint.port, endpoint.group, endpoint.store_path_index, command
    );
    Ok(endpoint)
}

fn listed_groups(body: ResponseBody) -> Result<Vec<GroupStat>> {
    let groups = body.into_groups()?;
    debug!("Tracker lists {} groups", groups.len());
    Ok(groups)
}

fn single_group(body: ResponseBody) -> Result<GroupStat> {
    let mut groups = body.into_groups()?;
    Ok(groups.pop().ok_or(FrameError::UnexpectedBody("group list"))?)
}

fn listed_servers(group: &str, body: ResponseBody) -> Result<Vec<StorageStat>> {
    let servers = body.into_servers()?;
    debug!("Tracker lists {} storage nodes in '{}'", servers.len(), group);
    Ok(servers)
}

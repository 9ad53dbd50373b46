use std::net::SocketAddr;

use crate::resource::SharedResource;

/// Interface the Announcement Protocol uses to hand off to the bulk-transfer
/// collaborator (explicitly out of scope — see the crate's top-level docs).
///
/// `lanshare-agentd` wires in a real implementation; this crate ships only
/// [`NoopTransferHandle`], which logs and does nothing, so the engine runs
/// end to end before a collaborator exists.
pub trait BulkTransferHandle: Send + Sync {
    /// Called whenever the Resource Catalog learns of a resource it should
    /// fetch (or re-fetch) from `from`.
    fn request_download(&self, resource: SharedResource, from: SocketAddr);
}

/// Default [`BulkTransferHandle`] that only logs the request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTransferHandle;

impl BulkTransferHandle for NoopTransferHandle {
    fn request_download(&self, resource: SharedResource, from: SocketAddr) {
        tracing::info!(
            resource_id = %resource.resource_id,
            owner = %resource.owner,
            %from,
            "download requested with no transfer collaborator wired in"
        );
    }
}

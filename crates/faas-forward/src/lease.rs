use faas_worker_common::{Channel, Handle, PoolError};
use tracing::debug;

/// Exclusive use of a handle for one forward sequence. Released exactly
/// once, when the lease is dropped.
pub struct Lease<'a> {
    handle: &'a dyn Handle,
    channel: Channel,
}

impl<'a> Lease<'a> {
    pub async fn acquire(handle: &'a dyn Handle) -> Result<Lease<'a>, PoolError> {
        let channel = handle.lease().await?;
        debug!(function = handle.name(), url = %channel.url, "Lease acquired");
        Ok(Self { handle, channel })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        self.handle.release();
        debug!(function = self.handle.name(), "Lease released");
    }
}

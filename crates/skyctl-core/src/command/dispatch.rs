// ── Command dispatch ──
//
// Submit a write, then poll the property store until the expectation
// holds, the server reports ALERT, or the deadline passes.

use std::sync::Arc;
use std::time::Duration;

use skyctl_api::LinkSender;
use tracing::{debug, info};

use super::clock::{Clock, ElapsedTimer};
use super::{Command, Progress};
use crate::error::CoreError;
use crate::model::Property;
use crate::store::PropertyStore;

/// Everything a wait loop needs from the session.
pub(crate) struct WaitContext<'a> {
    pub store: &'a PropertyStore,
    pub clock: &'a dyn Clock,
    pub poll_interval: Duration,
    pub is_connected: &'a (dyn Fn() -> bool + Send + Sync),
}

/// Poll `check` every `poll_interval` until it yields a result.
///
/// `check` runs before the first sleep, so an already-satisfied
/// condition returns immediately.
pub(crate) async fn poll_until<T>(
    ctx: &WaitContext<'_>,
    what: &str,
    timeout: Duration,
    mut check: impl FnMut(&PropertyStore) -> Option<Result<T, CoreError>>,
) -> Result<T, CoreError> {
    let timer = ElapsedTimer::start(ctx.clock);
    loop {
        if let Some(result) = check(ctx.store) {
            return result;
        }
        if !(ctx.is_connected)() {
            return Err(CoreError::Disconnected);
        }
        if timer.has_expired(timeout) {
            return Err(CoreError::Timeout {
                key: what.to_owned(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        }
        tokio::time::sleep(ctx.poll_interval).await;
    }
}

/// Submit `cmd` and wait for its terminal state.
pub(crate) async fn execute(
    ctx: &WaitContext<'_>,
    sender: &LinkSender,
    cmd: &Command,
    timeout: Duration,
) -> Result<Arc<Property>, CoreError> {
    let id = &cmd.id;
    if ctx.store.property(id).is_none() {
        return Err(CoreError::PropertyNotFound { key: id.to_string() });
    }
    let msg = cmd.to_message()?;

    ctx.store.mark_busy(id);
    let marked = ctx.store.property(id).map_or(0, |p| p.revision);
    debug!(property = %id, values = ?cmd.values, "submitting write");
    sender.send(msg).await?;

    let key = id.to_string();
    let prop = poll_until(ctx, &key, timeout, |store| {
        let prop = store.property(id)?;
        match cmd.expect.evaluate(&prop) {
            Progress::Done if !cmd.expect.busy_first || store.server_busy_revision(id) > marked => {
                Some(Ok(prop))
            }
            // Done before the server's Busy is a stale update.
            Progress::Pending | Progress::Done => None,
            Progress::Rejected(message) => Some(Err(CoreError::Rejected {
                key: key.clone(),
                message,
            })),
        }
    })
    .await?;

    info!(property = %id, state = %prop.state, "command complete");
    Ok(prop)
}

use std::time::Duration;

use ygg_types::{Context, YggError};

use crate::messages::{ErrorInfo, RequestContext};

pub fn ygg_to_error_info(err: &YggError) -> ErrorInfo {
    let errmsg = match err {
        YggError::NotLeader { leader: Some(leader) } => format!("{err}; retry on store {leader}"),
        _ => err.to_string(),
    };
    ErrorInfo { errcode: err.errno(), errmsg }
}

/// `None` on success, the error envelope otherwise.
pub fn error_slot<T>(result: &Result<T, YggError>) -> Option<ErrorInfo> {
    let err = result.as_ref().err()?;
    if err.is_validation() {
        tracing::debug!(error = %err, "request rejected");
    } else {
        tracing::warn!(error = %err, errno = ?err.errno(), "request failed");
    }
    Some(ygg_to_error_info(err))
}

pub fn to_context(ctx: &RequestContext, timeout: Duration) -> Context {
    Context::new()
        .with_region_id(ctx.region_id)
        .with_cf_name(ctx.cf_name())
        .with_timeout(timeout)
}

#[cfg(test)]
mod tests {
    use ygg_types::{Errno, DATA_CF};

    use super::*;

    #[test]
    fn leader_hint_in_message() {
        let info = ygg_to_error_info(&YggError::NotLeader { leader: Some(3) });
        assert_eq!(info.errcode, Errno::NotLeader);
        assert!(info.errmsg.contains("store 3"));

        let info = ygg_to_error_info(&YggError::RegionNotFound(8));
        assert_eq!(info.errcode, Errno::RegionNotFound);
        assert_eq!(info.errmsg, "region 8 not found");
    }

    #[test]
    fn empty_cf_means_default_partition() {
        let ctx = to_context(&RequestContext::new(4), Duration::from_secs(1));
        assert_eq!((ctx.region_id(), ctx.cf_name()), (4, DATA_CF));
        let ctx = to_context(&RequestContext::new(4).with_cf_name("lock"), Duration::from_secs(1));
        assert_eq!(ctx.cf_name(), "lock");
        assert!(error_slot(&Ok::<(), YggError>(())).is_none());
    }
}
